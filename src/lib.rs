//! stria - Embedded code generation for numerical kernels.
//!
//! stria builds native functions at runtime by emitting typed LLVM IR through
//! structured combinators instead of hand-written instruction sequences. A
//! session owns one module; values carry their kind, control flow lowers to
//! basic blocks and phi nodes, and a broadcasting strided-array engine walks
//! arbitrary memory layouts with plain getelementptr arithmetic.
//!
//! # Primary Usage
//!
//! ```ignore
//! use stria::{BuildOptions, Emitter, Variable};
//! use bumpalo::Bump;
//! use inkwell::context::Context;
//!
//! // Create an emission session with arena allocation
//! let context = Context::create();
//! let arena = Bump::new();
//! let fx = Emitter::new(&context, &arena, BuildOptions::default())?;
//!
//! // Emit a counted loop, then compile and run
//! let total = Variable::set_to(&fx, 0i64)?;
//! fx.for_(8i64, |fx, _index| total.add_assign(fx, 1i64))?;
//! fx.finish()?.run()?;
//! ```
//!
//! # Architecture
//!
//! - [`emit`] - The emission session and control-flow combinators
//! - [`value`] - Typed value algebra and coercion
//! - [`variable`] - Mutable stack slots
//! - [`function`] - Function definition and calls
//! - [`strided`] - Broadcasting strided-array engine
//! - [`types`] - Element descriptors and LLVM type mapping
//! - [`host`] - Callback bridge into host code
//! - [`program`] - Module finishing and JIT execution
//! - [`error`] - Emission errors and runtime faults

pub mod emit;
pub mod error;
pub mod function;
pub mod host;
pub mod program;
pub mod strided;
pub mod types;
pub mod value;
pub mod variable;

// Re-export the working surface
pub use emit::Emitter;
pub use error::{EmitError, EmitResult, Fault, FaultKind};
pub use function::FnDecl;
pub use host::HostValue;
pub use program::{BuildOptions, Compiled};
pub use strided::{semicast, strided_type, StridedArray, StridedArrays};
pub use types::{packed_size_of, DType, Field};
pub use value::{Ptr, ToValue, Value};
pub use variable::Variable;
