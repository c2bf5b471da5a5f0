// This module defines error types for the stria emission runtime using the thiserror
// crate for idiomatic Rust error handling. EmitError is the main error enum covering
// build-time failure scenarios: unsupported coercions between value types, broadcast
// shape mismatches, impossible strided layouts, call arity mismatches, operations a
// value variant does not define, and non-standard record packing. Each variant carries
// relevant context (type names, strides, argument counts) for debugging. Build-time
// errors are raised synchronously at emission time and abort the build; the only error
// observable while the generated code runs is Fault, which travels through the single
// recovery context saved at program entry and carries the formatted message plus the
// emission-time call stack captured when the assertion was built.

//! Error types for IR emission and generated-program faults.
//!
//! Using thiserror for more idiomatic error handling.

use std::fmt;

use thiserror::Error;

/// Main error type for the emission API.
#[derive(Error, Debug)]
pub enum EmitError {
    #[error("cannot coerce a value of type {from} to {to}")]
    Coercion { from: String, to: String },

    #[error("incompatible array shapes: {reason}")]
    Shape { reason: String },

    #[error("array stride {stride} is smaller than the packed element size {required}")]
    Layout { stride: u64, required: u64 },

    #[error("function {name} expects {expected} arguments but received {received}")]
    Arity {
        name: String,
        expected: usize,
        received: usize,
    },

    #[error("function {name} already has a body")]
    Redefinition { name: String },

    #[error("{kind} value does not define {operation}")]
    Operator {
        kind: &'static str,
        operation: &'static str,
    },

    #[error("cannot build a type for the descriptor: {reason}")]
    Packing { reason: String },

    #[error("builder has no insertion point")]
    NoInsertionPoint,

    #[error("break emitted outside of a loop body")]
    BreakOutsideLoop,

    #[error(transparent)]
    Builder(#[from] inkwell::builder::BuilderError),

    #[error("module verification failed: {reason}")]
    Verify { reason: String },

    #[error("execution engine creation failed: {reason}")]
    Engine { reason: String },
}

/// Result type alias for emission operations.
pub type EmitResult<T> = Result<T, EmitError>;

/// How a runtime fault originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A generated assertion evaluated to false.
    Assertion,
    /// A host callback returned an error.
    HostCall,
}

/// A fault raised while the generated program was running.
///
/// Faults unwind through the single recovery context established at program
/// entry; exactly one fault can be in flight per execution. For assertions the
/// `emission_trace` is the call stack captured when the assertion IR was
/// *built*, not when it fired.
#[derive(Debug, Clone)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
    pub emission_trace: Option<String>,
}

impl Fault {
    /// Build a fault representing an error raised by a host callback.
    pub fn raised(message: impl Into<String>) -> Self {
        Fault {
            kind: FaultKind::HostCall,
            message: message.into(),
            emission_trace: None,
        }
    }

    pub(crate) fn assertion(message: String, emission_trace: String) -> Self {
        Fault {
            kind: FaultKind::Assertion,
            message,
            emission_trace: Some(emission_trace),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(trace) = &self.emission_trace {
            write!(f, "\ncode generation stack:\n{trace}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Fault {}
