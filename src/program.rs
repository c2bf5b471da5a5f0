// This module closes the emission session and runs the result. finish terminates the
// entry body, verifies the module, brings up the native target once per process, and
// hands the module to the JIT execution engine. Host symbols referenced by the
// generated code are bound explicitly: the hook trampoline, the math shims, the libc
// allocator, and the context-save pair the fault path jumps through. Compiled owns
// the engine together with the hook table the emitted code points into, so the table
// outlives every possible run. run invokes the generated entry point and folds the
// exit status and any recorded fault into a single result.

//! Finishing a session and executing the generated program.

use std::os::raw::c_void;
use std::rc::Rc;
use std::sync::OnceLock;

use inkwell::execution_engine::ExecutionEngine;
use inkwell::module::Module;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;

use crate::emit::{Emitter, HOST_EXP, HOST_INVOKE, HOST_LOG, HOST_LOG1P};
use crate::error::{EmitError, EmitResult, Fault};
use crate::host::{hook_trampoline, HookTable};

/// Session-wide build settings.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Module name, visible in IR dumps.
    pub name: String,
    /// Follow every real arithmetic operation with a not-NaN assertion.
    pub test_for_nan: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            name: "stria".into(),
            test_for_nan: false,
        }
    }
}

impl BuildOptions {
    pub fn named(name: impl Into<String>) -> Self {
        BuildOptions {
            name: name.into(),
            ..BuildOptions::default()
        }
    }
}

extern "C" {
    fn malloc(size: usize) -> *mut c_void;
    fn free(ptr: *mut c_void);
    fn _setjmp(env: *mut c_void) -> i32;
    fn longjmp(env: *mut c_void, status: i32) -> !;
}

extern "C" fn host_log(x: f64) -> f64 {
    x.ln()
}

extern "C" fn host_log1p(x: f64) -> f64 {
    x.ln_1p()
}

extern "C" fn host_exp(x: f64) -> f64 {
    x.exp()
}

fn initialize_native() -> EmitResult<()> {
    static NATIVE: OnceLock<Result<(), String>> = OnceLock::new();
    NATIVE
        .get_or_init(|| Target::initialize_native(&InitializationConfig::default()))
        .clone()
        .map_err(|reason| EmitError::Engine { reason })
}

fn bind_host_symbols<'ctx>(engine: &ExecutionEngine<'ctx>, module: &Module<'ctx>) {
    let bindings: &[(&str, usize)] = &[
        (HOST_INVOKE, hook_trampoline as usize),
        (HOST_LOG, host_log as usize),
        (HOST_LOG1P, host_log1p as usize),
        (HOST_EXP, host_exp as usize),
        ("malloc", malloc as usize),
        ("free", free as usize),
        ("_setjmp", _setjmp as usize),
        ("longjmp", longjmp as usize),
    ];
    for (name, address) in bindings {
        if let Some(declaration) = module.get_function(name) {
            engine.add_global_mapping(&declaration, *address);
        }
    }
}

impl<'ctx, 'arena> Emitter<'ctx, 'arena> {
    /// Seal the session: terminate the entry body, verify the module, and
    /// JIT-compile it into a runnable program.
    pub fn finish(self) -> EmitResult<Compiled<'ctx>> {
        if !self.block_terminated()? {
            self.builder.build_return(None)?;
        }

        self.module.verify().map_err(|message| EmitError::Verify {
            reason: message.to_string(),
        })?;

        initialize_native()?;

        let hooks = Rc::clone(&self.hooks);
        let module = self.module;
        let engine = module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|message| EmitError::Engine {
                reason: message.to_string(),
            })?;
        bind_host_symbols(&engine, &module);

        log::debug!("module sealed and handed to the execution engine");
        Ok(Compiled {
            module,
            engine,
            hooks,
        })
    }
}

/// A verified, JIT-compiled program ready to run.
pub struct Compiled<'ctx> {
    module: Module<'ctx>,
    engine: ExecutionEngine<'ctx>,
    hooks: Rc<HookTable>,
}

impl<'ctx> Compiled<'ctx> {
    /// The textual IR, for inspection.
    pub fn ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    /// Execute the generated program once.
    ///
    /// Returns the fault that aborted the run, if any. The program can be
    /// run any number of times; at most one fault is in flight per run.
    pub fn run(&self) -> Result<(), Fault> {
        log::debug!("entering generated program");
        let entry = unsafe {
            self.engine
                .get_function::<unsafe extern "C" fn() -> i32>("main")
        }
        .map_err(|message| Fault::raised(format!("entry point unavailable: {message}")))?;

        let status = unsafe { entry.call() };
        log::debug!("generated program exited with status {status}");

        if let Some(fault) = self.hooks.take_fault() {
            return Err(fault);
        }
        if status != 0 {
            return Err(Fault::raised("the program aborted without recording a fault"));
        }
        Ok(())
    }
}
