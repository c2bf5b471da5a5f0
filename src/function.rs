// This module covers function declaration, definition and calls. FnDecl pairs an
// LLVM function with the parameter and return types the call path coerces against.
// define_function positions the builder inside a fresh entry block, runs the caller's
// body closure with the classified parameters, then restores the previous cursor via
// the emitter's cursor guard; void functions that fall off the end get an implicit
// return. define_function_once memoizes by name so shared helpers are emitted exactly
// once per module. call checks arity, coerces each argument to the matching parameter
// type, and classifies the call result.

//! Function declaration, definition and call emission.

use inkwell::module::Linkage;
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum};
use inkwell::values::{BasicMetadataValueEnum, FunctionValue};

use crate::emit::Emitter;
use crate::error::{EmitError, EmitResult};
use crate::value::{ToValue, Value};

/// A declared function together with its signature.
#[derive(Debug, Clone)]
pub struct FnDecl<'ctx> {
    pub value: FunctionValue<'ctx>,
    pub params: Vec<BasicTypeEnum<'ctx>>,
    pub ret: Option<BasicTypeEnum<'ctx>>,
}

impl<'ctx, 'arena> Emitter<'ctx, 'arena> {
    /// Declare a function without a body, reusing any existing declaration of
    /// the same name.
    pub fn declare_function(
        &self,
        name: &str,
        params: &[BasicTypeEnum<'ctx>],
        ret: Option<BasicTypeEnum<'ctx>>,
    ) -> FnDecl<'ctx> {
        let value = self.module().get_function(name).unwrap_or_else(|| {
            let meta: Vec<BasicMetadataTypeEnum> =
                params.iter().map(|t| (*t).into()).collect();
            let fn_type = match ret {
                Some(ty) => ty.fn_type(&meta, false),
                None => self.context().void_type().fn_type(&meta, false),
            };
            self.module().add_function(name, fn_type, None)
        });
        FnDecl {
            value,
            params: params.to_vec(),
            ret,
        }
    }

    /// Define a function with internal linkage, emitting its body via the
    /// given closure. The emission cursor is restored afterwards, so defining
    /// a function mid-stream does not disturb the surrounding code. A name
    /// that already has a body is rejected; see [`define_function_once`]
    /// for the memoizing variant.
    ///
    /// [`define_function_once`]: Emitter::define_function_once
    pub fn define_function(
        &self,
        name: &str,
        params: &[BasicTypeEnum<'ctx>],
        ret: Option<BasicTypeEnum<'ctx>>,
        body: impl FnOnce(&Self, &[Value<'ctx>]) -> EmitResult<()>,
    ) -> EmitResult<FnDecl<'ctx>> {
        let decl = self.declare_function(name, params, ret);
        if decl.value.count_basic_blocks() > 0 {
            return Err(EmitError::Redefinition {
                name: name.to_owned(),
            });
        }
        decl.value.set_linkage(Linkage::Internal);

        let entry = self.context().append_basic_block(decl.value, "entry");
        let guard = self.save_cursor()?;
        self.builder().position_at_end(entry);

        let arguments: Vec<Value<'ctx>> = decl
            .value
            .get_param_iter()
            .map(|p| Value::classify(self, p))
            .collect();
        body(self, &arguments)?;

        // Void functions may fall off the end of their body.
        if ret.is_none() && !self.block_terminated()? {
            self.builder().build_return(None)?;
        }

        drop(guard);
        log::debug!("defined function {name} ({} params)", params.len());
        Ok(decl)
    }

    /// Define a function exactly once per module; later calls with the same
    /// name return the existing definition without re-emitting the body.
    pub fn define_function_once(
        &self,
        name: &str,
        params: &[BasicTypeEnum<'ctx>],
        ret: Option<BasicTypeEnum<'ctx>>,
        body: impl FnOnce(&Self, &[Value<'ctx>]) -> EmitResult<()>,
    ) -> EmitResult<FnDecl<'ctx>> {
        if let Some(existing) = self.module().get_function(name) {
            if existing.count_basic_blocks() > 0 {
                return Ok(FnDecl {
                    value: existing,
                    params: params.to_vec(),
                    ret,
                });
            }
        }
        self.define_function(name, params, ret, body)
    }

    /// Emit a call, coercing each argument to the declared parameter type.
    pub fn call(
        &self,
        decl: &FnDecl<'ctx>,
        arguments: &[Value<'ctx>],
    ) -> EmitResult<Option<Value<'ctx>>> {
        if arguments.len() != decl.params.len() {
            return Err(EmitError::Arity {
                name: decl
                    .value
                    .get_name()
                    .to_str()
                    .unwrap_or("<function>")
                    .to_owned(),
                expected: decl.params.len(),
                received: arguments.len(),
            });
        }

        let mut coerced: Vec<BasicMetadataValueEnum<'ctx>> =
            Vec::with_capacity(arguments.len());
        for (argument, param) in arguments.iter().zip(&decl.params) {
            let value = argument.to_value(self)?.cast_to(self, *param)?;
            coerced.push(value.basic()?.into());
        }

        let site = self.builder().build_call(decl.value, &coerced, "call")?;
        Ok(site
            .try_as_basic_value()
            .basic()
            .map(|v| Value::classify(self, v)))
    }
}
