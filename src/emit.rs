// This module implements the Emitter, the single-writer emission session that owns
// the LLVM module, the instruction builder and all per-session tables. Structured
// control flow is provided as combinators that lower to basic blocks and phi nodes:
// if_/if_else append conditional branches and a merge block, for_ builds the
// check/flesh/leave block triangle with an unsigned counter phi, break_ branches to
// the innermost leave block. The fault path is a single recovery context: the
// generated main saves a jump context on entry and every abort longjmps back to it,
// so a partial run simply unwinds to the entry frame and reports failure through the
// exit status. Host callbacks marshal their arguments into entry-block scratch
// buffers and route through one extern trampoline; a nonzero trampoline status takes
// the abort path. Assertions capture the host-side call stack when the assertion is
// built, which is the stack that tells the author where the failing check came from.
// String literals are interned in the session arena and emitted as internal globals
// exactly once. Cursor positioning nests via RAII guards so a failed body closure
// still restores the caller's insertion point.

//! The emission session: structured combinators over raw IR.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use bumpalo::Bump;
use inkwell::attributes::{Attribute, AttributeLoc};
use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicTypeEnum, IntType};
use inkwell::values::{FunctionValue, GlobalValue, IntValue};
use inkwell::{AddressSpace, IntPredicate};

use crate::error::{EmitError, EmitResult, Fault};
use crate::host::{format_message, HookTable, HostValue, TAG_INT, TAG_REAL};
use crate::program::BuildOptions;
use crate::types::packed_size_of;
use crate::value::{Ptr, ToValue, Value};

/// Symbol names resolved by the host when the program is prepared for
/// execution.
pub(crate) const HOST_INVOKE: &str = "stria_host_invoke";
pub(crate) const HOST_LOG: &str = "stria_log";
pub(crate) const HOST_LOG1P: &str = "stria_log1p";
pub(crate) const HOST_EXP: &str = "stria_exp";

/// An in-progress emission session.
///
/// One emitter owns one module; the cursor starts inside the body of the
/// generated entry point and every emission method appends at the cursor.
pub struct Emitter<'ctx, 'arena> {
    pub(crate) context: &'ctx Context,
    pub(crate) module: Module<'ctx>,
    pub(crate) builder: Builder<'ctx>,
    pub(crate) arena: &'arena Bump,
    recovery: GlobalValue<'ctx>,
    literals: RefCell<hashbrown::HashMap<&'arena str, Ptr<'ctx>>>,
    named_types: RefCell<hashbrown::HashMap<&'arena str, BasicTypeEnum<'ctx>>>,
    break_stack: RefCell<Vec<BasicBlock<'ctx>>>,
    test_for_nan: Cell<bool>,
    pub(crate) hooks: Rc<HookTable>,
}

impl<'ctx, 'arena> Emitter<'ctx, 'arena> {
    /// Start a session: create the module, establish the recovery context and
    /// the entry point, and leave the cursor inside the entry point's body.
    pub fn new(
        context: &'ctx Context,
        arena: &'arena Bump,
        options: BuildOptions,
    ) -> EmitResult<Self> {
        let module = context.create_module(&options.name);
        let builder = context.create_builder();
        let ptr_ty = context.ptr_type(AddressSpace::default());
        let i32_ty = context.i32_type();

        // The recovery context main saves on entry and aborts jump back to.
        let buffer_ty = context.i8_type().array_type(512);
        let recovery = module.add_global(buffer_ty, None, "fault.context");
        recovery.set_linkage(Linkage::Internal);
        recovery.set_initializer(&buffer_ty.const_zero());

        let setjmp = module.add_function("_setjmp", i32_ty.fn_type(&[ptr_ty.into()], false), None);
        let returns_twice = Attribute::get_named_enum_kind_id("returns_twice");
        setjmp.add_attribute(
            AttributeLoc::Function,
            context.create_enum_attribute(returns_twice, 0),
        );

        let longjmp = module.add_function(
            "longjmp",
            context
                .void_type()
                .fn_type(&[ptr_ty.into(), i32_ty.into()], false),
            None,
        );
        let noreturn = Attribute::get_named_enum_kind_id("noreturn");
        longjmp.add_attribute(
            AttributeLoc::Function,
            context.create_enum_attribute(noreturn, 0),
        );

        // main: save the context, run the body, report through the status.
        // A longjmp from an abort resumes the setjmp with a nonzero status.
        let main = module.add_function("main", i32_ty.fn_type(&[], false), None);
        let entry = context.append_basic_block(main, "entry");
        let run = context.append_basic_block(main, "run");
        let fail = context.append_basic_block(main, "fail");

        builder.position_at_end(entry);
        let status = builder
            .build_call(setjmp, &[recovery.as_pointer_value().into()], "status")?
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| EmitError::Verify {
                reason: "context-save call yielded no value".into(),
            })?
            .into_int_value();
        let fresh = builder.build_int_compare(
            IntPredicate::EQ,
            status,
            i32_ty.const_zero(),
            "fresh",
        )?;
        builder.build_conditional_branch(fresh, run, fail)?;

        builder.position_at_end(fail);
        builder.build_return(Some(&i32_ty.const_int(1, false)))?;

        let body = module.add_function(
            "main_body",
            context.void_type().fn_type(&[], false),
            Some(Linkage::Internal),
        );
        builder.position_at_end(run);
        builder.build_call(body, &[], "")?;
        builder.build_return(Some(&i32_ty.const_zero()))?;

        let body_entry = context.append_basic_block(body, "entry");
        builder.position_at_end(body_entry);

        log::debug!("emission session {} started", options.name);

        Ok(Emitter {
            context,
            module,
            builder,
            arena,
            recovery,
            literals: RefCell::new(hashbrown::HashMap::new()),
            named_types: RefCell::new(hashbrown::HashMap::new()),
            break_stack: RefCell::new(Vec::new()),
            test_for_nan: Cell::new(options.test_for_nan),
            hooks: Rc::new(HookTable::new()),
        })
    }

    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn builder(&self) -> &Builder<'ctx> {
        &self.builder
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Whether real arithmetic is followed by a not-NaN assertion.
    pub fn test_for_nan(&self) -> bool {
        self.test_for_nan.get()
    }

    pub fn set_test_for_nan(&self, enabled: bool) {
        self.test_for_nan.set(enabled);
    }

    /// The pointer-width integer type.
    pub fn iptr_type(&self) -> IntType<'ctx> {
        self.context
            .custom_width_int_type(8 * std::mem::size_of::<usize>() as u32)
    }

    // ---------------------------------------------------------------------
    // Cursor bookkeeping
    // ---------------------------------------------------------------------

    pub(crate) fn current_block(&self) -> EmitResult<BasicBlock<'ctx>> {
        self.builder
            .get_insert_block()
            .ok_or(EmitError::NoInsertionPoint)
    }

    pub(crate) fn current_function(&self) -> EmitResult<FunctionValue<'ctx>> {
        self.current_block()?
            .get_parent()
            .ok_or(EmitError::NoInsertionPoint)
    }

    /// Whether the block under the cursor already ends in a terminator.
    pub(crate) fn block_terminated(&self) -> EmitResult<bool> {
        Ok(self.current_block()?.get_terminator().is_some())
    }

    /// Remember the cursor; the guard restores it when dropped, including on
    /// the error path out of a body closure.
    pub(crate) fn save_cursor(&self) -> EmitResult<CursorGuard<'_, 'ctx, 'arena>> {
        Ok(CursorGuard {
            fx: self,
            block: self.current_block()?,
        })
    }

    /// Allocate a stack slot in the current function's entry block, so slots
    /// created inside loop bodies are not re-allocated per iteration.
    pub(crate) fn entry_alloca(
        &self,
        ty: BasicTypeEnum<'ctx>,
        name: &str,
    ) -> EmitResult<Ptr<'ctx>> {
        let current = self.current_block()?;
        let entry = self
            .current_function()?
            .get_first_basic_block()
            .ok_or(EmitError::NoInsertionPoint)?;
        match entry.get_first_instruction() {
            Some(first) => self.builder.position_before(&first),
            None => self.builder.position_at_end(entry),
        }
        let slot = self.builder.build_alloca(ty, name);
        self.builder.position_at_end(current);
        Ok(Ptr::new(slot?, ty))
    }

    /// Normalize a condition to a single bit.
    fn truth(&self, condition: impl ToValue<'ctx>) -> EmitResult<IntValue<'ctx>> {
        let condition = condition.to_value(self)?.expect_int("branch condition")?;
        if condition.get_type().get_bit_width() == 1 {
            return Ok(condition);
        }
        Ok(self.builder.build_int_compare(
            IntPredicate::NE,
            condition,
            condition.get_type().const_zero(),
            "truth",
        )?)
    }

    // ---------------------------------------------------------------------
    // Control flow
    // ---------------------------------------------------------------------

    /// Run the body when the condition holds. The cursor ends at the merge
    /// block either way.
    pub fn if_(
        &self,
        condition: impl ToValue<'ctx>,
        body: impl FnOnce(&Self) -> EmitResult<()>,
    ) -> EmitResult<()> {
        let condition = self.truth(condition)?;
        let function = self.current_function()?;
        let then_block = self.context.append_basic_block(function, "if.then");
        let merge_block = self.context.append_basic_block(function, "if.merge");

        self.builder
            .build_conditional_branch(condition, then_block, merge_block)?;
        self.builder.position_at_end(then_block);
        body(self)?;
        if !self.block_terminated()? {
            self.builder.build_unconditional_branch(merge_block)?;
        }
        self.builder.position_at_end(merge_block);
        Ok(())
    }

    /// Two-armed conditional; the body closure is invoked once per arm with a
    /// flag naming the arm. The merge block is created only when an arm falls
    /// off its end: two arms that both return leave no unreachable merge
    /// behind, and the cursor stays in the second arm's terminated block.
    pub fn if_else(
        &self,
        condition: impl ToValue<'ctx>,
        mut body: impl FnMut(&Self, bool) -> EmitResult<()>,
    ) -> EmitResult<()> {
        let condition = self.truth(condition)?;
        let function = self.current_function()?;
        let then_block = self.context.append_basic_block(function, "if.then");
        let else_block = self.context.append_basic_block(function, "if.else");
        let mut merge_block = None;

        self.builder
            .build_conditional_branch(condition, then_block, else_block)?;

        self.builder.position_at_end(then_block);
        body(self, true)?;
        if !self.block_terminated()? {
            let merge = *merge_block
                .get_or_insert_with(|| self.context.append_basic_block(function, "if.merge"));
            self.builder.build_unconditional_branch(merge)?;
        }

        self.builder.position_at_end(else_block);
        body(self, false)?;
        if !self.block_terminated()? {
            let merge = *merge_block
                .get_or_insert_with(|| self.context.append_basic_block(function, "if.merge"));
            self.builder.build_unconditional_branch(merge)?;
        }

        if let Some(merge) = merge_block {
            self.builder.position_at_end(merge);
        }
        Ok(())
    }

    /// Counted loop from zero to `count` exclusive. The index is a 64-bit phi
    /// and the trip test is unsigned, so a zero or negative-as-unsigned-huge
    /// count is the caller's to avoid. The body may `break_`.
    pub fn for_(
        &self,
        count: impl ToValue<'ctx>,
        body: impl FnOnce(&Self, Value<'ctx>) -> EmitResult<()>,
    ) -> EmitResult<()> {
        let i64_ty = self.context.i64_type();
        let count = count
            .to_value(self)?
            .cast_to(self, i64_ty.into())?
            .expect_int("loop count")?;

        let function = self.current_function()?;
        let start = self.current_block()?;
        let check = self.context.append_basic_block(function, "for.check");
        let flesh = self.context.append_basic_block(function, "for.flesh");
        let leave = self.context.append_basic_block(function, "for.leave");

        self.builder.build_unconditional_branch(check)?;
        self.builder.position_at_end(check);
        let index = self.builder.build_phi(i64_ty, "for.index")?;
        index.add_incoming(&[(&i64_ty.const_zero(), start)]);
        let index_value = index.as_basic_value().into_int_value();
        let again = self.builder.build_int_compare(
            IntPredicate::UGT,
            count,
            index_value,
            "for.test",
        )?;
        self.builder.build_conditional_branch(again, flesh, leave)?;

        self.builder.position_at_end(flesh);
        {
            let guard = BreakGuard::push(self, leave);
            body(self, Value::Integer(index_value))?;
            drop(guard);
        }
        if !self.block_terminated()? {
            let next =
                self.builder
                    .build_int_add(index_value, i64_ty.const_int(1, false), "for.next")?;
            let tail = self.current_block()?;
            self.builder.build_unconditional_branch(check)?;
            index.add_incoming(&[(&next, tail)]);
        }

        self.builder.position_at_end(leave);
        Ok(())
    }

    /// Leave the innermost loop. Code emitted after the break in the same
    /// body is unreachable.
    pub fn break_(&self) -> EmitResult<()> {
        let target = *self
            .break_stack
            .borrow()
            .last()
            .ok_or(EmitError::BreakOutsideLoop)?;
        self.builder.build_unconditional_branch(target)?;
        let dead = self
            .context
            .append_basic_block(self.current_function()?, "break.dead");
        self.builder.position_at_end(dead);
        Ok(())
    }

    /// Branchless two-way choice; the false arm is coerced to the true arm's
    /// type.
    pub fn select(
        &self,
        condition: impl ToValue<'ctx>,
        on_true: impl ToValue<'ctx>,
        on_false: impl ToValue<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        let condition = self.truth(condition)?;
        let on_true = on_true.to_value(self)?;
        let on_false = on_false.to_value(self)?.cast_to(self, on_true.type_of()?)?;
        let chosen =
            self.builder
                .build_select(condition, on_true.basic()?, on_false.basic()?, "select")?;
        Ok(Value::classify(self, chosen))
    }

    /// Return from the function under emission.
    pub fn return_(&self, value: Option<Value<'ctx>>) -> EmitResult<()> {
        match value {
            Some(value) => self.builder.build_return(Some(&value.basic()?))?,
            None => self.builder.build_return(None)?,
        };
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Allocation and literals
    // ---------------------------------------------------------------------

    /// Allocate a stack slot, optionally storing a coerced initial value.
    pub fn stack_allocate(
        &self,
        ty: BasicTypeEnum<'ctx>,
        initial: Option<Value<'ctx>>,
    ) -> EmitResult<Ptr<'ctx>> {
        let slot = self.entry_alloca(ty, "slot")?;
        if let Some(value) = initial {
            value.cast_to(self, ty)?.store(self, slot)?;
        }
        Ok(slot)
    }

    /// Allocate `count` packed elements on the heap. Ownership stays with the
    /// emitted program; pair with [`heap_free`](Self::heap_free).
    pub fn heap_allocate(
        &self,
        ty: BasicTypeEnum<'ctx>,
        count: impl ToValue<'ctx>,
    ) -> EmitResult<Ptr<'ctx>> {
        let iptr = self.iptr_type();
        let count = count
            .to_value(self)?
            .cast_to(self, iptr.into())?
            .expect_int("allocation count")?;
        let element = iptr.const_int(packed_size_of(ty)?, false);
        let bytes = self.builder.build_int_mul(count, element, "alloc.bytes")?;

        let ptr_ty: BasicTypeEnum = self.context.ptr_type(AddressSpace::default()).into();
        let malloc = self.declare_function("malloc", &[iptr.into()], Some(ptr_ty));
        let raw = self
            .call(&malloc, &[Value::Integer(bytes)])?
            .ok_or_else(|| EmitError::Verify {
                reason: "allocator call yielded no value".into(),
            })?
            .expect_ptr("heap allocation")?;
        Ok(raw.retype(ty))
    }

    /// Release a heap allocation.
    pub fn heap_free(&self, ptr: Ptr<'ctx>) -> EmitResult<()> {
        let ptr_ty: BasicTypeEnum = self.context.ptr_type(AddressSpace::default()).into();
        let free = self.declare_function("free", &[ptr_ty], None);
        self.call(&free, &[ptr.value()])?;
        Ok(())
    }

    /// NUL-terminated string constant, interned per session: the same text
    /// always yields the same global.
    pub fn string_literal(&self, text: &str) -> EmitResult<Ptr<'ctx>> {
        let mut literals = self.literals.borrow_mut();
        if let Some(existing) = literals.get(text) {
            return Ok(*existing);
        }

        let bytes = self.context.const_string(text.as_bytes(), true);
        let global = self
            .module
            .add_global(bytes.get_type(), None, &format!("literal{}", literals.len()));
        global.set_linkage(Linkage::Internal);
        global.set_constant(true);
        global.set_initializer(&bytes);

        let interned = Ptr::new(global.as_pointer_value(), bytes.get_type().into());
        literals.insert(self.arena.alloc_str(text), interned);
        Ok(interned)
    }

    /// Get-or-build a session-named type. The builder closure runs only on
    /// the first request for a name.
    pub fn named_type(
        &self,
        name: &str,
        build: impl FnOnce(&Self) -> EmitResult<BasicTypeEnum<'ctx>>,
    ) -> EmitResult<BasicTypeEnum<'ctx>> {
        if let Some(existing) = self.named_types.borrow().get(name) {
            return Ok(*existing);
        }
        let built = build(self)?;
        self.named_types
            .borrow_mut()
            .insert(self.arena.alloc_str(name), built);
        Ok(built)
    }

    // ---------------------------------------------------------------------
    // Faults, hooks, assertions
    // ---------------------------------------------------------------------

    /// Abandon the run: jump back to the recovery context saved at entry.
    pub fn abort(&self) -> EmitResult<()> {
        let longjmp = self
            .module
            .get_function("longjmp")
            .ok_or(EmitError::NoInsertionPoint)?;
        self.builder.build_call(
            longjmp,
            &[
                self.recovery.as_pointer_value().into(),
                self.context.i32_type().const_int(1, false).into(),
            ],
            "",
        )?;
        self.builder.build_unreachable()?;
        // Keep the cursor valid for whatever the caller emits next; the
        // block is unreachable by construction.
        let dead = self
            .context
            .append_basic_block(self.current_function()?, "abort.dead");
        self.builder.position_at_end(dead);
        Ok(())
    }

    /// Emit a call back into the host. Arguments are marshalled by tag and
    /// 64-bit word; a failing callback records its fault and the generated
    /// code takes the abort path.
    pub fn hook(
        &self,
        arguments: &[Value<'ctx>],
        callback: impl FnMut(&[HostValue]) -> Result<(), Fault> + 'static,
    ) -> EmitResult<()> {
        let slot = self.hooks.register(Box::new(callback));
        let argc = arguments.len() as u32;
        let i8_ty = self.context.i8_type();
        let i32_ty = self.context.i32_type();
        let i64_ty = self.context.i64_type();

        let tags = self.entry_alloca(i8_ty.array_type(argc).into(), "hook.tags")?;
        let words = self.entry_alloca(i64_ty.array_type(argc).into(), "hook.words")?;

        for (i, argument) in arguments.iter().enumerate() {
            let (tag, word) = match argument {
                Value::Integer(v) => {
                    let wide = if v.get_type().get_bit_width() < 64 {
                        self.builder.build_int_s_extend(*v, i64_ty, "hook.word")?
                    } else {
                        *v
                    };
                    (TAG_INT, wide)
                }
                Value::Real(v) => {
                    let bits = self
                        .builder
                        .build_bit_cast(*v, i64_ty, "hook.bits")?
                        .into_int_value();
                    (TAG_REAL, bits)
                }
                other => {
                    return Err(EmitError::Operator {
                        kind: other.kind_name(),
                        operation: "hook argument",
                    })
                }
            };

            let at = [i32_ty.const_zero(), i32_ty.const_int(i as u64, false)];
            let tag_slot = tags.gep(self, &at)?;
            self.builder
                .build_store(tag_slot, i8_ty.const_int(u64::from(tag), false))?;
            let word_slot = words.gep(self, &at)?;
            self.builder.build_store(word_slot, word)?;
        }

        let ptr_ty = self.context.ptr_type(AddressSpace::default());
        let invoke = self.module.get_function(HOST_INVOKE).unwrap_or_else(|| {
            let fn_type = i32_ty.fn_type(
                &[
                    ptr_ty.into(),
                    i64_ty.into(),
                    i64_ty.into(),
                    ptr_ty.into(),
                    ptr_ty.into(),
                ],
                false,
            );
            self.module.add_function(HOST_INVOKE, fn_type, None)
        });

        // The table address is baked in as a constant; the Rc keeps it alive
        // for as long as the compiled program can run.
        let table_addr = self
            .iptr_type()
            .const_int(Rc::as_ptr(&self.hooks) as usize as u64, false);
        let table = self
            .builder
            .build_int_to_ptr(table_addr, ptr_ty, "hook.table")?;

        let status = self
            .builder
            .build_call(
                invoke,
                &[
                    table.into(),
                    i64_ty.const_int(slot as u64, false).into(),
                    i64_ty.const_int(u64::from(argc), false).into(),
                    tags.raw.into(),
                    words.raw.into(),
                ],
                "hook.status",
            )?
            .try_as_basic_value()
            .basic()
            .ok_or_else(|| EmitError::Verify {
                reason: "hook call yielded no status".into(),
            })?
            .into_int_value();

        let failed = self.builder.build_int_compare(
            IntPredicate::NE,
            status,
            i32_ty.const_zero(),
            "hook.failed",
        )?;
        self.if_(Value::Integer(failed), |fx| fx.abort())
    }

    /// Assert a condition, aborting the run with a formatted message when it
    /// fails. `{}` placeholders in the message are filled with the argument
    /// values in order. The reported stack is captured here, at emission
    /// time, which is where the failing check was authored.
    pub fn assert_(
        &self,
        condition: impl ToValue<'ctx>,
        message: &str,
        arguments: &[Value<'ctx>],
    ) -> EmitResult<()> {
        let condition = self.truth(condition)?;
        let failed = self.builder.build_int_compare(
            IntPredicate::EQ,
            condition,
            condition.get_type().const_zero(),
            "assert.failed",
        )?;

        let template = message.to_owned();
        let trace = std::backtrace::Backtrace::force_capture().to_string();
        self.if_(Value::Integer(failed), |fx| {
            fx.hook(arguments, move |values| {
                Err(Fault::assertion(
                    format_message(&template, values),
                    trace.clone(),
                ))
            })
        })
    }

    /// Guard a real arithmetic result with a not-NaN assertion when the
    /// session flag is set.
    pub(crate) fn nan_guard(
        &self,
        result: Value<'ctx>,
        lhs: Value<'ctx>,
        rhs: Value<'ctx>,
        operator: &'static str,
    ) -> EmitResult<()> {
        if !self.test_for_nan.get() {
            return Ok(());
        }
        let poisoned = result.is_nan(self)?;
        let fine = self.builder.build_not(poisoned.expect_int("is_nan")?, "fine")?;
        self.assert_(
            Value::Integer(fine),
            &format!("result of {{}} {operator} {{}} is not a number"),
            &[lhs, rhs],
        )
    }

    // ---------------------------------------------------------------------
    // Math
    // ---------------------------------------------------------------------

    fn real_unary(
        &self,
        symbol: &str,
        label: &str,
        argument: impl ToValue<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        let f64_ty: BasicTypeEnum = self.context.f64_type().into();
        let argument = argument.to_value(self)?.cast_to(self, f64_ty)?;
        let decl = self.declare_function(symbol, &[f64_ty], Some(f64_ty));
        let result = self
            .call(&decl, &[argument])?
            .ok_or_else(|| EmitError::Verify {
                reason: format!("{symbol} yielded no value"),
            })?;

        if self.test_for_nan.get() {
            let poisoned = result.is_nan(self)?;
            let fine = self
                .builder
                .build_not(poisoned.expect_int("is_nan")?, "fine")?;
            self.assert_(
                Value::Integer(fine),
                &format!("result of {label}({{}}) is not a number"),
                &[argument],
            )?;
        }
        Ok(result)
    }

    /// Natural logarithm.
    pub fn log(&self, argument: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.real_unary(HOST_LOG, "log", argument)
    }

    /// log(1 + x), stable near zero.
    pub fn log1p(&self, argument: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.real_unary(HOST_LOG1P, "log1p", argument)
    }

    /// Natural exponential.
    pub fn exp(&self, argument: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.real_unary(HOST_EXP, "exp", argument)
    }
}

/// Restores the saved insertion point on drop.
pub(crate) struct CursorGuard<'a, 'ctx, 'arena> {
    fx: &'a Emitter<'ctx, 'arena>,
    block: BasicBlock<'ctx>,
}

impl Drop for CursorGuard<'_, '_, '_> {
    fn drop(&mut self) {
        self.fx.builder.position_at_end(self.block);
    }
}

/// Pops the innermost break target on drop.
struct BreakGuard<'a, 'ctx, 'arena> {
    fx: &'a Emitter<'ctx, 'arena>,
}

impl<'a, 'ctx, 'arena> BreakGuard<'a, 'ctx, 'arena> {
    fn push(fx: &'a Emitter<'ctx, 'arena>, target: BasicBlock<'ctx>) -> Self {
        fx.break_stack.borrow_mut().push(target);
        BreakGuard { fx }
    }
}

impl Drop for BreakGuard<'_, '_, '_> {
    fn drop(&mut self) {
        self.fx.break_stack.borrow_mut().pop();
    }
}
