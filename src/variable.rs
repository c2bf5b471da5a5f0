// This module implements mutable slots over the immutable value algebra. A Variable
// owns a stack slot allocated in the function's entry block; get loads the current
// contents, set coerces to the slot's element type and stores, and the compound
// assignment helpers follow the load-compute-store discipline so that every mutation
// is a fresh load followed by a store. Slot promotion to registers is left to the
// backend's mem2reg pass.

//! Mutable stack slots layered over [`Value`](crate::Value).

use inkwell::types::BasicTypeEnum;

use crate::emit::Emitter;
use crate::error::EmitResult;
use crate::value::{Ptr, ToValue, Value};

/// A mutable slot holding one value of a fixed type.
#[derive(Debug, Clone, Copy)]
pub struct Variable<'ctx> {
    slot: Ptr<'ctx>,
}

impl<'ctx> Variable<'ctx> {
    /// Allocate an uninitialized slot of the given type.
    pub fn new(fx: &Emitter<'ctx, '_>, ty: BasicTypeEnum<'ctx>) -> EmitResult<Self> {
        let slot = fx.entry_alloca(ty, "var")?;
        Ok(Variable { slot })
    }

    /// Allocate a slot typed and initialized from a value.
    pub fn set_to(fx: &Emitter<'ctx, '_>, value: impl ToValue<'ctx>) -> EmitResult<Self> {
        let value = value.to_value(fx)?;
        let variable = Variable::new(fx, value.type_of()?)?;
        value.store(fx, variable.slot)?;
        Ok(variable)
    }

    /// The slot pointer.
    pub fn slot(&self) -> Ptr<'ctx> {
        self.slot
    }

    /// Load the current contents. Every call re-reads the slot.
    pub fn get(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        self.slot.load(fx)
    }

    /// Coerce to the slot's element type and store.
    pub fn set(&self, fx: &Emitter<'ctx, '_>, value: impl ToValue<'ctx>) -> EmitResult<()> {
        let value = value.to_value(fx)?.cast_to(fx, self.slot.pointee)?;
        value.store(fx, self.slot)
    }

    pub fn add_assign(&self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<()> {
        let updated = self.get(fx)?.add(fx, other)?;
        self.set(fx, updated)
    }

    pub fn sub_assign(&self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<()> {
        let updated = self.get(fx)?.sub(fx, other)?;
        self.set(fx, updated)
    }

    pub fn mul_assign(&self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<()> {
        let updated = self.get(fx)?.mul(fx, other)?;
        self.set(fx, updated)
    }

    pub fn div_assign(&self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<()> {
        let updated = self.get(fx)?.div(fx, other)?;
        self.set(fx, updated)
    }
}

impl<'ctx> ToValue<'ctx> for Variable<'ctx> {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        self.get(fx)
    }
}
