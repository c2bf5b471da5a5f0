// This module implements the typed value algebra at the heart of the emission runtime.
// Value is a sealed tagged union over Integer, Real, Pointer, Function and Aggregate
// operands; every arithmetic, comparison and cast method dispatches on the variant and
// appends the corresponding instruction at the emitter's current cursor. Binary
// operations coerce their right operand to the left operand's type first, which is
// also how mixed literal/value expressions acquire their width. Integer arithmetic is
// signed with truncating remainder; Real arithmetic optionally asserts its result is
// not NaN when the module-wide flag is set. Pointers carry their pointee type in the
// wrapper because LLVM pointers are opaque: the typed-pointer information the strided
// engine and the allocator rely on has to travel alongside the raw operand.

//! Typed IR operands and their coercion rules.

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValueEnum, FloatValue, FunctionValue, IntValue, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::emit::Emitter;
use crate::error::{EmitError, EmitResult};

/// A typed pointer: the raw opaque operand plus the type it points at.
#[derive(Debug, Clone, Copy)]
pub struct Ptr<'ctx> {
    pub raw: PointerValue<'ctx>,
    pub pointee: BasicTypeEnum<'ctx>,
}

impl<'ctx> Ptr<'ctx> {
    pub fn new(raw: PointerValue<'ctx>, pointee: BasicTypeEnum<'ctx>) -> Self {
        Ptr { raw, pointee }
    }

    /// Load the pointed-at value. Every read goes back to memory.
    pub fn load(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        let loaded = fx.builder().build_load(self.pointee, self.raw, "load")?;
        Ok(Value::classify(fx, loaded))
    }

    /// Index into the pointed-at aggregate.
    pub fn gep(&self, fx: &Emitter<'ctx, '_>, indices: &[IntValue<'ctx>]) -> EmitResult<PointerValue<'ctx>> {
        let gep = unsafe {
            fx.builder()
                .build_in_bounds_gep(self.pointee, self.raw, indices, "gep")?
        };
        Ok(gep)
    }

    /// Reinterpret as a pointer to a different type. Opaque pointers make
    /// this a pure re-tagging with no emitted instruction.
    pub fn retype(self, pointee: BasicTypeEnum<'ctx>) -> Self {
        Ptr {
            raw: self.raw,
            pointee,
        }
    }

    pub fn value(self) -> Value<'ctx> {
        Value::Pointer(self)
    }
}

/// An immutable handle to a typed IR operand.
#[derive(Debug, Clone, Copy)]
pub enum Value<'ctx> {
    Integer(IntValue<'ctx>),
    Real(FloatValue<'ctx>),
    Pointer(Ptr<'ctx>),
    Function(FunctionValue<'ctx>),
    /// Anything without arithmetic: structs, arrays, vectors, odd floats.
    Aggregate(BasicValueEnum<'ctx>),
}

/// Anything the emission API accepts where a value is expected: literals
/// become width-appropriate constants, variables re-load from their slot.
pub trait ToValue<'ctx> {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>>;
}

impl<'ctx> ToValue<'ctx> for Value<'ctx> {
    fn to_value(&self, _fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(*self)
    }
}

impl<'ctx> ToValue<'ctx> for Ptr<'ctx> {
    fn to_value(&self, _fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(Value::Pointer(*self))
    }
}

impl<'ctx> ToValue<'ctx> for bool {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(Value::Integer(
            fx.context().bool_type().const_int(u64::from(*self), false),
        ))
    }
}

impl<'ctx> ToValue<'ctx> for i32 {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(Value::Integer(
            fx.context().i32_type().const_int(*self as u64, true),
        ))
    }
}

impl<'ctx> ToValue<'ctx> for i64 {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(Value::Integer(
            fx.context().i64_type().const_int(*self as u64, true),
        ))
    }
}

impl<'ctx> ToValue<'ctx> for u64 {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(Value::Integer(fx.context().i64_type().const_int(*self, false)))
    }
}

impl<'ctx> ToValue<'ctx> for f64 {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        Ok(Value::Real(fx.context().f64_type().const_float(*self)))
    }
}

impl<'ctx, T: ToValue<'ctx>> ToValue<'ctx> for &T {
    fn to_value(&self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        T::to_value(*self, fx)
    }
}

impl<'ctx> Value<'ctx> {
    /// Classify a raw operand into the minimal matching variant.
    pub(crate) fn classify(fx: &Emitter<'ctx, '_>, value: BasicValueEnum<'ctx>) -> Value<'ctx> {
        match value {
            BasicValueEnum::IntValue(v) => Value::Integer(v),
            BasicValueEnum::FloatValue(v) if v.get_type() == fx.context().f64_type() => {
                Value::Real(v)
            }
            BasicValueEnum::PointerValue(v) => {
                // Opaque operand; callers retype when they know better.
                Value::Pointer(Ptr::new(v, fx.context().i8_type().into()))
            }
            other => Value::Aggregate(other),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Pointer(_) => "pointer",
            Value::Function(_) => "function",
            Value::Aggregate(_) => "aggregate",
        }
    }

    /// The raw operand, for handing to the backend.
    pub fn basic(&self) -> EmitResult<BasicValueEnum<'ctx>> {
        match self {
            Value::Integer(v) => Ok((*v).into()),
            Value::Real(v) => Ok((*v).into()),
            Value::Pointer(p) => Ok(p.raw.into()),
            Value::Function(f) => Ok(f.as_global_value().as_pointer_value().into()),
            Value::Aggregate(v) => Ok(*v),
        }
    }

    pub fn expect_int(&self, operation: &'static str) -> EmitResult<IntValue<'ctx>> {
        match self {
            Value::Integer(v) => Ok(*v),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation,
            }),
        }
    }

    pub fn expect_real(&self, operation: &'static str) -> EmitResult<FloatValue<'ctx>> {
        match self {
            Value::Real(v) => Ok(*v),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation,
            }),
        }
    }

    pub fn expect_ptr(&self, operation: &'static str) -> EmitResult<Ptr<'ctx>> {
        match self {
            Value::Pointer(p) => Ok(*p),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation,
            }),
        }
    }

    /// The type of the underlying operand.
    pub fn type_of(&self) -> EmitResult<BasicTypeEnum<'ctx>> {
        Ok(match self {
            Value::Integer(v) => v.get_type().into(),
            Value::Real(v) => v.get_type().into(),
            Value::Pointer(p) => p.raw.get_type().into(),
            Value::Function(f) => f.as_global_value().as_pointer_value().get_type().into(),
            Value::Aggregate(v) => v.get_type(),
        })
    }

    fn coerced(&self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        other.to_value(fx)?.cast_to(fx, self.type_of()?)
    }

    // ---------------------------------------------------------------------
    // Arithmetic
    // ---------------------------------------------------------------------

    pub fn add(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_int_add(
                lhs,
                rhs.expect_int("+")?,
                "add",
            )?)),
            Value::Real(lhs) => {
                let out = Value::Real(fx.builder().build_float_add(
                    lhs,
                    rhs.expect_real("+")?,
                    "fadd",
                )?);
                fx.nan_guard(out, self, rhs, "+")?;
                Ok(out)
            }
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "+",
            }),
        }
    }

    pub fn sub(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_int_sub(
                lhs,
                rhs.expect_int("-")?,
                "sub",
            )?)),
            Value::Real(lhs) => {
                let out = Value::Real(fx.builder().build_float_sub(
                    lhs,
                    rhs.expect_real("-")?,
                    "fsub",
                )?);
                fx.nan_guard(out, self, rhs, "-")?;
                Ok(out)
            }
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "-",
            }),
        }
    }

    pub fn mul(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_int_mul(
                lhs,
                rhs.expect_int("*")?,
                "mul",
            )?)),
            Value::Real(lhs) => {
                let out = Value::Real(fx.builder().build_float_mul(
                    lhs,
                    rhs.expect_real("*")?,
                    "fmul",
                )?);
                fx.nan_guard(out, self, rhs, "*")?;
                Ok(out)
            }
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "*",
            }),
        }
    }

    pub fn div(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_int_signed_div(
                lhs,
                rhs.expect_int("/")?,
                "sdiv",
            )?)),
            Value::Real(lhs) => {
                let out = Value::Real(fx.builder().build_float_div(
                    lhs,
                    rhs.expect_real("/")?,
                    "fdiv",
                )?);
                fx.nan_guard(out, self, rhs, "/")?;
                Ok(out)
            }
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "/",
            }),
        }
    }

    /// Truncating remainder, matching hardware signed remainder rather than
    /// floor division.
    pub fn rem(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_int_signed_rem(
                lhs,
                rhs.expect_int("%")?,
                "srem",
            )?)),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "%",
            }),
        }
    }

    pub fn and_(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_and(
                lhs,
                rhs.expect_int("&")?,
                "and",
            )?)),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "&",
            }),
        }
    }

    pub fn or_(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_or(
                lhs,
                rhs.expect_int("|")?,
                "or",
            )?)),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "|",
            }),
        }
    }

    pub fn xor_(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        let rhs = self.coerced(fx, other)?;
        match self {
            Value::Integer(lhs) => Ok(Value::Integer(fx.builder().build_xor(
                lhs,
                rhs.expect_int("^")?,
                "xor",
            )?)),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "^",
            }),
        }
    }

    /// Bitwise inversion.
    pub fn invert(self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        match self {
            Value::Integer(v) => Ok(Value::Integer(fx.builder().build_not(v, "not")?)),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "~",
            }),
        }
    }

    /// Negation: multiplication by -1, reals only.
    pub fn neg(self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        match self {
            Value::Real(_) => self.mul(fx, -1.0f64),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "unary -",
            }),
        }
    }

    /// Branchless absolute value: a select between the value and its
    /// negation, keyed on a greater-than-zero comparison.
    pub fn abs(self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        match self {
            Value::Real(_) => {
                let positive = self.gt(fx, 0.0f64)?;
                let negated = self.neg(fx)?;
                fx.select(positive, self, negated)
            }
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "abs",
            }),
        }
    }

    /// NaN self-comparison test; yields a boolean.
    pub fn is_nan(self, fx: &Emitter<'ctx, '_>) -> EmitResult<Value<'ctx>> {
        match self {
            Value::Real(v) => Ok(Value::Integer(fx.builder().build_float_compare(
                FloatPredicate::UNO,
                v,
                v,
                "isnan",
            )?)),
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation: "is_nan",
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Comparisons: 1-bit Integer results. Integer comparisons are signed,
    // real comparisons ordered.
    // ---------------------------------------------------------------------

    fn compare(
        self,
        fx: &Emitter<'ctx, '_>,
        other: impl ToValue<'ctx>,
        int_predicate: IntPredicate,
        float_predicate: FloatPredicate,
        operation: &'static str,
    ) -> EmitResult<Value<'ctx>> {
        match self {
            Value::Integer(lhs) => {
                let rhs = self.coerced(fx, other)?.expect_int(operation)?;
                Ok(Value::Integer(fx.builder().build_int_compare(
                    int_predicate,
                    lhs,
                    rhs,
                    "icmp",
                )?))
            }
            Value::Real(lhs) => {
                let rhs = self.coerced(fx, other)?.expect_real(operation)?;
                Ok(Value::Integer(fx.builder().build_float_compare(
                    float_predicate,
                    lhs,
                    rhs,
                    "fcmp",
                )?))
            }
            Value::Pointer(lhs) if matches!(int_predicate, IntPredicate::EQ | IntPredicate::NE) => {
                let iptr = fx.iptr_type();
                let left = fx.builder().build_ptr_to_int(lhs.raw, iptr, "lhs.addr")?;
                let right = other
                    .to_value(fx)?
                    .cast_to(fx, iptr.into())?
                    .expect_int(operation)?;
                Ok(Value::Integer(fx.builder().build_int_compare(
                    int_predicate,
                    left,
                    right,
                    "pcmp",
                )?))
            }
            other => Err(EmitError::Operator {
                kind: other.kind_name(),
                operation,
            }),
        }
    }

    pub fn eq(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.compare(fx, other, IntPredicate::EQ, FloatPredicate::OEQ, "==")
    }

    pub fn ne(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.compare(fx, other, IntPredicate::NE, FloatPredicate::ONE, "!=")
    }

    pub fn lt(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.compare(fx, other, IntPredicate::SLT, FloatPredicate::OLT, "<")
    }

    pub fn le(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.compare(fx, other, IntPredicate::SLE, FloatPredicate::OLE, "<=")
    }

    pub fn gt(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.compare(fx, other, IntPredicate::SGT, FloatPredicate::OGT, ">")
    }

    pub fn ge(self, fx: &Emitter<'ctx, '_>, other: impl ToValue<'ctx>) -> EmitResult<Value<'ctx>> {
        self.compare(fx, other, IntPredicate::SGE, FloatPredicate::OGE, ">=")
    }

    // ---------------------------------------------------------------------
    // Casts
    // ---------------------------------------------------------------------

    /// Coerce to the target type per the closed cast table; any unsupported
    /// pair fails naming both types.
    pub fn cast_to(
        self,
        fx: &Emitter<'ctx, '_>,
        target: BasicTypeEnum<'ctx>,
    ) -> EmitResult<Value<'ctx>> {
        match (self, target) {
            (Value::Integer(v), BasicTypeEnum::IntType(t)) => {
                let from = v.get_type().get_bit_width();
                let to = t.get_bit_width();
                if from == to {
                    Ok(self)
                } else if from < to {
                    Ok(Value::Integer(fx.builder().build_int_s_extend(v, t, "sext")?))
                } else {
                    Ok(Value::Integer(fx.builder().build_int_truncate(v, t, "trunc")?))
                }
            }
            (Value::Integer(v), BasicTypeEnum::FloatType(t))
                if t == fx.context().f64_type() =>
            {
                Ok(Value::Real(fx.builder().build_signed_int_to_float(
                    v,
                    t,
                    "sitofp",
                )?))
            }
            (Value::Real(v), BasicTypeEnum::FloatType(t)) if t == v.get_type() => Ok(self),
            (Value::Real(v), BasicTypeEnum::IntType(t)) => Ok(Value::Integer(
                fx.builder().build_float_to_signed_int(v, t, "fptosi")?,
            )),
            (Value::Pointer(_), BasicTypeEnum::PointerType(_)) => Ok(self),
            (Value::Pointer(p), BasicTypeEnum::IntType(t))
                if t.get_bit_width() == fx.iptr_type().get_bit_width() =>
            {
                Ok(Value::Integer(fx.builder().build_ptr_to_int(
                    p.raw,
                    t,
                    "ptrtoint",
                )?))
            }
            (from, to) => Err(EmitError::Coercion {
                from: format!("{:?}", from.type_of()?),
                to: format!("{to:?}"),
            }),
        }
    }

    /// Store this value through the given pointer.
    pub fn store(&self, fx: &Emitter<'ctx, '_>, slot: Ptr<'ctx>) -> EmitResult<()> {
        fx.builder().build_store(slot.raw, self.basic()?)?;
        Ok(())
    }
}
