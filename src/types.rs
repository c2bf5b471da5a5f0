// This module provides the bidirectional mapping between element descriptors and LLVM
// types. A DType describes scalar kind and byte width, nested record fields, and fixed
// sub-array shapes; to_llvm builds the matching LLVM type (packed structs for records,
// nested arrays for shapes) while validating that record fields are laid out
// contiguously in declaration order, and from_llvm reconstructs a descriptor from an
// LLVM aggregate. normalize produces the shape-greedy normal form in which a shaped
// descriptor's base is always shapeless. packed_size_of computes the packed byte size
// of an LLVM type and is what the strided-array engine measures declared strides
// against.

//! Element descriptors and their LLVM type mapping.

use inkwell::context::Context;
use inkwell::types::{BasicType, BasicTypeEnum};

use crate::error::{EmitError, EmitResult};

/// One field of a record descriptor. The offset, when given, must equal the
/// packed running position of the field; anything else is rejected as
/// non-standard packing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub dtype: DType,
    pub offset: Option<u64>,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DType) -> Self {
        Field {
            name: name.into(),
            dtype,
            offset: None,
        }
    }
}

/// Element descriptor: scalar kind plus optional record/sub-array structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DType {
    /// Signed integer of the given bit width (8, 16, 32 or 64).
    Int { width: u32 },
    Float32,
    Float64,
    /// Contiguously packed record.
    Record(Vec<Field>),
    /// Fixed sub-array shape over a base descriptor.
    Shaped { base: Box<DType>, shape: Vec<u64> },
}

impl DType {
    /// Packed size of one element, in bytes.
    pub fn size(&self) -> u64 {
        match self {
            DType::Int { width } => u64::from(*width) / 8,
            DType::Float32 => 4,
            DType::Float64 => 8,
            DType::Record(fields) => fields.iter().map(|f| f.dtype.size()).sum(),
            DType::Shaped { base, shape } => base.size() * shape.iter().product::<u64>(),
        }
    }

    /// Shape-greedy normal form: the base of a shaped descriptor never has a
    /// shape of its own.
    pub fn normalize(&self) -> DType {
        match self {
            DType::Shaped { base, shape } => {
                let base = base.normalize();
                match base {
                    DType::Shaped {
                        base: inner,
                        shape: inner_shape,
                    } => {
                        let mut merged = shape.clone();
                        merged.extend(inner_shape);
                        DType::Shaped {
                            base: inner,
                            shape: merged,
                        }
                    }
                    other => DType::Shaped {
                        base: Box::new(other),
                        shape: shape.clone(),
                    },
                }
            }
            other => other.clone(),
        }
    }

    /// Build the LLVM type matching this descriptor.
    pub fn to_llvm<'ctx>(&self, context: &'ctx Context) -> EmitResult<BasicTypeEnum<'ctx>> {
        match self {
            DType::Int { width } => match width {
                8 | 16 | 32 | 64 => Ok(context.custom_width_int_type(*width).into()),
                other => Err(EmitError::Packing {
                    reason: format!("unsupported integer width {other}"),
                }),
            },
            DType::Float32 => Ok(context.f32_type().into()),
            DType::Float64 => Ok(context.f64_type().into()),
            DType::Record(fields) => {
                let mut members = Vec::with_capacity(fields.len());
                let mut position = 0u64;
                for field in fields {
                    if let Some(offset) = field.offset {
                        if offset != position {
                            return Err(EmitError::Packing {
                                reason: format!(
                                    "field {} at offset {offset}, expected {position}",
                                    field.name
                                ),
                            });
                        }
                    }
                    members.push(field.dtype.to_llvm(context)?);
                    position += field.dtype.size();
                }
                Ok(context.struct_type(&members, true).into())
            }
            DType::Shaped { base, shape } => {
                let mut ty = base.to_llvm(context)?;
                for extent in shape.iter().rev() {
                    ty = ty.array_type(*extent as u32).into();
                }
                Ok(ty)
            }
        }
    }

    /// Reconstruct a descriptor from an LLVM type.
    pub fn from_llvm(ty: BasicTypeEnum<'_>) -> EmitResult<DType> {
        match ty {
            BasicTypeEnum::IntType(int) => match int.get_bit_width() {
                width @ (8 | 16 | 32 | 64) => Ok(DType::Int { width }),
                other => Err(EmitError::Packing {
                    reason: format!("no descriptor for an i{other} value"),
                }),
            },
            BasicTypeEnum::FloatType(float) => {
                let context = float.get_context();
                if float == context.f32_type() {
                    Ok(DType::Float32)
                } else if float == context.f64_type() {
                    Ok(DType::Float64)
                } else {
                    Err(EmitError::Packing {
                        reason: "no descriptor for this floating-point width".into(),
                    })
                }
            }
            BasicTypeEnum::StructType(record) => {
                let fields = record
                    .get_field_types_iter()
                    .enumerate()
                    .map(|(i, field)| Ok(Field::new(format!("f{i}"), DType::from_llvm(field)?)))
                    .collect::<EmitResult<Vec<_>>>()?;
                Ok(DType::Record(fields))
            }
            BasicTypeEnum::ArrayType(array) => {
                let base = DType::from_llvm(array.get_element_type())?;
                let shaped = DType::Shaped {
                    base: Box::new(base),
                    shape: vec![u64::from(array.len())],
                };
                Ok(shaped.normalize())
            }
            other => Err(EmitError::Packing {
                reason: format!("no descriptor for {other:?}"),
            }),
        }
    }
}

/// Packed byte size of an LLVM type, as the strided-array engine counts it:
/// no alignment padding beyond what the type itself spells out.
pub fn packed_size_of(ty: BasicTypeEnum<'_>) -> EmitResult<u64> {
    match ty {
        BasicTypeEnum::IntType(int) => Ok(u64::from(int.get_bit_width().div_ceil(8))),
        BasicTypeEnum::FloatType(float) => {
            let context = float.get_context();
            if float == context.f32_type() {
                Ok(4)
            } else if float == context.f64_type() {
                Ok(8)
            } else {
                Err(EmitError::Packing {
                    reason: "unsupported floating-point width".into(),
                })
            }
        }
        BasicTypeEnum::PointerType(_) => Ok(std::mem::size_of::<usize>() as u64),
        BasicTypeEnum::ArrayType(array) => {
            Ok(u64::from(array.len()) * packed_size_of(array.get_element_type())?)
        }
        BasicTypeEnum::StructType(record) => {
            let mut total = 0;
            for field in record.get_field_types_iter() {
                total += packed_size_of(field)?;
            }
            Ok(total)
        }
        other => Err(EmitError::Packing {
            reason: format!("cannot size {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fields: &[(&str, DType)]) -> DType {
        DType::Record(
            fields
                .iter()
                .map(|(name, dtype)| Field::new(*name, dtype.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DType::Int { width: 32 }.size(), 4);
        assert_eq!(DType::Float64.size(), 8);
        assert_eq!(
            record(&[("a", DType::Int { width: 16 }), ("b", DType::Float64)]).size(),
            10
        );
        let shaped = DType::Shaped {
            base: Box::new(DType::Float32),
            shape: vec![2, 3],
        };
        assert_eq!(shaped.size(), 24);
    }

    #[test]
    fn test_llvm_round_trip() {
        let context = Context::create();
        let dtype = record(&[
            ("a", DType::Int { width: 8 }),
            (
                "b",
                DType::Shaped {
                    base: Box::new(DType::Float64),
                    shape: vec![4],
                },
            ),
        ]);

        let ty = dtype.to_llvm(&context).unwrap();
        assert_eq!(packed_size_of(ty).unwrap(), dtype.size());

        let back = DType::from_llvm(ty).unwrap();
        // Field names are positional after a round trip; compare structure.
        match back {
            DType::Record(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].dtype, DType::Int { width: 8 });
                assert_eq!(
                    fields[1].dtype,
                    DType::Shaped {
                        base: Box::new(DType::Float64),
                        shape: vec![4],
                    }
                );
            }
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn test_nonstandard_packing_rejected() {
        let context = Context::create();
        let dtype = DType::Record(vec![
            Field {
                name: "a".into(),
                dtype: DType::Int { width: 32 },
                offset: Some(0),
            },
            Field {
                name: "b".into(),
                dtype: DType::Float64,
                offset: Some(16),
            },
        ]);

        match dtype.to_llvm(&context) {
            Err(EmitError::Packing { .. }) => {}
            other => panic!("expected a packing error, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_is_shape_greedy() {
        let nested = DType::Shaped {
            base: Box::new(DType::Shaped {
                base: Box::new(DType::Int { width: 32 }),
                shape: vec![3],
            }),
            shape: vec![2],
        };
        assert_eq!(
            nested.normalize(),
            DType::Shaped {
                base: Box::new(DType::Int { width: 32 }),
                shape: vec![2, 3],
            }
        );
    }
}
