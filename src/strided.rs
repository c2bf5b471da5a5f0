// This module implements the strided-array engine. A strided layout is modelled
// structurally: each dimension with a nonzero stride becomes an LLVM array of a packed
// struct pairing the inner layout with a byte-padding tail, so ordinary
// getelementptr arithmetic walks arbitrary row strides without any multiply-and-add
// address code. Dimensions with stride zero are broadcast dimensions: they collapse
// out of the structural type entirely and at() skips their index, which is how the
// same element is revisited across a broadcast extent. semicast aligns shape prefixes
// the way the numpy broadcast rule does, padding shorter prefixes with leading unit
// dimensions and zeroing the stride of every unit extent. StridedArrays bundles named
// arrays of equal prefix shape and loop_all drives a nest of counted loops over that
// prefix, eliding loops over unit extents.

//! Broadcasting strided arrays over structural layouts.

use inkwell::context::Context;
use inkwell::types::BasicTypeEnum;
use inkwell::values::PointerValue;

use crate::emit::Emitter;
use crate::error::{EmitError, EmitResult};
use crate::types::packed_size_of;
use crate::value::{Ptr, ToValue, Value};

/// Build the structural LLVM type for a strided layout, returning the type
/// and its footprint in bytes.
///
/// Zero-stride dimensions contribute no structure. Every other dimension is
/// an array of `{inner, [pad x i8]}` packed structs; a stride smaller than
/// the inner footprint cannot be represented and is rejected.
pub fn strided_type<'ctx>(
    context: &'ctx Context,
    element: BasicTypeEnum<'ctx>,
    shape: &[u64],
    strides: &[u64],
) -> EmitResult<(BasicTypeEnum<'ctx>, u64)> {
    if shape.is_empty() {
        let size = packed_size_of(element)?;
        return Ok((element, size));
    }

    let (inner, inner_size) = strided_type(context, element, &shape[1..], &strides[1..])?;
    let stride = strides[0];

    if stride == 0 {
        return Ok((inner, inner_size));
    }
    if stride < inner_size {
        return Err(EmitError::Layout {
            stride,
            required: inner_size,
        });
    }

    let pad = u32::try_from(stride - inner_size).map_err(|_| EmitError::Shape {
        reason: format!("stride {stride} needs more padding than a type can hold"),
    })?;
    let extent = u32::try_from(shape[0]).map_err(|_| EmitError::Shape {
        reason: format!("extent {} exceeds the maximum array length", shape[0]),
    })?;
    let padding = context.i8_type().array_type(pad);
    let row = context.struct_type(&[inner, padding.into()], true);
    Ok((row.array_type(extent).into(), shape[0] * stride))
}

/// A view of memory as a shaped, strided array of packed elements.
#[derive(Debug, Clone)]
pub struct StridedArray<'ctx> {
    data: PointerValue<'ctx>,
    shape: Vec<u64>,
    strides: Vec<u64>,
    element: BasicTypeEnum<'ctx>,
    strided: BasicTypeEnum<'ctx>,
}

impl<'ctx> StridedArray<'ctx> {
    /// View a data pointer as an array. With no strides given the layout is
    /// packed row-major.
    pub fn from_raw(
        fx: &Emitter<'ctx, '_>,
        data: Ptr<'ctx>,
        shape: Vec<u64>,
        strides: Option<Vec<u64>>,
    ) -> EmitResult<Self> {
        let element = data.pointee;
        let strides = match strides {
            Some(strides) => strides,
            None => packed_strides(&shape, packed_size_of(element)?),
        };
        let (strided, _) = strided_type(fx.context(), element, &shape, &strides)?;
        Ok(StridedArray {
            data: data.raw,
            shape,
            strides,
            element,
            strided,
        })
    }

    /// Heap-allocate a packed array of the given shape.
    pub fn heap_allocated(
        fx: &Emitter<'ctx, '_>,
        element: BasicTypeEnum<'ctx>,
        shape: Vec<u64>,
    ) -> EmitResult<Self> {
        let count: u64 = shape.iter().product();
        let data = fx.heap_allocate(element, count)?;
        StridedArray::from_raw(fx, data, shape, None)
    }

    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    pub fn strides(&self) -> &[u64] {
        &self.strides
    }

    pub fn element(&self) -> BasicTypeEnum<'ctx> {
        self.element
    }

    /// The data pointer, typed as the remaining structural layout. For a
    /// rank-zero array this is a plain element pointer, ready for loads and
    /// stores.
    pub fn as_ptr(&self) -> Ptr<'ctx> {
        Ptr::new(self.data, self.strided)
    }

    /// The subarray at the given leading indices.
    ///
    /// One getelementptr walks the structural layout: each consumed
    /// dimension contributes an array index plus a step into the row struct,
    /// and broadcast dimensions are skipped so their index never reaches the
    /// address computation.
    pub fn at(&self, fx: &Emitter<'ctx, '_>, indices: &[Value<'ctx>]) -> EmitResult<Self> {
        if indices.len() > self.shape.len() {
            return Err(EmitError::Shape {
                reason: format!(
                    "{} indices into a rank-{} array",
                    indices.len(),
                    self.shape.len()
                ),
            });
        }

        let i32_ty = fx.context().i32_type();
        let i64_ty = fx.context().i64_type();
        let mut offsets = vec![i32_ty.const_zero()];
        for (index, stride) in indices.iter().zip(&self.strides) {
            if *stride > 0 {
                let index = index
                    .cast_to(fx, i64_ty.into())?
                    .expect_int("array index")?;
                offsets.push(index);
                offsets.push(i32_ty.const_zero());
            }
        }

        let data = self.as_ptr().gep(fx, &offsets)?;
        let shape = self.shape[indices.len()..].to_vec();
        let strides = self.strides[indices.len()..].to_vec();
        let (strided, _) = strided_type(fx.context(), self.element, &shape, &strides)?;
        Ok(StridedArray {
            data,
            shape,
            strides,
            element: self.element,
            strided,
        })
    }

    /// Prepend a broadcast unit dimension.
    pub fn envelop(&self) -> Self {
        let mut shape = vec![1];
        shape.extend_from_slice(&self.shape);
        let mut strides = vec![0];
        strides.extend_from_slice(&self.strides);
        StridedArray {
            data: self.data,
            shape,
            strides,
            element: self.element,
            strided: self.strided,
        }
    }

    /// The same layout over a different data pointer.
    pub fn using(&self, data: Ptr<'ctx>) -> Self {
        StridedArray {
            data: data.raw,
            ..self.clone()
        }
    }
}

fn packed_strides(shape: &[u64], element_size: u64) -> Vec<u64> {
    let mut strides = Vec::with_capacity(shape.len());
    let mut axis_size = element_size;
    for extent in shape.iter().rev() {
        strides.push(axis_size);
        axis_size *= extent;
    }
    strides.reverse();
    strides
}

/// Broadcast shape prefixes together. Each entry pairs a shape with the
/// length of its participating prefix (`None` for the whole shape). Returns
/// the common prefix shape.
pub(crate) fn broadcast_prefix(shapes: &[(&[u64], Option<usize>)]) -> EmitResult<Vec<u64>> {
    let mut prefixes: Vec<&[u64]> = Vec::with_capacity(shapes.len());
    for (shape, axes) in shapes {
        let axes = axes.unwrap_or(shape.len());
        let prefix = shape.get(..axes).ok_or_else(|| EmitError::Shape {
            reason: format!("array of rank {} broadcast over {axes} axes", shape.len()),
        })?;
        prefixes.push(prefix);
    }
    let ndim = prefixes.iter().map(|p| p.len()).max().unwrap_or(0);

    let mut out = vec![1u64; ndim];
    for prefix in &prefixes {
        let pad = ndim - prefix.len();
        for (slot, extent) in out[pad..].iter_mut().zip(*prefix) {
            if *extent > *slot {
                *slot = *extent;
            }
        }
    }

    for prefix in &prefixes {
        let pad = ndim - prefix.len();
        for (wanted, extent) in out[pad..].iter().zip(*prefix) {
            if *extent != *wanted && *extent != 1 {
                return Err(EmitError::Shape {
                    reason: format!("extent {extent} does not broadcast to {wanted}"),
                });
            }
        }
    }
    Ok(out)
}

/// Broadcast compatible shape prefixes together.
///
/// Each array is recast over the common prefix: shorter prefixes gain
/// leading unit dimensions, and every unit extent has its stride zeroed so
/// the single element is revisited across the broadcast. Trailing
/// (non-participating) dimensions keep their own shape and strides. Returns
/// the prefix shape and the recast arrays.
pub fn semicast<'ctx>(
    fx: &Emitter<'ctx, '_>,
    arrays: &[(&StridedArray<'ctx>, Option<usize>)],
) -> EmitResult<(Vec<u64>, Vec<StridedArray<'ctx>>)> {
    let shapes: Vec<(&[u64], Option<usize>)> = arrays
        .iter()
        .map(|(array, axes)| (array.shape(), *axes))
        .collect();
    let prefix = broadcast_prefix(&shapes)?;

    let mut casts = Vec::with_capacity(arrays.len());
    for (array, axes) in arrays {
        let participating = axes.unwrap_or(array.shape.len());
        let pad = prefix.len() - participating;

        let mut shape = prefix.clone();
        shape.extend_from_slice(&array.shape[participating..]);

        let mut strides = vec![0u64; pad];
        for (extent, stride) in array.shape.iter().zip(&array.strides) {
            strides.push(if *extent == 1 { 0 } else { *stride });
        }

        let (strided, _) = strided_type(fx.context(), array.element, &shape, &strides)?;
        casts.push(StridedArray {
            data: array.data,
            shape,
            strides,
            element: array.element,
            strided,
        });
    }
    Ok((prefix, casts))
}

/// Named arrays of equal prefix shape, iterated together.
pub struct StridedArrays<'ctx> {
    arrays: hashbrown::HashMap<String, StridedArray<'ctx>>,
}

impl<'ctx> StridedArrays<'ctx> {
    pub fn new(arrays: impl IntoIterator<Item = (String, StridedArray<'ctx>)>) -> Self {
        StridedArrays {
            arrays: arrays.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StridedArray<'ctx>> {
        self.arrays.get(name)
    }

    /// The subarrays at the given leading indices.
    pub fn at_all(&self, fx: &Emitter<'ctx, '_>, indices: &[Value<'ctx>]) -> EmitResult<Self> {
        let mut arrays = hashbrown::HashMap::with_capacity(self.arrays.len());
        for (name, array) in &self.arrays {
            arrays.insert(name.clone(), array.at(fx, indices)?);
        }
        Ok(StridedArrays { arrays })
    }

    /// Emit a loop nest over the leading `axes` dimensions (all of them when
    /// `None`), invoking the body once per position with the subarrays at
    /// that position. Unit extents are not looped; their index is a constant
    /// zero.
    pub fn loop_all(
        &self,
        fx: &Emitter<'ctx, '_>,
        axes: Option<usize>,
        body: &impl Fn(&Emitter<'ctx, '_>, &StridedArrays<'ctx>) -> EmitResult<()>,
    ) -> EmitResult<()> {
        let mut shape: Option<&[u64]> = None;
        let mut axes = axes;
        for array in self.arrays.values() {
            let axes = *axes.get_or_insert(array.shape.len());
            let prefix = array.shape.get(..axes).ok_or_else(|| EmitError::Shape {
                reason: format!("array of rank {} looped over {axes} axes", array.shape.len()),
            })?;
            match shape {
                None => shape = Some(prefix),
                Some(shape) if shape != prefix => {
                    return Err(EmitError::Shape {
                        reason: format!("prefix {prefix:?} differs from {shape:?}"),
                    })
                }
                Some(_) => {}
            }
        }

        let shape = shape.unwrap_or(&[]).to_vec();
        let mut indices = Vec::with_capacity(shape.len());
        self.walk(fx, &shape, 0, &mut indices, body)
    }

    fn walk(
        &self,
        fx: &Emitter<'ctx, '_>,
        shape: &[u64],
        axis: usize,
        indices: &mut Vec<Value<'ctx>>,
        body: &impl Fn(&Emitter<'ctx, '_>, &StridedArrays<'ctx>) -> EmitResult<()>,
    ) -> EmitResult<()> {
        if axis == shape.len() {
            let here = self.at_all(fx, indices)?;
            return body(fx, &here);
        }

        if shape[axis] > 1 {
            fx.for_(shape[axis], |fx, index| {
                indices.push(index);
                let walked = self.walk(fx, shape, axis + 1, indices, body);
                indices.pop();
                walked
            })
        } else {
            indices.push(0u64.to_value(fx)?);
            let walked = self.walk(fx, shape, axis + 1, indices, body);
            indices.pop();
            walked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkwell::context::Context;

    #[test]
    fn test_packed_strides_are_row_major() {
        assert_eq!(packed_strides(&[3, 4], 8), vec![32, 8]);
        assert_eq!(packed_strides(&[2, 3, 4], 1), vec![12, 4, 1]);
        assert_eq!(packed_strides(&[], 8), Vec::<u64>::new());
    }

    #[test]
    fn test_strided_type_pads_rows() {
        let context = Context::create();
        let element: BasicTypeEnum = context.f64_type().into();

        let (_, size) = strided_type(&context, element, &[3, 4], &[40, 8]).unwrap();
        assert_eq!(size, 120);

        let (_, collapsed) = strided_type(&context, element, &[5], &[0]).unwrap();
        assert_eq!(collapsed, 8);
    }

    #[test]
    fn test_strided_type_rejects_narrow_stride() {
        let context = Context::create();
        let element: BasicTypeEnum = context.f64_type().into();

        match strided_type(&context, element, &[3], &[4]) {
            Err(EmitError::Layout {
                stride: 4,
                required: 8,
            }) => {}
            other => panic!("expected a layout error, got {other:?}"),
        }
    }

    #[test]
    fn test_broadcast_prefix() {
        let prefix = broadcast_prefix(&[(&[3, 1], None), (&[1, 4], None)]).unwrap();
        assert_eq!(prefix, vec![3, 4]);

        let padded = broadcast_prefix(&[(&[2, 5], None), (&[5], None)]).unwrap();
        assert_eq!(padded, vec![2, 5]);

        // A participating-prefix bound leaves trailing axes out.
        let partial = broadcast_prefix(&[(&[2, 7], Some(1)), (&[2], None)]).unwrap();
        assert_eq!(partial, vec![2]);

        assert!(broadcast_prefix(&[(&[3], None), (&[4], None)]).is_err());
    }

    #[test]
    fn test_broadcast_prefix_rejects_oversized_axis_count() {
        match broadcast_prefix(&[(&[3, 4], Some(3))]) {
            Err(EmitError::Shape { reason }) => {
                assert!(reason.contains("rank 2"), "unexpected reason: {reason}");
            }
            other => panic!("expected a shape error, got {other:?}"),
        }
    }

    #[test]
    fn test_strided_type_rejects_extent_beyond_array_limit() {
        let context = Context::create();
        let element: BasicTypeEnum = context.i8_type().into();

        match strided_type(&context, element, &[1 << 33], &[1]) {
            Err(EmitError::Shape { .. }) => {}
            other => panic!("expected a shape error, got {other:?}"),
        }
    }
}
