//! Element loops over raw pointers into host memory.
//!
//! Every loop is generic over a scalar function, so one entry per call shape, registered under
//! [`Capability::Scalar`], serves every operator which is safe to apply element by element.
//! Callers must check buffer lengths before calling a loop.

use std::ptr;

use crate::ops::Capability;
use crate::registry::{CallShape, KernelTable, Registry};
use crate::{BackendId, CType, DType};

pub type NullaryLoop<T> = fn(fn() -> T, &mut [T]);

pub type UnaryLoop<T> = fn(fn(T) -> T, &[T], &mut [T]);

pub type BinaryLoop<T> = fn(fn(T, T) -> T, &[T], &[T], &mut [T]);

/// Reduce the middle axis of an input with dimensions `[outer, len, inner]`.
pub type ReduceLoop<T> = fn(fn(T, T) -> T, &[T], [usize; 3], &mut [T]);

pub type AggregateLoop<T> = fn(fn(T, T) -> T, &[T]) -> Option<T>;

/// Register the element loops for every element type.
pub fn register(registry: &mut Registry) {
    for dtype in DType::ALL {
        match dtype {
            DType::U8 => register_dtype::<u8>(registry),
            DType::U16 => register_dtype::<u16>(registry),
            DType::U32 => register_dtype::<u32>(registry),
            DType::U64 => register_dtype::<u64>(registry),
            DType::I8 => register_dtype::<i8>(registry),
            DType::I16 => register_dtype::<i16>(registry),
            DType::I32 => register_dtype::<i32>(registry),
            DType::I64 => register_dtype::<i64>(registry),
            DType::F32 => register_dtype::<f32>(registry),
            DType::F64 => register_dtype::<f64>(registry),
        }
    }
}

fn register_dtype<T: CType>(registry: &mut Registry) {
    let nullary = KernelTable::<NullaryLoop<T>>::new().register(Capability::Scalar, "fill", fill);
    let unary = KernelTable::<UnaryLoop<T>>::new().register(Capability::Scalar, "map", map);
    let binary = KernelTable::<BinaryLoop<T>>::new().register(Capability::Scalar, "zip", zip);
    let reduce = KernelTable::<ReduceLoop<T>>::new().register(Capability::Scalar, "reduce", reduce);
    let aggregate =
        KernelTable::<AggregateLoop<T>>::new().register(Capability::Scalar, "fold", fold);

    registry.register(BackendId::Raw, T::TYPE, CallShape::Nullary, nullary);
    registry.register(BackendId::Raw, T::TYPE, CallShape::Unary, unary);
    registry.register(BackendId::Raw, T::TYPE, CallShape::Binary, binary);
    registry.register(BackendId::Raw, T::TYPE, CallShape::Reduce, reduce);
    registry.register(BackendId::Raw, T::TYPE, CallShape::Aggregate, aggregate);
}

fn fill<T: CType>(f: fn() -> T, output: &mut [T]) {
    let dst = output.as_mut_ptr();

    for i in 0..output.len() {
        // SAFETY: i < output.len()
        unsafe { dst.add(i).write(f()) }
    }
}

fn map<T: CType>(f: fn(T) -> T, input: &[T], output: &mut [T]) {
    debug_assert_eq!(input.len(), output.len());

    let len = input.len().min(output.len());
    let (src, dst) = (input.as_ptr(), output.as_mut_ptr());

    for i in 0..len {
        // SAFETY: i < len, which bounds both buffers
        unsafe { dst.add(i).write(f(src.add(i).read())) }
    }
}

fn zip<T: CType>(f: fn(T, T) -> T, left: &[T], right: &[T], output: &mut [T]) {
    debug_assert_eq!(left.len(), output.len());
    debug_assert_eq!(right.len(), output.len());

    let len = left.len().min(right.len()).min(output.len());
    let (l, r, dst) = (left.as_ptr(), right.as_ptr(), output.as_mut_ptr());

    for i in 0..len {
        // SAFETY: i < len, which bounds all three buffers
        unsafe { dst.add(i).write(f(l.add(i).read(), r.add(i).read())) }
    }
}

fn reduce<T: CType>(
    f: fn(T, T) -> T,
    input: &[T],
    [outer, len, inner]: [usize; 3],
    output: &mut [T],
) {
    debug_assert_eq!(input.len(), outer * len * inner);
    debug_assert_eq!(output.len(), outer * inner);

    if len == 0 || input.len() < outer * len * inner || output.len() < outer * inner {
        return;
    }

    let (src, dst) = (input.as_ptr(), output.as_mut_ptr());

    for o in 0..outer {
        for i in 0..inner {
            let start = o * len * inner + i;

            // SAFETY: start + x * inner < outer * len * inner <= input.len()
            // and o * inner + i < outer * inner <= output.len()
            unsafe {
                let mut acc = src.add(start).read();

                for x in 1..len {
                    acc = f(acc, src.add(start + x * inner).read());
                }

                dst.add(o * inner + i).write(acc);
            }
        }
    }
}

fn fold<T: CType>(f: fn(T, T) -> T, input: &[T]) -> Option<T> {
    let (first, rest) = input.split_first()?;
    let mut acc = *first;
    let src = rest.as_ptr();

    for i in 0..rest.len() {
        // SAFETY: i < rest.len()
        acc = f(acc, unsafe { src.add(i).read() });
    }

    Some(acc)
}

/// Copy `source` into `dest`, which must have the same length and must not overlap it.
pub fn copy<T: CType>(source: &[T], dest: &mut [T]) {
    debug_assert_eq!(source.len(), dest.len());
    let len = source.len().min(dest.len());

    // SAFETY: both buffers hold at least `len` elements, and a shared and a unique borrow
    // cannot overlap
    unsafe { ptr::copy_nonoverlapping(source.as_ptr(), dest.as_mut_ptr(), len) }
}
