//! Bulk kernels, registered per element type by capability.

use rayon::prelude::*;

use crate::ops::Capability;
use crate::registry::{CallShape, KernelTable, Registry};
use crate::{BackendId, CType, Error};

use super::device::DeviceArray;

pub type UnaryKernel<T> = fn(&DeviceArray<T>) -> Result<DeviceArray<T>, Error>;

pub type BinaryKernel<T> = fn(&DeviceArray<T>, &DeviceArray<T>) -> Result<DeviceArray<T>, Error>;

/// Reduce the middle axis of an input with dimensions `[outer, len, inner]`.
pub type ReduceKernel<T> = fn(&DeviceArray<T>, [usize; 3]) -> Result<DeviceArray<T>, Error>;

pub type AggregateKernel<T> = fn(&DeviceArray<T>) -> Result<T, Error>;

/// Multiply matrices with dimensions `[m, k]` and `[k, n]`, given as `[m, k, n]`.
pub type MatMulKernel<T> =
    fn(&DeviceArray<T>, &DeviceArray<T>, [usize; 3]) -> Result<DeviceArray<T>, Error>;

/// Register the bulk kernels for every element type the bulk device supports.
pub fn register(registry: &mut Registry) {
    register_dtype::<f32>(registry);
    register_dtype::<f64>(registry);
}

fn register_dtype<T: CType>(registry: &mut Registry) {
    let unary = KernelTable::<UnaryKernel<T>>::new()
        .register(Capability::Abs, "abs", abs)
        .register(Capability::Floor, "floor", floor)
        .register(Capability::Ceil, "ceil", ceil)
        .register(Capability::Round, "rint", rint)
        .register(Capability::Sqrt, "sqrt", sqrt)
        .register(Capability::Neg, "neg", neg);

    let binary = KernelTable::<BinaryKernel<T>>::new()
        .register(Capability::Add, "add", add)
        .register(Capability::Sub, "sub", sub)
        .register(Capability::Mul, "mul", mul)
        .register(Capability::Div, "div", div)
        .register(Capability::Mod, "mod", rem)
        .register(Capability::Max, "max", max)
        .register(Capability::Min, "min", min);

    let reduce = KernelTable::<ReduceKernel<T>>::new()
        .register(Capability::Add, "sum", reduce_sum)
        .register(Capability::Mul, "product", reduce_product)
        .register(Capability::Max, "max", reduce_max)
        .register(Capability::Min, "min", reduce_min);

    let aggregate = KernelTable::<AggregateKernel<T>>::new()
        .register(Capability::Add, "sum", sum)
        .register(Capability::Mul, "product", product)
        .register(Capability::Max, "max", max_all)
        .register(Capability::Min, "min", min_all);

    let linalg = KernelTable::<MatMulKernel<T>>::new().register(Capability::Add, "matmul", matmul);

    registry.register(BackendId::Bulk, T::TYPE, CallShape::Unary, unary);
    registry.register(BackendId::Bulk, T::TYPE, CallShape::Binary, binary);
    registry.register(BackendId::Bulk, T::TYPE, CallShape::Reduce, reduce);
    registry.register(BackendId::Bulk, T::TYPE, CallShape::Aggregate, aggregate);
    registry.register(BackendId::Bulk, T::TYPE, CallShape::MatMul, linalg);
}

fn map<T: CType>(input: &DeviceArray<T>, f: fn(T) -> T) -> DeviceArray<T> {
    let output = input.read().par_iter().copied().map(f).collect();
    input.derive(output)
}

fn zip<T: CType>(
    left: &DeviceArray<T>,
    right: &DeviceArray<T>,
    f: fn(T, T) -> T,
) -> Result<DeviceArray<T>, Error> {
    if left.len() != right.len() {
        return Err(Error::Bounds(format!(
            "cannot combine device buffers of size {} and {}",
            left.len(),
            right.len()
        )));
    }

    let output = {
        let (left, right) = (left.read(), right.read());

        left.par_iter()
            .copied()
            .zip(right.par_iter().copied())
            .map(|(l, r)| f(l, r))
            .collect()
    };

    Ok(left.derive(output))
}

fn reduce_axis<T: CType>(
    input: &DeviceArray<T>,
    [outer, len, inner]: [usize; 3],
    f: fn(T, T) -> T,
) -> Result<DeviceArray<T>, Error> {
    if len == 0 || outer * len * inner != input.len() {
        return Err(Error::Bounds(format!(
            "cannot reduce a device buffer of size {} with dimensions {:?}",
            input.len(),
            [outer, len, inner]
        )));
    }

    let output = {
        let data = input.read();

        (0..(outer * inner))
            .into_par_iter()
            .map(|offset| {
                let start = (offset / inner) * len * inner + (offset % inner);
                let first = data[start];
                (1..len).map(|i| data[start + i * inner]).fold(first, f)
            })
            .collect()
    };

    Ok(input.derive(output))
}

fn reduce_all<T: CType>(input: &DeviceArray<T>, f: fn(T, T) -> T) -> Result<T, Error> {
    input
        .read()
        .par_iter()
        .copied()
        .reduce_with(f)
        .ok_or_else(|| Error::Bounds("cannot reduce an empty device buffer".to_string()))
}

macro_rules! unary_kernel {
    ($name:ident, $f:expr) => {
        fn $name<T: CType>(input: &DeviceArray<T>) -> Result<DeviceArray<T>, Error> {
            Ok(map(input, $f))
        }
    };
}

unary_kernel!(abs, T::abs);
unary_kernel!(floor, T::floor);
unary_kernel!(ceil, T::ceil);
unary_kernel!(rint, T::round);
unary_kernel!(sqrt, T::sqrt);
unary_kernel!(neg, T::neg);

macro_rules! binary_kernel {
    ($name:ident, $f:expr) => {
        fn $name<T: CType>(
            left: &DeviceArray<T>,
            right: &DeviceArray<T>,
        ) -> Result<DeviceArray<T>, Error> {
            zip(left, right, $f)
        }
    };
}

binary_kernel!(add, T::add);
binary_kernel!(sub, T::sub);
binary_kernel!(mul, T::mul);
binary_kernel!(div, T::div);
binary_kernel!(rem, T::rem);
binary_kernel!(max, T::max);
binary_kernel!(min, T::min);

macro_rules! reduce_kernels {
    ($axis:ident, $all:ident, $f:expr) => {
        fn $axis<T: CType>(
            input: &DeviceArray<T>,
            dims: [usize; 3],
        ) -> Result<DeviceArray<T>, Error> {
            reduce_axis(input, dims, $f)
        }

        fn $all<T: CType>(input: &DeviceArray<T>) -> Result<T, Error> {
            reduce_all(input, $f)
        }
    };
}

reduce_kernels!(reduce_sum, sum, T::add);
reduce_kernels!(reduce_product, product, T::mul);
reduce_kernels!(reduce_max, max_all, T::max);
reduce_kernels!(reduce_min, min_all, T::min);

fn matmul<T: CType>(
    left: &DeviceArray<T>,
    right: &DeviceArray<T>,
    [m, k, n]: [usize; 3],
) -> Result<DeviceArray<T>, Error> {
    if left.len() != m * k || right.len() != k * n {
        return Err(Error::Bounds(format!(
            "cannot multiply device buffers of size {} and {} with dimensions {:?}",
            left.len(),
            right.len(),
            [m, k, n]
        )));
    }

    let output = {
        let left = left.read();

        // transpose the right matrix so that each column is contiguous
        let mut right_t = vec![T::ZERO; k * n];
        transpose::transpose(&right.read(), &mut right_t, n, k);

        (0..(m * n))
            .into_par_iter()
            .map(|offset| {
                let row = &left[(offset / n) * k..][..k];
                let col = &right_t[(offset % n) * k..][..k];

                let mut products = row.iter().zip(col).map(|(l, r)| CType::mul(*l, *r));

                match products.next() {
                    Some(first) => products.fold(first, CType::add),
                    None => T::ZERO,
                }
            })
            .collect()
    };

    Ok(left.derive(output))
}
