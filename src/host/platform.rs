use log::trace;

use crate::access::Accessor;
use crate::ops::{BinaryConvOp, BinaryOp, NullaryOp, UnaryConvOp, UnaryOp};
use crate::{CType, Error};

use super::ops::{Heap, Stack};

pub const VEC_MIN_SIZE: usize = 64;

/// The default element-at-a-time engine, which performs every operation on host memory.
///
/// Inputs are read, and outputs written, through their plain representation, so any
/// device-resident input is synchronized first and any device-resident copy of the output is
/// released.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Host {
    Stack(Stack),
    Heap(Heap),
}

impl Host {
    /// Select a strategy for an operation over `size_hint` elements.
    pub fn select(size_hint: usize) -> Self {
        if size_hint < VEC_MIN_SIZE {
            Self::Stack(Stack)
        } else {
            Self::Heap(Heap)
        }
    }

    /// Select a strategy for a reduction producing `outputs` values.
    pub fn select_reduce(outputs: usize, size_hint: usize) -> Self {
        if outputs < num_cpus::get() {
            Self::Stack(Stack)
        } else {
            Self::select(size_hint)
        }
    }

    pub fn binary<O, T>(
        op: O,
        left: &Accessor<T>,
        right: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<(), Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let (left, right) = (left.to_vec()?, right.to_vec()?);
        let zip = move |l, r| op.call(l, r);

        let result = match Self::select(output.size()) {
            Self::Stack(stack) => stack.zip(&left, &right, zip),
            Self::Heap(heap) => heap.zip(&left, &right, zip),
        };

        trace!("host {} of {} elements", O::NAME, result.len());
        output.overwrite(result)
    }

    pub fn unary<O, T>(op: O, input: &Accessor<T>, output: &Accessor<T>) -> Result<(), Error>
    where
        O: UnaryOp<T>,
        T: CType,
    {
        let input = input.to_vec()?;
        let map = move |n| op.call(n);

        let result = match Self::select(output.size()) {
            Self::Stack(stack) => stack.map(&input, map),
            Self::Heap(heap) => heap.map(&input, map),
        };

        trace!("host {} of {} elements", O::NAME, result.len());
        output.overwrite(result)
    }

    pub fn binary_conv<O, IT, OT>(
        op: O,
        left: &Accessor<IT>,
        right: &Accessor<IT>,
        output: &Accessor<OT>,
    ) -> Result<(), Error>
    where
        O: BinaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        let (left, right) = (left.to_vec()?, right.to_vec()?);
        let zip = move |l, r| op.call(l, r);

        let result = match Self::select(output.size()) {
            Self::Stack(stack) => stack.zip(&left, &right, zip),
            Self::Heap(heap) => heap.zip(&left, &right, zip),
        };

        trace!("host {} of {} elements", O::NAME, result.len());
        output.overwrite(result)
    }

    pub fn unary_conv<O, IT, OT>(
        op: O,
        input: &Accessor<IT>,
        output: &Accessor<OT>,
    ) -> Result<(), Error>
    where
        O: UnaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        let input = input.to_vec()?;
        let map = move |n| op.call(n);

        let result = match Self::select(output.size()) {
            Self::Stack(stack) => stack.map(&input, map),
            Self::Heap(heap) => heap.map(&input, map),
        };

        trace!("host {} of {} elements", O::NAME, result.len());
        output.overwrite(result)
    }

    pub fn nullary<O, T>(op: O, output: &Accessor<T>) -> Result<(), Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        let size = output.size();
        let fill = move || op.call();

        let result = match Self::select(size) {
            Self::Stack(stack) => stack.fill(size, fill),
            Self::Heap(heap) => heap.fill(size, fill),
        };

        trace!("host {} of {} elements", O::NAME, size);
        output.overwrite(result)
    }

    /// Reduce the middle axis of `input`, given as dimensions `[outer, len, inner]` with `len > 0`.
    pub fn reduce<O, T>(
        op: O,
        input: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<(), Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let input = input.to_vec()?;
        let reduce = move |l, r| op.call(l, r);

        let result = match Self::select_reduce(output.size(), input.len()) {
            Self::Stack(stack) => stack.reduce_axis(&input, dims, reduce),
            Self::Heap(heap) => heap.reduce_axis(&input, dims, reduce),
        };

        trace!("host {} of {} elements along an axis", O::NAME, input.len());
        output.overwrite(result)
    }

    /// Reduce every element of `input` to a single value.
    pub fn aggregate<O, T>(op: O, input: &Accessor<T>) -> Result<T, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let input = input.to_vec()?;
        let fold = move |l, r| op.call(l, r);

        let result = match Self::select(input.len()) {
            Self::Stack(stack) => stack.fold(&input, fold),
            Self::Heap(heap) => heap.fold(&input, fold),
        };

        trace!("host {} of {} elements", O::NAME, input.len());
        result.ok_or_else(|| Error::Bounds(format!("cannot {} an empty array", O::NAME)))
    }

    pub fn matmul<A, M, T>(
        add: A,
        mul: M,
        left: &Accessor<T>,
        right: &Accessor<T>,
        [m, k, n]: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<(), Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        let (left, right) = (left.to_vec()?, right.to_vec()?);

        let mut right_t = vec![T::ZERO; right.len()];
        transpose::transpose(&right, &mut right_t, n, k);

        let add = move |l, r| add.call(l, r);
        let mul = move |l, r| mul.call(l, r);

        let result = match Self::select_reduce(m * n, m * k * n) {
            Self::Stack(stack) => stack.matmul(&left, &right_t, [m, k, n], add, mul),
            Self::Heap(heap) => heap.matmul(&left, &right_t, [m, k, n], add, mul),
        };

        trace!("host matmul of {m}x{k} by {k}x{n}");
        output.overwrite(result)
    }
}

impl From<Stack> for Host {
    fn from(stack: Stack) -> Self {
        Self::Stack(stack)
    }
}

impl From<Heap> for Host {
    fn from(heap: Heap) -> Self {
        Self::Heap(heap)
    }
}
