//! The raw memory backend, which applies scalar operators through raw pointers into host buffers.

use std::ops::Deref;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::MappedRwLockReadGuard;

use crate::access::{Accessor, HostAccessor};
use crate::ops::{BinaryConvOp, BinaryOp, Capability, NullaryOp, Operator, UnaryConvOp, UnaryOp};
use crate::registry::{CallShape, KernelBinding, Registry};
use crate::{BackendId, CType, DType, Error};

pub use kernels::{
    copy, register, AggregateLoop, BinaryLoop, NullaryLoop, ReduceLoop, UnaryLoop,
};

mod kernels;

/// An input buffer, borrowed directly or copied if the output shares its storage
enum Operand<'a, T> {
    Locked(MappedRwLockReadGuard<'a, [T]>),
    Snapshot(Vec<T>),
}

impl<'a, T: CType> Operand<'a, T> {
    fn read(input: &'a HostAccessor<T>, output: &HostAccessor<T>) -> Self {
        if input.shares_buffer(output) {
            Self::Snapshot(input.to_vec())
        } else {
            Self::Locked(input.read())
        }
    }
}

impl<'a, T> Deref for Operand<'a, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        match self {
            Self::Locked(guard) => guard,
            Self::Snapshot(data) => data,
        }
    }
}

/// The raw memory backend
#[derive(Clone)]
pub struct Raw {
    registry: Arc<Registry>,
}

impl Raw {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn binary<O, T>(
        &self,
        _op: O,
        left: &Accessor<T>,
        right: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let (Some(left), Some(right), Some(output)) = (
            plain::<O, T>(left),
            plain::<O, T>(right),
            plain::<O, T>(output),
        ) else {
            return Ok(false);
        };

        let Some(binding) = self.resolve::<O, BinaryLoop<T>>(T::TYPE, CallShape::Binary) else {
            return Ok(false);
        };

        let f: fn(T, T) -> T = |l, r| BinaryOp::call(&O::default(), l, r);

        let left = Operand::read(left, output);
        let right = Operand::read(right, output);

        trace!("raw {} loop for {}", binding.name(), O::NAME);
        (binding.kernel())(f, &left, &right, &mut output.write());

        Ok(true)
    }

    pub fn unary<O, T>(
        &self,
        _op: O,
        input: &Accessor<T>,
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        O: UnaryOp<T>,
        T: CType,
    {
        let (Some(input), Some(output)) = (plain::<O, T>(input), plain::<O, T>(output)) else {
            return Ok(false);
        };

        if O::CAPABILITIES.contains(Capability::Copy) {
            if !input.shares_buffer(output) {
                trace!("raw copy of {} elements", input.size());
                copy(&input.read(), &mut output.write());
            }

            return Ok(true);
        }

        let Some(binding) = self.resolve::<O, UnaryLoop<T>>(T::TYPE, CallShape::Unary) else {
            return Ok(false);
        };

        let f: fn(T) -> T = |n| UnaryOp::call(&O::default(), n);
        let input = Operand::read(input, output);

        trace!("raw {} loop for {}", binding.name(), O::NAME);
        (binding.kernel())(f, &input, &mut output.write());

        Ok(true)
    }

    pub fn binary_conv<O, IT, OT>(
        &self,
        _op: O,
        _left: &Accessor<IT>,
        _right: &Accessor<IT>,
        _output: &Accessor<OT>,
    ) -> Result<bool, Error>
    where
        O: BinaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        debug!("raw backend does not convert {} to {}", IT::TYPE, OT::TYPE);
        Ok(false)
    }

    pub fn unary_conv<O, IT, OT>(
        &self,
        _op: O,
        _input: &Accessor<IT>,
        _output: &Accessor<OT>,
    ) -> Result<bool, Error>
    where
        O: UnaryConvOp<IT, OT>,
        IT: CType,
        OT: CType,
    {
        debug!("raw backend does not convert {} to {}", IT::TYPE, OT::TYPE);
        Ok(false)
    }

    pub fn nullary<O, T>(&self, _op: O, output: &Accessor<T>) -> Result<bool, Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        let Some(output) = plain::<O, T>(output) else {
            return Ok(false);
        };

        let Some(binding) = self.resolve::<O, NullaryLoop<T>>(T::TYPE, CallShape::Nullary) else {
            return Ok(false);
        };

        let f: fn() -> T = || NullaryOp::call(&O::default());

        trace!("raw {} loop for {}", binding.name(), O::NAME);
        (binding.kernel())(f, &mut output.write());

        Ok(true)
    }

    pub fn reduce<O, T>(
        &self,
        _op: O,
        input: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let (Some(input), Some(output)) = (plain::<O, T>(input), plain::<O, T>(output)) else {
            return Ok(false);
        };

        let Some(binding) = self.resolve::<O, ReduceLoop<T>>(T::TYPE, CallShape::Reduce) else {
            return Ok(false);
        };

        let f: fn(T, T) -> T = |l, r| BinaryOp::call(&O::default(), l, r);
        let input = Operand::read(input, output);

        trace!("raw {} loop for {}", binding.name(), O::NAME);
        (binding.kernel())(f, &input, dims, &mut output.write());

        Ok(true)
    }

    /// Reduce every element of `input` to a single value, or return `None` to decline.
    pub fn aggregate<O, T>(&self, _op: O, input: &Accessor<T>) -> Result<Option<T>, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        let Some(input) = plain::<O, T>(input) else {
            return Ok(None);
        };

        let shape = CallShape::Aggregate;
        let Some(binding) = self.resolve::<O, AggregateLoop<T>>(T::TYPE, shape) else {
            return Ok(None);
        };

        let f: fn(T, T) -> T = |l, r| BinaryOp::call(&O::default(), l, r);

        trace!("raw {} loop for {}", binding.name(), O::NAME);
        Ok((binding.kernel())(f, &input.read()))
    }

    pub fn matmul<A, M, T>(
        &self,
        _add: A,
        _mul: M,
        _left: &Accessor<T>,
        _right: &Accessor<T>,
        _dims: [usize; 3],
        _output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        debug!("raw backend has no matmul loop for {} with {}", A::NAME, M::NAME);
        Ok(false)
    }

    fn resolve<O: Operator, K>(&self, dtype: DType, shape: CallShape) -> Option<KernelBinding<K>>
    where
        K: Copy + Send + Sync + 'static,
    {
        let binding = self.registry.resolve::<O, K>(BackendId::Raw, dtype, shape);

        if binding.is_none() {
            debug!("raw backend has no registered match for {}", O::NAME);
        }

        binding
    }
}

fn plain<O: Operator, T: CType>(accessor: &Accessor<T>) -> Option<&HostAccessor<T>> {
    match accessor {
        Accessor::Host(host) => Some(host),
        Accessor::Device(_) => {
            let repr = accessor.representation();
            debug!("raw backend cannot access a {repr} buffer for {}", O::NAME);
            None
        }
    }
}
