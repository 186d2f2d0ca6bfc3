use std::sync::Arc;

use log::{debug, trace};

use crate::access::{Accessor, Representation};
use crate::bulk::access::DeviceAccessor;
use crate::ops::{BinaryConvOp, BinaryOp, Capability, NullaryOp, Operator, UnaryConvOp, UnaryOp};
use crate::registry::{CallShape, KernelBinding, Registry};
use crate::{BackendId, CType, DType, Error};

use super::device::BulkDevice;
use super::kernels::{AggregateKernel, BinaryKernel, MatMulKernel, ReduceKernel, UnaryKernel};
use super::sync::Coordinator;
use super::DTYPES;

/// The bulk array backend
#[derive(Clone)]
pub struct Bulk {
    registry: Arc<Registry>,
    coordinator: Coordinator,
}

impl Bulk {
    pub fn new(device: BulkDevice, registry: Arc<Registry>) -> Self {
        Self {
            registry,
            coordinator: Coordinator::new(device),
        }
    }

    /// The device this backend executes on.
    pub fn device(&self) -> &BulkDevice {
        self.coordinator.device()
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
        let Some(target) = self.output::<O, T>(output) else {
            return Ok(false);
        };

        if !self.inputs::<O, T>(&[left, right]) {
            return Ok(false);
        }

        let Some(binding) = self.resolve::<O, BinaryKernel<T>>(T::TYPE, CallShape::Binary) else {
            return Ok(false);
        };

        let left = self.coordinator.view(left)?;
        let right = self.coordinator.view(right)?;
        let mut target = self.coordinator.view_mut(target)?;

        let result = self.launch::<O, _, _>(binding, || (binding.kernel())(&left, &right))?;
        target.commit(result)?;

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
        let Some(target) = self.output::<O, T>(output) else {
            return Ok(false);
        };

        if !self.inputs::<O, T>(&[input]) {
            return Ok(false);
        }

        if O::CAPABILITIES.contains(Capability::Copy) {
            trace!("bulk assign of {} elements", input.size());

            let source = self.coordinator.view(input)?;
            let mut target = self.coordinator.view_mut(target)?;
            target.assign(&source)?;

            return Ok(true);
        }

        let Some(binding) = self.resolve::<O, UnaryKernel<T>>(T::TYPE, CallShape::Unary) else {
            return Ok(false);
        };

        let input = self.coordinator.view(input)?;
        let mut target = self.coordinator.view_mut(target)?;

        let result = self.launch::<O, _, _>(binding, || (binding.kernel())(&input))?;
        target.commit(result)?;

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
        debug!("bulk backend does not convert {} to {}", IT::TYPE, OT::TYPE);
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
        debug!("bulk backend does not convert {} to {}", IT::TYPE, OT::TYPE);
        Ok(false)
    }

    pub fn nullary<O, T>(&self, _op: O, _output: &Accessor<T>) -> Result<bool, Error>
    where
        O: NullaryOp<T>,
        T: CType,
    {
        debug!("bulk backend has no nullary kernel for {}", O::NAME);
        Ok(false)
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
        let Some(target) = self.output::<O, T>(output) else {
            return Ok(false);
        };

        if !self.inputs::<O, T>(&[input]) {
            return Ok(false);
        }

        let Some(binding) = self.resolve::<O, ReduceKernel<T>>(T::TYPE, CallShape::Reduce) else {
            return Ok(false);
        };

        let input = self.coordinator.view(input)?;
        let mut target = self.coordinator.view_mut(target)?;

        let result = self.launch::<O, _, _>(binding, || (binding.kernel())(&input, dims))?;
        target.commit(result)?;

        Ok(true)
    }

    /// Reduce every element of `input` to a single value, or return `None` to decline.
    pub fn aggregate<O, T>(&self, _op: O, input: &Accessor<T>) -> Result<Option<T>, Error>
    where
        O: BinaryOp<T>,
        T: CType,
    {
        if !self.supports::<O, T>() || !self.inputs::<O, T>(&[input]) {
            return Ok(None);
        }

        let shape = CallShape::Aggregate;
        let Some(binding) = self.resolve::<O, AggregateKernel<T>>(T::TYPE, shape) else {
            return Ok(None);
        };

        let input = self.coordinator.view(input)?;

        self.launch::<O, _, _>(binding, || (binding.kernel())(&input))
            .map(Some)
    }

    pub fn matmul<A, M, T>(
        &self,
        _add: A,
        _mul: M,
        left: &Accessor<T>,
        right: &Accessor<T>,
        dims: [usize; 3],
        output: &Accessor<T>,
    ) -> Result<bool, Error>
    where
        A: BinaryOp<T>,
        M: BinaryOp<T>,
        T: CType,
    {
        let Some(target) = self.output::<A, T>(output) else {
            return Ok(false);
        };

        if !self.inputs::<A, T>(&[left, right]) {
            return Ok(false);
        }

        if !M::CAPABILITIES.contains(Capability::Mul) {
            debug!("bulk backend has no matmul kernel for {} with {}", A::NAME, M::NAME);
            return Ok(false);
        }

        let Some(binding) = self.resolve::<A, MatMulKernel<T>>(T::TYPE, CallShape::MatMul) else {
            return Ok(false);
        };

        let left = self.coordinator.view(left)?;
        let right = self.coordinator.view(right)?;
        let mut target = self.coordinator.view_mut(target)?;

        let result = self.launch::<A, _, _>(binding, || (binding.kernel())(&left, &right, dims))?;
        target.commit(result)?;

        Ok(true)
    }

    fn supports<O: Operator, T: CType>(&self) -> bool {
        if DTYPES.contains(&T::TYPE) {
            true
        } else {
            debug!("bulk backend does not support {} for {}", T::TYPE, O::NAME);
            false
        }
    }

    // the output must already be in this device's bulk representation
    fn output<'a, O: Operator, T: CType>(
        &self,
        output: &'a Accessor<T>,
    ) -> Option<&'a DeviceAccessor<T>> {
        if !self.supports::<O, T>() {
            return None;
        }

        match output {
            Accessor::Device(target) if target.device() == self.device() => Some(target),
            Accessor::Device(_) => {
                debug!("bulk backend cannot write {} to another device", O::NAME);
                None
            }
            Accessor::Host(_) => {
                debug!(
                    "bulk backend cannot write {} to a {} output",
                    O::NAME,
                    Representation::Plain
                );

                None
            }
        }
    }

    fn inputs<O: Operator, T: CType>(&self, inputs: &[&Accessor<T>]) -> bool {
        if inputs.iter().all(|input| self.coordinator.is_compatible(input)) {
            true
        } else {
            debug!("bulk backend cannot read {} inputs from another device", O::NAME);
            false
        }
    }

    fn resolve<O: Operator, K>(&self, dtype: DType, shape: CallShape) -> Option<KernelBinding<K>>
    where
        K: Copy + Send + Sync + 'static,
    {
        let binding = self.registry.resolve::<O, K>(BackendId::Bulk, dtype, shape);

        if binding.is_none() {
            debug!("bulk backend has no registered match for {}", O::NAME);
        }

        binding
    }

    fn launch<O: Operator, K: Copy, R>(
        &self,
        binding: KernelBinding<K>,
        kernel: impl FnOnce() -> Result<R, Error>,
    ) -> Result<R, Error> {
        trace!("launch bulk kernel {} for {}", binding.name(), O::NAME);
        self.device().launched();
        kernel().map_err(|cause| Error::kernel(BackendId::Bulk, O::NAME, cause))
    }
}
