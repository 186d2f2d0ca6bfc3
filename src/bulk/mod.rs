//! The bulk array backend.
//!
//! Arrays in the bulk representation may keep a copy of their contents in the memory of a
//! [`BulkDevice`]. Bulk kernels read and write only device memory, so a chain of bulk
//! operations transfers nothing back to the host until a result is read.

use crate::access::{Accessor, HostAccessor};
use crate::{CType, DType, Error};

pub use access::DeviceAccessor;
pub use device::{BulkDevice, DeviceArray, DeviceStats};
pub use kernels::{register, AggregateKernel, BinaryKernel, MatMulKernel, ReduceKernel, UnaryKernel};
pub use platform::Bulk;
pub use sync::{BackendView, Coordinator, OutputView};

mod access;
mod device;
mod kernels;
mod platform;
mod sync;

/// The element types supported by the bulk backend
pub const DTYPES: &[DType] = &[DType::F32, DType::F64];

/// Check that a round trip through device memory preserves its contents.
pub fn self_test() -> Result<bool, Error> {
    let device = BulkDevice::new();
    let data = [1f32, 2., 3.];

    let handle = device.wrap(&data);
    let round_trip = device.unwrap(&handle)?;
    device.release(handle);

    Ok(round_trip == data)
}

/// Constructs accessors in the bulk representation where the bulk backend can use them
#[derive(Clone, Debug)]
pub struct BulkFactory {
    device: BulkDevice,
    dtypes: &'static [DType],
}

impl BulkFactory {
    pub fn new(device: BulkDevice) -> Self {
        Self {
            device,
            dtypes: DTYPES,
        }
    }

    /// The device of the accessors this factory constructs.
    pub fn device(&self) -> &BulkDevice {
        &self.device
    }

    /// Return `true` if an array of `size` elements of type `T` should use the bulk representation.
    pub fn accepts<T: CType>(&self, size: usize) -> bool {
        size != 1 && self.dtypes.contains(&T::TYPE)
    }

    /// Construct a new, unallocated accessor of the given `size`.
    pub fn create<T: CType>(&self, size: usize) -> Accessor<T> {
        if self.accepts::<T>(size) {
            DeviceAccessor::new(self.device.clone(), size).into()
        } else {
            HostAccessor::new(size).into()
        }
    }

    /// Construct a new accessor which owns the given `data`.
    pub fn wrap<T: CType>(&self, data: Vec<T>) -> Accessor<T> {
        if self.accepts::<T>(data.len()) {
            DeviceAccessor::from_vec(self.device.clone(), data).into()
        } else {
            HostAccessor::from_vec(data).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Representation;

    #[test]
    fn test_self_test() -> Result<(), Error> {
        assert!(self_test()?);
        Ok(())
    }

    #[test]
    fn test_factory() {
        let factory = BulkFactory::new(BulkDevice::new());

        assert_eq!(factory.create::<f32>(8).representation(), Representation::Bulk);
        assert_eq!(factory.create::<f32>(1).representation(), Representation::Plain);
        assert_eq!(factory.create::<u16>(8).representation(), Representation::Plain);
        assert_eq!(factory.wrap(vec![1f64]).representation(), Representation::Plain);
        assert_eq!(factory.wrap(vec![1f64, 2.]).representation(), Representation::Bulk);
    }
}
