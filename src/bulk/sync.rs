//! Scoped device views of logical arrays.
//!
//! An input view wraps the current contents of an array in a device handle, uploading them
//! only if the array has no device copy yet. An output view collects a kernel result and, when
//! it goes out of scope, records that the array's device copy is newer than its host copy.
//! Nothing is ever copied back to the host here: the host copy is refreshed only when the
//! array is next read through its plain representation.

use std::ops::Deref;

use log::trace;

use crate::access::Accessor;
use crate::{CType, Error};

use super::access::DeviceAccessor;
use super::device::{BulkDevice, DeviceArray};

/// Synchronizes logical arrays with the memory of one [`BulkDevice`]
#[derive(Clone)]
pub struct Coordinator {
    device: BulkDevice,
}

impl Coordinator {
    pub fn new(device: BulkDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &BulkDevice {
        &self.device
    }

    /// Return `true` if the given array can be viewed on this coordinator's device.
    pub fn is_compatible<T: CType>(&self, accessor: &Accessor<T>) -> bool {
        match accessor {
            Accessor::Host(_) => true,
            Accessor::Device(device) => device.device() == &self.device,
        }
    }

    /// Open a read-only device view of the given array.
    pub fn view<T: CType>(&self, accessor: &Accessor<T>) -> Result<BackendView<T>, Error> {
        let (handle, temporary) = match accessor {
            Accessor::Host(host) => (self.device.wrap(&host.read()), true),
            Accessor::Device(device) if device.device() == &self.device => {
                (device.resident(), false)
            }
            Accessor::Device(_) => {
                return Err(Error::Interface(
                    "cannot view a buffer of a different bulk device".to_string(),
                ))
            }
        };

        self.device.view_opened();

        Ok(BackendView {
            device: self.device.clone(),
            handle,
            temporary,
        })
    }

    /// Open a write-target view of the given array.
    pub fn view_mut<'a, T: CType>(
        &self,
        accessor: &'a DeviceAccessor<T>,
    ) -> Result<OutputView<'a, T>, Error> {
        if accessor.device() != &self.device {
            return Err(Error::Interface(
                "cannot write to a buffer of a different bulk device".to_string(),
            ));
        }

        self.device.view_opened();

        Ok(OutputView {
            device: self.device.clone(),
            accessor,
            written: false,
        })
    }
}

/// A read-only device view of a logical array, released when dropped
pub struct BackendView<T> {
    device: BulkDevice,
    handle: DeviceArray<T>,
    temporary: bool,
}

impl<T> Deref for BackendView<T> {
    type Target = DeviceArray<T>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<T> Drop for BackendView<T> {
    fn drop(&mut self) {
        if self.temporary {
            trace!("release a temporary device upload");
        }

        self.device.view_closed();
    }
}

/// A write-target device view of a logical array.
///
/// Marks the array dirty when dropped, if and only if a result was committed.
pub struct OutputView<'a, T: CType> {
    device: BulkDevice,
    accessor: &'a DeviceAccessor<T>,
    written: bool,
}

impl<'a, T: CType> OutputView<'a, T> {
    /// Commit a kernel `result` owned by no other array.
    ///
    /// If the array already has a device copy the result is assigned into it,
    /// otherwise the result becomes the array's device copy.
    pub fn commit(&mut self, result: DeviceArray<T>) -> Result<(), Error> {
        match self.accessor.existing() {
            Some(existing) => self.device.assign(&existing, &result)?,
            None => self.accessor.install(result),
        }

        self.written = true;
        Ok(())
    }

    /// Copy the contents of a `source` handle which may be owned by another array.
    pub fn assign(&mut self, source: &DeviceArray<T>) -> Result<(), Error> {
        let dest = self.accessor.resident();
        self.device.assign(&dest, source)?;
        self.written = true;
        Ok(())
    }
}

impl<'a, T: CType> Drop for OutputView<'a, T> {
    fn drop(&mut self) {
        if self.written {
            self.accessor.mark_dirty();
        }

        self.device.view_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::HostAccessor;

    #[test]
    fn test_views_are_released() -> Result<(), Error> {
        let device = BulkDevice::new();
        let coordinator = Coordinator::new(device.clone());

        let input = Accessor::Host(HostAccessor::from_vec(vec![1f32, 2.]));
        let output = DeviceAccessor::new(device.clone(), 2);

        {
            let view = coordinator.view(&input)?;
            let mut target = coordinator.view_mut(&output)?;
            assert_eq!(device.stats().open_views, 2);

            target.commit(view.derive(vec![3., 4.]))?;
        }

        assert_eq!(device.stats().open_views, 0);
        assert!(output.is_dirty());
        assert_eq!(output.to_vec()?, vec![3., 4.]);

        Ok(())
    }

    #[test]
    fn test_uncommitted_output_stays_clean() -> Result<(), Error> {
        let device = BulkDevice::new();
        let coordinator = Coordinator::new(device.clone());
        let output = DeviceAccessor::<f64>::new(device.clone(), 3);

        drop(coordinator.view_mut(&output)?);

        assert!(!output.is_dirty());
        assert!(!output.is_allocated());
        Ok(())
    }

    #[test]
    fn test_foreign_device_view() {
        let coordinator = Coordinator::new(BulkDevice::new());
        let foreign = Accessor::Device(DeviceAccessor::<f32>::new(BulkDevice::new(), 2));

        assert!(!coordinator.is_compatible(&foreign));
        assert!(coordinator.view(&foreign).is_err());
    }
}
