use std::fmt;
use std::mem::size_of;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::{RwLock, RwLockReadGuard};

use crate::{CType, Error};

#[derive(Default)]
struct Counters {
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    live: AtomicUsize,
    launches: AtomicUsize,
    open_views: AtomicUsize,
}

/// A snapshot of the transfer statistics of a [`BulkDevice`]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DeviceStats {
    /// Host-to-device copies
    pub uploads: usize,
    /// Device-to-host copies
    pub downloads: usize,
    /// Device buffers not yet released
    pub live: usize,
    /// Kernel invocations
    pub launches: usize,
    /// Backend views not yet released
    pub open_views: usize,
}

/// A bulk array device with its own memory.
///
/// Two handles to the same device compare equal. Buffers of one device cannot be passed to
/// another.
#[derive(Clone, Default)]
pub struct BulkDevice {
    counters: Arc<Counters>,
}

impl BulkDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the transfer statistics of this device.
    pub fn stats(&self) -> DeviceStats {
        let counters = &self.counters;

        DeviceStats {
            uploads: counters.uploads.load(Ordering::Acquire),
            downloads: counters.downloads.load(Ordering::Acquire),
            live: counters.live.load(Ordering::Acquire),
            launches: counters.launches.load(Ordering::Acquire),
            open_views: counters.open_views.load(Ordering::Acquire),
        }
    }

    /// Copy the given host `data` into a new device buffer.
    pub fn wrap<T: CType>(&self, data: &[T]) -> DeviceArray<T> {
        trace!("upload {} x {} to the bulk device", data.len(), T::TYPE);
        self.counters.uploads.fetch_add(1, Ordering::AcqRel);
        DeviceArray::new(self.clone(), data.to_vec())
    }

    /// Allocate a new zero-filled device buffer of the given `size`.
    pub fn alloc<T: CType>(&self, size: usize) -> DeviceArray<T> {
        DeviceArray::new(self.clone(), vec![T::ZERO; size])
    }

    /// Copy the contents of the given device buffer into host memory.
    pub fn unwrap<T: CType>(&self, handle: &DeviceArray<T>) -> Result<Vec<T>, Error> {
        self.check_device(handle)?;

        trace!("download {} x {} from the bulk device", handle.len(), T::TYPE);
        self.counters.downloads.fetch_add(1, Ordering::AcqRel);

        Ok(handle.read().to_vec())
    }

    /// Overwrite the contents of `dest` with the contents of `source`.
    pub fn assign<T: CType>(
        &self,
        dest: &DeviceArray<T>,
        source: &DeviceArray<T>,
    ) -> Result<(), Error> {
        self.check_device(dest)?;
        self.check_device(source)?;

        if dest.len() != source.len() {
            return Err(Error::Bounds(format!(
                "cannot overwrite a buffer of size {} with one of size {}",
                dest.len(),
                source.len()
            )));
        }

        if dest.shares_buffer(source) {
            return Ok(());
        }

        let source = source.read();
        dest.buffer.data.write().copy_from_slice(&source);

        Ok(())
    }

    /// Release the given device buffer.
    pub fn release<T: CType>(&self, handle: DeviceArray<T>) {
        std::mem::drop(handle)
    }

    pub(super) fn launched(&self) {
        self.counters.launches.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn view_opened(&self) {
        self.counters.open_views.fetch_add(1, Ordering::AcqRel);
    }

    pub(super) fn view_closed(&self) {
        self.counters.open_views.fetch_sub(1, Ordering::AcqRel);
    }

    fn check_device<T: CType>(&self, handle: &DeviceArray<T>) -> Result<(), Error> {
        if &handle.buffer.device == self {
            Ok(())
        } else {
            Err(Error::Interface(
                "cannot access a buffer of a different bulk device".to_string(),
            ))
        }
    }
}

impl PartialEq for BulkDevice {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.counters, &other.counters)
    }
}

impl Eq for BulkDevice {}

impl fmt::Debug for BulkDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bulk device at {:p}", Arc::as_ptr(&self.counters))
    }
}

struct Allocation<T> {
    device: BulkDevice,
    data: RwLock<Vec<T>>,
}

impl<T> Drop for Allocation<T> {
    fn drop(&mut self) {
        self.device.counters.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A handle to a buffer in the memory of a [`BulkDevice`]
///
/// Cloning a handle does not copy the buffer. The buffer is released when its last handle is
/// dropped.
pub struct DeviceArray<T> {
    buffer: Arc<Allocation<T>>,
}

impl<T> Clone for DeviceArray<T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
        }
    }
}

impl<T: CType> DeviceArray<T> {
    fn new(device: BulkDevice, data: Vec<T>) -> Self {
        device.counters.live.fetch_add(1, Ordering::AcqRel);

        Self {
            buffer: Arc::new(Allocation {
                device,
                data: RwLock::new(data),
            }),
        }
    }

    /// Construct a new buffer on the same device, holding the given kernel output.
    pub fn derive(&self, data: Vec<T>) -> Self {
        Self::new(self.buffer.device.clone(), data)
    }

    /// The device which owns this buffer.
    pub fn device(&self) -> &BulkDevice {
        &self.buffer.device
    }

    pub fn len(&self) -> usize {
        self.buffer.data.read_recursive().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the device-resident contents of this buffer, for use by a kernel.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.buffer.data.read_recursive()
    }

    pub fn shares_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    pub(super) fn heap_size(&self) -> usize {
        self.len() * size_of::<T>()
    }
}

impl<T: CType> fmt::Debug for DeviceArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "device buffer of {} x {}", self.len(), T::TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_stats() -> Result<(), Error> {
        let device = BulkDevice::new();

        let handle = device.wrap(&[1f32, 2., 3.]);
        assert_eq!(device.unwrap(&handle)?, vec![1., 2., 3.]);

        let copy = handle.clone();
        let stats = device.stats();
        assert_eq!(stats.uploads, 1);
        assert_eq!(stats.downloads, 1);
        assert_eq!(stats.live, 1);

        device.release(handle);
        device.release(copy);
        assert_eq!(device.stats().live, 0);

        Ok(())
    }

    #[test]
    fn test_assign() -> Result<(), Error> {
        let device = BulkDevice::new();
        let dest = device.alloc::<f64>(2);
        let source = device.wrap(&[4., 5.]);

        device.assign(&dest, &source)?;
        assert_eq!(&*dest.read(), &[4., 5.]);

        device.assign(&dest, &dest.clone())?;
        assert!(device.assign(&dest, &device.alloc(3)).is_err());

        Ok(())
    }

    #[test]
    fn test_foreign_device() {
        let device = BulkDevice::new();
        let other = BulkDevice::new();
        assert_ne!(device, other);

        let handle = other.wrap(&[1f32]);
        assert!(device.unwrap(&handle).is_err());
    }
}
