use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use get_size::GetSize;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::bulk::DeviceAccessor;
use crate::{CType, DType, Error};

/// The concrete storage representation of an [`Accessor`]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Representation {
    /// A CPU-visible buffer, readable by every backend
    Plain,
    /// A buffer which may be resident on the bulk device
    Bulk,
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Bulk => f.write_str("bulk"),
        }
    }
}

/// A lazily allocated buffer in host memory, which may be shared with other arrays
pub struct HostAccessor<T> {
    size: usize,
    buffer: Arc<RwLock<Option<Vec<T>>>>,
}

impl<T> Clone for HostAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            buffer: self.buffer.clone(),
        }
    }
}

impl<T: CType> HostAccessor<T> {
    /// Construct a new accessor of the given `size`, without allocating it.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            buffer: Arc::new(RwLock::new(None)),
        }
    }

    /// Construct a new accessor which owns the given `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            size: data.len(),
            buffer: Arc::new(RwLock::new(Some(data))),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_allocated(&self) -> bool {
        self.buffer.read_recursive().is_some()
    }

    /// Return `true` if this accessor's buffer is also referenced by another accessor.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.buffer) > 1
    }

    /// Return `true` if this accessor and `other` refer to the same buffer.
    pub fn shares_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Borrow the contents of this buffer, allocating it if needed.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, [T]> {
        self.allocate();

        RwLockReadGuard::map(self.buffer.read_recursive(), |buffer| {
            buffer.as_deref().unwrap_or_default()
        })
    }

    /// Borrow the contents of this buffer mutably, allocating it if needed.
    pub fn write(&self) -> MappedRwLockWriteGuard<'_, [T]> {
        let size = self.size;

        RwLockWriteGuard::map(self.buffer.write(), |buffer| {
            buffer
                .get_or_insert_with(|| vec![T::ZERO; size])
                .as_mut_slice()
        })
    }

    /// Copy the contents of this buffer into a new [`Vec`].
    pub fn to_vec(&self) -> Vec<T> {
        self.read().to_vec()
    }

    /// Overwrite the contents of this buffer with the given `data`.
    pub fn overwrite(&self, data: Vec<T>) -> Result<(), Error> {
        if data.len() != self.size {
            return Err(Error::Bounds(format!(
                "cannot overwrite a buffer of size {} with one of size {}",
                self.size,
                data.len()
            )));
        }

        let mut buffer = self.buffer.write();

        match buffer.as_mut() {
            Some(buffer) => buffer.copy_from_slice(&data),
            None => *buffer = Some(data),
        }

        Ok(())
    }

    fn allocate(&self) {
        if self.buffer.read_recursive().is_none() {
            let mut buffer = self.buffer.write();

            if buffer.is_none() {
                *buffer = Some(vec![T::ZERO; self.size]);
            }
        }
    }
}

impl<T: CType> GetSize for HostAccessor<T> {
    fn get_heap_size(&self) -> usize {
        if self.is_allocated() {
            self.size * size_of::<T>()
        } else {
            0
        }
    }
}

impl<T: CType> fmt::Debug for HostAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "plain buffer of {} x {}", self.size, T::TYPE)
    }
}

/// The storage of one array, in one of several representations
pub enum Accessor<T> {
    Host(HostAccessor<T>),
    Device(DeviceAccessor<T>),
}

impl<T> Clone for Accessor<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Host(host) => Self::Host(host.clone()),
            Self::Device(device) => Self::Device(device.clone()),
        }
    }
}

impl<T: CType> Accessor<T> {
    /// The number of elements in this buffer.
    pub fn size(&self) -> usize {
        match self {
            Self::Host(host) => host.size(),
            Self::Device(device) => device.size(),
        }
    }

    /// The element type of this buffer.
    pub fn dtype(&self) -> DType {
        T::TYPE
    }

    pub fn representation(&self) -> Representation {
        match self {
            Self::Host(_) => Representation::Plain,
            Self::Device(_) => Representation::Bulk,
        }
    }

    /// Return `true` if any backing storage has been materialized.
    pub fn is_allocated(&self) -> bool {
        match self {
            Self::Host(host) => host.is_allocated(),
            Self::Device(device) => device.is_allocated(),
        }
    }

    /// Return `true` if a backend-resident copy is newer than the CPU-visible copy.
    pub fn is_dirty(&self) -> bool {
        match self {
            Self::Host(_) => false,
            Self::Device(device) => device.is_dirty(),
        }
    }

    /// Construct a new accessor which shares this accessor's buffer.
    pub fn share(&self) -> Self {
        self.clone()
    }

    /// Return `true` if this accessor and `other` refer to the same buffer.
    pub fn shares_buffer(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Host(this), Self::Host(that)) => this.shares_buffer(that),
            (Self::Device(this), Self::Device(that)) => this.shares_buffer(that),
            _ => false,
        }
    }

    /// Read the contents of this buffer through the plain representation,
    /// synchronizing from the backend first if needed.
    pub fn to_vec(&self) -> Result<Vec<T>, Error> {
        match self {
            Self::Host(host) => Ok(host.to_vec()),
            Self::Device(device) => device.to_vec(),
        }
    }

    /// Read the element at `offset`.
    pub fn read_value(&self, offset: usize) -> Result<T, Error> {
        let value = match self {
            Self::Host(host) => host.read().get(offset).copied(),
            Self::Device(device) => device.read()?.get(offset).copied(),
        };

        value.ok_or_else(|| {
            Error::Bounds(format!(
                "invalid offset {offset} for a buffer of length {}",
                self.size()
            ))
        })
    }

    /// Overwrite the contents of this buffer through the plain representation.
    pub fn overwrite(&self, data: Vec<T>) -> Result<(), Error> {
        match self {
            Self::Host(host) => host.overwrite(data),
            Self::Device(device) => device.overwrite(data),
        }
    }

    /// Write the given `value` at `offset`.
    pub fn write_value_at(&self, offset: usize, value: T) -> Result<(), Error> {
        let size = self.size();

        let slot = match self {
            Self::Host(host) => host.write().get_mut(offset).map(|slot| *slot = value),
            Self::Device(device) => device.write()?.get_mut(offset).map(|slot| *slot = value),
        };

        slot.ok_or_else(|| {
            Error::Bounds(format!(
                "invalid offset {offset} for a buffer of length {size}"
            ))
        })
    }
}

impl<T: CType> GetSize for Accessor<T> {
    fn get_heap_size(&self) -> usize {
        match self {
            Self::Host(host) => host.get_heap_size(),
            Self::Device(device) => device.get_heap_size(),
        }
    }
}

impl<T: CType> fmt::Debug for Accessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Host(host) => host.fmt(f),
            Self::Device(device) => device.fmt(f),
        }
    }
}

impl<T: CType> From<HostAccessor<T>> for Accessor<T> {
    fn from(host: HostAccessor<T>) -> Self {
        Self::Host(host)
    }
}

impl<T: CType> From<DeviceAccessor<T>> for Accessor<T> {
    fn from(device: DeviceAccessor<T>) -> Self {
        Self::Device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_allocation() {
        let host = HostAccessor::<f32>::new(4);
        assert!(!host.is_allocated());
        assert_eq!(host.get_heap_size(), 0);

        assert_eq!(host.to_vec(), vec![0.; 4]);
        assert!(host.is_allocated());
        assert_eq!(host.get_heap_size(), 16);
    }

    #[test]
    fn test_shared_buffer() -> Result<(), Error> {
        let host = HostAccessor::from_vec(vec![1, 2, 3]);
        let shared = host.clone();
        assert!(host.is_shared());
        assert!(host.shares_buffer(&shared));

        shared.overwrite(vec![4, 5, 6])?;
        assert_eq!(host.to_vec(), vec![4, 5, 6]);

        assert!(host.overwrite(vec![1]).is_err());
        Ok(())
    }

    #[test]
    fn test_nested_reads() {
        let host = HostAccessor::from_vec(vec![1u8, 2]);
        let first = host.read();
        let second = host.read();
        assert_eq!(&*first, &*second);
    }

    #[test]
    fn test_read_write_value() -> Result<(), Error> {
        let accessor = Accessor::from(HostAccessor::<i64>::new(3));
        accessor.write_value_at(1, 7)?;
        assert_eq!(accessor.read_value(1)?, 7);
        assert!(accessor.read_value(3).is_err());
        assert!(accessor.write_value_at(3, 1).is_err());
        Ok(())
    }
}
