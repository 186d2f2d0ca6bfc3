use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

use get_size::GetSize;
use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::{CType, Error};

use super::device::{BulkDevice, DeviceArray};

struct DeviceState<T> {
    host: Option<Vec<T>>,
    device: Option<DeviceArray<T>>,
    dirty: bool,
}

impl<T: CType> DeviceState<T> {
    // the device copy, when present, is never older than the host copy
    fn is_stale(&self) -> bool {
        self.dirty || (self.host.is_none() && self.device.is_some())
    }

    fn sync(&mut self, device: &BulkDevice) -> Result<(), Error> {
        if self.is_stale() {
            if let Some(handle) = &self.device {
                self.host = Some(device.unwrap(handle)?);
            }

            self.dirty = false;
        }

        Ok(())
    }
}

/// A buffer which may be resident in the memory of a [`BulkDevice`].
///
/// The host copy is only refreshed from the device when it is read.
pub struct DeviceAccessor<T> {
    size: usize,
    device: BulkDevice,
    state: Arc<RwLock<DeviceState<T>>>,
}

impl<T> Clone for DeviceAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            size: self.size,
            device: self.device.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: CType> DeviceAccessor<T> {
    /// Construct a new accessor of the given `size`, without allocating it.
    pub fn new(device: BulkDevice, size: usize) -> Self {
        Self::with_state(device, size, None)
    }

    /// Construct a new accessor which owns the given host `data`.
    pub fn from_vec(device: BulkDevice, data: Vec<T>) -> Self {
        Self::with_state(device, data.len(), Some(data))
    }

    fn with_state(device: BulkDevice, size: usize, host: Option<Vec<T>>) -> Self {
        let state = DeviceState {
            host,
            device: None,
            dirty: false,
        };

        Self {
            size,
            device,
            state: Arc::new(RwLock::new(state)),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The device this buffer may be resident on.
    pub fn device(&self) -> &BulkDevice {
        &self.device
    }

    pub fn is_allocated(&self) -> bool {
        let state = self.state.read_recursive();
        state.host.is_some() || state.device.is_some()
    }

    /// Return `true` if the device copy of this buffer is newer than its host copy.
    pub fn is_dirty(&self) -> bool {
        self.state.read_recursive().dirty
    }

    /// Return `true` if this buffer has a copy in device memory.
    pub fn is_resident(&self) -> bool {
        self.state.read_recursive().device.is_some()
    }

    pub fn shares_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Download the device copy of this buffer if it is newer than the host copy.
    pub fn sync(&self) -> Result<(), Error> {
        if self.state.read_recursive().is_stale() {
            self.state.write().sync(&self.device)?;
        }

        Ok(())
    }

    /// Borrow the host copy of this buffer, synchronizing it first if needed.
    pub fn read(&self) -> Result<MappedRwLockReadGuard<'_, [T]>, Error> {
        {
            let state = self.state.read_recursive();
            if !state.is_stale() && state.host.is_some() {
                return Ok(RwLockReadGuard::map(state, |state| {
                    state.host.as_deref().unwrap_or_default()
                }));
            }
        }

        let mut state = self.state.write();
        state.sync(&self.device)?;

        if state.host.is_none() {
            state.host = Some(vec![T::ZERO; self.size]);
        }

        let state = RwLockWriteGuard::downgrade(state);

        Ok(RwLockReadGuard::map(state, |state| {
            state.host.as_deref().unwrap_or_default()
        }))
    }

    /// Borrow the host copy of this buffer mutably, releasing its device copy.
    pub fn write(&self) -> Result<MappedRwLockWriteGuard<'_, [T]>, Error> {
        let mut state = self.state.write();
        state.sync(&self.device)?;
        state.device = None;

        let size = self.size;
        Ok(RwLockWriteGuard::map(state, |state| {
            state
                .host
                .get_or_insert_with(|| vec![T::ZERO; size])
                .as_mut_slice()
        }))
    }

    /// Copy the host copy of this buffer into a new [`Vec`], synchronizing it first if needed.
    pub fn to_vec(&self) -> Result<Vec<T>, Error> {
        self.read().map(|slice| slice.to_vec())
    }

    /// Replace the contents of this buffer with the given host `data`.
    pub fn overwrite(&self, data: Vec<T>) -> Result<(), Error> {
        if data.len() != self.size {
            return Err(Error::Bounds(format!(
                "cannot overwrite a buffer of size {} with one of size {}",
                self.size,
                data.len()
            )));
        }

        let mut state = self.state.write();
        state.host = Some(data);
        state.device = None;
        state.dirty = false;

        Ok(())
    }

    /// Return the device copy of this buffer, uploading the host copy if there is none.
    pub(super) fn resident(&self) -> DeviceArray<T> {
        if let Some(handle) = &self.state.read_recursive().device {
            return handle.clone();
        }

        let mut state = self.state.write();

        if let Some(handle) = &state.device {
            return handle.clone();
        }

        let handle = match &state.host {
            Some(host) => self.device.wrap(host),
            None => self.device.alloc(self.size),
        };

        state.device = Some(handle.clone());
        handle
    }

    /// Return the existing device copy of this buffer, if any, without uploading.
    pub(super) fn existing(&self) -> Option<DeviceArray<T>> {
        self.state.read_recursive().device.clone()
    }

    /// Make the given `handle` the device copy of this buffer.
    pub(super) fn install(&self, handle: DeviceArray<T>) {
        self.state.write().device = Some(handle);
    }

    pub(super) fn mark_dirty(&self) {
        self.state.write().dirty = true;
    }
}

impl<T: CType> GetSize for DeviceAccessor<T> {
    fn get_heap_size(&self) -> usize {
        let state = self.state.read_recursive();
        let host = state.host.as_ref().map(|host| host.len() * size_of::<T>());
        let device = state.device.as_ref().map(|handle| handle.heap_size());
        host.unwrap_or(0) + device.unwrap_or(0)
    }
}

impl<T: CType> fmt::Debug for DeviceAccessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let state = self.state.read_recursive();

        write!(
            f,
            "bulk buffer of {} x {} (resident: {}, dirty: {})",
            self.size,
            T::TYPE,
            state.device.is_some(),
            state.dirty
        )
    }
}
