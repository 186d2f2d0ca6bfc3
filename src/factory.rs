use crate::access::{Accessor, HostAccessor};
use crate::bulk::BulkFactory;
use crate::CType;

/// Chooses the storage representation of each new array
#[derive(Clone, Debug)]
pub enum AccessorFactory {
    /// Every array uses the plain representation
    Plain,
    /// Arrays use the bulk representation where the bulk backend can operate on them
    Bulk(BulkFactory),
}

impl AccessorFactory {
    /// Construct a new, unallocated accessor of the given `size`.
    pub fn create<T: CType>(&self, size: usize) -> Accessor<T> {
        match self {
            Self::Plain => HostAccessor::new(size).into(),
            Self::Bulk(bulk) => bulk.create(size),
        }
    }

    /// Construct a new accessor which owns the given `data`.
    pub fn wrap<T: CType>(&self, data: Vec<T>) -> Accessor<T> {
        match self {
            Self::Plain => HostAccessor::from_vec(data).into(),
            Self::Bulk(bulk) => bulk.wrap(data),
        }
    }
}

impl Default for AccessorFactory {
    fn default() -> Self {
        Self::Plain
    }
}

impl From<BulkFactory> for AccessorFactory {
    fn from(bulk: BulkFactory) -> Self {
        Self::Bulk(bulk)
    }
}
