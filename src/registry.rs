//! Kernel tables and the per-operator resolution cache.
//!
//! Each backend registers, per element type and call shape, an ordered list of
//! `(capability, kernel)` entries. An operator resolves to the first entry whose capability it
//! satisfies. Since an operator may satisfy several capabilities, registration order matters.
//! The result of each scan, including "no match", is memoized by the operator's [`TypeId`].

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::trace;
use parking_lot::RwLock;

use crate::ops::{Capabilities, Capability, Operator};
use crate::{BackendId, DType};

/// The call shape of an operation, which determines the signature of its kernels
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CallShape {
    Nullary,
    Unary,
    Binary,
    Reduce,
    Aggregate,
    MatMul,
}

/// A capability tag bound to a concrete kernel
#[derive(Copy, Clone)]
pub struct KernelBinding<K> {
    index: usize,
    tag: Capability,
    name: &'static str,
    kernel: K,
}

impl<K: Copy> KernelBinding<K> {
    /// The position of this binding in its [`KernelTable`].
    pub fn index(&self) -> usize {
        self.index
    }

    /// The capability tag which matched.
    pub fn tag(&self) -> Capability {
        self.tag
    }

    /// The name the kernel was registered with.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The bound kernel.
    pub fn kernel(&self) -> K {
        self.kernel
    }
}

// two bindings are identical iff they are the same entry of the same table
impl<K> PartialEq for KernelBinding<K> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.tag == other.tag && self.name == other.name
    }
}

impl<K> fmt::Debug for KernelBinding<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({:?}) at {}", self.name, self.tag, self.index)
    }
}

struct KernelEntry<K> {
    tag: Capability,
    name: &'static str,
    kernel: K,
}

/// An ordered list of kernels for one backend, element type, and call shape
pub struct KernelTable<K> {
    entries: Vec<KernelEntry<K>>,
    cache: RwLock<HashMap<TypeId, Option<KernelBinding<K>>>>,
}

impl<K: Copy> KernelTable<K> {
    /// Construct a new, empty table.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Append a kernel, to be selected for operators which satisfy `tag`
    /// and no earlier entry in this table.
    pub fn register(mut self, tag: Capability, name: &'static str, kernel: K) -> Self {
        self.entries.push(KernelEntry { tag, name, kernel });
        self
    }

    /// The number of registered kernels.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of operator types resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    /// Resolve the kernel for the operator `O`, if any.
    pub fn resolve<O: Operator>(&self) -> Option<KernelBinding<K>> {
        let op_type = TypeId::of::<O>();

        if let Some(binding) = self.cache.read().get(&op_type) {
            return *binding;
        }

        let binding = self.scan(O::CAPABILITIES);
        trace!("resolved {} to {:?}", O::NAME, binding);

        // a concurrent scan for the same operator will have found the same entry
        *self.cache.write().entry(op_type).or_insert(binding)
    }

    fn scan(&self, capabilities: Capabilities) -> Option<KernelBinding<K>> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, entry)| capabilities.contains(entry.tag))
            .map(|(index, entry)| KernelBinding {
                index,
                tag: entry.tag,
                name: entry.name,
                kernel: entry.kernel,
            })
    }
}

impl<K: Copy> Default for KernelTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

type TableKey = (BackendId, DType, CallShape);

/// The kernel tables of every backend, fixed once constructed
pub struct Registry {
    tables: HashMap<TableKey, Box<dyn Any + Send + Sync>>,
    lookups: AtomicUsize,
}

impl Registry {
    /// Construct a new, empty registry.
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Construct a registry holding the kernels of every built-in backend.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::raw::register(&mut registry);
        crate::bulk::register(&mut registry);
        registry
    }

    /// Register the kernel `table` of a `backend` for the given element type and call shape,
    /// replacing any existing table.
    pub fn register<K>(
        &mut self,
        backend: BackendId,
        dtype: DType,
        shape: CallShape,
        table: KernelTable<K>,
    ) where
        K: Copy + Send + Sync + 'static,
    {
        self.tables.insert((backend, dtype, shape), Box::new(table));
    }

    /// Borrow the kernel table of a `backend` for the given element type and call shape.
    pub fn table<K>(
        &self,
        backend: BackendId,
        dtype: DType,
        shape: CallShape,
    ) -> Option<&KernelTable<K>>
    where
        K: Copy + Send + Sync + 'static,
    {
        self.tables
            .get(&(backend, dtype, shape))
            .and_then(|table| table.downcast_ref())
    }

    /// Resolve the kernel of a `backend` for the operator `O` on elements of type `dtype`.
    pub fn resolve<O, K>(
        &self,
        backend: BackendId,
        dtype: DType,
        shape: CallShape,
    ) -> Option<KernelBinding<K>>
    where
        O: Operator,
        K: Copy + Send + Sync + 'static,
    {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.table::<K>(backend, dtype, shape)?.resolve::<O>()
    }

    /// The number of calls to [`Registry::resolve`] so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
