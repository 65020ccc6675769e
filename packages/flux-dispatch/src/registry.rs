//! Name → store mapping with uniqueness and stable registration order.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::{DispatchError, Result};
use crate::store::{AnyStore, Store, StoreCell, StoreHandle, StoreRef};

/// Registry of stores keyed by unique name.
///
/// Registration order is preserved; it is the order stores run in when no
/// `wait_for` reorders them. The registry never changes during a dispatch
/// cycle: [`Dispatcher`](crate::Dispatcher) refuses registration while one is
/// running.
pub struct StoreRegistry<P = serde_json::Value> {
    stores: Vec<Rc<dyn AnyStore<P>>>,
    index: HashMap<String, usize>,
}

impl<P: 'static> StoreRegistry<P> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            stores: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register `store` under `name`.
    ///
    /// Fails with [`DispatchError::DuplicateName`] if the name is taken.
    pub fn register<S: 'static>(
        &mut self,
        name: impl Into<String>,
        store: Store<S, P>,
    ) -> Result<StoreHandle<S, P>> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(DispatchError::DuplicateName { name });
        }

        let cell = Rc::new(StoreCell::new(name.clone(), store));
        let erased: Rc<dyn AnyStore<P>> = cell.clone();

        debug!(store = %name, position = self.stores.len(), "store registered");
        self.index.insert(name, self.stores.len());
        self.stores.push(erased);

        Ok(StoreHandle::new(cell))
    }

    /// Look up a store by name.
    ///
    /// Fails with [`DispatchError::UnknownStore`] if absent.
    pub fn lookup(&self, name: &str) -> Result<StoreRef<'_, P>> {
        let index = self.index_of(name)?;
        Ok(StoreRef::new(self.store_at(index)))
    }

    /// Returns true if a store is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Store names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.stores.iter().map(|store| store.name())
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Returns true if no store is registered.
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub(crate) fn index_of(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| DispatchError::UnknownStore {
                name: name.to_string(),
            })
    }

    pub(crate) fn store_at(&self, index: usize) -> &dyn AnyStore<P> {
        self.stores[index].as_ref()
    }
}

impl<P: 'static> Default for StoreRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> fmt::Debug for StoreRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("stores", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
