//! Synchronized state wrapper shared by concurrent vertex visits.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::addrs::{AbsProviderConfig, AbsResource, AbsResourceInstance, ConfigResource};
use crate::value::Value;

use super::object::ResourceInstanceObject;
use super::state::State;

/// A [`State`] behind a lock.
///
/// Each method takes the lock for exactly one read or write. Callers that
/// derive a new object from an old one must write it back within the same
/// visit; nothing serializes a read-modify-write sequence across calls.
#[derive(Debug, Default)]
pub struct SyncState {
    inner: RwLock<State>,
}

impl SyncState {
    /// Wraps a state.
    #[must_use]
    pub const fn new(state: State) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current object of an instance.
    #[must_use]
    pub fn current(&self, addr: &AbsResourceInstance) -> Option<ResourceInstanceObject> {
        self.read().current(addr).cloned()
    }

    /// Deposed objects of an instance.
    #[must_use]
    pub fn deposed(&self, addr: &AbsResourceInstance) -> BTreeMap<String, ResourceInstanceObject> {
        self.read()
            .instance(addr)
            .map(|i| i.deposed.clone())
            .unwrap_or_default()
    }

    /// Sets or removes the current object of an instance.
    pub fn set_current(
        &self,
        addr: &AbsResourceInstance,
        object: Option<ResourceInstanceObject>,
        provider: &AbsProviderConfig,
    ) {
        self.write().set_current(addr, object, provider);
    }

    /// Sets or removes a deposed object.
    pub fn set_deposed(
        &self,
        addr: &AbsResourceInstance,
        key: &str,
        object: Option<ResourceInstanceObject>,
        provider: &AbsProviderConfig,
    ) {
        self.write().set_deposed(addr, key, object, provider);
    }

    /// Moves the current object of an instance into the deposed set.
    pub fn depose_current(&self, addr: &AbsResourceInstance, key: &str) -> bool {
        self.write().depose_current(addr, key)
    }

    /// Provider configuration recorded for a resource.
    #[must_use]
    pub fn resource_provider(&self, addr: &AbsResource) -> Option<AbsProviderConfig> {
        self.read().resource_provider(addr).cloned()
    }

    /// Every recorded instance of a configuration resource.
    #[must_use]
    pub fn instances_of(&self, config: &ConfigResource) -> Vec<AbsResourceInstance> {
        self.read().instances_of(config)
    }

    /// Every instance with a current object.
    #[must_use]
    pub fn instances(&self) -> Vec<AbsResourceInstance> {
        self.read().instances()
    }

    /// Current objects of every instance of one resource, keyed by instance key.
    #[must_use]
    pub fn resource_objects(
        &self,
        addr: &AbsResource,
    ) -> Option<BTreeMap<crate::addrs::InstanceKey, ResourceInstanceObject>> {
        let state = self.read();
        let resource = state.resources.get(addr)?;
        Some(
            resource
                .instances
                .iter()
                .filter_map(|(key, i)| i.current.clone().map(|obj| (key.clone(), obj)))
                .collect(),
        )
    }

    /// Sets or removes a root output value.
    pub fn set_root_output(&self, name: &str, value: Option<Value>) {
        let mut state = self.write();
        match value {
            Some(value) => {
                state.root_outputs.insert(name.to_string(), value);
            }
            None => {
                state.root_outputs.remove(name);
            }
        }
    }

    /// A copy of the wrapped state.
    #[must_use]
    pub fn snapshot(&self) -> State {
        self.read().clone()
    }

    /// Unwraps the state.
    #[must_use]
    pub fn into_inner(self) -> State {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
