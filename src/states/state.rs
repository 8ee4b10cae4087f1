//! The persisted state document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::addrs::{
    AbsProviderConfig, AbsResource, AbsResourceInstance, ConfigResource, InstanceKey,
    ModuleInstance,
};
use crate::value::Value;

use super::object::ResourceInstanceObject;

/// Objects recorded for one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// The current object, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<ResourceInstanceObject>,
    /// Objects waiting to be destroyed after a create-before-destroy replace.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deposed: BTreeMap<String, ResourceInstanceObject>,
}

impl InstanceState {
    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.deposed.is_empty()
    }
}

/// All instances of one resource in one module instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Provider configuration that manages the instances.
    pub provider: AbsProviderConfig,
    /// Instances keyed by instance key.
    #[serde(default)]
    pub instances: BTreeMap<InstanceKey, InstanceState>,
}

/// Recorded state of every resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Identity of this state's history. Preserved across writes.
    pub lineage: Uuid,
    /// Incremented on every persisted write.
    pub serial: u64,
    /// Last modification time.
    pub last_updated: DateTime<Utc>,
    /// Resources keyed by absolute address.
    #[serde(default)]
    pub resources: BTreeMap<AbsResource, ResourceState>,
    /// Root module outputs.
    #[serde(default)]
    pub root_outputs: BTreeMap<String, Value>,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    /// Creates an empty state with a fresh lineage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lineage: Uuid::new_v4(),
            serial: 0,
            last_updated: Utc::now(),
            resources: BTreeMap::new(),
            root_outputs: BTreeMap::new(),
        }
    }

    /// Returns true if no resources are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.values().all(|r| r.instances.values().all(InstanceState::is_empty))
    }

    /// Records for one instance.
    #[must_use]
    pub fn instance(&self, addr: &AbsResourceInstance) -> Option<&InstanceState> {
        self.resources
            .get(&addr.abs_resource())
            .and_then(|r| r.instances.get(&addr.resource.key))
    }

    /// Current object of one instance.
    #[must_use]
    pub fn current(&self, addr: &AbsResourceInstance) -> Option<&ResourceInstanceObject> {
        self.instance(addr).and_then(|i| i.current.as_ref())
    }

    /// Provider configuration recorded for a resource.
    #[must_use]
    pub fn resource_provider(&self, addr: &AbsResource) -> Option<&AbsProviderConfig> {
        self.resources.get(addr).map(|r| &r.provider)
    }

    /// Mutable records for one instance, created on demand.
    fn instance_mut(
        &mut self,
        addr: &AbsResourceInstance,
        provider: &AbsProviderConfig,
    ) -> &mut InstanceState {
        let resource = self
            .resources
            .entry(addr.abs_resource())
            .or_insert_with(|| ResourceState {
                provider: provider.clone(),
                instances: BTreeMap::new(),
            });
        resource.provider = provider.clone();
        resource.instances.entry(addr.resource.key.clone()).or_default()
    }

    /// Drops empty instance and resource records for `addr`.
    fn prune(&mut self, addr: &AbsResourceInstance) {
        let abs = addr.abs_resource();
        let Some(resource) = self.resources.get_mut(&abs) else {
            return;
        };
        if resource
            .instances
            .get(&addr.resource.key)
            .is_some_and(InstanceState::is_empty)
        {
            resource.instances.remove(&addr.resource.key);
        }
        if resource.instances.is_empty() {
            self.resources.remove(&abs);
        }
    }

    /// Sets or removes (with `None`) the current object of an instance.
    pub fn set_current(
        &mut self,
        addr: &AbsResourceInstance,
        object: Option<ResourceInstanceObject>,
        provider: &AbsProviderConfig,
    ) {
        match object {
            Some(object) => self.instance_mut(addr, provider).current = Some(object),
            None => {
                if let Some(instance) = self
                    .resources
                    .get_mut(&addr.abs_resource())
                    .and_then(|r| r.instances.get_mut(&addr.resource.key))
                {
                    instance.current = None;
                }
                self.prune(addr);
            }
        }
    }

    /// Sets or removes a deposed object of an instance.
    pub fn set_deposed(
        &mut self,
        addr: &AbsResourceInstance,
        key: &str,
        object: Option<ResourceInstanceObject>,
        provider: &AbsProviderConfig,
    ) {
        match object {
            Some(object) => {
                self.instance_mut(addr, provider)
                    .deposed
                    .insert(key.to_string(), object);
            }
            None => {
                if let Some(instance) = self
                    .resources
                    .get_mut(&addr.abs_resource())
                    .and_then(|r| r.instances.get_mut(&addr.resource.key))
                {
                    instance.deposed.remove(key);
                }
                self.prune(addr);
            }
        }
    }

    /// Moves the current object into the deposed set under `key`.
    ///
    /// Returns false when there was no current object.
    pub fn depose_current(&mut self, addr: &AbsResourceInstance, key: &str) -> bool {
        let Some(instance) = self
            .resources
            .get_mut(&addr.abs_resource())
            .and_then(|r| r.instances.get_mut(&addr.resource.key))
        else {
            return false;
        };
        match instance.current.take() {
            Some(object) => {
                instance.deposed.insert(key.to_string(), object);
                true
            }
            None => false,
        }
    }

    /// Moves every record of a resource to a new address.
    ///
    /// Returns false, leaving state untouched, when nothing is recorded at
    /// `from` or something already is at `to`.
    pub fn move_resource(&mut self, from: &AbsResource, to: &AbsResource) -> bool {
        if self.resources.contains_key(to) {
            return false;
        }
        match self.resources.remove(from) {
            Some(resource) => {
                self.resources.insert(to.clone(), resource);
                true
            }
            None => false,
        }
    }

    /// Moves the records of one instance to a new address.
    ///
    /// Returns false, leaving state untouched, when nothing is recorded at
    /// `from` or something already is at `to`.
    pub fn move_instance(&mut self, from: &AbsResourceInstance, to: &AbsResourceInstance) -> bool {
        if self.instance(to).is_some_and(|i| !i.is_empty()) {
            return false;
        }
        let abs = from.abs_resource();
        let Some(resource) = self.resources.get_mut(&abs) else {
            return false;
        };
        let provider = resource.provider.clone();
        let Some(records) = resource.instances.remove(&from.resource.key) else {
            return false;
        };
        if resource.instances.is_empty() {
            self.resources.remove(&abs);
        }
        *self.instance_mut(to, &provider) = records;
        true
    }

    /// Every recorded instance address with a current object, sorted.
    #[must_use]
    pub fn instances(&self) -> Vec<AbsResourceInstance> {
        self.resources
            .iter()
            .flat_map(|(addr, r)| {
                r.instances
                    .iter()
                    .filter(|(_, i)| i.current.is_some())
                    .map(|(key, _)| addr.instance(key.clone()))
            })
            .collect()
    }

    /// Every recorded instance of a resource across all module instances.
    #[must_use]
    pub fn instances_of(&self, config: &ConfigResource) -> Vec<AbsResourceInstance> {
        self.resources
            .iter()
            .filter(|(addr, _)| addr.config() == *config)
            .flat_map(|(addr, r)| r.instances.keys().map(|key| addr.instance(key.clone())))
            .collect()
    }

    /// Every recorded resource in exactly one module instance.
    #[must_use]
    pub fn resources_in(&self, module: &ModuleInstance) -> Vec<&AbsResource> {
        self.resources.keys().filter(|addr| addr.module == *module).collect()
    }

    /// Every resource recorded in state whose configuration address is `config`.
    #[must_use]
    pub fn has_resource(&self, config: &ConfigResource) -> bool {
        self.resources.keys().any(|addr| addr.config() == *config)
    }

    /// Marks a persisted write.
    pub fn touch(&mut self) {
        self.serial += 1;
        self.last_updated = Utc::now();
    }
}
