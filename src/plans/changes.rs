//! Change sets.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

use crate::addrs::{AbsProviderConfig, AbsResourceInstance};
use crate::value::Value;

use super::action::{Action, ActionReason};

/// Import metadata for a change that adopts an existing object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Importing {
    /// Provider-specific identifier that was imported.
    pub id: String,
}

/// The planned transition of one resource instance object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstanceChange {
    /// Instance address.
    pub addr: AbsResourceInstance,
    /// Deposed key when the change targets a deposed object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deposed: Option<String>,
    /// Provider configuration that performs the change.
    pub provider: AbsProviderConfig,
    /// Planned action.
    pub action: Action,
    /// Why the action was chosen.
    #[serde(default)]
    pub action_reason: ActionReason,
    /// Value before the change.
    pub before: Value,
    /// Value after the change. May contain unknowns.
    pub after: Value,
    /// Attributes whose change forces a replacement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_replace: Vec<String>,
    /// Set when the change adopts an existing object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importing: Option<Importing>,
}

impl ResourceInstanceChange {
    /// Creates a change with no reason or import metadata.
    #[must_use]
    pub const fn new(
        addr: AbsResourceInstance,
        provider: AbsProviderConfig,
        action: Action,
        before: Value,
        after: Value,
    ) -> Self {
        Self {
            addr,
            deposed: None,
            provider,
            action,
            action_reason: ActionReason::None,
            before,
            after,
            requires_replace: Vec::new(),
            importing: None,
        }
    }

    /// Sets the action reason.
    #[must_use]
    pub const fn with_reason(mut self, reason: ActionReason) -> Self {
        self.action_reason = reason;
        self
    }

    /// Targets a deposed object.
    #[must_use]
    pub fn with_deposed(mut self, key: impl Into<String>) -> Self {
        self.deposed = Some(key.into());
        self
    }

    fn same_object(&self, addr: &AbsResourceInstance, deposed: Option<&str>) -> bool {
        self.addr == *addr && self.deposed.as_deref() == deposed
    }
}

/// An object recorded under a new address by a `moved` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstanceMove {
    /// Address in the previous run.
    pub from: AbsResourceInstance,
    /// Address the plan uses.
    pub to: AbsResourceInstance,
}

/// All planned changes, sorted by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changes {
    /// Resource instance changes.
    pub resources: Vec<ResourceInstanceChange>,
}

impl Changes {
    /// Creates an empty change set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
        }
    }

    /// The change for the current object of an instance.
    #[must_use]
    pub fn resource_instance(&self, addr: &AbsResourceInstance) -> Option<&ResourceInstanceChange> {
        self.resources.iter().find(|c| c.same_object(addr, None))
    }

    /// The change for a deposed object.
    #[must_use]
    pub fn deposed(&self, addr: &AbsResourceInstance, key: &str) -> Option<&ResourceInstanceChange> {
        self.resources.iter().find(|c| c.same_object(addr, Some(key)))
    }

    /// Inserts or replaces a change.
    pub fn upsert(&mut self, change: ResourceInstanceChange) {
        self.resources
            .retain(|c| !c.same_object(&change.addr, change.deposed.as_deref()));
        let pos = self
            .resources
            .partition_point(|c| (&c.addr, &c.deposed) < (&change.addr, &change.deposed));
        self.resources.insert(pos, change);
    }

    /// Returns true if every change is a no-op.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.iter().all(|c| c.action == Action::NoOp)
    }

    /// Number of changes with the given action.
    #[must_use]
    pub fn count(&self, action: Action) -> usize {
        self.resources.iter().filter(|c| c.action == action).count()
    }
}

/// A [`Changes`] behind a lock, written by concurrent vertex visits.
#[derive(Debug, Default)]
pub struct SyncChanges {
    inner: RwLock<Changes>,
}

impl SyncChanges {
    /// Wraps a change set.
    #[must_use]
    pub const fn new(changes: Changes) -> Self {
        Self {
            inner: RwLock::new(changes),
        }
    }

    /// Records a change, replacing any earlier change for the same object.
    pub fn append(&self, change: ResourceInstanceChange) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .upsert(change);
    }

    /// The change for the current object of an instance.
    #[must_use]
    pub fn get(&self, addr: &AbsResourceInstance) -> Option<ResourceInstanceChange> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resource_instance(addr)
            .cloned()
    }

    /// The change for a deposed object.
    #[must_use]
    pub fn get_deposed(&self, addr: &AbsResourceInstance, key: &str) -> Option<ResourceInstanceChange> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .deposed(addr, key)
            .cloned()
    }

    /// A copy of the wrapped change set.
    #[must_use]
    pub fn snapshot(&self) -> Changes {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Unwraps the change set.
    #[must_use]
    pub fn into_inner(self) -> Changes {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}
