//! The recorded object for one resource instance.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::addrs::ConfigResource;
use crate::value::Value;

/// Lifecycle status of a recorded object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStatus {
    /// Fully applied and usable.
    #[default]
    Ready,
    /// Partially created; replaced on the next plan.
    Tainted,
    /// Planned but not applied yet. Only appears in working state during a walk.
    Planned,
}

/// The last-known provider-side representation of one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInstanceObject {
    /// Attribute values.
    pub value: Value,
    /// Object status.
    #[serde(default)]
    pub status: ObjectStatus,
    /// Resources this object depended on when it was last applied.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ConfigResource>,
    /// Whether the object was created with `create_before_destroy`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub create_before_destroy: bool,
}

impl ResourceInstanceObject {
    /// A ready object with the given value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self {
            value,
            status: ObjectStatus::Ready,
            dependencies: Vec::new(),
            create_before_destroy: false,
        }
    }

    /// A planned (not yet applied) object.
    #[must_use]
    pub const fn planned(value: Value) -> Self {
        Self {
            value,
            status: ObjectStatus::Planned,
            dependencies: Vec::new(),
            create_before_destroy: false,
        }
    }

    /// Sets the recorded dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, mut dependencies: Vec<ConfigResource>) -> Self {
        dependencies.sort();
        dependencies.dedup();
        self.dependencies = dependencies;
        self
    }

    /// Sets the status.
    #[must_use]
    pub const fn with_status(mut self, status: ObjectStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the create-before-destroy flag.
    #[must_use]
    pub const fn with_create_before_destroy(mut self, cbd: bool) -> Self {
        self.create_before_destroy = cbd;
        self
    }

    /// Returns true if the object must be replaced.
    #[must_use]
    pub const fn is_tainted(&self) -> bool {
        matches!(self.status, ObjectStatus::Tainted)
    }
}

/// Generates a key for a deposed object.
#[must_use]
pub fn new_deposed_key() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
