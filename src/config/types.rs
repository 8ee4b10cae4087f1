//! Configuration file types.
//!
//! One YAML file describes one module. Child modules are separate files
//! referenced by `modules[].source`, relative to the calling file.

use serde::Deserialize;
use std::collections::BTreeMap;

use crate::addrs::{LocalProviderConfig, Resource, ResourceMode};
use crate::value::Value;

use super::expr::Expr;

/// Contents of one module file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleFile {
    /// Provider local names mapped to source addresses.
    #[serde(default)]
    pub required_providers: BTreeMap<String, RequiredProvider>,
    /// Provider configurations.
    #[serde(default)]
    pub providers: Vec<ProviderBlock>,
    /// Input variables.
    #[serde(default)]
    pub variables: Vec<VariableBlock>,
    /// Local values.
    #[serde(default)]
    pub locals: BTreeMap<String, Expr>,
    /// Managed resources and data sources.
    #[serde(default)]
    pub resources: Vec<ResourceBlock>,
    /// Child module calls.
    #[serde(default)]
    pub modules: Vec<ModuleCallBlock>,
    /// Output values.
    #[serde(default)]
    pub outputs: Vec<OutputBlock>,
    /// Objects to adopt into state.
    #[serde(default)]
    pub imports: Vec<ImportBlock>,
    /// Resources removed from configuration on purpose.
    #[serde(default)]
    pub removed: Vec<RemovedBlock>,
    /// Resources renamed since the last apply.
    #[serde(default)]
    pub moved: Vec<MovedBlock>,
}

/// A `required_providers` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredProvider {
    /// Source address, `namespace/type` or `type`.
    pub source: String,
}

/// A provider configuration block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderBlock {
    /// Local name.
    pub name: String,
    /// Optional alias.
    #[serde(default)]
    pub alias: Option<String>,
    /// Configuration arguments.
    #[serde(default)]
    pub config: BTreeMap<String, Expr>,
    /// Creates one provider instance per element.
    #[serde(default)]
    pub for_each: Option<Expr>,
}

impl ProviderBlock {
    /// The local configuration address, `name` or `name.alias`.
    #[must_use]
    pub fn local_config(&self) -> LocalProviderConfig {
        LocalProviderConfig::new(self.name.clone(), self.alias.clone())
    }
}

/// An input variable declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableBlock {
    /// Variable name.
    pub name: String,
    /// Default value. Variables without one are required.
    #[serde(default)]
    pub default: Option<Value>,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Whether a resource block declares a managed resource or a data source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockMode {
    /// Managed resource.
    #[default]
    Managed,
    /// Data source.
    Data,
}

/// Lifecycle settings of a managed resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Lifecycle {
    /// Replace by creating the new object first.
    #[serde(default)]
    pub create_before_destroy: bool,
    /// Reject any plan that destroys the object.
    #[serde(default)]
    pub prevent_destroy: bool,
    /// Attributes whose configuration changes are ignored after creation.
    #[serde(default)]
    pub ignore_changes: Vec<String>,
    /// Checked before each instance is planned or applied.
    #[serde(default)]
    pub precondition: Vec<ConditionBlock>,
    /// Checked against the planned and the applied object; may use `self`.
    #[serde(default)]
    pub postcondition: Vec<ConditionBlock>,
}

/// A custom condition in a `lifecycle` block.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionBlock {
    /// Must evaluate to `true`.
    pub condition: Expr,
    /// Reported when the condition is `false`.
    pub error_message: Expr,
}

/// A resource or data source declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceBlock {
    /// Resource type, e.g. `test_instance`.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Resource name.
    pub name: String,
    /// Managed or data.
    #[serde(default)]
    pub mode: BlockMode,
    /// Provider configuration, `name` or `name.alias`.
    #[serde(default)]
    pub provider: Option<String>,
    /// Instance key selecting one instance of a provider with `for_each`.
    #[serde(default)]
    pub provider_key: Option<Expr>,
    /// Number of instances.
    #[serde(default)]
    pub count: Option<Expr>,
    /// One instance per map or set element.
    #[serde(default)]
    pub for_each: Option<Expr>,
    /// Explicit dependencies.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Lifecycle settings.
    #[serde(default)]
    pub lifecycle: Lifecycle,
    /// Resource arguments.
    #[serde(default)]
    pub attributes: BTreeMap<String, Expr>,
}

impl ResourceBlock {
    /// The resource address within its module.
    #[must_use]
    pub fn addr(&self) -> Resource {
        match self.mode {
            BlockMode::Managed => Resource::managed(self.type_name.clone(), self.name.clone()),
            BlockMode::Data => Resource::data(self.type_name.clone(), self.name.clone()),
        }
    }

    /// Managed or data.
    #[must_use]
    pub const fn resource_mode(&self) -> ResourceMode {
        match self.mode {
            BlockMode::Managed => ResourceMode::Managed,
            BlockMode::Data => ResourceMode::Data,
        }
    }

    /// The attributes as one map expression.
    #[must_use]
    pub fn config_expr(&self) -> Expr {
        Expr::Map(self.attributes.clone())
    }
}

/// How a parent passes a provider configuration to a child module.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProviderPassing {
    /// `child_name: parent_name.alias`
    Local(String),
    /// A parent configuration plus the instance key to use.
    Keyed {
        /// Parent configuration, `name` or `name.alias`.
        from: String,
        /// Instance key expression, evaluated in the calling module.
        key: Expr,
    },
}

impl ProviderPassing {
    /// The parent configuration text.
    #[must_use]
    pub fn parent(&self) -> &str {
        match self {
            Self::Local(s) | Self::Keyed { from: s, .. } => s,
        }
    }

    /// The instance key expression, if any.
    #[must_use]
    pub const fn key(&self) -> Option<&Expr> {
        match self {
            Self::Local(_) => None,
            Self::Keyed { key, .. } => Some(key),
        }
    }
}

/// A child module call.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleCallBlock {
    /// Call name.
    pub name: String,
    /// Path of the child module file, relative to the calling file.
    pub source: String,
    /// Number of instances.
    #[serde(default)]
    pub count: Option<Expr>,
    /// One instance per map or set element.
    #[serde(default)]
    pub for_each: Option<Expr>,
    /// Provider configurations passed to the child, keyed by the child's name.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderPassing>,
    /// Values for the child's input variables.
    #[serde(default)]
    pub inputs: BTreeMap<String, Expr>,
    /// Explicit dependencies of everything in the child.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// An output value.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputBlock {
    /// Output name.
    pub name: String,
    /// Value expression.
    pub value: Expr,
    /// Human description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Adopts an existing object into state.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportBlock {
    /// Instance address to import into.
    pub to: String,
    /// Provider-specific object identifier.
    pub id: String,
}

/// Declares that a resource was removed from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemovedBlock {
    /// Resource address, relative to this module.
    pub from: String,
    /// Destroy the real objects (`true`) or only forget them.
    #[serde(default = "default_true")]
    pub destroy: bool,
}

/// Records that a resource or resource instance now lives at a new address.
///
/// Both ends are relative to the declaring module and must be the same kind
/// of address: two resources or two instances.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovedBlock {
    /// The address in the previous run.
    pub from: String,
    /// The address in the current configuration.
    pub to: String,
}

const fn default_true() -> bool {
    true
}
