//! Resource addresses at every level of expansion.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::parse::{parse_steps, Step};
use super::{InstanceKey, ModuleInstance, ModulePath};

/// Whether a resource is managed or a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceMode {
    /// Managed resource, created and destroyed by the engine.
    Managed,
    /// Data source, only read.
    Data,
}

/// A resource declaration within one module: `test_instance.a`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resource {
    /// Managed or data.
    pub mode: ResourceMode,
    /// Resource type, e.g. `test_instance`.
    pub type_name: String,
    /// Resource name.
    pub name: String,
}

impl Resource {
    /// Creates a managed resource address.
    #[must_use]
    pub fn managed(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Managed,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Creates a data resource address.
    #[must_use]
    pub fn data(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            mode: ResourceMode::Data,
            type_name: type_name.into(),
            name: name.into(),
        }
    }

    /// Instance of this resource with the given key.
    #[must_use]
    pub fn instance(&self, key: InstanceKey) -> ResourceInstance {
        ResourceInstance {
            resource: self.clone(),
            key,
        }
    }

    /// This resource in a static module path.
    #[must_use]
    pub fn in_module(&self, module: ModulePath) -> ConfigResource {
        ConfigResource {
            module,
            resource: self.clone(),
        }
    }

    /// This resource in a module instance.
    #[must_use]
    pub fn absolute(&self, module: ModuleInstance) -> AbsResource {
        AbsResource {
            module,
            resource: self.clone(),
        }
    }

    /// Provider local name implied by the type prefix (`test` for `test_instance`).
    #[must_use]
    pub fn implied_provider(&self) -> &str {
        self.type_name
            .split_once('_')
            .map_or(self.type_name.as_str(), |(prefix, _)| prefix)
    }

    /// Parses a resource from the front of a step list.
    pub(crate) fn from_steps(steps: &[Step]) -> Option<(Self, &[Step])> {
        match steps {
            [Step::Attr(kw), Step::Attr(type_name), Step::Attr(name), rest @ ..] if kw == "data" => {
                Some((Self::data(type_name.clone(), name.clone()), rest))
            }
            [Step::Attr(type_name), Step::Attr(name), rest @ ..] => {
                Some((Self::managed(type_name.clone(), name.clone()), rest))
            }
            _ => None,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ResourceMode::Managed => write!(f, "{}.{}", self.type_name, self.name),
            ResourceMode::Data => write!(f, "data.{}.{}", self.type_name, self.name),
        }
    }
}

/// One instance of a resource within one module instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceInstance {
    /// The resource.
    pub resource: Resource,
    /// Instance key.
    pub key: InstanceKey,
}

impl fmt::Display for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.resource, self.key)
    }
}

/// A resource in a static module path, before expansion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigResource {
    /// Static module path.
    pub module: ModulePath,
    /// The resource.
    pub resource: Resource,
}

impl ConfigResource {
    /// Returns true if the instance was produced by this resource.
    #[must_use]
    pub fn contains(&self, instance: &AbsResourceInstance) -> bool {
        instance.resource.resource == self.resource && instance.module.module() == self.module
    }
}

impl fmt::Display for ConfigResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

impl FromStr for ConfigResource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let abs: AbsResourceInstance = s.parse()?;
        if abs.resource.key != InstanceKey::NoKey
            || abs.module.steps().iter().any(|step| step.key != InstanceKey::NoKey)
        {
            return Err(ConfigError::InvalidAddress {
                input: s.to_string(),
                message: "instance keys are not allowed in a configuration address".to_string(),
            });
        }
        Ok(abs.config_resource())
    }
}

/// A resource in an expanded module instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsResource {
    /// Module instance.
    pub module: ModuleInstance,
    /// The resource.
    pub resource: Resource,
}

impl AbsResource {
    /// Instance of this resource with the given key.
    #[must_use]
    pub fn instance(&self, key: InstanceKey) -> AbsResourceInstance {
        AbsResourceInstance {
            module: self.module.clone(),
            resource: self.resource.instance(key),
        }
    }

    /// Static form of this address.
    #[must_use]
    pub fn config(&self) -> ConfigResource {
        self.resource.in_module(self.module.module())
    }
}

impl fmt::Display for AbsResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

impl FromStr for AbsResource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let abs: AbsResourceInstance = s.parse()?;
        if abs.resource.key != InstanceKey::NoKey {
            return Err(ConfigError::InvalidAddress {
                input: s.to_string(),
                message: "expected a resource address without an instance key".to_string(),
            });
        }
        Ok(abs.abs_resource())
    }
}

/// A fully expanded resource instance address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsResourceInstance {
    /// Module instance.
    pub module: ModuleInstance,
    /// Resource instance.
    pub resource: ResourceInstance,
}

impl AbsResourceInstance {
    /// The resource this instance belongs to.
    #[must_use]
    pub fn abs_resource(&self) -> AbsResource {
        self.resource.resource.absolute(self.module.clone())
    }

    /// The static resource this instance belongs to.
    #[must_use]
    pub fn config_resource(&self) -> ConfigResource {
        self.resource.resource.in_module(self.module.module())
    }

    /// Resource mode shortcut.
    #[must_use]
    pub const fn mode(&self) -> ResourceMode {
        self.resource.resource.mode
    }
}

impl fmt::Display for AbsResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module.is_root() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}.{}", self.module, self.resource)
        }
    }
}

impl FromStr for AbsResourceInstance {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = parse_steps(s)?;
        let (module, rest) = ModuleInstance::from_steps(&steps);
        let invalid = |message: &str| ConfigError::InvalidAddress {
            input: s.to_string(),
            message: message.to_string(),
        };
        let (resource, rest) =
            Resource::from_steps(rest).ok_or_else(|| invalid("expected a resource type and name"))?;
        let (key, rest) = match rest {
            [Step::Index(key), rest @ ..] => (key.clone(), rest),
            _ => (InstanceKey::NoKey, rest),
        };
        if !rest.is_empty() {
            return Err(invalid("unexpected trailing steps"));
        }
        Ok(Self {
            module,
            resource: resource.instance(key),
        })
    }
}
