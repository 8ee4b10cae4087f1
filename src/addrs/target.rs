//! Target and exclude filters.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::parse::{parse_steps, Step};
use super::{AbsResource, AbsResourceInstance, ConfigResource, InstanceKey, ModuleInstance, ModulePath, Resource};

/// An address given to `--target` or `--exclude`.
///
/// A step without a key matches every instance of that module call or
/// resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// A module instance and everything inside it.
    Module(ModuleInstance),
    /// Every instance of a resource.
    Resource(AbsResource),
    /// One resource instance.
    Instance(AbsResourceInstance),
}

impl Target {
    /// Returns true if the instance is selected by this target.
    #[must_use]
    pub fn contains_instance(&self, addr: &AbsResourceInstance) -> bool {
        match self {
            Self::Module(module) => module.target_contains(&addr.module),
            Self::Resource(res) => {
                res.resource == addr.resource.resource
                    && res.module.target_contains(&addr.module)
                    && res.module.steps().len() == addr.module.steps().len()
            }
            Self::Instance(inst) => {
                inst.resource == addr.resource
                    && inst.module.target_contains(&addr.module)
                    && inst.module.steps().len() == addr.module.steps().len()
            }
        }
    }

    /// Returns true if some instance of the static resource may be selected.
    #[must_use]
    pub fn may_contain_resource(&self, addr: &ConfigResource) -> bool {
        match self {
            Self::Module(module) => module.module().is_ancestor_of(&addr.module),
            Self::Resource(res) => res.config() == *addr,
            Self::Instance(inst) => inst.config_resource() == *addr,
        }
    }

    /// Returns true if the whole static resource is selected, whatever the keys.
    #[must_use]
    pub fn contains_whole_resource(&self, addr: &ConfigResource) -> bool {
        let unkeyed = |module: &ModuleInstance| module.steps().iter().all(|s| s.key == InstanceKey::NoKey);
        match self {
            Self::Module(module) => unkeyed(module) && module.module().is_ancestor_of(&addr.module),
            Self::Resource(res) => unkeyed(&res.module) && res.config() == *addr,
            Self::Instance(_) => false,
        }
    }

    /// Returns true if the static module is inside the target's module.
    #[must_use]
    pub fn may_contain_module(&self, path: &ModulePath) -> bool {
        let target_module = match self {
            Self::Module(module) => module.module(),
            Self::Resource(res) => res.module.module(),
            Self::Instance(inst) => inst.module.module(),
        };
        target_module.is_ancestor_of(path) || path.is_ancestor_of(&target_module)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(m) => write!(f, "{m}"),
            Self::Resource(r) => write!(f, "{r}"),
            Self::Instance(i) => write!(f, "{i}"),
        }
    }
}

impl FromStr for Target {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = parse_steps(s)?;
        let (module, rest) = ModuleInstance::from_steps(&steps);
        if rest.is_empty() {
            return Ok(Self::Module(module));
        }
        let invalid = || ConfigError::InvalidAddress {
            input: s.to_string(),
            message: "expected a module, resource or resource instance address".to_string(),
        };
        let (resource, rest): (Resource, &[Step]) = Resource::from_steps(rest).ok_or_else(invalid)?;
        match rest {
            [] => Ok(Self::Resource(resource.absolute(module))),
            [Step::Index(key)] => Ok(Self::Instance(AbsResourceInstance {
                module,
                resource: resource.instance(key.clone()),
            })),
            _ => Err(invalid()),
        }
    }
}
