//! Endpoints of `moved` blocks.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::{AbsResource, AbsResourceInstance, ConfigResource, ModuleInstance, ModulePath, Resource};

/// One side of a move, relative to the module that declares it.
///
/// `test_instance.a` moves a whole resource with all its instances;
/// `test_instance.a[0]` moves one instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MoveEndpoint {
    /// Every instance of a resource.
    Resource(AbsResource),
    /// A single instance.
    Instance(AbsResourceInstance),
}

impl MoveEndpoint {
    /// The resource the endpoint belongs to.
    #[must_use]
    pub const fn resource(&self) -> &Resource {
        match self {
            Self::Resource(r) => &r.resource,
            Self::Instance(ri) => &ri.resource.resource,
        }
    }

    /// Module steps written in the endpoint.
    #[must_use]
    pub const fn module(&self) -> &ModuleInstance {
        match self {
            Self::Resource(r) => &r.module,
            Self::Instance(ri) => &ri.module,
        }
    }

    /// Returns true when both endpoints name the same kind of object.
    #[must_use]
    pub const fn same_kind(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Resource(_), Self::Resource(_)) | (Self::Instance(_), Self::Instance(_))
        )
    }

    /// The static resource address, for an endpoint declared in `declared_in`.
    #[must_use]
    pub fn config_resource(&self, declared_in: &ModulePath) -> ConfigResource {
        let module = self
            .module()
            .steps()
            .iter()
            .fold(declared_in.clone(), |path, step| path.child(&step.name));
        self.resource().in_module(module)
    }

    /// The absolute endpoint inside one instance of the declaring module.
    #[must_use]
    pub fn absolute(&self, base: &ModuleInstance) -> Self {
        match self {
            Self::Resource(r) => Self::Resource(r.resource.absolute(base.join(&r.module))),
            Self::Instance(ri) => Self::Instance(AbsResourceInstance {
                module: base.join(&ri.module),
                resource: ri.resource.clone(),
            }),
        }
    }
}

impl fmt::Display for MoveEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(r) => write!(f, "{r}"),
            Self::Instance(ri) => write!(f, "{ri}"),
        }
    }
}

impl FromStr for MoveEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let addr: AbsResourceInstance = s.parse()?;
        if s.trim_end().ends_with(']') {
            Ok(Self::Instance(addr))
        } else {
            Ok(Self::Resource(addr.abs_resource()))
        }
    }
}
