//! Structured addresses.
//!
//! Addresses name resources, module instances and provider configurations
//! independently of any graph. They are the keys of state and change maps
//! and are rendered in their canonical string forms, e.g.
//! `module.net[0].test_instance.web["blue"]`.

/// Implements serde for address types through their string form.
macro_rules! string_serde {
    ($($ty:ty),* $(,)?) => {
        $(
            impl serde::Serialize for $ty {
                fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.collect_str(self)
                }
            }

            impl<'de> serde::Deserialize<'de> for $ty {
                fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    let text = <String as serde::Deserialize>::deserialize(deserializer)?;
                    text.parse().map_err(serde::de::Error::custom)
                }
            }
        )*
    };
}

mod instance_key;
mod module;
mod moved;
mod parse;
mod provider;
mod reference;
mod resource;
mod target;

pub use instance_key::InstanceKey;
pub use module::{ModuleInstance, ModuleInstanceStep, ModulePath};
pub use moved::MoveEndpoint;
pub use provider::{AbsProviderConfig, DEFAULT_PROVIDER_NAMESPACE, LocalProviderConfig, Provider};
pub use reference::{Reference, Referenceable, TraversalStep};
pub use resource::{
    AbsResource, AbsResourceInstance, ConfigResource, Resource, ResourceInstance, ResourceMode,
};
pub use target::Target;

string_serde!(
    InstanceKey,
    ModuleInstance,
    AbsResource,
    AbsResourceInstance,
    ConfigResource,
    AbsProviderConfig,
    Provider,
    Target,
);
