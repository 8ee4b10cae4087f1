//! Provider capability and the bundled providers.
//!
//! Providers are the only collaborators that touch real objects. The engine
//! talks to them exclusively through [`ProviderInterface`].

mod echo;
mod interface;
mod registry;
mod schema;

pub use echo::{ECHO_PROVIDER_SOURCE, EchoProvider};
pub use interface::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ImportResourceStateRequest,
    ImportResourceStateResponse, ImportedResource, PlanResourceChangeRequest,
    PlanResourceChangeResponse, ProviderInterface, ReadDataSourceRequest, ReadDataSourceResponse,
    ReadResourceRequest, ReadResourceResponse,
};
pub use registry::{ProviderFactory, ProviderRegistry};
pub use schema::{Attribute, AttributeKind, ProviderSchema, Schema};
