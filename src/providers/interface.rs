//! The provider capability.

use async_trait::async_trait;

use crate::diagnostics::Diagnostics;
use crate::value::Value;

use super::schema::ProviderSchema;

/// Input to [`ProviderInterface::plan_resource_change`].
#[derive(Debug, Clone)]
pub struct PlanResourceChangeRequest {
    /// Resource type.
    pub type_name: String,
    /// Prior object value, null when creating.
    pub prior: Value,
    /// Configuration value, null when destroying.
    pub config: Value,
}

/// Output of [`ProviderInterface::plan_resource_change`].
#[derive(Debug, Clone, Default)]
pub struct PlanResourceChangeResponse {
    /// Planned object value. May contain unknowns.
    pub planned: Value,
    /// Attributes whose change forces replacement.
    pub requires_replace: Vec<String>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// Input to [`ProviderInterface::read_resource`].
#[derive(Debug, Clone)]
pub struct ReadResourceRequest {
    /// Resource type.
    pub type_name: String,
    /// Last recorded object value.
    pub prior: Value,
}

/// Output of [`ProviderInterface::read_resource`].
#[derive(Debug, Clone, Default)]
pub struct ReadResourceResponse {
    /// Current object value, null if the object no longer exists.
    pub new_state: Value,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// Input to [`ProviderInterface::apply_resource_change`].
#[derive(Debug, Clone)]
pub struct ApplyResourceChangeRequest {
    /// Resource type.
    pub type_name: String,
    /// Prior object value, null when creating.
    pub prior: Value,
    /// Planned object value, null when destroying.
    pub planned: Value,
    /// Final configuration value.
    pub config: Value,
}

/// Output of [`ProviderInterface::apply_resource_change`].
#[derive(Debug, Clone, Default)]
pub struct ApplyResourceChangeResponse {
    /// New object value, null after a destroy.
    pub new_state: Value,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// Input to [`ProviderInterface::read_data_source`].
#[derive(Debug, Clone)]
pub struct ReadDataSourceRequest {
    /// Data source type.
    pub type_name: String,
    /// Configuration value, wholly known.
    pub config: Value,
}

/// Output of [`ProviderInterface::read_data_source`].
#[derive(Debug, Clone, Default)]
pub struct ReadDataSourceResponse {
    /// Data source result.
    pub state: Value,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// Input to [`ProviderInterface::import_resource_state`].
#[derive(Debug, Clone)]
pub struct ImportResourceStateRequest {
    /// Resource type.
    pub type_name: String,
    /// Provider-specific identifier.
    pub id: String,
}

/// One object returned by an import.
#[derive(Debug, Clone)]
pub struct ImportedResource {
    /// Resource type of the object.
    pub type_name: String,
    /// Imported value.
    pub state: Value,
}

/// Output of [`ProviderInterface::import_resource_state`].
#[derive(Debug, Clone, Default)]
pub struct ImportResourceStateResponse {
    /// Imported objects.
    pub imported: Vec<ImportedResource>,
    /// Diagnostics.
    pub diagnostics: Diagnostics,
}

/// Operations a provider offers the engine.
///
/// Every call reports failures through its diagnostics rather than a
/// `Result`, so that warnings can travel alongside successful results.
#[async_trait]
pub trait ProviderInterface: Send + Sync {
    /// Returns the provider's schema.
    fn schema(&self) -> ProviderSchema;

    /// Provider-specific validation of a resource configuration.
    async fn validate_resource_config(&self, _type_name: &str, _config: &Value) -> Diagnostics {
        Diagnostics::new()
    }

    /// Configures the provider instance.
    async fn configure(&self, config: &Value) -> Diagnostics;

    /// Plans a change for a managed resource.
    async fn plan_resource_change(&self, req: PlanResourceChangeRequest) -> PlanResourceChangeResponse;

    /// Reads the current value of a managed resource.
    async fn read_resource(&self, req: ReadResourceRequest) -> ReadResourceResponse;

    /// Applies a planned change.
    async fn apply_resource_change(&self, req: ApplyResourceChangeRequest) -> ApplyResourceChangeResponse;

    /// Reads a data source.
    async fn read_data_source(&self, req: ReadDataSourceRequest) -> ReadDataSourceResponse;

    /// Imports an existing object by identifier.
    async fn import_resource_state(&self, req: ImportResourceStateRequest) -> ImportResourceStateResponse;

    /// Releases provider resources.
    async fn close(&self) -> Diagnostics {
        Diagnostics::new()
    }
}
