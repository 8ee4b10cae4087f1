//! The bundled `builtin/echo` provider.
//!
//! `echo_value` resources store their configuration and get a generated
//! `id`. Changing `trigger` replaces the object. The `echo_data` data source
//! returns its `input` as `result`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::value::Value;

use super::interface::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, ImportResourceStateRequest,
    ImportResourceStateResponse, ImportedResource, PlanResourceChangeRequest,
    PlanResourceChangeResponse, ProviderInterface, ReadDataSourceRequest, ReadDataSourceResponse,
    ReadResourceRequest, ReadResourceResponse,
};
use super::schema::{Attribute, AttributeKind, ProviderSchema, Schema};

/// Source address of the echo provider.
pub const ECHO_PROVIDER_SOURCE: &str = "builtin/echo";

const RESOURCE_TYPE: &str = "echo_value";
const DATA_SOURCE_TYPE: &str = "echo_data";

/// A provider that echoes configuration back as state.
#[derive(Debug, Default)]
pub struct EchoProvider {
    prefix: Mutex<Option<String>>,
}

impl EchoProvider {
    /// Creates an unconfigured provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn unsupported(type_name: &str) -> Diagnostics {
        Diagnostic::error(
            "Unsupported resource type",
            format!("builtin/echo does not support {type_name:?}"),
        )
        .into()
    }

    fn new_id(&self) -> String {
        let id = Uuid::new_v4().simple().to_string();
        match self.prefix.lock().map(|p| p.clone()) {
            Ok(Some(prefix)) => format!("{prefix}-{id}"),
            _ => id,
        }
    }
}

#[async_trait]
impl ProviderInterface for EchoProvider {
    fn schema(&self) -> ProviderSchema {
        let resource = Schema::new()
            .with_attribute("id", Attribute::computed(AttributeKind::Primitive))
            .with_attribute("input", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("values", Attribute::optional(AttributeKind::Map))
            .with_attribute("trigger", Attribute::optional(AttributeKind::Primitive).force_new());
        let data = Schema::new()
            .with_attribute("input", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("result", Attribute::computed(AttributeKind::Primitive));
        ProviderSchema {
            provider: Schema::new().with_attribute("id_prefix", Attribute::optional(AttributeKind::Primitive)),
            resource_types: BTreeMap::from([(RESOURCE_TYPE.to_string(), resource)]),
            data_sources: BTreeMap::from([(DATA_SOURCE_TYPE.to_string(), data)]),
        }
    }

    async fn configure(&self, config: &Value) -> Diagnostics {
        let prefix = config
            .get_attr("id_prefix")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Ok(mut guard) = self.prefix.lock() {
            *guard = prefix;
        }
        Diagnostics::new()
    }

    async fn plan_resource_change(&self, req: PlanResourceChangeRequest) -> PlanResourceChangeResponse {
        if req.type_name != RESOURCE_TYPE {
            return PlanResourceChangeResponse {
                diagnostics: Self::unsupported(&req.type_name),
                ..Default::default()
            };
        }
        if req.config.is_null() {
            return PlanResourceChangeResponse::default();
        }
        let mut planned = req.config.as_map().cloned().unwrap_or_default();
        let prior_trigger = req.prior.get_attr("trigger").cloned().unwrap_or_default();
        let trigger = planned.get("trigger").cloned().unwrap_or_default();
        let replace = !req.prior.is_null() && !prior_trigger.equivalent_ignoring_empty(&trigger);
        let id = match req.prior.get_attr("id") {
            Some(id) if !replace => id.clone(),
            _ => Value::Unknown,
        };
        planned.insert("id".to_string(), id);
        PlanResourceChangeResponse {
            planned: Value::Map(planned),
            requires_replace: if replace { vec!["trigger".to_string()] } else { Vec::new() },
            diagnostics: Diagnostics::new(),
        }
    }

    async fn read_resource(&self, req: ReadResourceRequest) -> ReadResourceResponse {
        ReadResourceResponse {
            new_state: req.prior,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn apply_resource_change(&self, req: ApplyResourceChangeRequest) -> ApplyResourceChangeResponse {
        if req.planned.is_null() {
            debug!("echo: destroying {}", req.type_name);
            return ApplyResourceChangeResponse::default();
        }
        let mut state = req.planned.as_map().cloned().unwrap_or_default();
        if !state.get("id").is_some_and(Value::is_known) {
            state.insert("id".to_string(), Value::from(self.new_id()));
        }
        ApplyResourceChangeResponse {
            new_state: Value::Map(state).unknown_as_null(),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn read_data_source(&self, req: ReadDataSourceRequest) -> ReadDataSourceResponse {
        if req.type_name != DATA_SOURCE_TYPE {
            return ReadDataSourceResponse {
                diagnostics: Self::unsupported(&req.type_name),
                ..Default::default()
            };
        }
        let input = req.config.get_attr("input").cloned().unwrap_or_default();
        ReadDataSourceResponse {
            state: Value::map([("input", input.clone()), ("result", input)]),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn import_resource_state(&self, req: ImportResourceStateRequest) -> ImportResourceStateResponse {
        if req.type_name != RESOURCE_TYPE {
            return ImportResourceStateResponse {
                diagnostics: Self::unsupported(&req.type_name),
                ..Default::default()
            };
        }
        ImportResourceStateResponse {
            imported: vec![ImportedResource {
                type_name: req.type_name,
                state: Value::map([("id", Value::from(req.id))]),
            }],
            diagnostics: Diagnostics::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_plan_and_apply_create() {
        let provider = EchoProvider::new();
        provider
            .configure(&Value::map([("id_prefix", Value::from("echo"))]))
            .await;
        let config = Value::map([("input", Value::from("hello"))]);
        let plan = provider
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: RESOURCE_TYPE.to_string(),
                prior: Value::Null,
                config: config.clone(),
            })
            .await;
        assert!(!plan.diagnostics.has_errors());
        assert_eq!(plan.planned.get_attr("id"), Some(&Value::Unknown));

        let applied = provider
            .apply_resource_change(ApplyResourceChangeRequest {
                type_name: RESOURCE_TYPE.to_string(),
                prior: Value::Null,
                planned: plan.planned,
                config,
            })
            .await;
        let id = applied.new_state.get_attr("id").and_then(Value::as_str).expect("id");
        assert!(id.starts_with("echo-"));
    }

    #[tokio::test]
    async fn test_trigger_forces_replace() {
        let provider = EchoProvider::new();
        let prior = Value::map([("id", Value::from("x")), ("trigger", Value::from("1"))]);
        let plan = provider
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: RESOURCE_TYPE.to_string(),
                prior,
                config: Value::map([("trigger", Value::from("2"))]),
            })
            .await;
        assert_eq!(plan.requires_replace, vec!["trigger"]);
        assert_eq!(plan.planned.get_attr("id"), Some(&Value::Unknown));
    }

    #[tokio::test]
    async fn test_unsupported_type() {
        let provider = EchoProvider::new();
        let resp = provider
            .read_data_source(ReadDataSourceRequest {
                type_name: "nope".to_string(),
                config: Value::Null,
            })
            .await;
        assert!(resp.diagnostics.has_errors());
    }
}
