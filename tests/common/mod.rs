//! Shared helpers for engine behaviour tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use graphform::addrs::{AbsProviderConfig, AbsResourceInstance, ModulePath, Provider};
use graphform::config::{Config, ConfigParser};
use graphform::diagnostics::{Diagnostic, Diagnostics};
use graphform::providers::{
    ApplyResourceChangeRequest, ApplyResourceChangeResponse, Attribute, AttributeKind,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    PlanResourceChangeRequest, PlanResourceChangeResponse, ProviderInterface, ProviderRegistry,
    ProviderSchema, ReadDataSourceRequest, ReadDataSourceResponse, ReadResourceRequest,
    ReadResourceResponse, Schema,
};
use graphform::states::{ResourceInstanceObject, State};
use graphform::{Context, Value};

/// A `test` provider that records every call it receives.
///
/// `test_instance` has a computed `id`, optional `ami`, `size` and `value`,
/// and a force-new `zone`. Its computed `healthy` is false once an object
/// with `ami: sick` is applied. `test_data_source` returns `input` as
/// `result`.
#[derive(Debug, Default)]
pub struct MockProvider {
    calls: Mutex<Vec<(String, String)>>,
    configured: Mutex<Vec<Value>>,
    vanished: Mutex<BTreeSet<String>>,
    fail_apply: Mutex<BTreeSet<String>>,
    next_id: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, op: &str, detail: impl Into<String>) {
        self.calls
            .lock()
            .expect("calls lock")
            .push((op.to_string(), detail.into()));
    }

    /// Number of calls of one operation.
    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(name, _)| name == op)
            .count()
    }

    /// Details of every call of one operation, in call order.
    pub fn details(&self, op: &str) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|(name, _)| name == op)
            .map(|(_, detail)| detail.clone())
            .collect()
    }

    /// Every call as `op detail`, in call order.
    pub fn log(&self) -> Vec<String> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|(op, detail)| format!("{op} {detail}"))
            .collect()
    }

    pub fn reset(&self) {
        self.calls.lock().expect("calls lock").clear();
    }

    /// Configurations passed to `configure`, in call order.
    pub fn configured(&self) -> Vec<Value> {
        self.configured.lock().expect("configured lock").clone()
    }

    /// Makes `read_resource` report the object with this id as gone.
    pub fn vanish(&self, id: &str) {
        self.vanished.lock().expect("vanished lock").insert(id.to_string());
    }

    /// Makes `apply_resource_change` fail for objects with this `ami`.
    pub fn fail_apply_for(&self, ami: &str) {
        self.fail_apply.lock().expect("fail lock").insert(ami.to_string());
    }

    fn describe(value: &Value) -> String {
        value
            .get_attr("id")
            .and_then(Value::as_str)
            .or_else(|| value.get_attr("ami").and_then(Value::as_str))
            .unwrap_or("?")
            .to_string()
    }
}

#[async_trait]
impl ProviderInterface for MockProvider {
    fn schema(&self) -> ProviderSchema {
        let instance = Schema::new()
            .with_attribute("id", Attribute::computed(AttributeKind::Primitive))
            .with_attribute("healthy", Attribute::computed(AttributeKind::Primitive))
            .with_attribute("ami", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("size", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("value", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("zone", Attribute::optional(AttributeKind::Primitive).force_new());
        let data = Schema::new()
            .with_attribute("input", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("result", Attribute::computed(AttributeKind::Primitive));
        ProviderSchema {
            provider: Schema::new().with_attribute("region", Attribute::optional(AttributeKind::Primitive)),
            resource_types: BTreeMap::from([("test_instance".to_string(), instance)]),
            data_sources: BTreeMap::from([("test_data_source".to_string(), data)]),
        }
    }

    async fn configure(&self, config: &Value) -> Diagnostics {
        self.record("configure", config.to_string());
        self.configured.lock().expect("configured lock").push(config.clone());
        Diagnostics::new()
    }

    async fn plan_resource_change(&self, req: PlanResourceChangeRequest) -> PlanResourceChangeResponse {
        self.record("plan", Self::describe(&req.prior));
        if req.config.is_null() {
            return PlanResourceChangeResponse::default();
        }
        let mut planned = req.config.as_map().cloned().unwrap_or_default();
        let id = req.prior.get_attr("id").cloned().unwrap_or(Value::Unknown);
        planned.insert("id".to_string(), id);
        if req.prior.is_null() {
            planned.insert("healthy".to_string(), Value::Unknown);
        } else if let Some(healthy) = req.prior.get_attr("healthy") {
            planned.insert("healthy".to_string(), healthy.clone());
        }
        PlanResourceChangeResponse {
            planned: Value::Map(planned),
            ..Default::default()
        }
    }

    async fn read_resource(&self, req: ReadResourceRequest) -> ReadResourceResponse {
        let id = Self::describe(&req.prior);
        self.record("read", id.clone());
        let gone = self.vanished.lock().expect("vanished lock").contains(&id);
        ReadResourceResponse {
            new_state: if gone { Value::Null } else { req.prior },
            diagnostics: Diagnostics::new(),
        }
    }

    async fn apply_resource_change(&self, req: ApplyResourceChangeRequest) -> ApplyResourceChangeResponse {
        if req.planned.is_null() {
            self.record("destroy", Self::describe(&req.prior));
            return ApplyResourceChangeResponse::default();
        }
        let ami = req.planned.get_attr("ami").and_then(Value::as_str).unwrap_or_default();
        if self.fail_apply.lock().expect("fail lock").contains(ami) {
            self.record("apply_failed", ami);
            return ApplyResourceChangeResponse {
                diagnostics: Diagnostic::error("Apply failed", format!("cannot create {ami}")).into(),
                ..Default::default()
            };
        }
        let mut state = req.planned.as_map().cloned().unwrap_or_default();
        if !state.get("id").is_some_and(Value::is_known) {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            state.insert("id".to_string(), Value::from(format!("id-{n}")));
        }
        if !state.get("healthy").is_some_and(Value::is_known) {
            state.insert("healthy".to_string(), Value::Bool(ami != "sick"));
        }
        let state = Value::Map(state).unknown_as_null();
        let op = if req.prior.is_null() { "create" } else { "update" };
        self.record(op, Self::describe(&state));
        ApplyResourceChangeResponse {
            new_state: state,
            diagnostics: Diagnostics::new(),
        }
    }

    async fn read_data_source(&self, req: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let input = req.config.get_attr("input").cloned().unwrap_or_default();
        self.record(
            "read_data",
            input.as_str().map_or_else(|| input.to_string(), str::to_string),
        );
        ReadDataSourceResponse {
            state: Value::map([("input", input.clone()), ("result", input)]),
            diagnostics: Diagnostics::new(),
        }
    }

    async fn import_resource_state(&self, req: ImportResourceStateRequest) -> ImportResourceStateResponse {
        self.record("import", req.id.clone());
        ImportResourceStateResponse {
            imported: vec![ImportedResource {
                type_name: req.type_name,
                state: Value::map([("id", Value::from(req.id)), ("ami", Value::from("imported"))]),
            }],
            diagnostics: Diagnostics::new(),
        }
    }
}

/// A registry whose `test` provider always hands out `provider`.
pub fn registry(provider: &Arc<MockProvider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    let shared = Arc::clone(provider);
    registry.register(
        Provider::default_for("test"),
        Arc::new(move || Arc::clone(&shared) as Arc<dyn ProviderInterface>),
    );
    registry
}

/// Loads an in-memory module tree. The first file is the root module.
pub fn config(files: &[(&str, &str)]) -> Config {
    let mut parser = ConfigParser::new();
    for (path, text) in files {
        parser = parser.with_source(*path, *text);
    }
    parser.load_file(files[0].0).expect("config")
}

/// A context over a single root module.
pub fn context(yaml: &str, provider: &Arc<MockProvider>) -> Context {
    Context::new(config(&[("main.yaml", yaml)]), registry(provider))
}

pub fn test_provider() -> AbsProviderConfig {
    AbsProviderConfig::new(ModulePath::root(), Provider::default_for("test"), None)
}

pub fn addr(text: &str) -> AbsResourceInstance {
    text.parse().expect("address")
}

/// Builds an object from string attributes.
pub fn object(attrs: &[(&str, &str)]) -> ResourceInstanceObject {
    ResourceInstanceObject::new(Value::map(attrs.iter().map(|(k, v)| (*k, Value::from(*v)))))
}

/// A state holding the given root-module instances.
pub fn state_with(instances: &[(&str, ResourceInstanceObject)]) -> State {
    let mut state = State::new();
    for (text, object) in instances {
        state.set_current(&addr(text), Some(object.clone()), &test_provider());
    }
    state
}
