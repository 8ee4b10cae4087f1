//! Shared state of one graph walk and per-module evaluation contexts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::trace;

use crate::addrs::{
    AbsProviderConfig, AbsResource, AbsResourceInstance, InstanceKey, ModuleInstance, Provider,
    Referenceable, Target,
};
use crate::config::{Config, Expr, Module};
use crate::error::{ConfigError, EngineError, ProviderError, Result};
use crate::eval::{Evaluator, Expansion, InstanceExpander, NamedValues, RepetitionData, Scope};
use crate::plans::SyncChanges;
use crate::providers::{ProviderInterface, ProviderRegistry, ProviderSchema};
use crate::states::SyncState;
use crate::value::Value;

use super::node::{ProviderKeyScope, ResolvedProvider};
use super::options::{PlanOptions, WalkOperation};

type ProviderInstances = HashMap<(AbsProviderConfig, InstanceKey), Arc<dyn ProviderInterface>>;

/// Everything the vertices of one walk share.
pub struct WalkContext {
    /// What the walk is doing.
    pub operation: WalkOperation,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Options of the operation.
    pub options: PlanOptions,
    /// Working state.
    pub state: SyncState,
    /// State after refresh, before planned changes.
    pub refresh_state: SyncState,
    /// State as the previous run left it.
    pub prev_run_state: SyncState,
    /// Planned changes (written while planning, read while applying).
    pub changes: SyncChanges,
    /// Provider factories.
    pub registry: ProviderRegistry,
    /// Expansion records.
    pub expander: InstanceExpander,
    /// Variables, locals and outputs.
    pub named_values: NamedValues,
    /// Expression evaluator.
    pub evaluator: Arc<dyn Evaluator>,
    /// Instances to import, with their ids.
    pub imports: BTreeMap<AbsResourceInstance, String>,
    /// Addresses from `removed` blocks with their `destroy` flag.
    pub removed: Vec<(Target, bool)>,
    providers: RwLock<ProviderInstances>,
    semaphore: Semaphore,
}

impl std::fmt::Debug for WalkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkContext")
            .field("operation", &self.operation)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Inputs for [`WalkContext::new`].
pub struct WalkInputs {
    /// What the walk is doing.
    pub operation: WalkOperation,
    /// Loaded configuration.
    pub config: Arc<Config>,
    /// Options of the operation.
    pub options: PlanOptions,
    /// Initial working state.
    pub state: crate::states::State,
    /// Initial refresh state.
    pub refresh_state: crate::states::State,
    /// Prior-run state.
    pub prev_run_state: crate::states::State,
    /// Initial changes.
    pub changes: crate::plans::Changes,
    /// Provider factories.
    pub registry: ProviderRegistry,
    /// Expression evaluator.
    pub evaluator: Arc<dyn Evaluator>,
    /// Bound on concurrent provider calls.
    pub parallelism: usize,
}

impl WalkContext {
    /// Creates the shared context for one walk.
    #[must_use]
    pub fn new(inputs: WalkInputs) -> Self {
        let root = &inputs.config.root;
        let mut imports: BTreeMap<AbsResourceInstance, String> = root
            .file
            .imports
            .iter()
            .filter_map(|block| Some((block.to.parse().ok()?, block.id.clone())))
            .collect();
        for import in &inputs.options.imports {
            imports.insert(import.addr.clone(), import.id.clone());
        }
        let removed = root
            .file
            .removed
            .iter()
            .filter_map(|block| Some((block.from.parse().ok()?, block.destroy)))
            .collect();

        Self {
            operation: inputs.operation,
            config: inputs.config,
            options: inputs.options,
            state: SyncState::new(inputs.state),
            refresh_state: SyncState::new(inputs.refresh_state),
            prev_run_state: SyncState::new(inputs.prev_run_state),
            changes: SyncChanges::new(inputs.changes),
            registry: inputs.registry,
            expander: InstanceExpander::new(),
            named_values: NamedValues::new(),
            evaluator: inputs.evaluator,
            imports,
            removed,
            providers: RwLock::new(HashMap::new()),
            semaphore: Semaphore::new(inputs.parallelism.max(1)),
        }
    }

    /// Creates an evaluation context for one module instance.
    #[must_use]
    pub fn enter_path(self: &Arc<Self>, path: ModuleInstance) -> EvalContext {
        trace!("Entering module path {path:?}");
        EvalContext {
            path,
            walk: Arc::clone(self),
        }
    }

    /// Waits for a provider call slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the semaphore was closed.
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| EngineError::internal(format!("provider call slots closed: {e}")))
    }

    /// Cached schema of a provider.
    ///
    /// # Errors
    ///
    /// Returns an error if no factory is registered for the provider.
    pub fn schema(&self, provider: &Provider) -> Result<Arc<ProviderSchema>> {
        self.registry.schema(provider)
    }

    /// Records a started provider instance.
    pub fn set_provider(
        &self,
        addr: &AbsProviderConfig,
        key: InstanceKey,
        provider: Arc<dyn ProviderInterface>,
    ) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((addr.clone(), key), provider);
    }

    /// Every started instance of one provider configuration.
    #[must_use]
    pub fn provider_instances(
        &self,
        addr: &AbsProviderConfig,
    ) -> Vec<(InstanceKey, Arc<dyn ProviderInterface>)> {
        let mut out: Vec<_> = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((a, _), _)| a == addr)
            .map(|((_, key), p)| (key.clone(), Arc::clone(p)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// The provider instance a resource instance uses.
    ///
    /// # Errors
    ///
    /// Returns an error if the key expression cannot be evaluated or the
    /// selected provider instance was never started.
    pub fn provider_for(
        self: &Arc<Self>,
        resolved: &ResolvedProvider,
        addr: &AbsResourceInstance,
    ) -> Result<Arc<dyn ProviderInterface>> {
        let key = match (&resolved.key, self.operation) {
            (None, _) | (Some(_), WalkOperation::Validate) => InstanceKey::NoKey,
            (Some(key), _) => {
                let value = match &key.scope {
                    ProviderKeyScope::Resource => {
                        let repetition = self.expander.resource_repetition(addr);
                        self.enter_path(addr.module.clone())
                            .evaluate(&key.expr, &repetition)?
                    }
                    ProviderKeyScope::ModuleCall(child) => {
                        let call_instance = addr.module.truncate(child.depth());
                        let repetition = self.expander.module_repetition(&call_instance);
                        let parent = call_instance.parent().unwrap_or_default();
                        self.enter_path(parent).evaluate(&key.expr, &repetition)?
                    }
                };
                value_to_key(&value, addr)?
            }
        };

        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(resolved.addr.clone(), key.clone()))
            .cloned()
            .ok_or_else(|| {
                EngineError::Provider(ProviderError::NotInitialized {
                    addr: format!("{}{key}", resolved.addr),
                })
            })
    }

    /// True if a `removed` block with `destroy: false` covers the instance.
    #[must_use]
    pub fn is_forgotten(&self, addr: &AbsResourceInstance) -> bool {
        self.removed
            .iter()
            .any(|(target, destroy)| !destroy && target.contains_instance(addr))
    }

    /// True if the instance passes the target and exclude filters.
    #[must_use]
    pub fn is_targeted(&self, addr: &AbsResourceInstance) -> bool {
        let targets = &self.options.targets;
        let included = targets.is_empty() || targets.iter().any(|t| t.contains_instance(addr));
        included && !self.options.excludes.iter().any(|t| t.contains_instance(addr))
    }
}

fn value_to_key(value: &Value, addr: &AbsResourceInstance) -> Result<InstanceKey> {
    let invalid = |message: String| {
        EngineError::Config(ConfigError::ValidationError {
            message: format!("invalid provider instance key for {addr}: {message}"),
            field: Some("provider_key".to_string()),
        })
    };
    match value {
        Value::String(s) => Ok(InstanceKey::String(s.clone())),
        Value::Number(_) => value
            .as_i64()
            .map(InstanceKey::Int)
            .ok_or_else(|| invalid(format!("{value} is not a whole number"))),
        Value::Unknown => Err(invalid(
            "the key depends on values that cannot be determined until apply".to_string(),
        )),
        other => Err(invalid(format!("{other} cannot be used as an instance key"))),
    }
}

/// Evaluation context for one module instance.
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Module instance expressions are evaluated in.
    pub path: ModuleInstance,
    /// The walk this context belongs to.
    pub walk: Arc<WalkContext>,
}

impl EvalContext {
    /// The configuration of this context's module.
    #[must_use]
    pub fn module(&self) -> Option<&Module> {
        self.walk.config.module(&self.path.module())
    }

    /// Evaluates an expression with the given repetition data.
    ///
    /// # Errors
    ///
    /// Returns an error when a reference cannot be resolved.
    pub fn evaluate(&self, expr: &Expr, repetition: &RepetitionData) -> Result<Value> {
        self.evaluate_with_self(expr, repetition, None)
    }

    /// Evaluates an expression that may refer to `self`.
    ///
    /// # Errors
    ///
    /// Returns an error when a reference cannot be resolved, including
    /// `self` when no object is bound.
    pub fn evaluate_with_self(
        &self,
        expr: &Expr,
        repetition: &RepetitionData,
        self_value: Option<&Value>,
    ) -> Result<Value> {
        let scope = InstanceScope {
            ctx: self,
            repetition,
            self_value,
        };
        self.walk.evaluator.evaluate(expr, &scope)
    }

    /// Value of one resource instance as seen by expressions.
    ///
    /// While planning, a recorded change wins over state; while applying,
    /// state written by already-applied instances wins over planned values.
    #[must_use]
    pub fn instance_value(&self, addr: &AbsResourceInstance) -> Value {
        let from_change = || self.walk.changes.get(addr).map(|c| c.after);
        let from_state = || self.walk.state.current(addr).map(|o| o.value);
        let found = match self.walk.operation {
            WalkOperation::Apply => from_state().or_else(from_change),
            _ => from_change().or_else(from_state),
        };
        found.unwrap_or_default()
    }

    /// Value of a whole resource, shaped by its expansion.
    #[must_use]
    pub fn resource_value(&self, addr: &AbsResource) -> Value {
        match self.walk.expander.resource_expansion(addr) {
            Some(Expansion::Single) => self.instance_value(&addr.instance(InstanceKey::NoKey)),
            Some(Expansion::Count(n)) => Value::List(
                (0..n)
                    .map(|i| {
                        let key = InstanceKey::Int(i64::try_from(i).unwrap_or(i64::MAX));
                        self.instance_value(&addr.instance(key))
                    })
                    .collect(),
            ),
            Some(Expansion::ForEach(entries)) => Value::Map(
                entries
                    .keys()
                    .map(|k| {
                        let key = InstanceKey::String(k.clone());
                        (k.clone(), self.instance_value(&addr.instance(key)))
                    })
                    .collect(),
            ),
            None => self.resource_value_from_state(addr),
        }
    }

    fn resource_value_from_state(&self, addr: &AbsResource) -> Value {
        let Some(objects) = self.walk.state.resource_objects(addr) else {
            return Value::Null;
        };
        if let Some(object) = objects.get(&InstanceKey::NoKey) {
            return object.value.clone();
        }
        if objects.keys().all(|k| matches!(k, InstanceKey::Int(_))) {
            return Value::List(objects.into_values().map(|o| o.value).collect());
        }
        Value::Map(
            objects
                .into_iter()
                .filter_map(|(key, o)| match key {
                    InstanceKey::String(k) => Some((k, o.value)),
                    _ => None,
                })
                .collect(),
        )
    }

    fn module_call_value(&self, call: &str) -> Result<Value> {
        let declared = self.module().is_some_and(|m| m.module_call(call).is_some());
        if !declared {
            return Err(undeclared("module call", call));
        }
        let outputs = |key: InstanceKey| {
            Value::Map(self.walk.named_values.outputs_of(&self.path.child(call, key)))
        };
        Ok(match self.walk.expander.module_expansion(&self.path, call) {
            Some(Expansion::Single) => outputs(InstanceKey::NoKey),
            Some(Expansion::Count(n)) => Value::List(
                (0..n)
                    .map(|i| outputs(InstanceKey::Int(i64::try_from(i).unwrap_or(i64::MAX))))
                    .collect(),
            ),
            Some(Expansion::ForEach(entries)) => Value::Map(
                entries
                    .keys()
                    .map(|k| (k.clone(), outputs(InstanceKey::String(k.clone()))))
                    .collect(),
            ),
            None => Value::Unknown,
        })
    }
}

fn undeclared(kind: &str, name: &str) -> EngineError {
    EngineError::Config(ConfigError::UndeclaredReference {
        kind: kind.to_string(),
        name: name.to_string(),
    })
}

struct InstanceScope<'a> {
    ctx: &'a EvalContext,
    repetition: &'a RepetitionData,
    self_value: Option<&'a Value>,
}

impl InstanceScope<'_> {
    fn repetition(&self, value: Option<&Value>, symbol: &str) -> Result<Value> {
        if self.ctx.walk.operation == WalkOperation::Validate {
            return Ok(Value::Unknown);
        }
        value.cloned().ok_or_else(|| {
            EngineError::Config(ConfigError::ValidationError {
                message: format!("{symbol} is only available in blocks that use it for repetition"),
                field: Some(symbol.to_string()),
            })
        })
    }
}

impl Scope for InstanceScope<'_> {
    fn resolve(&self, subject: &Referenceable) -> Result<Value> {
        let walk = &self.ctx.walk;
        let path = &self.ctx.path;
        match subject {
            Referenceable::CountIndex => {
                self.repetition(self.repetition.count_index.as_ref(), "count.index")
            }
            Referenceable::EachKey => self.repetition(self.repetition.each_key.as_ref(), "each.key"),
            Referenceable::EachValue => {
                self.repetition(self.repetition.each_value.as_ref(), "each.value")
            }
            Referenceable::SelfObject => match self.self_value {
                Some(value) => Ok(value.clone()),
                None if walk.operation == WalkOperation::Validate => Ok(Value::Unknown),
                None => Err(EngineError::Config(ConfigError::ValidationError {
                    message: "self is only available in resource postconditions".to_string(),
                    field: Some("self".to_string()),
                })),
            },
            _ if walk.operation == WalkOperation::Validate => Ok(Value::Unknown),
            Referenceable::InputVariable(name) => walk
                .named_values
                .variable(path, name)
                .ok_or_else(|| undeclared("input variable", name)),
            Referenceable::LocalValue(name) => walk
                .named_values
                .local(path, name)
                .ok_or_else(|| undeclared("local value", name)),
            Referenceable::ModuleCall(call) => self.ctx.module_call_value(call),
            Referenceable::Resource(resource) => {
                Ok(self.ctx.resource_value(&resource.absolute(path.clone())))
            }
            Referenceable::ResourceInstance(instance) => {
                let addr = AbsResourceInstance {
                    module: path.clone(),
                    resource: instance.clone(),
                };
                Ok(self.ctx.instance_value(&addr))
            }
        }
    }
}
