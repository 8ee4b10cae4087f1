//! Planning of single resource instances.
//!
//! Each instance moves through refresh (or a skipped refresh) and then a
//! diff against its configuration. The resulting change is recorded before
//! the working state is updated, since later vertices infer an instance's
//! status from whether a change exists.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::addrs::{AbsProviderConfig, AbsResourceInstance, ResourceMode};
use crate::config::ResourceBlock;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{EngineError, PlanError, ProviderError, Result};
use crate::plans::{Action, ActionReason, Importing, PlanMode, ResourceInstanceChange};
use crate::providers::{
    ImportResourceStateRequest, PlanResourceChangeRequest, PlanResourceChangeResponse,
    ProviderInterface, ReadDataSourceRequest, ReadResourceRequest, Schema,
};
use crate::states::ResourceInstanceObject;
use crate::value::Value;

use super::conditions::{ConditionCheck, ConditionKind};
use super::expand::evaluate_config;
use super::node::{InstanceFlavor, InstanceNode, ResolvedProvider};
use super::options::{RefreshMode, RefreshStats};
use super::walk_context::WalkContext;

/// The provider an instance vertex resolved to.
pub(super) fn resolved_provider(node: &InstanceNode) -> Result<&ResolvedProvider> {
    node.provider
        .as_ref()
        .ok_or_else(|| EngineError::internal(format!("no provider was resolved for {node}")))
}

/// The started provider instance for a vertex, with its configuration address.
pub(super) fn instance_provider(
    walk: &Arc<WalkContext>,
    node: &InstanceNode,
) -> Result<(Arc<dyn ProviderInterface>, AbsProviderConfig)> {
    let resolved = resolved_provider(node)?;
    let provider = walk.provider_for(resolved, &node.addr)?;
    Ok((provider, resolved.addr.clone()))
}

/// The provider for an object that is going away. Its key expression may no
/// longer evaluate, so any started instance of its configuration will do.
pub(super) fn destroyer_provider(
    walk: &Arc<WalkContext>,
    node: &InstanceNode,
) -> Result<(Arc<dyn ProviderInterface>, AbsProviderConfig)> {
    let resolved = resolved_provider(node)?;
    match walk.provider_for(resolved, &node.addr) {
        Ok(provider) => Ok((provider, resolved.addr.clone())),
        Err(err) => walk
            .provider_instances(&resolved.addr)
            .into_iter()
            .next()
            .map(|(_, provider)| (provider, resolved.addr.clone()))
            .ok_or(err),
    }
}

/// Schema of an instance's resource or data source type.
pub(super) fn instance_schema(
    walk: &WalkContext,
    addr: &AbsResourceInstance,
    provider: &AbsProviderConfig,
) -> Result<Schema> {
    let resource = &addr.resource.resource;
    walk.schema(&provider.provider)?
        .schema_for(resource.mode, &resource.type_name)
        .cloned()
        .ok_or_else(|| {
            EngineError::Provider(ProviderError::UnsupportedType {
                provider: provider.provider.to_string(),
                kind: match resource.mode {
                    ResourceMode::Managed => "resource",
                    ResourceMode::Data => "data source",
                },
                type_name: resource.type_name.clone(),
            })
        })
}

/// True if any configurable attribute differs from the recorded object.
///
/// Null and empty collections are the same value here, at any depth.
#[must_use]
pub fn config_changed(schema: &Schema, config: &Value, prior: &Value) -> bool {
    let mut names: BTreeSet<&str> = schema.configurable().collect();
    if let Some(attrs) = config.as_map() {
        names.extend(attrs.keys().map(String::as_str));
    }
    names.into_iter().any(|name| {
        let wanted = config.get_attr(name).unwrap_or(&Value::Null);
        let recorded = prior.get_attr(name).unwrap_or(&Value::Null);
        !wanted.equivalent_ignoring_empty(recorded)
    })
}

/// Replaces ignored attributes of `config` with their prior values.
fn ignore_changes(config: Value, prior: &Value, ignored: &[String]) -> Value {
    let Value::Map(mut attrs) = config else {
        return config;
    };
    for name in ignored {
        match prior.get_attr(name) {
            Some(value) => {
                attrs.insert(name.clone(), value.clone());
            }
            None => {
                attrs.remove(name);
            }
        }
    }
    Value::Map(attrs)
}

const fn replace_action(create_before_destroy: bool) -> Action {
    if create_before_destroy {
        Action::CreateThenDelete
    } else {
        Action::DeleteThenCreate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// Ask the provider for the current object.
    Read,
    /// Keep the recorded object.
    Skip,
    /// Nothing recorded yet; counts as refreshed.
    New,
}

/// Plans one instance vertex of a plan or destroy-plan walk.
pub(super) struct InstancePlanner<'a> {
    walk: &'a Arc<WalkContext>,
    node: &'a InstanceNode,
}

impl<'a> InstancePlanner<'a> {
    pub(super) const fn new(walk: &'a Arc<WalkContext>, node: &'a InstanceNode) -> Self {
        Self { walk, node }
    }

    /// Runs the flavor-specific planning and collects its diagnostics.
    pub(super) async fn run(&self) -> Diagnostics {
        trace!("Planning {}", self.node);
        let result = match self.node.flavor {
            InstanceFlavor::Plan => self.plan().await,
            InstanceFlavor::PlanOrphan => self.plan_orphan().await,
            InstanceFlavor::PlanDestroy => self.plan_destroy(),
            InstanceFlavor::Apply | InstanceFlavor::ApplyDestroy => Err(EngineError::internal(
                format!("{} cannot be planned", self.node),
            )),
        };
        result.unwrap_or_else(Diagnostics::from)
    }

    fn stats(&self) -> Option<&RefreshStats> {
        self.walk.options.refresh_stats.as_deref()
    }

    async fn plan(&self) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let block = self
            .node
            .config
            .as_ref()
            .ok_or_else(|| EngineError::internal(format!("{addr} has no configuration")))?;
        let (provider, provider_addr) = instance_provider(walk, self.node)?;
        let schema = instance_schema(walk, addr, &provider_addr)?;

        let ctx = walk.enter_path(addr.module.clone());
        let repetition = walk.expander.resource_repetition(addr);
        let config = evaluate_config(&ctx, block, &repetition)?;
        let unexpected = schema.unknown_attributes(&config);
        if !unexpected.is_empty() {
            return Err(EngineError::validation(
                format!("{addr} sets unsupported attributes: {}", unexpected.join(", ")),
                Some(format!("resources.{}", block.addr())),
            ));
        }

        let checks = ConditionCheck {
            ctx: &ctx,
            addr,
            repetition: &repetition,
        };
        let refresh_only = walk.options.mode == PlanMode::RefreshOnly;
        let mut diags = if refresh_only {
            Diagnostics::new()
        } else {
            checks.run(ConditionKind::Precondition, &block.lifecycle.precondition, None)
        };
        if diags.has_errors() {
            return Ok(diags);
        }

        diags.append(match addr.mode() {
            ResourceMode::Data => self.plan_data(provider.as_ref(), &provider_addr, &schema, config).await?,
            ResourceMode::Managed => {
                self.plan_managed(provider.as_ref(), &provider_addr, &schema, block, config)
                    .await?
            }
        });
        if diags.has_errors() || refresh_only {
            return Ok(diags);
        }
        if let Some(planned) = self.planned_value() {
            diags.append(checks.run(ConditionKind::Postcondition, &block.lifecycle.postcondition, Some(&planned)));
        }
        Ok(diags)
    }

    /// The object postconditions see after planning. A read deferred to
    /// apply has nothing to check yet.
    fn planned_value(&self) -> Option<Value> {
        let addr = &self.node.addr;
        match self.walk.changes.get(addr) {
            Some(change) if change.action == Action::Read => None,
            Some(change) => Some(change.after),
            None => self.walk.state.current(addr).map(|o| o.value),
        }
    }

    /// True if a managed dependency has a pending change, so reading now
    /// would see stale values.
    fn dependency_pending(&self) -> bool {
        if self.node.dependencies.is_empty() {
            return false;
        }
        self.walk.changes.snapshot().resources.iter().any(|change| {
            !matches!(change.action, Action::NoOp | Action::Read)
                && self.node.dependencies.contains(&change.addr.config_resource())
        })
    }

    async fn plan_data(
        &self,
        provider: &dyn ProviderInterface,
        provider_addr: &AbsProviderConfig,
        schema: &Schema,
        config: Value,
    ) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let mut diags = Diagnostics::new();
        let prior = walk.state.current(addr);

        let deferred = if !config.is_wholly_known() {
            Some(ActionReason::ReadBecauseConfigUnknown)
        } else if walk.options.mode != PlanMode::RefreshOnly && self.dependency_pending() {
            Some(ActionReason::ReadBecauseDependencyPending)
        } else {
            None
        };
        if let Some(reason) = deferred {
            if let Some(stats) = self.stats() {
                stats.record_data(false);
            }
            if walk.options.mode == PlanMode::RefreshOnly {
                return Ok(diags);
            }
            debug!("Deferring read of {addr} until apply");
            let before = prior.map(|o| o.value).unwrap_or_default();
            walk.changes.append(
                ResourceInstanceChange::new(
                    addr.clone(),
                    provider_addr.clone(),
                    Action::Read,
                    before,
                    config.clone(),
                )
                .with_reason(reason),
            );
            let planned = ResourceInstanceObject::planned(config)
                .with_dependencies(self.node.dependencies.clone());
            walk.state.set_current(addr, Some(planned), provider_addr);
            return Ok(diags);
        }

        let read = match walk.options.refresh_mode {
            RefreshMode::Full => true,
            RefreshMode::None => prior.is_none(),
            RefreshMode::Config => prior.as_ref().is_none_or(|p| {
                !self.node.dependencies.is_empty() || config_changed(schema, &config, &p.value)
            }),
        };
        if let Some(stats) = self.stats() {
            stats.record_data(read);
        }
        if !read {
            debug!("Skipping read of {addr}");
            return Ok(diags);
        }

        debug!("Reading data source {addr}");
        let resp = {
            let _permit = walk.acquire().await?;
            provider
                .read_data_source(ReadDataSourceRequest {
                    type_name: addr.resource.resource.type_name.clone(),
                    config,
                })
                .await
        };
        diags.append(resp.diagnostics);
        if diags.has_errors() {
            return Ok(diags);
        }
        let object =
            ResourceInstanceObject::new(resp.state).with_dependencies(self.node.dependencies.clone());
        walk.refresh_state.set_current(addr, Some(object.clone()), provider_addr);
        walk.state.set_current(addr, Some(object), provider_addr);
        Ok(diags)
    }

    async fn import(
        &self,
        provider: &dyn ProviderInterface,
        id: &str,
        diags: &mut Diagnostics,
    ) -> Result<Option<ResourceInstanceObject>> {
        let addr = &self.node.addr;
        let type_name = &addr.resource.resource.type_name;
        info!("Importing {addr} with id {id:?}");
        let resp = {
            let _permit = self.walk.acquire().await?;
            provider
                .import_resource_state(ImportResourceStateRequest {
                    type_name: type_name.clone(),
                    id: id.to_string(),
                })
                .await
        };
        diags.append(resp.diagnostics);
        if diags.has_errors() {
            return Ok(None);
        }
        let imported = resp
            .imported
            .into_iter()
            .find(|r| r.type_name == *type_name)
            .ok_or_else(|| {
                EngineError::provider_call(
                    "ImportResourceState",
                    addr.to_string(),
                    format!("no {type_name} object was found with id {id:?}"),
                )
            })?;
        Ok(Some(ResourceInstanceObject::new(imported.state)))
    }

    async fn plan_change(
        &self,
        provider: &dyn ProviderInterface,
        prior: Value,
        config: Value,
    ) -> Result<PlanResourceChangeResponse> {
        let _permit = self.walk.acquire().await?;
        Ok(provider
            .plan_resource_change(PlanResourceChangeRequest {
                type_name: self.node.addr.resource.resource.type_name.clone(),
                prior,
                config,
            })
            .await)
    }

    async fn plan_managed(
        &self,
        provider: &dyn ProviderInterface,
        provider_addr: &AbsProviderConfig,
        schema: &Schema,
        block: &ResourceBlock,
        config: Value,
    ) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let mut diags = Diagnostics::new();
        let mut prior = walk.state.current(addr);

        let mut importing = None;
        if let (None, Some(id)) = (&prior, walk.imports.get(addr)) {
            prior = self.import(provider, id, &mut diags).await?;
            if diags.has_errors() {
                return Ok(diags);
            }
            importing = Some(Importing { id: id.clone() });
        }

        let refresh = match (&prior, walk.options.refresh_mode) {
            (Some(_), _) if importing.is_some() => Refresh::Read,
            (_, RefreshMode::None) => Refresh::Skip,
            (None, _) => Refresh::New,
            (Some(_), RefreshMode::Full) => Refresh::Read,
            (Some(object), RefreshMode::Config) => {
                if config_changed(schema, &config, &object.value) {
                    Refresh::Read
                } else {
                    Refresh::Skip
                }
            }
        };
        if let Some(stats) = self.stats() {
            stats.record_managed(refresh != Refresh::Skip);
        }

        if refresh == Refresh::Skip {
            trace!("Skipping refresh of {addr}");
        } else if let (Refresh::Read, Some(object)) = (refresh, prior.take()) {
            debug!("Refreshing {addr}");
            let resp = {
                let _permit = walk.acquire().await?;
                provider
                    .read_resource(ReadResourceRequest {
                        type_name: addr.resource.resource.type_name.clone(),
                        prior: object.value.clone(),
                    })
                    .await
            };
            diags.append(resp.diagnostics);
            if diags.has_errors() {
                return Ok(diags);
            }
            prior = if resp.new_state.is_null() {
                info!("{addr} no longer exists");
                None
            } else {
                Some(ResourceInstanceObject {
                    value: resp.new_state,
                    ..object
                })
            };
            walk.refresh_state.set_current(addr, prior.clone(), provider_addr);
            walk.state.set_current(addr, prior.clone(), provider_addr);
        }

        if walk.options.mode == PlanMode::RefreshOnly {
            return Ok(diags);
        }

        let prior_value = prior.as_ref().map_or(Value::Null, |o| o.value.clone());
        let config = if prior.is_some() {
            ignore_changes(config, &prior_value, &block.lifecycle.ignore_changes)
        } else {
            config
        };
        let resp = self.plan_change(provider, prior_value.clone(), config.clone()).await?;
        diags.append(resp.diagnostics);
        if diags.has_errors() {
            return Ok(diags);
        }
        let mut planned = resp.planned;
        let mut requires_replace = resp.requires_replace;
        if prior.is_some() {
            for path in schema.replace_paths(&prior_value, &planned) {
                if !requires_replace.contains(&path) {
                    requires_replace.push(path);
                }
            }
        }

        let cbd = block.lifecycle.create_before_destroy || self.node.create_before_destroy;
        let (action, reason) = match &prior {
            None => (Action::Create, ActionReason::None),
            Some(object) if object.is_tainted() => {
                (replace_action(cbd), ActionReason::ReplaceBecauseTainted)
            }
            Some(_) if walk.options.force_replace.contains(addr) => {
                (replace_action(cbd), ActionReason::ReplaceByRequest)
            }
            Some(_) if !requires_replace.is_empty() => {
                (replace_action(cbd), ActionReason::ReplaceBecauseCannotUpdate)
            }
            Some(object) if object.value.equivalent_ignoring_empty(&planned) => {
                (Action::NoOp, ActionReason::None)
            }
            Some(_) => (Action::Update, ActionReason::None),
        };
        if action.is_replace() {
            let resp = self.plan_change(provider, Value::Null, config).await?;
            diags.append(resp.diagnostics);
            if diags.has_errors() {
                return Ok(diags);
            }
            planned = resp.planned;
        }

        debug!("Planned {action} for {addr}");
        let mut change = ResourceInstanceChange::new(
            addr.clone(),
            provider_addr.clone(),
            action,
            prior_value,
            planned.clone(),
        )
        .with_reason(reason);
        change.requires_replace = requires_replace;
        change.importing = importing;
        walk.changes.append(change);

        if action.destroys() && block.lifecycle.prevent_destroy {
            diags.push_error(PlanError::PreventDestroy { addr: addr.to_string() }.into());
            return Ok(diags);
        }

        let dependencies = self.node.dependencies.clone();
        let working = match (action, prior) {
            (Action::NoOp, Some(object)) => {
                let object = object.with_dependencies(dependencies);
                walk.refresh_state.set_current(addr, Some(object.clone()), provider_addr);
                object
            }
            _ => ResourceInstanceObject::planned(planned)
                .with_dependencies(dependencies)
                .with_create_before_destroy(cbd),
        };
        walk.state.set_current(addr, Some(working), provider_addr);
        Ok(diags)
    }

    fn orphan_reason(&self) -> ActionReason {
        let addr = &self.node.addr;
        if self.node.deposed.is_some() {
            ActionReason::None
        } else if self.walk.config.resource(&addr.config_resource()).is_none() {
            ActionReason::DeleteBecauseNoResourceConfig
        } else if !self.walk.expander.module_instance_exists(&addr.module) {
            ActionReason::DeleteBecauseNoModule
        } else {
            ActionReason::DeleteBecauseWrongRepetition
        }
    }

    fn recorded_object(&self) -> Option<ResourceInstanceObject> {
        let addr = &self.node.addr;
        match &self.node.deposed {
            Some(key) => self.walk.state.deposed(addr).remove(key),
            None => self.walk.state.current(addr),
        }
    }

    fn remove_from_working_state(&self, provider_addr: &AbsProviderConfig) {
        let addr = &self.node.addr;
        match &self.node.deposed {
            Some(key) => self.walk.state.set_deposed(addr, key, None, provider_addr),
            None => self.walk.state.set_current(addr, None, provider_addr),
        }
    }

    async fn plan_orphan(&self) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let mut diags = Diagnostics::new();
        let Some(mut object) = self.recorded_object() else {
            return Ok(diags);
        };
        let (provider, provider_addr) = destroyer_provider(walk, self.node)?;

        if addr.mode() == ResourceMode::Data {
            debug!("Dropping data source {addr} from state");
            walk.refresh_state.set_current(addr, None, &provider_addr);
            walk.state.set_current(addr, None, &provider_addr);
            return Ok(diags);
        }

        if self.node.deposed.is_none() {
            let refresh = walk.options.refresh_mode != RefreshMode::None;
            if let Some(stats) = self.stats() {
                stats.record_managed(refresh);
            }
            if refresh {
                debug!("Refreshing orphan {addr}");
                let resp = {
                    let _permit = walk.acquire().await?;
                    provider
                        .read_resource(ReadResourceRequest {
                            type_name: addr.resource.resource.type_name.clone(),
                            prior: object.value.clone(),
                        })
                        .await
                };
                diags.append(resp.diagnostics);
                if diags.has_errors() {
                    return Ok(diags);
                }
                if resp.new_state.is_null() {
                    info!("{addr} no longer exists");
                    walk.refresh_state.set_current(addr, None, &provider_addr);
                    walk.state.set_current(addr, None, &provider_addr);
                    return Ok(diags);
                }
                object.value = resp.new_state;
                walk.refresh_state.set_current(addr, Some(object.clone()), &provider_addr);
                walk.state.set_current(addr, Some(object.clone()), &provider_addr);
            }
        }

        if walk.options.mode == PlanMode::RefreshOnly {
            return Ok(diags);
        }

        let forget = self.node.deposed.is_none() && walk.is_forgotten(addr);
        let (action, reason) = if forget {
            diags.push(Diagnostic::warning(
                "Some objects will no longer be managed",
                format!(
                    "{addr} will be removed from state, but the object it represents will not be destroyed."
                ),
            ));
            (Action::Forget, ActionReason::None)
        } else {
            (Action::Delete, self.orphan_reason())
        };
        debug!("Planned {action} for orphan {}", self.node);
        let mut change =
            ResourceInstanceChange::new(addr.clone(), provider_addr.clone(), action, object.value, Value::Null)
                .with_reason(reason);
        if let Some(key) = &self.node.deposed {
            change = change.with_deposed(key.clone());
        }
        walk.changes.append(change);
        self.remove_from_working_state(&provider_addr);
        Ok(diags)
    }

    fn plan_destroy(&self) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let mut diags = Diagnostics::new();
        let Some(object) = self.recorded_object() else {
            return Ok(diags);
        };
        let provider_addr = resolved_provider(self.node)?.addr.clone();

        if addr.mode() == ResourceMode::Data {
            walk.state.set_current(addr, None, &provider_addr);
            return Ok(diags);
        }

        debug!("Planned delete for {}", self.node);
        let mut change =
            ResourceInstanceChange::new(addr.clone(), provider_addr.clone(), Action::Delete, object.value, Value::Null);
        if let Some(key) = &self.node.deposed {
            change = change.with_deposed(key.clone());
        }
        walk.changes.append(change);

        let protected = self
            .node
            .config
            .as_ref()
            .is_some_and(|block| block.lifecycle.prevent_destroy);
        if self.node.deposed.is_none() && protected {
            diags.push_error(PlanError::PreventDestroy { addr: addr.to_string() }.into());
            return Ok(diags);
        }
        self.remove_from_working_state(&provider_addr);
        Ok(diags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{Attribute, AttributeKind};
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        Schema::new()
            .with_attribute("id", Attribute::computed(AttributeKind::Primitive))
            .with_attribute("ami", Attribute::optional(AttributeKind::Primitive))
            .with_attribute("tags", Attribute::optional(AttributeKind::Map))
    }

    #[test]
    fn test_config_changed_ignores_computed_and_empty() {
        let prior = Value::map([("id", Value::from("i-1")), ("ami", Value::from("bar"))]);
        let same = Value::map([("ami", Value::from("bar")), ("tags", Value::Map(BTreeMap::new()))]);
        assert!(!config_changed(&schema(), &same, &prior));

        let changed = Value::map([("ami", Value::from("new-ami"))]);
        assert!(config_changed(&schema(), &changed, &prior));

        let unknown = Value::map([("ami", Value::Unknown)]);
        assert!(config_changed(&schema(), &unknown, &prior));
    }

    #[test]
    fn test_ignore_changes_keeps_prior_values() {
        let prior = Value::map([("ami", Value::from("bar")), ("id", Value::from("i-1"))]);
        let config = Value::map([("ami", Value::from("new")), ("tags", Value::from("x"))]);
        let kept = ignore_changes(config, &prior, &["ami".to_string(), "tags".to_string()]);
        assert_eq!(kept, Value::map([("ami", Value::from("bar"))]));
    }

    #[test]
    fn test_replace_action_follows_lifecycle() {
        assert_eq!(replace_action(true), Action::CreateThenDelete);
        assert_eq!(replace_action(false), Action::DeleteThenCreate);
    }
}
