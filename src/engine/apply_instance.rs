//! Applying planned changes to single resource instances.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::addrs::{AbsProviderConfig, ResourceMode};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{EngineError, Result};
use crate::plans::{Action, ResourceInstanceChange};
use crate::providers::{ApplyResourceChangeRequest, PlanResourceChangeRequest, ReadDataSourceRequest};
use crate::states::{ObjectStatus, ResourceInstanceObject};
use crate::value::Value;

use super::conditions::{ConditionCheck, ConditionKind};
use super::expand::evaluate_config;
use super::node::{InstanceFlavor, InstanceNode};
use super::plan_instance::{destroyer_provider, instance_provider};
use super::walk_context::WalkContext;

/// Attributes the final plan changed although they were known when planning.
fn inconsistent_attributes(planned: &Value, final_plan: &Value) -> Vec<String> {
    let Some(attrs) = planned.as_map() else {
        return Vec::new();
    };
    attrs
        .iter()
        .filter(|(_, value)| value.is_wholly_known())
        .filter(|(name, value)| {
            !value.equivalent_ignoring_empty(final_plan.get_attr(name).unwrap_or(&Value::Null))
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Applies one instance vertex of an apply walk.
pub(super) struct InstanceApplier<'a> {
    walk: &'a Arc<WalkContext>,
    node: &'a InstanceNode,
}

impl<'a> InstanceApplier<'a> {
    pub(super) const fn new(walk: &'a Arc<WalkContext>, node: &'a InstanceNode) -> Self {
        Self { walk, node }
    }

    /// Runs the create or destroy half of a change.
    pub(super) async fn run(&self) -> Diagnostics {
        let result = match self.node.flavor {
            InstanceFlavor::Apply => self.apply().await,
            InstanceFlavor::ApplyDestroy => self.destroy().await,
            InstanceFlavor::Plan | InstanceFlavor::PlanOrphan | InstanceFlavor::PlanDestroy => Err(
                EngineError::internal(format!("{} cannot be applied", self.node)),
            ),
        };
        result.unwrap_or_else(Diagnostics::from)
    }

    fn save(&self, object: Option<ResourceInstanceObject>, provider: &AbsProviderConfig) {
        self.walk.state.set_current(&self.node.addr, object, provider);
    }

    async fn apply(&self) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let Some(change) = walk.changes.get(addr) else {
            debug!("No change recorded for {addr}");
            return Ok(Diagnostics::new());
        };

        match change.action {
            Action::Forget => {
                info!("Forgetting {addr}");
                self.save(None, &change.provider);
                Ok(Diagnostics::new())
            }
            Action::Delete => Ok(Diagnostics::new()),
            action => {
                let mut diags = self.check_conditions(ConditionKind::Precondition);
                if diags.has_errors() {
                    return Ok(diags);
                }
                diags.append(match action {
                    Action::NoOp => {
                        if let Some(object) = walk.state.current(addr) {
                            let object = object.with_dependencies(self.node.dependencies.clone());
                            self.save(Some(object), &change.provider);
                        }
                        Diagnostics::new()
                    }
                    Action::Read => self.read_data(&change).await?,
                    _ => self.apply_change(&change).await?,
                });
                if !diags.has_errors() {
                    diags.append(self.check_conditions(ConditionKind::Postcondition));
                }
                Ok(diags)
            }
        }
    }

    /// Checks one kind of lifecycle condition. Postconditions see the object
    /// now recorded in state, and are skipped when there is none.
    fn check_conditions(&self, kind: ConditionKind) -> Diagnostics {
        let Some(block) = &self.node.config else {
            return Diagnostics::new();
        };
        let addr = &self.node.addr;
        let (checks, self_value) = match kind {
            ConditionKind::Precondition => (&block.lifecycle.precondition, None),
            ConditionKind::Postcondition => match self.walk.state.current(addr) {
                Some(object) => (&block.lifecycle.postcondition, Some(object.value)),
                None => return Diagnostics::new(),
            },
        };
        if checks.is_empty() {
            return Diagnostics::new();
        }
        let ctx = self.walk.enter_path(addr.module.clone());
        let repetition = self.walk.expander.resource_repetition(addr);
        ConditionCheck {
            ctx: &ctx,
            addr,
            repetition: &repetition,
        }
        .run(kind, checks, self_value.as_ref())
    }

    fn config(&self) -> Result<Value> {
        let addr = &self.node.addr;
        let block = self
            .node
            .config
            .as_ref()
            .ok_or_else(|| EngineError::internal(format!("{addr} has no configuration")))?;
        let ctx = self.walk.enter_path(addr.module.clone());
        let repetition = self.walk.expander.resource_repetition(addr);
        evaluate_config(&ctx, block, &repetition)
    }

    async fn read_data(&self, change: &ResourceInstanceChange) -> Result<Diagnostics> {
        let addr = &self.node.addr;
        let config = self.config()?;
        if !config.is_wholly_known() {
            return Err(EngineError::internal(format!(
                "configuration of {addr} is still unknown during apply"
            )));
        }
        let (provider, _) = instance_provider(self.walk, self.node)?;
        debug!("Reading data source {addr}");
        let resp = {
            let _permit = self.walk.acquire().await?;
            provider
                .read_data_source(ReadDataSourceRequest {
                    type_name: addr.resource.resource.type_name.clone(),
                    config,
                })
                .await
        };
        if !resp.diagnostics.has_errors() {
            let object = ResourceInstanceObject::new(resp.state)
                .with_dependencies(self.node.dependencies.clone());
            self.save(Some(object), &change.provider);
        }
        Ok(resp.diagnostics)
    }

    async fn apply_change(&self, change: &ResourceInstanceChange) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let mut diags = Diagnostics::new();
        let config = self.config()?;
        let (provider, _) = instance_provider(walk, self.node)?;
        let provider_addr = &change.provider;
        let type_name = addr.resource.resource.type_name.clone();

        let deposed_key = match (change.action, &self.node.deposed) {
            (Action::CreateThenDelete, Some(key)) => {
                if walk.state.depose_current(addr, key) {
                    debug!("Deposed current object of {addr} as {key}");
                }
                Some(key.clone())
            }
            _ => None,
        };

        let prior = walk.state.current(addr).map_or(Value::Null, |o| o.value);
        let final_plan = {
            let _permit = walk.acquire().await?;
            provider
                .plan_resource_change(PlanResourceChangeRequest {
                    type_name: type_name.clone(),
                    prior: prior.clone(),
                    config: config.clone(),
                })
                .await
        };
        diags.append(final_plan.diagnostics);
        if diags.has_errors() {
            self.restore_deposed(deposed_key.as_deref(), provider_addr);
            return Ok(diags);
        }
        let changed = inconsistent_attributes(&change.after, &final_plan.planned);
        if !changed.is_empty() {
            diags.push(Diagnostic::error(
                "Provider produced inconsistent final plan",
                format!(
                    "When expanding the plan for {addr}, the provider produced different values for {}.",
                    changed.join(", ")
                ),
            ));
            self.restore_deposed(deposed_key.as_deref(), provider_addr);
            return Ok(diags);
        }

        info!("Applying {} to {addr}", change.action);
        let resp = {
            let _permit = walk.acquire().await?;
            provider
                .apply_resource_change(ApplyResourceChangeRequest {
                    type_name,
                    prior,
                    planned: final_plan.planned,
                    config,
                })
                .await
        };
        diags.append(resp.diagnostics);
        let cbd = self.node.create_before_destroy || change.action == Action::CreateThenDelete;

        if diags.has_errors() {
            warn!("Applying {addr} failed");
            if resp.new_state.is_null() {
                self.restore_deposed(deposed_key.as_deref(), provider_addr);
            } else {
                let mut object = ResourceInstanceObject::new(resp.new_state)
                    .with_dependencies(self.node.dependencies.clone())
                    .with_create_before_destroy(cbd);
                if change.action.creates() {
                    object = object.with_status(ObjectStatus::Tainted);
                }
                self.save(Some(object), provider_addr);
            }
            return Ok(diags);
        }

        let object = (!resp.new_state.is_null()).then(|| {
            ResourceInstanceObject::new(resp.new_state)
                .with_dependencies(self.node.dependencies.clone())
                .with_create_before_destroy(cbd)
        });
        self.save(object, provider_addr);
        Ok(diags)
    }

    /// Puts a deposed object back when its replacement was never created.
    fn restore_deposed(&self, key: Option<&str>, provider: &AbsProviderConfig) {
        let Some(key) = key else {
            return;
        };
        let addr = &self.node.addr;
        if self.walk.state.current(addr).is_some() {
            return;
        }
        if let Some(object) = self.walk.state.deposed(addr).remove(key) {
            debug!("Restoring deposed object {key} of {addr}");
            self.walk.state.set_deposed(addr, key, None, provider);
            self.save(Some(object), provider);
        }
    }

    async fn destroy(&self) -> Result<Diagnostics> {
        let walk = self.walk;
        let addr = &self.node.addr;
        let change = match &self.node.deposed {
            Some(key) => walk.changes.get_deposed(addr, key).or_else(|| walk.changes.get(addr)),
            None => walk.changes.get(addr),
        };
        let Some(change) = change.filter(|c| c.action.destroys()) else {
            return Ok(Diagnostics::new());
        };
        let provider_addr = &change.provider;

        let object = match &self.node.deposed {
            Some(key) => walk.state.deposed(addr).remove(key),
            None => walk.state.current(addr),
        };
        let remove = || match &self.node.deposed {
            Some(key) => walk.state.set_deposed(addr, key, None, provider_addr),
            None => self.save(None, provider_addr),
        };
        let Some(object) = object else {
            debug!("{} has nothing left to destroy", self.node);
            return Ok(Diagnostics::new());
        };
        if addr.mode() == ResourceMode::Data {
            remove();
            return Ok(Diagnostics::new());
        }

        let (provider, _) = destroyer_provider(walk, self.node)?;
        info!("Destroying {}", self.node);
        let resp = {
            let _permit = walk.acquire().await?;
            provider
                .apply_resource_change(ApplyResourceChangeRequest {
                    type_name: addr.resource.resource.type_name.clone(),
                    prior: object.value,
                    planned: Value::Null,
                    config: Value::Null,
                })
                .await
        };
        if resp.diagnostics.has_errors() {
            warn!("Destroying {} failed", self.node);
        } else {
            remove();
        }
        Ok(resp.diagnostics)
    }
}
