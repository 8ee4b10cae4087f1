//! The visitor that executes graph vertices during a walk.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::addrs::{AbsProviderConfig, InstanceKey, ModuleInstance};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ConfigError, EngineError, Result};
use crate::eval::{Expansion, RepetitionData};
use crate::graph::{Visit, Visitor};
use crate::value::Value;

use super::apply_instance::InstanceApplier;
use super::expand::{
    evaluate_attributes, evaluate_config, evaluate_expansion, expand_module, expand_resource,
    record_resource_expansion,
};
use super::node::{
    InstanceFlavor, LocalNode, Node, OutputNode, ProviderNode, ResourceFlavor, ResourceNode,
    VariableNode,
};
use super::options::WalkOperation;
use super::plan_instance::{InstancePlanner, instance_schema};
use super::walk_context::WalkContext;

fn diagnose(result: Result<Diagnostics>) -> Visit<Node> {
    Visit::done(result.unwrap_or_else(Diagnostics::from))
}

/// Executes each vertex against the shared walk context.
#[derive(Debug)]
pub struct GraphVisitor {
    walk: Arc<WalkContext>,
}

impl GraphVisitor {
    /// Creates a visitor for one walk.
    #[must_use]
    pub const fn new(walk: Arc<WalkContext>) -> Self {
        Self { walk }
    }

    async fn validate_resource(&self, node: &ResourceNode) -> Result<Diagnostics> {
        let walk = &self.walk;
        let Some(block) = &node.config else {
            return Ok(Diagnostics::new());
        };
        let Some(resolved) = &node.provider else {
            return Err(EngineError::internal(format!("no provider was resolved for {}", node.addr)));
        };
        let subject = walk
            .config
            .module(&node.addr.module)
            .map(|m| m.range(format!("resources.{}", node.addr.resource)));

        let module = node.addr.module.unkeyed_instance();
        let addr = node.addr.resource.absolute(module.clone()).instance(InstanceKey::NoKey);
        let ctx = walk.enter_path(module);
        let config = evaluate_config(&ctx, block, &RepetitionData::unknown())?;
        let schema = instance_schema(walk, &addr, &resolved.addr)?;

        let mut diags = Diagnostics::new();
        for name in schema.unknown_attributes(&config) {
            diags.push(
                Diagnostic::error(
                    "Unsupported argument",
                    format!("An argument named {name:?} is not expected for {}.", node.addr),
                )
                .with_subject(subject.clone()),
            );
        }
        for name in schema.missing_required(&config) {
            diags.push(
                Diagnostic::error(
                    "Missing required argument",
                    format!("The argument {name:?} is required for {}.", node.addr),
                )
                .with_subject(subject.clone()),
            );
        }
        if diags.has_errors() {
            return Ok(diags);
        }

        let provider = walk.provider_for(resolved, &addr)?;
        diags.append(
            provider
                .validate_resource_config(&addr.resource.resource.type_name, &config)
                .await,
        );
        Ok(diags)
    }

    async fn configure_provider(&self, node: &ProviderNode) -> Result<Diagnostics> {
        let walk = &self.walk;
        let modules = walk.expander.module_instances(&node.addr.module);
        let module = match modules.as_slice() {
            [] => return Ok(Diagnostics::new()),
            [module] => module.clone(),
            _ => {
                return Err(EngineError::validation(
                    format!(
                        "{} is declared in a module with count or for_each; pass provider configurations in from the calling module instead",
                        node.addr
                    ),
                    Some("providers".to_string()),
                ));
            }
        };
        let ctx = walk.enter_path(module);
        let schema = walk.schema(&node.addr.provider)?;

        let instances: Vec<(InstanceKey, Value)> = match &node.config {
            None => vec![(InstanceKey::NoKey, Value::Map(Default::default()))],
            Some(block) => {
                let expansion = match (&block.for_each, walk.operation) {
                    (Some(_), WalkOperation::Validate) | (None, _) => Expansion::Single,
                    (Some(expr), _) => {
                        evaluate_expansion(&ctx, None, Some(expr), &node.addr.to_string())?
                    }
                };
                let mut out = Vec::new();
                for key in expansion.keys() {
                    let repetition = if walk.operation == WalkOperation::Validate {
                        RepetitionData::unknown()
                    } else {
                        expansion.repetition_data(&key)
                    };
                    out.push((key, evaluate_attributes(&ctx, &block.config, &repetition)?));
                }
                out
            }
        };

        let mut diags = Diagnostics::new();
        for (key, config) in instances {
            let unexpected = schema.provider.unknown_attributes(&config);
            if !unexpected.is_empty() {
                diags.push_error(EngineError::validation(
                    format!("{} does not support {}", node.addr, unexpected.join(", ")),
                    Some("providers".to_string()),
                ));
                continue;
            }
            let provider = walk.registry.instantiate(&node.addr.provider)?;
            if walk.operation != WalkOperation::Validate {
                debug!("Configuring {}{key}", node.addr);
                let configured = {
                    let _permit = walk.acquire().await?;
                    provider.configure(&config).await
                };
                let failed = configured.has_errors();
                diags.append(configured);
                if failed {
                    continue;
                }
            }
            walk.set_provider(&node.addr, key, provider);
        }
        Ok(diags)
    }

    async fn close_provider(&self, addr: &AbsProviderConfig) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for (key, provider) in self.walk.provider_instances(addr) {
            trace!("Closing {addr}{key}");
            diags.append(provider.close().await);
        }
        diags
    }

    fn variable(&self, node: &VariableNode) -> Result<Diagnostics> {
        let walk = &self.walk;
        for instance in walk.expander.module_instances(&node.module) {
            let value = match (instance.parent(), &node.input) {
                (None, _) => walk.options.variables.get(&node.name).cloned(),
                (Some(parent), Some(input)) => {
                    let repetition = walk.expander.module_repetition(&instance);
                    Some(walk.enter_path(parent).evaluate(input, &repetition)?)
                }
                (Some(_), None) => None,
            };
            let value = match (value, &node.default, walk.operation) {
                (Some(value), _, _) => value,
                (None, Some(default), _) => default.clone(),
                (None, None, WalkOperation::Validate) => Value::Unknown,
                (None, None, _) => {
                    return Err(ConfigError::MissingVariable { name: node.name.clone() }.into());
                }
            };
            walk.named_values.set_variable(&instance, &node.name, value);
        }
        Ok(Diagnostics::new())
    }

    fn local(&self, node: &LocalNode) -> Result<Diagnostics> {
        let walk = &self.walk;
        for instance in walk.expander.module_instances(&node.module) {
            let value = walk
                .enter_path(instance.clone())
                .evaluate(&node.expr, &RepetitionData::default())?;
            walk.named_values.set_local(&instance, &node.name, value);
        }
        Ok(Diagnostics::new())
    }

    fn output(&self, node: &OutputNode) -> Diagnostics {
        let walk = &self.walk;
        let mut diags = Diagnostics::new();
        for instance in walk.expander.module_instances(&node.module) {
            let value = match walk
                .enter_path(instance.clone())
                .evaluate(&node.expr, &RepetitionData::default())
            {
                Ok(value) => value,
                Err(err) if walk.options.warn_on_output_errors => {
                    let diag = Diagnostic::from(err);
                    diags.push(Diagnostic::warning(diag.summary, diag.detail));
                    Value::Unknown
                }
                Err(err) => {
                    diags.push_error(err);
                    continue;
                }
            };
            if instance == ModuleInstance::root() && walk.operation == WalkOperation::Apply {
                walk.state.set_root_output(&node.name, Some(value.clone()));
            }
            walk.named_values.set_output(&instance, &node.name, value);
        }
        diags
    }
}

#[async_trait]
impl Visitor<Node> for GraphVisitor {
    async fn visit(&self, vertex: &Node) -> Visit<Node> {
        let walk = &self.walk;
        match vertex {
            Node::Resource(node) => match node.flavor {
                ResourceFlavor::Plan => expand_resource(walk, node),
                ResourceFlavor::Apply => diagnose(record_resource_expansion(walk, node)),
                ResourceFlavor::Validate => diagnose(self.validate_resource(node).await),
            },
            Node::Instance(node) => match node.flavor {
                InstanceFlavor::Plan | InstanceFlavor::PlanOrphan | InstanceFlavor::PlanDestroy => {
                    Visit::done(InstancePlanner::new(walk, node).run().await)
                }
                InstanceFlavor::Apply | InstanceFlavor::ApplyDestroy => {
                    Visit::done(InstanceApplier::new(walk, node).run().await)
                }
            },
            Node::ModuleExpand(node) => diagnose(expand_module(walk, node)),
            Node::Provider(node) => {
                info!("Starting {}", node.addr);
                diagnose(self.configure_provider(node).await)
            }
            Node::CloseProvider(addr) => Visit::done(self.close_provider(addr).await),
            Node::Variable(node) => diagnose(self.variable(node)),
            Node::Local(node) => diagnose(self.local(node)),
            Node::Output(node) => Visit::done(self.output(node)),
            Node::ModuleClose(_) | Node::RootClose | Node::ProviderProxy(_) => {
                Visit::done(Diagnostics::new())
            }
        }
    }
}
