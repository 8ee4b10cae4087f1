//! Dynamic expansion of resource and module vertices.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::addrs::{AbsResource, AbsResourceInstance, InstanceKey, ModuleInstance};
use crate::config::{Expr, ResourceBlock};
use crate::diagnostics::Diagnostics;
use crate::error::{EngineError, Result};
use crate::eval::{Expansion, RepetitionData};
use crate::graph::{Graph, Visit};
use crate::value::Value;

use super::node::{InstanceFlavor, InstanceNode, ModuleExpandNode, Node, ResourceNode};
use super::options::WalkOperation;
use super::walk_context::{EvalContext, WalkContext};

/// Evaluates a `count` or `for_each` pair into an expansion.
pub(super) fn evaluate_expansion(
    ctx: &EvalContext,
    count: Option<&Expr>,
    for_each: Option<&Expr>,
    addr: &str,
) -> Result<Expansion> {
    let none = RepetitionData::default();
    match (count, for_each) {
        (Some(count), _) => {
            let value = ctx.evaluate(count, &none)?;
            Ok(Expansion::from_count(&value, addr)?)
        }
        (None, Some(for_each)) => {
            let value = ctx.evaluate(for_each, &none)?;
            Ok(Expansion::from_for_each(&value, addr)?)
        }
        (None, None) => Ok(Expansion::Single),
    }
}

/// Evaluates every attribute of a resource block into an object value.
pub(super) fn evaluate_config(
    ctx: &EvalContext,
    block: &ResourceBlock,
    repetition: &RepetitionData,
) -> Result<Value> {
    evaluate_attributes(ctx, &block.attributes, repetition)
}

/// Evaluates a set of named expressions into an object value, collecting
/// every failure.
pub(super) fn evaluate_attributes(
    ctx: &EvalContext,
    exprs: &BTreeMap<String, Expr>,
    repetition: &RepetitionData,
) -> Result<Value> {
    let mut attributes = BTreeMap::new();
    let mut errors = Vec::new();
    for (name, expr) in exprs {
        match ctx.evaluate(expr, repetition) {
            Ok(value) => {
                attributes.insert(name.clone(), value);
            }
            Err(err) => errors.push(err),
        }
    }
    match errors.len() {
        0 => Ok(Value::Map(attributes)),
        1 => Err(errors.remove(0)),
        _ => Err(EngineError::Multiple(errors)),
    }
}

fn plan_instance(node: &ResourceNode, block: &ResourceBlock, addr: AbsResourceInstance) -> InstanceNode {
    InstanceNode {
        config: Some(block.clone()),
        provider: node.provider.clone(),
        create_before_destroy: block.lifecycle.create_before_destroy,
        dependencies: node.dependencies.clone(),
        ..InstanceNode::new(addr, InstanceFlavor::Plan)
    }
}

fn orphan_instance(node: &ResourceNode, addr: AbsResourceInstance, deposed: Option<String>) -> InstanceNode {
    InstanceNode {
        provider: node.provider.clone(),
        ..InstanceNode::new(addr, InstanceFlavor::PlanOrphan).with_deposed(deposed)
    }
}

/// Expands a plan-time resource vertex into one vertex per instance.
///
/// Instances are added for every key the current `count` or `for_each`
/// produces in every instance of the containing module. Objects in state that
/// no expansion produces (including objects left in module instances that no
/// longer exist) and deposed objects become orphan vertices.
pub(super) fn expand_resource(walk: &Arc<WalkContext>, node: &ResourceNode) -> Visit<Node> {
    let mut diags = Diagnostics::new();
    let Some(block) = &node.config else {
        diags.push_error(EngineError::internal(format!("{} has no configuration", node.addr)));
        return Visit::done(diags);
    };

    let mut subgraph = Graph::new();
    let mut wanted: Vec<AbsResourceInstance> = Vec::new();
    for module in walk.expander.module_instances(&node.addr.module) {
        let abs: AbsResource = node.addr.resource.absolute(module.clone());
        let ctx = walk.enter_path(module);
        let expansion = match evaluate_expansion(
            &ctx,
            block.count.as_ref(),
            block.for_each.as_ref(),
            &abs.to_string(),
        ) {
            Ok(expansion) => expansion,
            Err(err) => {
                diags.push_error(err);
                continue;
            }
        };
        trace!("{abs} expanded to {expansion:?}");
        walk.expander.set_resource_expansion(&abs, expansion.clone());
        for key in expansion.keys() {
            let addr = abs.instance(key);
            wanted.push(addr.clone());
            if walk.is_targeted(&addr) {
                subgraph.add(Node::Instance(plan_instance(node, block, addr)));
            }
        }
    }
    if diags.has_errors() {
        return Visit::done(diags);
    }

    for addr in walk.state.instances_of(&node.addr) {
        if !walk.is_targeted(&addr) {
            continue;
        }
        if !wanted.contains(&addr) && walk.state.current(&addr).is_some() {
            debug!("{addr} is no longer produced by configuration");
            subgraph.add(Node::Instance(orphan_instance(node, addr.clone(), None)));
        }
        for key in walk.state.deposed(&addr).into_keys() {
            subgraph.add(Node::Instance(orphan_instance(node, addr.clone(), Some(key))));
        }
    }

    debug!("Expanded {} into {} vertices", node.addr, subgraph.len());
    Visit::expanded(diags, subgraph)
}

/// Records the expansion of an apply-time resource so that whole-resource
/// references see the final set of instances.
pub(super) fn record_resource_expansion(walk: &Arc<WalkContext>, node: &ResourceNode) -> Result<Diagnostics> {
    let Some(block) = &node.config else {
        return Ok(Diagnostics::new());
    };
    for module in walk.expander.module_instances(&node.addr.module) {
        let abs = node.addr.resource.absolute(module.clone());
        let ctx = walk.enter_path(module);
        let expansion =
            evaluate_expansion(&ctx, block.count.as_ref(), block.for_each.as_ref(), &abs.to_string())?;
        walk.expander.set_resource_expansion(&abs, expansion);
    }
    Ok(Diagnostics::new())
}

/// Records how a module call expands inside each instance of its parent.
pub(super) fn expand_module(walk: &Arc<WalkContext>, node: &ModuleExpandNode) -> Result<Diagnostics> {
    let Some(parent) = node.path.parent() else {
        return Ok(Diagnostics::new());
    };
    let parents: Vec<ModuleInstance> = walk.expander.module_instances(&parent);
    for instance in parents {
        let expansion = if walk.operation == WalkOperation::Validate {
            Expansion::Single
        } else {
            let ctx = walk.enter_path(instance.clone());
            let addr = instance.child(&node.call.name, InstanceKey::NoKey);
            evaluate_expansion(
                &ctx,
                node.call.count.as_ref(),
                node.call.for_each.as_ref(),
                &addr.to_string(),
            )?
        };
        debug!("module.{} in {instance} expanded to {expansion:?}", node.call.name);
        walk.expander.set_module_expansion(&instance, &node.call.name, expansion);
    }
    Ok(Diagnostics::new())
}
