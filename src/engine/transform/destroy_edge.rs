//! Ordering between object creation and destruction during apply.
//!
//! Edges here come from stored dependencies rather than references:
//! - a creator waits for the destroyer of the same instance, unless the
//!   instance is create-before-destroy, in which case the destroyer waits
//!   for the creator;
//! - if B depended on A when B was created, A's destroyer waits for B's
//!   destroyer, and an update of A with no destroyer waits for B's
//!   destroyer too;
//! - a creator waits for the destroyers of resources it depends on, except
//!   that a create-before-destroy destroyer waits for the creator instead.
//!
//! Edges between instances of different module instances sharing the same
//! static module are skipped: their dependencies are by definition within
//! one module instance.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

use crate::addrs::{AbsProviderConfig, AbsResourceInstance, ConfigResource};
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer, VertexId};
use crate::plans::{Action, Changes};

use crate::engine::node::{InstanceFlavor, InstanceNode, Node};

/// Adds the destroy ordering edges of an apply graph.
#[derive(Debug)]
pub struct DestroyEdgeTransformer<'a> {
    destroy: bool,
    changes: Option<&'a Changes>,
}

impl<'a> DestroyEdgeTransformer<'a> {
    /// `destroy` is set when applying a destroy-mode plan, in which case
    /// edges are never dropped to break cycles.
    #[must_use]
    pub const fn new(destroy: bool) -> Self {
        Self { destroy, changes: None }
    }

    /// Planned changes, used to leave NoOp creators out of the ordering.
    #[must_use]
    pub const fn with_changes(mut self, changes: &'a Changes) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Whether a creator takes part in destroy ordering.
    fn orders_creator(&self, node: &InstanceNode) -> bool {
        let Some(changes) = self.changes else {
            return true;
        };
        changes
            .resource_instance(&node.addr)
            .is_some_and(|c| c.action != Action::NoOp)
    }

    /// Adds `from -> to` between two destroyers.
    ///
    /// When the two use different providers the edge is only a courtesy for
    /// ordering across providers and is dropped again if it closes a cycle.
    fn try_destroy_edge(&self, graph: &mut Graph<Node>, from: VertexId, to: VertexId) {
        if !graph.connect(from, to) {
            return;
        }
        if self.destroy || same_provider(graph, from, to) {
            return;
        }
        if !graph.cycles().is_empty() {
            debug!(
                "Dropping edge {} -> {} between providers; it would create a cycle",
                graph.name_of(from),
                graph.name_of(to)
            );
            graph.remove_edge(from, to);
        }
    }
}

fn instance(graph: &Graph<Node>, id: VertexId) -> Option<&InstanceNode> {
    match graph.vertex(id) {
        Some(Node::Instance(n)) => Some(n),
        _ => None,
    }
}

fn provider_of(node: &InstanceNode) -> Option<&AbsProviderConfig> {
    node.provider
        .as_ref()
        .map(|p| &p.addr)
        .or(node.stored_provider.as_ref())
}

fn same_provider(graph: &Graph<Node>, a: VertexId, b: VertexId) -> bool {
    match (instance(graph, a), instance(graph, b)) {
        (Some(a), Some(b)) => provider_of(a) == provider_of(b),
        _ => true,
    }
}

/// True when `a` and `b` live in different instances of the same static
/// module.
fn in_sibling_module_instances(a: &AbsResourceInstance, b: &AbsResourceInstance) -> bool {
    a.module.module() == b.module.module() && a.module != b.module
}

impl GraphTransformer<Node> for DestroyEdgeTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let mut destroyers: BTreeMap<AbsResourceInstance, Vec<VertexId>> = BTreeMap::new();
        let mut destroyers_by_resource: HashMap<ConfigResource, Vec<VertexId>> = HashMap::new();
        let mut creators: Vec<VertexId> = Vec::new();
        let mut creators_by_resource: HashMap<ConfigResource, Vec<VertexId>> = HashMap::new();

        for (id, node) in graph.vertices() {
            let Node::Instance(n) = node else {
                continue;
            };
            match n.flavor {
                InstanceFlavor::ApplyDestroy => {
                    destroyers.entry(n.addr.clone()).or_default().push(id);
                    destroyers_by_resource
                        .entry(n.addr.config_resource())
                        .or_default()
                        .push(id);
                }
                InstanceFlavor::Apply => {
                    creators.push(id);
                    if self.orders_creator(n) {
                        creators_by_resource
                            .entry(n.addr.config_resource())
                            .or_default()
                            .push(id);
                    }
                }
                _ => {}
            }
        }
        if destroyers.is_empty() {
            return Ok(());
        }

        for &c in &creators {
            let Some((addr, cbd)) = instance(graph, c).map(|n| (n.addr.clone(), n.create_before_destroy))
            else {
                continue;
            };
            if let Some(ds) = destroyers.get(&addr) {
                for d in ds.iter().copied() {
                    if cbd {
                        trace!("{} waits for {}", graph.name_of(d), graph.name_of(c));
                        graph.connect(d, c);
                    } else {
                        trace!("{} waits for {}", graph.name_of(c), graph.name_of(d));
                        graph.connect(c, d);
                    }
                }
            }
        }

        let mut destroy_edges = Vec::new();
        for d in destroyers.values().flatten().copied() {
            let Some(node) = instance(graph, d) else {
                continue;
            };
            for dep in &node.state_dependencies {
                for dep_destroyer in destroyers_by_resource.get(dep).into_iter().flatten().copied() {
                    let Some(dep_node) = instance(graph, dep_destroyer) else {
                        continue;
                    };
                    if dep_destroyer == d || in_sibling_module_instances(&dep_node.addr, &node.addr) {
                        continue;
                    }
                    destroy_edges.push((dep_destroyer, d));
                }
                for dep_creator in creators_by_resource.get(dep).into_iter().flatten().copied() {
                    let Some(dep_node) = instance(graph, dep_creator) else {
                        continue;
                    };
                    if dep_node.addr == node.addr || in_sibling_module_instances(&dep_node.addr, &node.addr) {
                        continue;
                    }
                    destroy_edges.push((dep_creator, d));
                }
            }
        }
        for (from, to) in destroy_edges {
            trace!("{} has stored dependency of {}", graph.name_of(to), graph.name_of(from));
            self.try_destroy_edge(graph, from, to);
        }

        let mut create_edges = Vec::new();
        for c in creators_by_resource.values().flatten().copied() {
            let Some(node) = instance(graph, c) else {
                continue;
            };
            for dep in &node.dependencies {
                for dep_destroyer in destroyers_by_resource.get(dep).into_iter().flatten().copied() {
                    let Some(dep_node) = instance(graph, dep_destroyer) else {
                        continue;
                    };
                    if dep_node.addr == node.addr
                        || in_sibling_module_instances(&dep_node.addr, &node.addr)
                    {
                        continue;
                    }
                    if dep_node.create_before_destroy {
                        create_edges.push((dep_destroyer, c));
                    } else {
                        create_edges.push((c, dep_destroyer));
                    }
                }
            }
        }
        for (from, to) in create_edges {
            trace!("{} waits for {}", graph.name_of(from), graph.name_of(to));
            graph.connect(from, to);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{ModulePath, Provider};
    use crate::graph::Vertex;
    use crate::plans::ResourceInstanceChange;
    use crate::value::Value;

    fn provider() -> AbsProviderConfig {
        AbsProviderConfig::new(ModulePath::root(), Provider::default_for("test"), None)
    }

    fn destroyer(addr: &str, deps: &[&str]) -> Node {
        let mut node = InstanceNode::new(addr.parse().expect("addr"), InstanceFlavor::ApplyDestroy);
        node.stored_provider = Some(provider());
        node.state_dependencies = deps
            .iter()
            .map(|d| d.parse::<AbsResourceInstance>().expect("dep").config_resource())
            .collect();
        Node::Instance(node)
    }

    fn creator(addr: &str, cbd: bool) -> Node {
        let mut node = InstanceNode::new(addr.parse().expect("addr"), InstanceFlavor::Apply);
        node.create_before_destroy = cbd;
        Node::Instance(node)
    }

    fn id(graph: &Graph<Node>, name: &str) -> VertexId {
        graph.find(|v| v.name() == name).unwrap_or_else(|| panic!("no {name}"))
    }

    #[test]
    fn test_destroy_chain_runs_dependents_first() {
        let mut graph = Graph::new();
        graph.add(destroyer("test_object.a", &[]));
        graph.add(destroyer("test_object.b", &["test_object.a"]));
        graph.add(destroyer("test_object.c", &["test_object.b"]));
        DestroyEdgeTransformer::new(true).transform(&mut graph).expect("edges");

        let a = id(&graph, "test_object.a (destroy)");
        let b = id(&graph, "test_object.b (destroy)");
        let c = id(&graph, "test_object.c (destroy)");
        assert!(graph.has_edge(a, b));
        assert!(graph.has_edge(b, c));
        assert!(!graph.has_edge(c, b));
    }

    #[test]
    fn test_replace_ordering() {
        let mut graph = Graph::new();
        graph.add(destroyer("test_object.a", &[]));
        graph.add(creator("test_object.a", false));
        graph.add(destroyer("test_object.b", &[]));
        graph.add(creator("test_object.b", true));
        DestroyEdgeTransformer::new(false).transform(&mut graph).expect("edges");

        let a_destroy = id(&graph, "test_object.a (destroy)");
        let a_create = id(&graph, "test_object.a");
        assert!(graph.has_edge(a_create, a_destroy));

        let b_destroy = id(&graph, "test_object.b (destroy)");
        let b_create = id(&graph, "test_object.b");
        assert!(graph.has_edge(b_destroy, b_create));
    }

    #[test]
    fn test_update_waits_for_destroy_of_dependent() {
        let mut graph = Graph::new();
        graph.add(creator("test_object.a", false));
        graph.add(destroyer("test_object.b", &["test_object.a"]));
        DestroyEdgeTransformer::new(false).transform(&mut graph).expect("edges");

        let a = id(&graph, "test_object.a");
        let b_destroy = id(&graph, "test_object.b (destroy)");
        assert!(graph.has_edge(a, b_destroy));
    }

    #[test]
    fn test_noop_creator_does_not_wait_for_destroy() {
        let mut graph = Graph::new();
        graph.add(creator("test_object.a", false));
        graph.add(destroyer("test_object.b", &["test_object.a"]));
        let mut changes = Changes::new();
        changes.upsert(ResourceInstanceChange::new(
            "test_object.a".parse().expect("addr"),
            provider(),
            Action::NoOp,
            Value::Null,
            Value::Null,
        ));
        DestroyEdgeTransformer::new(false)
            .with_changes(&changes)
            .transform(&mut graph)
            .expect("edges");

        let a = id(&graph, "test_object.a");
        let b_destroy = id(&graph, "test_object.b (destroy)");
        assert!(!graph.has_edge(a, b_destroy));
    }

    #[test]
    fn test_sibling_module_instances_are_independent() {
        let mut graph = Graph::new();
        graph.add(destroyer("module.m[0].test_object.a", &[]));
        graph.add(destroyer("module.m[1].test_object.b", &["module.m.test_object.a"]));
        graph.add(destroyer("module.m[1].test_object.a", &[]));
        DestroyEdgeTransformer::new(true).transform(&mut graph).expect("edges");

        let a0 = id(&graph, "module.m[0].test_object.a (destroy)");
        let a1 = id(&graph, "module.m[1].test_object.a (destroy)");
        let b1 = id(&graph, "module.m[1].test_object.b (destroy)");
        assert!(graph.has_edge(a1, b1));
        assert!(!graph.has_edge(a0, b1));
    }
}
