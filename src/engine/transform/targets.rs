use std::collections::BTreeSet;
use tracing::debug;

use crate::addrs::{ConfigResource, Target};
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer, VertexId};

use crate::engine::node::{InstanceFlavor, Node};

/// Limits a graph to targeted addresses and their dependencies, then drops
/// excluded addresses and everything depending on them.
///
/// Resource vertices are kept when a target may select some of their
/// instances; the exact instance filter runs again during expansion.
#[derive(Debug)]
pub struct TargetsTransformer<'a> {
    targets: &'a [Target],
    excludes: &'a [Target],
}

impl<'a> TargetsTransformer<'a> {
    #[must_use]
    pub const fn new(targets: &'a [Target], excludes: &'a [Target]) -> Self {
        Self { targets, excludes }
    }
}

const fn is_join(node: &Node) -> bool {
    matches!(node, Node::RootClose | Node::ModuleClose(_) | Node::CloseProvider(_))
}

fn selected(node: &Node, filters: &[Target], whole: bool) -> bool {
    match node {
        Node::Instance(n) => filters.iter().any(|t| t.contains_instance(&n.addr)),
        Node::Resource(n) if whole => filters.iter().any(|t| t.contains_whole_resource(&n.addr)),
        Node::Resource(n) => filters.iter().any(|t| t.may_contain_resource(&n.addr)),
        _ => false,
    }
}

/// Destroy vertices whose stored dependencies point at an already kept
/// destroy vertex must go too, since their objects rely on it.
fn destroy_dependents(graph: &Graph<Node>, kept: &mut BTreeSet<VertexId>) {
    loop {
        let destroyed: BTreeSet<ConfigResource> = kept
            .iter()
            .filter_map(|id| match graph.vertex(*id) {
                Some(Node::Instance(n)) if n.flavor == InstanceFlavor::PlanDestroy => {
                    Some(n.addr.config_resource())
                }
                _ => None,
            })
            .collect();
        let extra: Vec<VertexId> = graph
            .vertices()
            .filter(|(id, _)| !kept.contains(id))
            .filter(|(_, v)| {
                matches!(v, Node::Instance(n)
                    if n.flavor == InstanceFlavor::PlanDestroy
                        && n.state_dependencies.iter().any(|d| destroyed.contains(d)))
            })
            .map(|(id, _)| id)
            .collect();
        if extra.is_empty() {
            return;
        }
        for id in extra {
            kept.insert(id);
            kept.extend(graph.ancestors(id));
        }
    }
}

impl GraphTransformer<Node> for TargetsTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        if !self.targets.is_empty() {
            let mut kept = BTreeSet::new();
            for (id, node) in graph.vertices() {
                if selected(node, self.targets, false) {
                    kept.insert(id);
                    kept.extend(graph.ancestors(id));
                }
            }
            destroy_dependents(graph, &mut kept);
            for id in graph.vertex_ids() {
                let join = graph.vertex(id).is_some_and(is_join);
                if !join && !kept.contains(&id) {
                    debug!("Removing untargeted {}", graph.name_of(id));
                    graph.remove(id);
                }
            }
        }

        if !self.excludes.is_empty() {
            let mut doomed = BTreeSet::new();
            for (id, node) in graph.vertices() {
                if selected(node, self.excludes, true) {
                    doomed.insert(id);
                    doomed.extend(graph.descendants(id));
                }
            }
            for id in doomed {
                if graph.vertex(id).is_some_and(|v| !is_join(v)) {
                    debug!("Removing excluded {}", graph.name_of(id));
                    graph.remove(id);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::ResourceFlavor;
    use crate::engine::transform::{
        AttachResourceConfigTransformer, ConfigTransformer, ReferenceTransformer, load_config,
    };
    use crate::graph::{Multi, Vertex};

    fn graph() -> Graph<Node> {
        let config = load_config(&[(
            "main.yaml",
            r#"
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
    attributes:
      upstream: "${test_instance.a.id}"
  - type: test_instance
    name: c
"#,
        )]);
        let mut graph = Graph::new();
        let steps: Vec<Box<dyn GraphTransformer<Node> + '_>> = vec![
            Box::new(ConfigTransformer::new(&config, ResourceFlavor::Plan)),
            Box::new(AttachResourceConfigTransformer::new(&config)),
            Box::new(ReferenceTransformer),
        ];
        Multi::new(steps).transform(&mut graph).expect("graph");
        graph
    }

    fn names(graph: &Graph<Node>) -> Vec<String> {
        let mut names: Vec<String> = graph.vertices().map(|(_, v)| v.name()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_target_keeps_dependencies() {
        let mut graph = graph();
        let targets = vec!["test_instance.b".parse::<Target>().expect("target")];
        TargetsTransformer::new(&targets, &[]).transform(&mut graph).expect("targets");
        assert_eq!(names(&graph), vec!["test_instance.a (expand)", "test_instance.b (expand)"]);
    }

    #[test]
    fn test_exclude_drops_dependents() {
        let mut graph = graph();
        let excludes = vec!["test_instance.a".parse::<Target>().expect("exclude")];
        TargetsTransformer::new(&[], &excludes).transform(&mut graph).expect("excludes");
        assert_eq!(names(&graph), vec!["test_instance.c (expand)"]);
    }
}
