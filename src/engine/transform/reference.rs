use std::collections::HashMap;
use tracing::trace;

use crate::addrs::ConfigResource;
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer, VertexId};

use crate::engine::node::{Node, RefKey};

/// Connects every vertex to the vertices its expressions refer to.
#[derive(Debug, Default)]
pub struct ReferenceTransformer;

impl GraphTransformer<Node> for ReferenceTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let mut index: HashMap<RefKey, Vec<VertexId>> = HashMap::new();
        for (id, node) in graph.vertices() {
            for key in node.referenceable_keys() {
                index.entry(key).or_default().push(id);
            }
        }

        let mut edges = Vec::new();
        for (id, node) in graph.vertices() {
            for key in node.references() {
                let Some(targets) = index.get(&key) else {
                    continue;
                };
                for target in targets.iter().copied().filter(|t| *t != id) {
                    edges.push((id, target));
                }
            }
        }
        for (from, to) in edges {
            trace!("{} references {}", graph.name_of(from), graph.name_of(to));
            graph.connect(from, to);
        }
        Ok(())
    }
}

/// Records on each resource vertex the managed resources it transitively
/// depends on, for storing with the objects it produces.
#[derive(Debug, Default)]
pub struct AttachDependenciesTransformer;

impl GraphTransformer<Node> for AttachDependenciesTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let mut found: Vec<(VertexId, Vec<ConfigResource>)> = Vec::new();
        for (id, node) in graph.vertices() {
            let own = match node {
                Node::Resource(n) => n.addr.clone(),
                Node::Instance(n) if !n.is_destroyer() => n.addr.config_resource(),
                _ => continue,
            };
            let mut deps: Vec<ConfigResource> = graph
                .ancestors(id)
                .into_iter()
                .filter_map(|a| graph.vertex(a))
                .filter(|v| {
                    v.is_managed_resource() && !matches!(v, Node::Instance(n) if n.is_destroyer())
                })
                .filter_map(Node::config_resource)
                .filter(|addr| *addr != own)
                .collect();
            deps.sort();
            deps.dedup();
            found.push((id, deps));
        }
        for (id, deps) in found {
            match graph.vertex_mut(id) {
                Some(Node::Resource(n)) => n.dependencies = deps,
                Some(Node::Instance(n)) => n.dependencies = deps,
                _ => {}
            }
        }
        Ok(())
    }
}
