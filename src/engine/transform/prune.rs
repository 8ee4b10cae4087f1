use tracing::trace;

use crate::error::Result;
use crate::graph::{Graph, GraphTransformer, VertexId};

use crate::engine::node::Node;

/// Removes vertices a destroy walk has no use for.
///
/// Runs to a fixed point, since removing one vertex can leave another
/// without dependents:
/// - variables, locals and module outputs are kept only while something
///   still depends on them;
/// - module and resource expanders are kept only while a resource
///   instance, a provider, an input variable or another expander depends
///   on them;
/// - providers are kept only while a resource consumes them.
///
/// Root outputs are always kept.
#[derive(Debug, Default)]
pub struct PruneUnusedNodesTransformer;

fn removable(graph: &Graph<Node>, id: VertexId) -> bool {
    let Some(node) = graph.vertex(id) else {
        return false;
    };
    let dependents: Vec<&Node> = graph
        .dependents(id)
        .into_iter()
        .filter_map(|d| graph.vertex(d))
        .filter(|d| !matches!(d, Node::ModuleClose(_) | Node::RootClose | Node::CloseProvider(_)))
        .collect();
    match node {
        Node::Output(n) if n.module.is_root() => false,
        Node::Variable(_) | Node::Local(_) | Node::Output(_) => dependents.is_empty(),
        Node::ModuleExpand(_) | Node::Resource(_) => !dependents.iter().any(|d| {
            matches!(
                d,
                Node::Instance(_)
                    | Node::Resource(_)
                    | Node::ModuleExpand(_)
                    | Node::Provider(_)
                    | Node::Variable(_)
            )
        }),
        Node::Provider(_) => !dependents
            .iter()
            .any(|d| matches!(d, Node::Instance(_) | Node::Resource(_))),
        _ => false,
    }
}

impl GraphTransformer<Node> for PruneUnusedNodesTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        loop {
            let doomed: Vec<VertexId> = graph
                .vertex_ids()
                .into_iter()
                .filter(|id| removable(graph, *id))
                .collect();
            if doomed.is_empty() {
                return Ok(());
            }
            for id in doomed {
                trace!("Pruning unused {}", graph.name_of(id));
                graph.remove(id);
            }
        }
    }
}
