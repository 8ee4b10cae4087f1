use tracing::debug;

use crate::error::Result;
use crate::graph::{Graph, GraphTransformer};
use crate::plans::{Action, Changes};
use crate::states::new_deposed_key;

use crate::engine::node::{InstanceFlavor, InstanceNode, Node};

/// Adds apply-time instance vertices for every planned change.
///
/// A replacement gets two vertices: one that creates the new object and
/// one that destroys the old one. For create-before-destroy the old object
/// is deposed first, under a key both vertices agree on up front.
#[derive(Debug)]
pub struct DiffTransformer<'a> {
    changes: &'a Changes,
}

impl<'a> DiffTransformer<'a> {
    #[must_use]
    pub const fn new(changes: &'a Changes) -> Self {
        Self { changes }
    }
}

impl GraphTransformer<Node> for DiffTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let existing = graph
            .vertices()
            .any(|(_, v)| {
                matches!(v, Node::Instance(n)
                    if matches!(n.flavor, InstanceFlavor::Apply | InstanceFlavor::ApplyDestroy))
            });
        if existing {
            return Ok(());
        }

        for change in &self.changes.resources {
            let destroyer = |deposed: Option<String>| {
                let mut node = InstanceNode::new(change.addr.clone(), InstanceFlavor::ApplyDestroy)
                    .with_deposed(deposed);
                node.stored_provider = Some(change.provider.clone());
                node.create_before_destroy = change.action == Action::CreateThenDelete;
                node
            };
            let creator = |deposed: Option<String>| {
                let mut node =
                    InstanceNode::new(change.addr.clone(), InstanceFlavor::Apply).with_deposed(deposed);
                node.create_before_destroy = change.action == Action::CreateThenDelete;
                node
            };

            let nodes = match (change.action, &change.deposed) {
                (Action::Delete, deposed) => vec![destroyer(deposed.clone())],
                (_, Some(_)) => Vec::new(),
                (Action::DeleteThenCreate, None) => vec![destroyer(None), creator(None)],
                (Action::CreateThenDelete, None) => {
                    let key = new_deposed_key();
                    vec![creator(Some(key.clone())), destroyer(Some(key))]
                }
                (Action::Forget, None) => {
                    let mut node = creator(None);
                    node.stored_provider = Some(change.provider.clone());
                    vec![node]
                }
                (Action::Create | Action::Update | Action::NoOp | Action::Read, None) => {
                    vec![creator(None)]
                }
            };

            for node in nodes {
                debug!("Adding apply vertex {node} for {:?}", change.action);
                let config_addr = node.addr.config_resource();
                let creates = node.flavor == InstanceFlavor::Apply;
                let id = graph.add(Node::Instance(node));
                let resource = graph.find(|v| matches!(v, Node::Resource(r) if r.addr == config_addr));
                if let (true, Some(resource)) = (creates, resource) {
                    graph.connect(id, resource);
                }
            }
        }
        Ok(())
    }
}
