use tracing::trace;

use crate::config::Config;
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer};

use crate::engine::node::{Node, ResourceFlavor, ResourceNode};

/// Adds one resource vertex per resource and data block in every module.
#[derive(Debug)]
pub struct ConfigTransformer<'a> {
    config: &'a Config,
    flavor: ResourceFlavor,
}

impl<'a> ConfigTransformer<'a> {
    /// Adds vertices of the given flavor.
    #[must_use]
    pub const fn new(config: &'a Config, flavor: ResourceFlavor) -> Self {
        Self { config, flavor }
    }
}

impl GraphTransformer<Node> for ConfigTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for (addr, _) in self.config.resources() {
            let exists = graph
                .find(|v| matches!(v, Node::Resource(n) if n.addr == addr))
                .is_some();
            if exists {
                continue;
            }
            trace!("Adding resource vertex {addr}");
            graph.add(Node::Resource(ResourceNode::new(addr, self.flavor)));
        }
        Ok(())
    }
}

/// Attaches resource blocks to resource and instance vertices.
///
/// Instance vertices also inherit `create_before_destroy` from the block's
/// lifecycle settings; state may already have set it.
#[derive(Debug)]
pub struct AttachResourceConfigTransformer<'a> {
    config: &'a Config,
}

impl<'a> AttachResourceConfigTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer<Node> for AttachResourceConfigTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for id in graph.vertex_ids() {
            match graph.vertex_mut(id) {
                Some(Node::Resource(n)) if n.config.is_none() => {
                    n.config = self.config.resource(&n.addr).cloned();
                }
                Some(Node::Instance(n)) if n.config.is_none() => {
                    if let Some(block) = self.config.resource(&n.addr.config_resource()) {
                        n.create_before_destroy |= block.lifecycle.create_before_destroy;
                        n.config = Some(block.clone());
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
