use tracing::{debug, trace};

use crate::config::Config;
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer};
use crate::states::State;

use crate::engine::node::{InstanceFlavor, InstanceNode, Node};

/// Adds orphan vertices for state resources whose block is gone.
///
/// Instances of resources that still have a block are handled when the
/// resource vertex expands, since only then is the set of wanted keys known.
#[derive(Debug)]
pub struct OrphanResourceInstanceTransformer<'a> {
    config: &'a Config,
    state: &'a State,
}

impl<'a> OrphanResourceInstanceTransformer<'a> {
    /// Looks for orphans of `config` in `state`.
    #[must_use]
    pub const fn new(config: &'a Config, state: &'a State) -> Self {
        Self { config, state }
    }
}

impl GraphTransformer<Node> for OrphanResourceInstanceTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for (addr, resource) in &self.state.resources {
            if self.config.resource(&addr.config()).is_some() {
                continue;
            }
            for (key, instance) in &resource.instances {
                let instance_addr = addr.instance(key.clone());
                let keys = instance
                    .current
                    .iter()
                    .map(|_| None)
                    .chain(instance.deposed.keys().map(|k| Some(k.clone())));
                for deposed in keys {
                    let mut node = InstanceNode::new(instance_addr.clone(), InstanceFlavor::PlanOrphan)
                        .with_deposed(deposed);
                    node.stored_provider = Some(resource.provider.clone());
                    debug!("Adding orphan {node}");
                    add_once(graph, node);
                }
            }
        }
        Ok(())
    }
}

/// Adds a destroy vertex for every object in state, current and deposed.
#[derive(Debug)]
pub struct StateTransformer<'a> {
    state: &'a State,
}

impl<'a> StateTransformer<'a> {
    #[must_use]
    pub const fn new(state: &'a State) -> Self {
        Self { state }
    }
}

impl GraphTransformer<Node> for StateTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for (addr, resource) in &self.state.resources {
            for (key, instance) in &resource.instances {
                let instance_addr = addr.instance(key.clone());
                let keys = instance
                    .current
                    .iter()
                    .map(|_| None)
                    .chain(instance.deposed.keys().map(|k| Some(k.clone())));
                for deposed in keys {
                    let mut node =
                        InstanceNode::new(instance_addr.clone(), InstanceFlavor::PlanDestroy)
                            .with_deposed(deposed);
                    node.stored_provider = Some(resource.provider.clone());
                    add_once(graph, node);
                }
            }
        }
        Ok(())
    }
}

fn add_once(graph: &mut Graph<Node>, node: InstanceNode) {
    let exists = graph
        .find(|v| {
            matches!(v, Node::Instance(n)
                if n.addr == node.addr && n.flavor == node.flavor && n.deposed == node.deposed)
        })
        .is_some();
    if !exists {
        graph.add(Node::Instance(node));
    }
}

/// Copies stored dependencies and the create-before-destroy flag of each
/// instance's state object onto its vertex.
#[derive(Debug)]
pub struct AttachStateTransformer<'a> {
    state: &'a State,
}

impl<'a> AttachStateTransformer<'a> {
    #[must_use]
    pub const fn new(state: &'a State) -> Self {
        Self { state }
    }
}

impl GraphTransformer<Node> for AttachStateTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for id in graph.vertex_ids() {
            let Some(Node::Instance(node)) = graph.vertex_mut(id) else {
                continue;
            };
            let Some(instance) = self.state.instance(&node.addr) else {
                continue;
            };
            // A create-before-destroy destroyer carries a deposed key that
            // is only allocated in state once apply deposes the object.
            let object = match &node.deposed {
                Some(key) if node.is_destroyer() => {
                    instance.deposed.get(key).or(instance.current.as_ref())
                }
                _ => instance.current.as_ref(),
            };
            if let Some(object) = object {
                trace!("Attaching state of {node}");
                node.state_dependencies.clone_from(&object.dependencies);
                node.create_before_destroy |= object.create_before_destroy;
            }
        }
        Ok(())
    }
}
