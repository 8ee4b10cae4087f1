use std::collections::HashMap;
use tracing::trace;

use crate::addrs::ModulePath;
use crate::config::Config;
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer, VertexId};

use crate::engine::node::{ModuleExpandNode, Node};

/// Adds expand and close vertices for every module call.
///
/// Every vertex inside a module depends on that module's expand vertex,
/// and the module's close vertex depends on every vertex inside it,
/// including the close vertices of nested modules. Destroyers do not wait
/// for expansion, since the instances they remove may no longer be part of
/// any expansion.
#[derive(Debug)]
pub struct ModuleExpansionTransformer<'a> {
    config: &'a Config,
}

impl<'a> ModuleExpansionTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer<Node> for ModuleExpansionTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let mut expanders: HashMap<ModulePath, VertexId> = HashMap::new();
        let mut closers: HashMap<ModulePath, VertexId> = HashMap::new();

        for module in self.config.modules() {
            let (Some(parent), Some(name)) = (module.path.parent(), module.path.call_name()) else {
                continue;
            };
            let Some(call) = self.config.module(&parent).and_then(|p| p.module_call(name)) else {
                continue;
            };
            let path = module.path.clone();
            let expand = graph
                .find(|v| matches!(v, Node::ModuleExpand(n) if n.path == path))
                .unwrap_or_else(|| {
                    graph.add(Node::ModuleExpand(ModuleExpandNode {
                        path: path.clone(),
                        call: call.clone(),
                    }))
                });
            let close = graph
                .find(|v| matches!(v, Node::ModuleClose(p) if *p == path))
                .unwrap_or_else(|| graph.add(Node::ModuleClose(path.clone())));
            expanders.insert(path.clone(), expand);
            closers.insert(path, close);
        }

        for id in graph.vertex_ids() {
            let Some(node) = graph.vertex(id) else {
                continue;
            };
            let Some(module) = node.module_path() else {
                continue;
            };
            if module.is_root() {
                continue;
            }
            let destroyer = matches!(node, Node::Instance(n) if n.is_destroyer());
            if !destroyer {
                if let Some(expand) = expanders.get(&module).copied() {
                    if expand != id {
                        trace!("{} waits for expansion of {module}", graph.name_of(id));
                        graph.connect(id, expand);
                    }
                }
            }
            if let Some(close) = closers.get(&module).copied() {
                if close != id {
                    graph.connect(close, id);
                }
            }
        }
        Ok(())
    }
}

/// Adds the root vertex, which depends on every other vertex.
#[derive(Debug, Default)]
pub struct CloseRootTransformer;

impl GraphTransformer<Node> for CloseRootTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let root = graph
            .find(|v| matches!(v, Node::RootClose))
            .unwrap_or_else(|| graph.add(Node::RootClose));
        for id in graph.vertex_ids() {
            if id != root {
                graph.connect(root, id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::node::ResourceFlavor;
    use crate::engine::transform::{ConfigTransformer, load_config};
    use crate::graph::Vertex;

    fn id_of(graph: &Graph<Node>, name: &str) -> VertexId {
        graph.find(|v| v.name() == name).unwrap_or_else(|| panic!("no {name}"))
    }

    #[test]
    fn test_nested_modules_expand_and_close() {
        let config = load_config(&[
            ("main.yaml", "modules:\n  - name: a\n    source: a.yaml\n"),
            (
                "a.yaml",
                "modules:\n  - name: b\n    source: b.yaml\nresources:\n  - type: test_instance\n    name: x\n",
            ),
            ("b.yaml", "resources:\n  - type: test_instance\n    name: y\n"),
        ]);
        let mut graph = Graph::new();
        ConfigTransformer::new(&config, ResourceFlavor::Plan)
            .transform(&mut graph)
            .expect("config");
        ModuleExpansionTransformer::new(&config)
            .transform(&mut graph)
            .expect("modules");
        CloseRootTransformer.transform(&mut graph).expect("root");

        let x = id_of(&graph, "module.a.test_instance.x (expand)");
        let y = id_of(&graph, "module.a.module.b.test_instance.y (expand)");
        let expand_a = id_of(&graph, "module.a (expand)");
        let expand_b = id_of(&graph, "module.a.module.b (expand)");
        let close_a = id_of(&graph, "module.a (close)");
        let close_b = id_of(&graph, "module.a.module.b (close)");

        assert!(graph.has_edge(x, expand_a));
        assert!(graph.has_edge(y, expand_b));
        assert!(graph.has_edge(expand_b, expand_a));
        assert!(graph.has_edge(close_b, y));
        assert!(graph.has_edge(close_a, close_b));
        assert!(graph.has_edge(close_a, x));
        assert!(graph.validate().is_ok());

        let root = id_of(&graph, "root");
        assert_eq!(graph.dependencies(root).len(), graph.len() - 1);
    }
}
