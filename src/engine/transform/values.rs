use crate::config::Config;
use crate::error::Result;
use crate::graph::{Graph, GraphTransformer};

use crate::engine::node::{LocalNode, Node, OutputNode, VariableNode};

fn has_vertex(graph: &Graph<Node>, pred: impl FnMut(&Node) -> bool) -> bool {
    graph.find(pred).is_some()
}

/// Adds a vertex for every input variable of every module.
///
/// Variables of child modules carry the input expression from the calling
/// block, which is evaluated in the parent module.
#[derive(Debug)]
pub struct VariableTransformer<'a> {
    config: &'a Config,
}

impl<'a> VariableTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer<Node> for VariableTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for module in self.config.modules() {
            let call = module
                .path
                .parent()
                .zip(module.path.call_name())
                .and_then(|(parent, name)| self.config.module(&parent)?.module_call(name));
            for variable in &module.file.variables {
                let exists = has_vertex(graph, |v| {
                    matches!(v, Node::Variable(n) if n.module == module.path && n.name == variable.name)
                });
                if exists {
                    continue;
                }
                graph.add(Node::Variable(VariableNode {
                    module: module.path.clone(),
                    name: variable.name.clone(),
                    default: variable.default.clone(),
                    input: call.and_then(|c| c.inputs.get(&variable.name)).cloned(),
                }));
            }
        }
        Ok(())
    }
}

/// Adds a vertex for every local value.
#[derive(Debug)]
pub struct LocalTransformer<'a> {
    config: &'a Config,
}

impl<'a> LocalTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer<Node> for LocalTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for module in self.config.modules() {
            for (name, expr) in &module.file.locals {
                let exists = has_vertex(graph, |v| {
                    matches!(v, Node::Local(n) if n.module == module.path && n.name == *name)
                });
                if !exists {
                    graph.add(Node::Local(LocalNode {
                        module: module.path.clone(),
                        name: name.clone(),
                        expr: expr.clone(),
                    }));
                }
            }
        }
        Ok(())
    }
}

/// Adds a vertex for every output value.
#[derive(Debug)]
pub struct OutputTransformer<'a> {
    config: &'a Config,
}

impl<'a> OutputTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer<Node> for OutputTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for module in self.config.modules() {
            for output in &module.file.outputs {
                let exists = has_vertex(graph, |v| {
                    matches!(v, Node::Output(n) if n.module == module.path && n.name == output.name)
                });
                if !exists {
                    graph.add(Node::Output(OutputNode {
                        module: module.path.clone(),
                        name: output.name.clone(),
                        expr: output.value.clone(),
                    }));
                }
            }
        }
        Ok(())
    }
}
