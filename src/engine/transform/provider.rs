//! Provider configuration vertices and consumer resolution.
//!
//! Consumers request a provider either exactly (an address recorded in
//! state, which must still exist) or locally (a local name plus alias in
//! the consumer's module). Local requests fall back to the unaliased
//! configuration of the same provider in each ancestor module, and follow
//! proxies for configurations passed in through module calls.

use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::addrs::{AbsProviderConfig, LocalProviderConfig, ModulePath};
use crate::config::Config;
use crate::error::{ConfigError, EngineError, ProviderError, Result};
use crate::graph::{Graph, GraphTransformer, Vertex, VertexId};

use crate::engine::node::{
    Node, ProviderKey, ProviderKeyScope, ProviderNode, ProxyNode, ResolvedProvider,
};

/// Adds a vertex for every provider block and a proxy for every provider
/// passed through a module call.
#[derive(Debug)]
pub struct ProviderConfigTransformer<'a> {
    config: &'a Config,
}

impl<'a> ProviderConfigTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

fn provider_vertex(graph: &Graph<Node>, addr: &AbsProviderConfig) -> Option<VertexId> {
    graph.find(|v| match v {
        Node::Provider(n) => n.addr == *addr,
        Node::ProviderProxy(n) => n.addr == *addr,
        _ => false,
    })
}

impl GraphTransformer<Node> for ProviderConfigTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for module in self.config.modules() {
            for block in &module.file.providers {
                let provider = module.provider_for_local_name(&block.name)?;
                let addr = AbsProviderConfig::new(module.path.clone(), provider, block.alias.clone());
                if provider_vertex(graph, &addr).is_none() {
                    trace!("Adding provider vertex {addr}");
                    graph.add(Node::Provider(ProviderNode {
                        addr,
                        config: Some(block.clone()),
                    }));
                }
            }
        }

        for module in self.config.modules() {
            let (Some(parent_path), Some(call_name)) = (module.path.parent(), module.path.call_name())
            else {
                continue;
            };
            let Some(parent) = self.config.module(&parent_path) else {
                continue;
            };
            let Some(call) = parent.module_call(call_name) else {
                continue;
            };
            for (child_text, passing) in &call.providers {
                let child: LocalProviderConfig = child_text.parse()?;
                let addr = AbsProviderConfig::new(
                    module.path.clone(),
                    module.provider_for_local_name(&child.local_name)?,
                    child.alias,
                );
                let from: LocalProviderConfig = passing.parent().parse()?;
                let target = AbsProviderConfig::new(
                    parent.path.clone(),
                    parent.provider_for_local_name(&from.local_name)?,
                    from.alias,
                );
                match provider_vertex(graph, &addr) {
                    Some(id) if matches!(graph.vertex(id), Some(Node::Provider(_))) => {
                        warn!("Module {} declares {addr} and also receives it from its caller", module.path);
                    }
                    Some(_) => {}
                    None => {
                        trace!("Adding proxy {addr} -> {target}");
                        graph.add(Node::ProviderProxy(ProxyNode {
                            addr,
                            target,
                            key: passing.key().map(|expr| ProviderKey {
                                expr: expr.clone(),
                                scope: ProviderKeyScope::ModuleCall(module.path.clone()),
                            }),
                        }));
                    }
                }
            }
        }
        Ok(())
    }
}

/// How a consumer asks for its provider.
enum Request {
    Exact(AbsProviderConfig),
    Local {
        addr: AbsProviderConfig,
        key: Option<ProviderKey>,
    },
}

impl Request {
    const fn addr(&self) -> &AbsProviderConfig {
        match self {
            Self::Exact(addr) | Self::Local { addr, .. } => addr,
        }
    }
}

fn local_request(
    config: &Config,
    module: &ModulePath,
    block: &crate::config::ResourceBlock,
) -> Result<Request> {
    let Some(module_config) = config.module(module) else {
        return Err(EngineError::internal(format!("no configuration for module {module}")));
    };
    let local = module_config.resource_provider_config(block)?;
    let provider = module_config.provider_for_local_name(&local.local_name)?;
    Ok(Request::Local {
        addr: AbsProviderConfig::new(module.clone(), provider, local.alias),
        key: block.provider_key.clone().map(|expr| ProviderKey {
            expr,
            scope: ProviderKeyScope::Resource,
        }),
    })
}

/// The provider request of a consumer vertex, or `None` for non-consumers.
fn request(config: &Config, node: &Node) -> Option<Result<Request>> {
    match node {
        Node::Resource(n) => n
            .config
            .as_ref()
            .map(|block| local_request(config, &n.addr.module, block)),
        Node::Instance(n) => match (&n.stored_provider, &n.config) {
            (Some(stored), _) => Some(Ok(Request::Exact(stored.clone()))),
            (None, Some(block)) => Some(local_request(config, &n.addr.module.module(), block)),
            (None, None) => Some(Err(EngineError::internal(format!(
                "{n} has neither configuration nor a stored provider"
            )))),
        },
        _ => None,
    }
}

/// Adds an implied, unconfigured root provider for every provider some
/// consumer needs but no vertex supplies.
#[derive(Debug)]
pub struct MissingProviderTransformer<'a> {
    config: &'a Config,
}

impl<'a> MissingProviderTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

impl GraphTransformer<Node> for MissingProviderTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let mut needed = Vec::new();
        for (_, node) in graph.vertices() {
            match request(self.config, node) {
                Some(Ok(req)) => needed.push(AbsProviderConfig::new(
                    ModulePath::root(),
                    req.addr().provider.clone(),
                    None,
                )),
                Some(Err(_)) | None => {}
            }
        }
        needed.sort();
        needed.dedup();
        for addr in needed {
            if provider_vertex(graph, &addr).is_none() {
                debug!("Adding implied provider {addr}");
                graph.add(Node::Provider(ProviderNode { addr, config: None }));
            }
        }
        Ok(())
    }
}

/// Resolves every consumer to a concrete provider vertex and connects it.
#[derive(Debug)]
pub struct ProviderTransformer<'a> {
    config: &'a Config,
}

impl<'a> ProviderTransformer<'a> {
    #[must_use]
    pub const fn new(config: &'a Config) -> Self {
        Self { config }
    }
}

type ProviderIndex = HashMap<AbsProviderConfig, VertexId>;

fn lookup(index: &ProviderIndex, mut addr: AbsProviderConfig) -> Option<(AbsProviderConfig, VertexId)> {
    loop {
        if let Some(id) = index.get(&addr) {
            return Some((addr, *id));
        }
        addr = addr.inherited()?;
    }
}

fn not_present(addr: &AbsProviderConfig, consumer: &str) -> EngineError {
    EngineError::Provider(ProviderError::ConfigurationNotPresent {
        addr: addr.to_string(),
        consumer: consumer.to_string(),
    })
}

fn resolve(
    graph: &Graph<Node>,
    index: &ProviderIndex,
    consumer: &str,
    req: Request,
) -> Result<(VertexId, ResolvedProvider)> {
    let (mut addr, mut id, mut keys) = match req {
        Request::Exact(addr) => {
            let id = *index.get(&addr).ok_or_else(|| not_present(&addr, consumer))?;
            (addr, id, Vec::new())
        }
        Request::Local { addr, key } => {
            let (found, id) = lookup(index, addr.clone()).ok_or_else(|| not_present(&addr, consumer))?;
            (found, id, key.into_iter().collect::<Vec<_>>())
        }
    };

    while let Some(Node::ProviderProxy(proxy)) = graph.vertex(id) {
        trace!("{consumer}: following proxy {} -> {}", proxy.addr, proxy.target);
        keys.extend(proxy.key.clone());
        (addr, id) = lookup(index, proxy.target.clone())
            .ok_or_else(|| not_present(&proxy.target, consumer))?;
    }

    if keys.len() > 1 {
        return Err(EngineError::Config(ConfigError::DuplicateProviderKey {
            addr: consumer.to_string(),
            message: format!(
                "an instance key for {addr} is given more than once along the chain of module calls"
            ),
        }));
    }
    Ok((id, ResolvedProvider { addr, key: keys.pop() }))
}

impl GraphTransformer<Node> for ProviderTransformer<'_> {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let index: ProviderIndex = graph
            .vertices()
            .filter_map(|(id, v)| match v {
                Node::Provider(n) => Some((n.addr.clone(), id)),
                Node::ProviderProxy(n) => Some((n.addr.clone(), id)),
                _ => None,
            })
            .collect();

        let mut errors = Vec::new();
        let mut resolved = Vec::new();
        for (id, node) in graph.vertices() {
            let Some(req) = request(self.config, node) else {
                continue;
            };
            let outcome = req.and_then(|req| resolve(graph, &index, &node.name(), req));
            match outcome {
                Ok((provider_id, provider)) => resolved.push((id, provider_id, provider)),
                Err(err) => errors.push(err),
            }
        }

        for (id, provider_id, provider) in resolved {
            trace!("{} uses {}", graph.name_of(id), provider.addr);
            match graph.vertex_mut(id) {
                Some(Node::Resource(n)) => n.provider = Some(provider),
                Some(Node::Instance(n)) => n.provider = Some(provider),
                _ => {}
            }
            graph.connect(id, provider_id);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(EngineError::Multiple(errors)),
        }
    }
}

/// Removes proxies and, optionally, providers nothing uses.
#[derive(Debug)]
pub struct PruneProviderTransformer {
    remove_unused: bool,
}

impl PruneProviderTransformer {
    #[must_use]
    pub const fn new(remove_unused: bool) -> Self {
        Self { remove_unused }
    }
}

impl GraphTransformer<Node> for PruneProviderTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        for id in graph.vertex_ids() {
            let remove = match graph.vertex(id) {
                Some(Node::ProviderProxy(_)) => true,
                Some(Node::Provider(_)) => self.remove_unused && graph.dependents(id).is_empty(),
                _ => false,
            };
            if remove {
                trace!("Pruning {}", graph.name_of(id));
                graph.remove(id);
            }
        }
        Ok(())
    }
}

/// Adds a close vertex per provider that runs after all its consumers.
#[derive(Debug, Default)]
pub struct CloseProviderTransformer;

impl GraphTransformer<Node> for CloseProviderTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        let providers: Vec<(VertexId, AbsProviderConfig)> = graph
            .vertices()
            .filter_map(|(id, v)| match v {
                Node::Provider(n) => Some((id, n.addr.clone())),
                _ => None,
            })
            .collect();
        for (id, addr) in providers {
            let close = graph
                .find(|v| matches!(v, Node::CloseProvider(a) if *a == addr))
                .unwrap_or_else(|| graph.add(Node::CloseProvider(addr.clone())));
            graph.connect(close, id);
            for dependent in graph.dependents(id) {
                if dependent != close {
                    graph.connect(close, dependent);
                }
            }
        }
        Ok(())
    }
}
