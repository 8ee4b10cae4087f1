//! Graph transformers for the engine's vertex type.
//!
//! Each transformer owns one structural concern. The graph builders in
//! [`super::builder`] fix the order they run in.

mod config;
mod destroy_edge;
mod diff;
mod module;
mod provider;
mod prune;
mod reference;
mod state;
mod targets;
mod values;

pub use config::{AttachResourceConfigTransformer, ConfigTransformer};
pub use destroy_edge::DestroyEdgeTransformer;
pub use diff::DiffTransformer;
pub use module::{CloseRootTransformer, ModuleExpansionTransformer};
pub use provider::{
    CloseProviderTransformer, MissingProviderTransformer, ProviderConfigTransformer,
    ProviderTransformer, PruneProviderTransformer,
};
pub use prune::PruneUnusedNodesTransformer;
pub use reference::{AttachDependenciesTransformer, ReferenceTransformer};
pub use state::{AttachStateTransformer, OrphanResourceInstanceTransformer, StateTransformer};
pub use targets::TargetsTransformer;
pub use values::{LocalTransformer, OutputTransformer, VariableTransformer};

use crate::error::Result;
use crate::graph::{Graph, GraphTransformer};

use super::node::Node;

/// Drops every edge implied by a longer path.
#[derive(Debug, Default)]
pub struct TransitiveReductionTransformer;

impl GraphTransformer<Node> for TransitiveReductionTransformer {
    fn transform(&self, graph: &mut Graph<Node>) -> Result<()> {
        graph.reduce_transitive();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn load_config(files: &[(&str, &str)]) -> crate::config::Config {
    let mut parser = crate::config::ConfigParser::new();
    for (path, text) in files {
        parser = parser.with_source(*path, *text);
    }
    parser.load_file(files[0].0).expect("config")
}
