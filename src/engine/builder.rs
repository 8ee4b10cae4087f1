//! Graph builders for each walk operation.
//!
//! Each builder is a fixed sequence of transformers. The order matters:
//! configuration and state vertices come first, providers are resolved once
//! every consumer exists, module and reference edges follow, and join
//! vertices are added last so that they depend on everything that survived
//! filtering.

use crate::config::Config;
use crate::error::Result;
use crate::graph::{Graph, GraphBuilder, GraphTransformer};
use crate::plans::Changes;
use crate::states::State;

use super::node::{Node, ResourceFlavor};
use super::options::PlanOptions;
use super::transform::{
    AttachDependenciesTransformer, AttachResourceConfigTransformer, AttachStateTransformer,
    CloseProviderTransformer, CloseRootTransformer, ConfigTransformer, DestroyEdgeTransformer,
    DiffTransformer, LocalTransformer, MissingProviderTransformer, ModuleExpansionTransformer,
    OrphanResourceInstanceTransformer, OutputTransformer, ProviderConfigTransformer,
    ProviderTransformer, PruneProviderTransformer, PruneUnusedNodesTransformer,
    ReferenceTransformer, StateTransformer, TargetsTransformer, TransitiveReductionTransformer,
    VariableTransformer,
};

type Steps<'a> = Vec<Box<dyn GraphTransformer<Node> + 'a>>;

fn provider_steps(config: &Config, prune_unused: bool) -> Steps<'_> {
    vec![
        Box::new(ProviderConfigTransformer::new(config)),
        Box::new(MissingProviderTransformer::new(config)),
        Box::new(ProviderTransformer::new(config)),
        Box::new(PruneProviderTransformer::new(prune_unused)),
    ]
}

/// Builds the graph for a normal or refresh-only plan.
///
/// # Errors
///
/// Returns an error if a provider cannot be resolved or the graph has a
/// cycle.
pub fn plan_graph(config: &Config, state: &State, options: &PlanOptions) -> Result<Graph<Node>> {
    let mut steps: Steps<'_> = vec![
        Box::new(ConfigTransformer::new(config, ResourceFlavor::Plan)),
        Box::new(VariableTransformer::new(config)),
        Box::new(LocalTransformer::new(config)),
        Box::new(OutputTransformer::new(config)),
        Box::new(OrphanResourceInstanceTransformer::new(config, state)),
        Box::new(AttachResourceConfigTransformer::new(config)),
        Box::new(AttachStateTransformer::new(state)),
    ];
    steps.extend(provider_steps(config, true));
    steps.extend::<Steps<'_>>(vec![
        Box::new(ModuleExpansionTransformer::new(config)),
        Box::new(ReferenceTransformer),
        Box::new(AttachDependenciesTransformer),
        Box::new(TargetsTransformer::new(&options.targets, &options.excludes)),
        Box::new(CloseProviderTransformer),
        Box::new(CloseRootTransformer),
        Box::new(TransitiveReductionTransformer),
    ]);
    GraphBuilder::new("plan", steps).build()
}

/// Builds the graph that plans the destruction of everything in state.
///
/// # Errors
///
/// See [`plan_graph`].
pub fn plan_destroy_graph(
    config: &Config,
    state: &State,
    options: &PlanOptions,
) -> Result<Graph<Node>> {
    let mut steps: Steps<'_> = vec![
        Box::new(StateTransformer::new(state)),
        Box::new(AttachResourceConfigTransformer::new(config)),
        Box::new(AttachStateTransformer::new(state)),
        Box::new(VariableTransformer::new(config)),
        Box::new(LocalTransformer::new(config)),
    ];
    steps.extend(provider_steps(config, true));
    steps.extend::<Steps<'_>>(vec![
        Box::new(ModuleExpansionTransformer::new(config)),
        Box::new(ReferenceTransformer),
        Box::new(PruneUnusedNodesTransformer),
        Box::new(TargetsTransformer::new(&options.targets, &options.excludes)),
        Box::new(CloseProviderTransformer),
        Box::new(CloseRootTransformer),
        Box::new(TransitiveReductionTransformer),
    ]);
    GraphBuilder::new("plan-destroy", steps).build()
}

/// Builds the graph that applies a set of planned changes.
///
/// `destroy` is set for plans made in destroy mode, which skips outputs and
/// prunes everything that no destroy vertex needs.
///
/// # Errors
///
/// See [`plan_graph`].
pub fn apply_graph(
    config: &Config,
    state: &State,
    changes: &Changes,
    destroy: bool,
) -> Result<Graph<Node>> {
    let mut steps: Steps<'_> = vec![
        Box::new(ConfigTransformer::new(config, ResourceFlavor::Apply)),
        Box::new(DiffTransformer::new(changes)),
        Box::new(VariableTransformer::new(config)),
        Box::new(LocalTransformer::new(config)),
    ];
    if !destroy {
        steps.push(Box::new(OutputTransformer::new(config)));
    }
    steps.extend::<Steps<'_>>(vec![
        Box::new(AttachResourceConfigTransformer::new(config)),
        Box::new(AttachStateTransformer::new(state)),
    ]);
    steps.extend(provider_steps(config, true));
    steps.extend::<Steps<'_>>(vec![
        Box::new(ModuleExpansionTransformer::new(config)),
        Box::new(ReferenceTransformer),
        Box::new(AttachDependenciesTransformer),
        Box::new(DestroyEdgeTransformer::new(destroy).with_changes(changes)),
    ]);
    if destroy {
        steps.push(Box::new(PruneUnusedNodesTransformer));
    }
    steps.extend::<Steps<'_>>(vec![
        Box::new(CloseProviderTransformer),
        Box::new(CloseRootTransformer),
        Box::new(TransitiveReductionTransformer),
    ]);
    GraphBuilder::new("apply", steps).build()
}

/// Builds the graph for static validation.
///
/// Every provider block is kept, used or not, so its configuration is
/// checked.
///
/// # Errors
///
/// See [`plan_graph`].
pub fn validate_graph(config: &Config) -> Result<Graph<Node>> {
    let mut steps: Steps<'_> = vec![
        Box::new(ConfigTransformer::new(config, ResourceFlavor::Validate)),
        Box::new(VariableTransformer::new(config)),
        Box::new(LocalTransformer::new(config)),
        Box::new(OutputTransformer::new(config)),
        Box::new(AttachResourceConfigTransformer::new(config)),
    ];
    steps.extend(provider_steps(config, false));
    steps.extend::<Steps<'_>>(vec![
        Box::new(ModuleExpansionTransformer::new(config)),
        Box::new(ReferenceTransformer),
        Box::new(CloseProviderTransformer),
        Box::new(CloseRootTransformer),
        Box::new(TransitiveReductionTransformer),
    ]);
    GraphBuilder::new("validate", steps).build()
}
