//! The plan and apply engine.
//!
//! A [`Context`] builds a graph for the requested operation from a fixed
//! sequence of transformers, then walks it with a visitor that expands
//! resources into instances and plans or applies each one against its
//! provider.

mod apply_instance;
mod builder;
mod conditions;
mod context;
mod expand;
mod moves;
mod node;
mod options;
mod plan_instance;
mod transform;
mod visitor;
mod walk_context;

pub use builder::{apply_graph, plan_destroy_graph, plan_graph, validate_graph};
pub use context::Context;
pub use moves::apply_moves;
pub use node::{
    InstanceFlavor, InstanceNode, Node, ResolvedProvider, ResourceFlavor, ResourceNode,
};
pub use options::{
    DEFAULT_PARALLELISM, GraphType, ImportTarget, PlanOptions, RefreshCounts, RefreshMode,
    RefreshStats, WalkOperation,
};
pub use plan_instance::config_changed;
pub use walk_context::{EvalContext, WalkContext};
