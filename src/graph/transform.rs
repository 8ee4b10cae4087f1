//! Graph transformer pipeline.
//!
//! A graph is built by running an ordered list of [`GraphTransformer`]s over
//! an initially empty [`Graph`]. Each transformer performs one kind of
//! structural edit. Later steps rely on the invariants established by
//! earlier ones, so every graph type fixes its own step order.

use tracing::{debug, trace};

use crate::error::{EngineError, GraphError, Result};

use super::dag::{Graph, Vertex};

/// A single graph-mutation pass.
pub trait GraphTransformer<V> {
    /// Short name for logging.
    fn name(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }

    /// Applies the pass to the graph.
    ///
    /// Running a pass whose effect is already present must be harmless.
    ///
    /// # Errors
    ///
    /// Returns an error when the pass cannot complete.
    fn transform(&self, graph: &mut Graph<V>) -> Result<()>;
}

impl<V, F> GraphTransformer<V> for F
where
    F: Fn(&mut Graph<V>) -> Result<()>,
{
    fn name(&self) -> String {
        "closure".to_string()
    }

    fn transform(&self, graph: &mut Graph<V>) -> Result<()> {
        self(graph)
    }
}

/// Runs several transformers in strict sequence, stopping at the first error.
pub struct Multi<'a, V> {
    steps: Vec<Box<dyn GraphTransformer<V> + 'a>>,
}

impl<'a, V: Vertex> Multi<'a, V> {
    /// Creates a combinator over the given steps.
    #[must_use]
    pub fn new(steps: Vec<Box<dyn GraphTransformer<V> + 'a>>) -> Self {
        Self { steps }
    }
}

impl<V: Vertex> GraphTransformer<V> for Multi<'_, V> {
    fn name(&self) -> String {
        format!(
            "Multi({})",
            self.steps.iter().map(|s| s.name()).collect::<Vec<_>>().join(", ")
        )
    }

    fn transform(&self, graph: &mut Graph<V>) -> Result<()> {
        for step in &self.steps {
            trace!("Running transformer {}", step.name());
            step.transform(graph).map_err(|e| wrap_step_error(&step.name(), e))?;
        }
        Ok(())
    }
}

fn wrap_step_error(step: &str, err: EngineError) -> EngineError {
    match err {
        EngineError::Internal(message) => EngineError::Graph(GraphError::TransformFailed {
            step: step.to_string(),
            message,
        }),
        other => other,
    }
}

/// Builds a graph by running transformer steps and then validating it.
pub struct GraphBuilder<'a, V> {
    name: String,
    steps: Vec<Box<dyn GraphTransformer<V> + 'a>>,
    validate: bool,
}

impl<'a, V: Vertex> GraphBuilder<'a, V> {
    /// Creates a builder for the named graph type.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Box<dyn GraphTransformer<V> + 'a>>) -> Self {
        Self {
            name: name.into(),
            steps,
            validate: true,
        }
    }

    /// Sets whether the finished graph is checked for cycles.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Runs every step on an empty graph.
    ///
    /// # Errors
    ///
    /// Returns the first step error, or a validation error when the result
    /// contains a cycle or a self reference.
    pub fn build(&self) -> Result<Graph<V>> {
        self.build_from(Graph::new())
    }

    /// Runs every step on an existing graph.
    ///
    /// # Errors
    ///
    /// See [`GraphBuilder::build`].
    pub fn build_from(&self, mut graph: Graph<V>) -> Result<Graph<V>> {
        debug!("Building {} graph with {} steps", self.name, self.steps.len());
        for step in &self.steps {
            let name = step.name();
            step.transform(&mut graph).map_err(|e| wrap_step_error(&name, e))?;
            trace!("{} graph after {}:\n{}", self.name, name, graph.dump());
        }
        if self.validate {
            graph.validate()?;
        }
        debug!(
            "Built {} graph: {} vertices, {} edges",
            self.name,
            graph.len(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
