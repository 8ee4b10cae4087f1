//! Arena-backed dependency graph.
//!
//! An edge `from -> to` means "`from` depends on `to`": `to` must finish
//! before `from` may start. Vertex identities are stable across removals.

use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction;
use std::collections::BTreeSet;
use std::fmt::{self, Write};

use crate::error::GraphError;

/// Behaviour every graph vertex provides.
pub trait Vertex {
    /// Human-readable name, used for logging, dumps and error messages.
    fn name(&self) -> String;
}

/// Stable vertex identifier. Maps to a petgraph `NodeIndex<u32>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(pub u32);

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<NodeIndex<u32>> for VertexId {
    fn from(idx: NodeIndex<u32>) -> Self {
        Self(idx.index() as u32)
    }
}

impl From<VertexId> for NodeIndex<u32> {
    fn from(id: VertexId) -> Self {
        Self::new(id.0 as usize)
    }
}

/// A directed graph of vertices with idempotent edges.
#[derive(Debug, Clone)]
pub struct Graph<V> {
    inner: StableDiGraph<V, (), u32>,
}

impl<V> Default for Graph<V> {
    fn default() -> Self {
        Self {
            inner: StableDiGraph::default(),
        }
    }
}

impl<V: Vertex> Graph<V> {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a vertex and returns its identity.
    pub fn add(&mut self, vertex: V) -> VertexId {
        self.inner.add_node(vertex).into()
    }

    /// Removes a vertex together with every incident edge.
    pub fn remove(&mut self, id: VertexId) -> Option<V> {
        self.inner.remove_node(id.into())
    }

    /// Returns the vertex for an identity.
    #[must_use]
    pub fn vertex(&self, id: VertexId) -> Option<&V> {
        self.inner.node_weight(id.into())
    }

    /// Returns the vertex for an identity, mutably.
    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut V> {
        self.inner.node_weight_mut(id.into())
    }

    /// Returns true if the identity is present.
    #[must_use]
    pub fn contains(&self, id: VertexId) -> bool {
        self.inner.contains_node(id.into())
    }

    /// Records that `from` depends on `to`. Connecting twice is a no-op.
    ///
    /// Returns true if a new edge was added.
    pub fn connect(&mut self, from: VertexId, to: VertexId) -> bool {
        if !self.contains(from) || !self.contains(to) || self.has_edge(from, to) {
            return false;
        }
        self.inner.add_edge(from.into(), to.into(), ());
        true
    }

    /// Removes the edge `from -> to` if present.
    pub fn remove_edge(&mut self, from: VertexId, to: VertexId) -> bool {
        match self.inner.find_edge(from.into(), to.into()) {
            Some(edge) => self.inner.remove_edge(edge).is_some(),
            None => false,
        }
    }

    /// Returns true if `from` directly depends on `to`.
    #[must_use]
    pub fn has_edge(&self, from: VertexId, to: VertexId) -> bool {
        self.inner.find_edge(from.into(), to.into()).is_some()
    }

    /// All vertex identities in insertion order.
    #[must_use]
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = self.inner.node_indices().map(VertexId::from).collect();
        ids.sort_unstable();
        ids
    }

    /// All vertices with their identities, in insertion order.
    pub fn vertices(&self) -> impl Iterator<Item = (VertexId, &V)> {
        self.vertex_ids()
            .into_iter()
            .filter_map(move |id| self.vertex(id).map(|v| (id, v)))
    }

    /// All edges as `(from, to)` pairs, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<(VertexId, VertexId)> {
        let mut edges: Vec<(VertexId, VertexId)> = self
            .inner
            .edge_indices()
            .filter_map(|e| self.inner.edge_endpoints(e))
            .map(|(from, to)| (from.into(), to.into()))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.node_count()
    }

    /// Returns true if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    fn neighbors(&self, id: VertexId, dir: Direction) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = self
            .inner
            .neighbors_directed(id.into(), dir)
            .map(VertexId::from)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Direct dependencies of `id` (targets of its out-edges).
    #[must_use]
    pub fn dependencies(&self, id: VertexId) -> Vec<VertexId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Direct dependents of `id` (sources of its in-edges).
    #[must_use]
    pub fn dependents(&self, id: VertexId) -> Vec<VertexId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn reachable(&self, id: VertexId, dir: Direction) -> BTreeSet<VertexId> {
        let mut seen = BTreeSet::new();
        let mut stack = self.neighbors(id, dir);
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.neighbors(next, dir));
            }
        }
        seen
    }

    /// Every vertex `id` transitively depends on.
    #[must_use]
    pub fn ancestors(&self, id: VertexId) -> BTreeSet<VertexId> {
        self.reachable(id, Direction::Outgoing)
    }

    /// Every vertex that transitively depends on `id`.
    #[must_use]
    pub fn descendants(&self, id: VertexId) -> BTreeSet<VertexId> {
        self.reachable(id, Direction::Incoming)
    }

    /// Finds the first vertex matching a predicate.
    pub fn find(&self, mut pred: impl FnMut(&V) -> bool) -> Option<VertexId> {
        self.vertices().find(|(_, v)| pred(*v)).map(|(id, _)| id)
    }

    /// Returns every cycle as a set of vertices, including self-loops.
    #[must_use]
    pub fn cycles(&self) -> Vec<Vec<VertexId>> {
        let mut cycles: Vec<Vec<VertexId>> = tarjan_scc(&self.inner)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.inner.find_edge(scc[0], scc[0]).is_some())
            .map(|scc| {
                let mut ids: Vec<VertexId> = scc.into_iter().map(VertexId::from).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Removes edges implied by longer paths.
    ///
    /// For every `u`, an edge `u -> w` is dropped when `w` is also reachable
    /// through another direct dependency of `u`.
    pub fn reduce_transitive(&mut self) {
        for u in self.vertex_ids() {
            let direct: BTreeSet<VertexId> = self.dependencies(u).into_iter().collect();
            let mut redundant = BTreeSet::new();
            let mut seen = BTreeSet::new();
            let mut stack: Vec<VertexId> = direct.iter().copied().collect();
            while let Some(v) = stack.pop() {
                if !seen.insert(v) {
                    continue;
                }
                for w in self.dependencies(v) {
                    if w != u && direct.contains(&w) {
                        redundant.insert(w);
                    }
                    stack.push(w);
                }
            }
            for w in redundant {
                self.remove_edge(u, w);
            }
        }
    }

    /// Checks the graph has no self references and no cycles.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::SelfReference`] or [`GraphError::Cycle`].
    pub fn validate(&self) -> Result<(), GraphError> {
        for (id, v) in self.vertices() {
            if self.has_edge(id, id) {
                return Err(GraphError::SelfReference { name: v.name() });
            }
        }
        let cycles = self.cycles();
        if cycles.is_empty() {
            return Ok(());
        }
        let rendered = cycles
            .iter()
            .map(|cycle| {
                let mut names: Vec<String> = cycle.iter().map(|id| self.name_of(*id)).collect();
                names.sort();
                names.join(", ")
            })
            .collect::<Vec<_>>()
            .join("; ");
        Err(GraphError::Cycle { cycles: rendered })
    }

    /// Name of a vertex, or its id when missing.
    #[must_use]
    pub fn name_of(&self, id: VertexId) -> String {
        self.vertex(id).map_or_else(|| format!("<{id}>"), Vertex::name)
    }

    /// Deterministic text dump: each vertex name followed by its dependencies.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut lines: Vec<(String, Vec<String>)> = self
            .vertices()
            .map(|(id, v)| {
                let mut deps: Vec<String> = self.dependencies(id).into_iter().map(|d| self.name_of(d)).collect();
                deps.sort();
                (v.name(), deps)
            })
            .collect();
        lines.sort();
        let mut out = String::new();
        for (name, deps) in lines {
            let _ = writeln!(out, "{name}");
            for dep in deps {
                let _ = writeln!(out, "  {dep}");
            }
        }
        out
    }

    /// Renders the graph in Graphviz DOT format.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n  compound = \"true\"\n  newrank = \"true\"\n");
        for (_, v) in self.vertices() {
            let _ = writeln!(out, "  {:?}", v.name());
        }
        for (from, to) in self.edges() {
            let _ = writeln!(out, "  {:?} -> {:?}", self.name_of(from), self.name_of(to));
        }
        out.push_str("}\n");
        out
    }

    /// Consumes the graph, returning vertices and edges.
    #[must_use]
    pub fn into_parts(mut self) -> (Vec<(VertexId, V)>, Vec<(VertexId, VertexId)>) {
        let edges = self.edges();
        let vertices = self
            .vertex_ids()
            .into_iter()
            .filter_map(|id| self.inner.remove_node(id.into()).map(|v| (id, v)))
            .collect();
        (vertices, edges)
    }
}
