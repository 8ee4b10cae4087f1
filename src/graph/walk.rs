//! Dependency-respecting concurrent graph walker.
//!
//! Every vertex is visited on its own task once all of its dependencies have
//! finished successfully. A visit may return a subgraph ([`Visit::expanded`]);
//! the walker splices it into the pending work and only considers the
//! expanding vertex finished once every spliced vertex has finished.
//!
//! A failing vertex does not abort the walk. Its dependents are skipped and
//! reported as blocked, while unrelated branches continue. Cancellation stops
//! new visits from starting; visits already in flight run to completion.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{EngineError, GraphError, PlanError};

use super::dag::{Graph, Vertex, VertexId};

/// Result of visiting a single vertex.
#[derive(Debug)]
pub struct Visit<V> {
    /// Diagnostics produced by the visit.
    pub diagnostics: Diagnostics,
    /// Subgraph produced by dynamic expansion, if any.
    pub expansion: Option<Graph<V>>,
}

impl<V> Visit<V> {
    /// A visit that produced only diagnostics.
    #[must_use]
    pub const fn done(diagnostics: Diagnostics) -> Self {
        Self {
            diagnostics,
            expansion: None,
        }
    }

    /// A visit that expanded into a subgraph.
    #[must_use]
    pub const fn expanded(diagnostics: Diagnostics, graph: Graph<V>) -> Self {
        Self {
            diagnostics,
            expansion: Some(graph),
        }
    }
}

/// Work performed for each vertex during a walk.
#[async_trait]
pub trait Visitor<V>: Send + Sync {
    /// Visits one vertex.
    async fn visit(&self, vertex: &V) -> Visit<V>;
}

/// Summary of a finished walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Aggregated diagnostics from every visit.
    pub diagnostics: Diagnostics,
    /// Names of vertices that finished successfully.
    pub completed: Vec<String>,
    /// Names of vertices whose own visit failed.
    pub failed: Vec<String>,
    /// Names of vertices skipped because a dependency failed.
    pub blocked: Vec<String>,
    /// Names of vertices abandoned because of cancellation.
    pub cancelled: Vec<String>,
}

impl WalkReport {
    /// Returns true if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Running,
    Expanded { remaining: usize, child_failed: bool },
    Done,
    Failed,
    Incomplete,
    Blocked,
}

struct Entry<V> {
    vertex: Arc<V>,
    name: String,
    waiting: usize,
    dependents: Vec<usize>,
    parent: Option<usize>,
    status: Status,
}

/// Walks a graph with a visitor.
#[derive(Debug, Clone, Default)]
pub struct Walker {
    cancel: CancellationToken,
}

impl Walker {
    /// Creates a walker that stops scheduling when `cancel` fires.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Walks the graph to completion or cancellation.
    pub async fn walk<V>(&self, graph: Graph<V>, visitor: Arc<dyn Visitor<V>>) -> WalkReport
    where
        V: Vertex + Send + Sync + 'static,
    {
        let mut report = WalkReport::default();
        if let Err(err) = graph.validate() {
            error!("Refusing to walk malformed graph: {err}");
            report.diagnostics.push_error(err.into());
            return report;
        }

        let mut state = WalkState::new(visitor);
        state.splice(graph, None);
        state.run(&self.cancel, &mut report).await;
        report
    }
}

struct WalkState<V> {
    entries: Vec<Entry<V>>,
    ready: VecDeque<usize>,
    visitor: Arc<dyn Visitor<V>>,
}

impl<V> WalkState<V>
where
    V: Vertex + Send + Sync + 'static,
{
    fn new(visitor: Arc<dyn Visitor<V>>) -> Self {
        Self {
            entries: Vec::new(),
            ready: VecDeque::new(),
            visitor,
        }
    }

    /// Adds a graph's vertices to the pending work. Returns how many were added.
    fn splice(&mut self, graph: Graph<V>, parent: Option<usize>) -> usize {
        let (vertices, edges) = graph.into_parts();
        let mut index: HashMap<VertexId, usize> = HashMap::with_capacity(vertices.len());
        let added = vertices.len();
        for (id, vertex) in vertices {
            index.insert(id, self.entries.len());
            self.entries.push(Entry {
                name: vertex.name(),
                vertex: Arc::new(vertex),
                waiting: 0,
                dependents: Vec::new(),
                parent,
                status: Status::Pending,
            });
        }
        for (from, to) in edges {
            if let (Some(&from), Some(&to)) = (index.get(&from), index.get(&to)) {
                self.entries[from].waiting += 1;
                self.entries[to].dependents.push(from);
            }
        }
        let mut fresh: Vec<usize> = index.into_values().collect();
        fresh.sort_unstable();
        for idx in fresh {
            if self.entries[idx].waiting == 0 {
                self.ready.push_back(idx);
            }
        }
        added
    }

    async fn run(&mut self, cancel: &CancellationToken, report: &mut WalkReport) {
        let mut tasks: JoinSet<(usize, Result<Visit<V>, tokio::task::JoinError>)> = JoinSet::new();
        let mut cancelled = cancel.is_cancelled();

        loop {
            if !cancelled {
                while let Some(idx) = self.ready.pop_front() {
                    if self.entries[idx].status != Status::Pending {
                        continue;
                    }
                    self.entries[idx].status = Status::Running;
                    trace!("Visiting {}", self.entries[idx].name);
                    let vertex = Arc::clone(&self.entries[idx].vertex);
                    let visitor = Arc::clone(&self.visitor);
                    tasks.spawn(async move {
                        let inner = tokio::spawn(async move { visitor.visit(&vertex).await });
                        (idx, inner.await)
                    });
                }
            }

            if tasks.is_empty() {
                break;
            }

            let joined = tokio::select! {
                biased;
                () = cancel.cancelled(), if !cancelled => {
                    warn!("Walk cancelled; waiting for {} in-flight visits", tasks.len());
                    cancelled = true;
                    continue;
                }
                joined = tasks.join_next() => joined,
            };

            match joined {
                Some(Ok((idx, Ok(visit)))) => self.handle_visit(idx, visit, report),
                Some(Ok((idx, Err(join_err)))) => {
                    let name = self.entries[idx].name.clone();
                    error!("Visit of {name} panicked: {join_err}");
                    report.diagnostics.push(Diagnostic::error(
                        "Internal error",
                        format!("visit of {name} did not complete: {join_err}"),
                    ));
                    self.fail(idx, report);
                }
                Some(Err(join_err)) => {
                    error!("Walker task failed: {join_err}");
                    report
                        .diagnostics
                        .push_error(EngineError::internal(format!("walker task failed: {join_err}")));
                }
                None => break,
            }
        }

        let pending: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].status == Status::Pending)
            .collect();
        if pending.is_empty() {
            return;
        }
        if cancelled {
            for &idx in &pending {
                report.cancelled.push(self.entries[idx].name.clone());
            }
            debug!("Abandoned {} vertices after cancellation", pending.len());
            let mut diag: Diagnostic = EngineError::Plan(PlanError::Cancelled).into();
            diag.detail = format!(
                "The operation was cancelled before {} pending steps could start.",
                pending.len()
            );
            report.diagnostics.push(diag);
        } else {
            report
                .diagnostics
                .push_error(GraphError::Stalled { pending: pending.len() }.into());
        }
    }

    fn handle_visit(&mut self, idx: usize, visit: Visit<V>, report: &mut WalkReport) {
        let failed = visit.diagnostics.has_errors();
        report.diagnostics.append(visit.diagnostics);
        if failed {
            debug!("{} failed", self.entries[idx].name);
            self.fail(idx, report);
            return;
        }

        if let Some(subgraph) = visit.expansion {
            if let Err(err) = subgraph.validate() {
                report.diagnostics.push_error(
                    GraphError::ExpansionFailed {
                        name: self.entries[idx].name.clone(),
                        message: err.to_string(),
                    }
                    .into(),
                );
                self.fail(idx, report);
                return;
            }
            let added = self.splice(subgraph, Some(idx));
            if added > 0 {
                debug!("{} expanded into {added} vertices", self.entries[idx].name);
                self.entries[idx].status = Status::Expanded {
                    remaining: added,
                    child_failed: false,
                };
                return;
            }
        }

        self.entries[idx].status = Status::Done;
        report.completed.push(self.entries[idx].name.clone());
        self.finish(idx, true, report);
    }

    fn fail(&mut self, idx: usize, report: &mut WalkReport) {
        self.entries[idx].status = Status::Failed;
        report.failed.push(self.entries[idx].name.clone());
        self.finish(idx, false, report);
    }

    /// Propagates completion of `idx` to its dependents and its expanding parent.
    fn finish(&mut self, idx: usize, ok: bool, report: &mut WalkReport) {
        let mut queue = VecDeque::from([(idx, ok)]);
        while let Some((current, ok)) = queue.pop_front() {
            let dependents = self.entries[current].dependents.clone();
            let current_name = self.entries[current].name.clone();
            for dep in dependents {
                let entry = &mut self.entries[dep];
                if ok {
                    entry.waiting = entry.waiting.saturating_sub(1);
                    if entry.waiting == 0 && entry.status == Status::Pending {
                        self.ready.push_back(dep);
                    }
                } else if entry.status == Status::Pending {
                    entry.status = Status::Blocked;
                    debug!("{} blocked by failed dependency {current_name}", entry.name);
                    report.blocked.push(entry.name.clone());
                    queue.push_back((dep, false));
                }
            }

            let Some(parent) = self.entries[current].parent else {
                continue;
            };
            if let Status::Expanded {
                remaining,
                child_failed,
            } = self.entries[parent].status
            {
                let remaining = remaining.saturating_sub(1);
                let child_failed = child_failed || !ok;
                if remaining > 0 {
                    self.entries[parent].status = Status::Expanded {
                        remaining,
                        child_failed,
                    };
                    continue;
                }
                let parent_ok = !child_failed;
                self.entries[parent].status = if parent_ok {
                    report.completed.push(self.entries[parent].name.clone());
                    Status::Done
                } else {
                    Status::Incomplete
                };
                queue.push_back((parent, parent_ok));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone)]
    struct TestVertex {
        name: String,
        fail: bool,
        expand: Vec<String>,
    }

    impl TestVertex {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail: false,
                expand: Vec::new(),
            }
        }
    }

    impl Vertex for TestVertex {
        fn name(&self) -> String {
            self.name.clone()
        }
    }

    #[derive(Default)]
    struct Recorder {
        order: Mutex<Vec<String>>,
        delay: Duration,
    }

    #[async_trait]
    impl Visitor<TestVertex> for Recorder {
        async fn visit(&self, vertex: &TestVertex) -> Visit<TestVertex> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.order.lock().expect("lock").push(vertex.name.clone());
            if vertex.fail {
                return Visit::done(Diagnostic::error("boom", vertex.name.clone()).into());
            }
            if vertex.expand.is_empty() {
                return Visit::done(Diagnostics::new());
            }
            let mut sub = Graph::new();
            for child in &vertex.expand {
                sub.add(TestVertex::new(child));
            }
            Visit::expanded(Diagnostics::new(), sub)
        }
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).expect("visited")
    }

    #[tokio::test]
    async fn test_dependencies_finish_before_dependents() {
        let mut g = Graph::new();
        let a = g.add(TestVertex::new("a"));
        let b = g.add(TestVertex::new("b"));
        let c = g.add(TestVertex::new("c"));
        g.connect(b, a);
        g.connect(c, b);

        let recorder = Arc::new(Recorder::default());
        let report = Walker::default().walk(g, recorder.clone()).await;
        assert!(!report.has_errors());
        let order = recorder.order.lock().expect("lock").clone();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(report.completed.len(), 3);
    }

    #[tokio::test]
    async fn test_failure_blocks_dependents_only() {
        let mut g = Graph::new();
        let mut bad = TestVertex::new("bad");
        bad.fail = true;
        let bad = g.add(bad);
        let child = g.add(TestVertex::new("child"));
        let grandchild = g.add(TestVertex::new("grandchild"));
        g.add(TestVertex::new("sibling"));
        g.connect(child, bad);
        g.connect(grandchild, child);

        let recorder = Arc::new(Recorder::default());
        let report = Walker::default().walk(g, recorder.clone()).await;

        assert_eq!(report.diagnostics.errors().count(), 1, "root cause reported once");
        assert_eq!(report.failed, vec!["bad"]);
        let mut blocked = report.blocked.clone();
        blocked.sort();
        assert_eq!(blocked, vec!["child", "grandchild"]);
        assert!(report.completed.contains(&"sibling".to_string()));
        let order = recorder.order.lock().expect("lock").clone();
        assert!(!order.contains(&"child".to_string()));
    }

    #[tokio::test]
    async fn test_expansion_completes_before_dependents() {
        let mut g = Graph::new();
        let mut expander = TestVertex::new("expander");
        expander.expand = vec!["inst0".to_string(), "inst1".to_string()];
        let expander = g.add(expander);
        let after = g.add(TestVertex::new("after"));
        g.connect(after, expander);

        let recorder = Arc::new(Recorder::default());
        let report = Walker::default().walk(g, recorder.clone()).await;
        assert!(!report.has_errors());
        let order = recorder.order.lock().expect("lock").clone();
        assert!(position(&order, "inst0") < position(&order, "after"));
        assert!(position(&order, "inst1") < position(&order, "after"));
        assert!(report.completed.contains(&"expander".to_string()));
    }

    #[tokio::test]
    async fn test_cycle_is_fatal() {
        let mut g = Graph::new();
        let a = g.add(TestVertex::new("a"));
        let b = g.add(TestVertex::new("b"));
        g.connect(a, b);
        g.connect(b, a);

        let recorder = Arc::new(Recorder::default());
        let report = Walker::default().walk(g, recorder.clone()).await;
        assert!(report.has_errors());
        assert!(recorder.order.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_abandons_pending_vertices() {
        let mut g = Graph::new();
        let first = g.add(TestVertex::new("first"));
        let second = g.add(TestVertex::new("second"));
        let third = g.add(TestVertex::new("third"));
        g.connect(second, first);
        g.connect(third, second);

        let token = CancellationToken::new();
        let recorder = Arc::new(Recorder {
            order: Mutex::new(Vec::new()),
            delay: Duration::from_millis(50),
        });
        let walker = Walker::new(token.clone());
        let handle = tokio::spawn({
            let recorder = recorder.clone();
            async move { walker.walk(g, recorder).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        let report = handle.await.expect("walk task");

        // The in-flight visit finishes; nothing after it starts.
        assert_eq!(recorder.order.lock().expect("lock").clone(), vec!["first"]);
        assert_eq!(report.cancelled.len(), 2);
        assert_eq!(report.diagnostics.errors().count(), 1);
        assert!(report.blocked.is_empty());
    }
}
