//! Engine entry points: validate, plan, apply and graph rendering.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::addrs::{ModuleInstance, ResourceMode};
use crate::config::{Config, ConfigHasher, ConfigValidator};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{EngineError, PlanError, Result};
use crate::eval::{BuiltinEvaluator, Evaluator};
use crate::graph::{Graph, Visitor, WalkReport, Walker};
use crate::plans::{Action, Changes, Plan, PlanMode, ResourceInstanceChange};
use crate::providers::ProviderRegistry;
use crate::states::State;
use crate::value::Value;

use super::builder::{apply_graph, plan_destroy_graph, plan_graph, validate_graph};
use super::moves::apply_moves;
use super::node::Node;
use super::options::{
    DEFAULT_PARALLELISM, GraphType, PlanOptions, RefreshMode, RefreshStats, WalkOperation,
};
use super::visitor::GraphVisitor;
use super::walk_context::{WalkContext, WalkInputs};

/// Checks option combinations that are rejected before any graph work.
fn check_options(options: &PlanOptions) -> Result<()> {
    if options.refresh_mode == RefreshMode::Config && options.mode == PlanMode::RefreshOnly {
        return Err(PlanError::IncompatibleOptions {
            message: "refresh=config cannot be combined with refresh-only planning".to_string(),
        }
        .into());
    }
    if !options.force_replace.is_empty() && options.mode != PlanMode::Normal {
        return Err(PlanError::IncompatibleOptions {
            message: format!("replacing objects is not supported in {} mode", options.mode),
        }
        .into());
    }
    Ok(())
}

/// Managed instances whose refreshed object differs from the prior run.
fn detect_drift(prev_run: &State, refreshed: &State) -> Vec<ResourceInstanceChange> {
    let mut drifted = Vec::new();
    for addr in prev_run.instances() {
        if addr.mode() != ResourceMode::Managed {
            continue;
        }
        let (Some(before), Some(provider)) = (
            prev_run.current(&addr),
            prev_run.resource_provider(&addr.abs_resource()),
        ) else {
            continue;
        };
        let (action, after) = match refreshed.current(&addr) {
            None => (Action::Delete, Value::Null),
            Some(after) if !after.value.equivalent_ignoring_empty(&before.value) => {
                (Action::Update, after.value.clone())
            }
            Some(_) => continue,
        };
        debug!("{addr} changed outside of graphform");
        drifted.push(ResourceInstanceChange::new(
            addr,
            provider.clone(),
            action,
            before.value.clone(),
            after,
        ));
    }
    drifted
}

/// Runs engine operations over one loaded configuration.
pub struct Context {
    config: Arc<Config>,
    registry: ProviderRegistry,
    evaluator: Arc<dyn Evaluator>,
    parallelism: usize,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("registry", &self.registry)
            .field("parallelism", &self.parallelism)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a context using the built-in expression evaluator.
    #[must_use]
    pub fn new(config: Config, registry: ProviderRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            evaluator: Arc::new(BuiltinEvaluator::new()),
            parallelism: DEFAULT_PARALLELISM,
            cancel: CancellationToken::new(),
        }
    }

    /// Replaces the expression evaluator.
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Bounds the number of concurrent provider calls.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stops scheduling new vertices in running and future walks.
    ///
    /// Visits already in flight finish their current provider call.
    pub fn stop(&self) {
        warn!("Stopping: no new operations will start");
        self.cancel.cancel();
    }

    fn config_hash(&self) -> String {
        ConfigHasher::new().hash_config(&self.config)
    }

    fn walk_context(
        &self,
        operation: WalkOperation,
        options: PlanOptions,
        state: &State,
        prev_run: &State,
        changes: Changes,
    ) -> Arc<WalkContext> {
        Arc::new(WalkContext::new(WalkInputs {
            operation,
            config: Arc::clone(&self.config),
            options,
            state: state.clone(),
            refresh_state: state.clone(),
            prev_run_state: prev_run.clone(),
            changes,
            registry: self.registry.clone(),
            evaluator: Arc::clone(&self.evaluator),
            parallelism: self.parallelism,
        }))
    }

    async fn walk(&self, graph: Graph<Node>, walk: &Arc<WalkContext>) -> Diagnostics {
        info!("Walking {} graph with {} vertices", walk.operation, graph.len());
        let visitor: Arc<dyn Visitor<Node>> = Arc::new(GraphVisitor::new(Arc::clone(walk)));
        let WalkReport {
            mut diagnostics,
            completed,
            failed,
            blocked,
            cancelled,
        } = Walker::new(self.cancel.child_token()).walk(graph, visitor).await;
        debug!(
            "{} walk finished: {} completed, {} failed, {} blocked",
            walk.operation,
            completed.len(),
            failed.len(),
            blocked.len()
        );
        if !cancelled.is_empty() {
            warn!("{} vertices were not started", cancelled.len());
            diagnostics.push_error(PlanError::Cancelled.into());
        }
        diagnostics
    }

    /// Statically validates the configuration and every resource block
    /// against its provider schema. No provider is configured.
    pub async fn validate(&self) -> Diagnostics {
        info!("Validating configuration");
        let mut diags = ConfigValidator::new().validate(&self.config).into_diagnostics();
        if diags.has_errors() {
            return diags;
        }
        let graph = match validate_graph(&self.config) {
            Ok(graph) => graph,
            Err(err) => {
                diags.push_error(err);
                return diags;
            }
        };
        let empty = State::new();
        let walk = self.walk_context(
            WalkOperation::Validate,
            PlanOptions::new(),
            &empty,
            &empty,
            Changes::new(),
        );
        diags.append(self.walk(graph, &walk).await);
        diags
    }

    /// Computes a plan against the state the previous run left behind.
    ///
    /// The returned plan is always populated; when the diagnostics contain
    /// errors it is marked errored and [`Context::apply`] refuses it.
    pub async fn plan(&self, prev_run: &State, mut options: PlanOptions) -> (Plan, Diagnostics) {
        info!("Planning in {} mode with {} refresh", options.mode, options.refresh_mode);
        let mut plan = Plan::new(options.mode, prev_run.clone(), self.config_hash());
        plan.targets.clone_from(&options.targets);
        plan.excludes.clone_from(&options.excludes);
        plan.force_replace.clone_from(&options.force_replace);
        plan.variables.clone_from(&options.variables);

        let mut diags = Diagnostics::new();
        if let Err(err) = check_options(&options) {
            diags.push_error(err);
            plan.errored = true;
            return (plan, diags);
        }
        diags.append(ConfigValidator::new().validate(&self.config).into_diagnostics());
        if diags.has_errors() {
            plan.errored = true;
            return (plan, diags);
        }

        let (moved, moves, move_diags) = apply_moves(&self.config, prev_run);
        diags.append(move_diags);
        let prev_run = &moved;
        plan.prior_state = moved.clone();
        plan.prev_run_state = moved.clone();
        plan.moves = moves;

        let stats = options
            .refresh_stats
            .get_or_insert_with(|| Arc::new(RefreshStats::new()))
            .clone();
        if !options.targets.is_empty() || !options.excludes.is_empty() {
            diags.push(Diagnostic::warning(
                "Resource targeting is in effect",
                "The plan may be incomplete: only the targeted objects and their dependencies are considered.",
            ));
        }

        let result = match options.mode {
            PlanMode::Normal | PlanMode::RefreshOnly => self.plan_walk(prev_run, &options, &mut plan).await,
            PlanMode::Destroy => self.plan_destroy(prev_run, &options, &mut plan).await,
        };
        match result {
            Ok(walk_diags) => diags.append(walk_diags),
            Err(err) => diags.push_error(err),
        }

        if options.refresh_mode == RefreshMode::Config {
            let counts = stats.counts();
            diags.push(Diagnostic::warning(
                "Selective refresh mode",
                format!(
                    "Only objects whose configuration changed were refreshed: {} of {} managed resources and {} of {} data sources.",
                    counts.managed_refreshed,
                    counts.managed_total,
                    counts.data_refreshed,
                    counts.data_total
                ),
            ));
        }

        plan.drifted = detect_drift(prev_run, &plan.prior_state);
        plan.errored = diags.has_errors();
        let (add, change, destroy) = plan.summary_counts();
        info!("Plan: {add} to add, {change} to change, {destroy} to destroy");
        (plan, diags)
    }

    async fn plan_walk(&self, prev_run: &State, options: &PlanOptions, plan: &mut Plan) -> Result<Diagnostics> {
        let graph = plan_graph(&self.config, prev_run, options)?;
        let walk = self.walk_context(WalkOperation::Plan, options.clone(), prev_run, prev_run, Changes::new());
        let diags = self.walk(graph, &walk).await;
        plan.prior_state = walk.refresh_state.snapshot();
        plan.changes = walk.changes.snapshot();
        plan.root_outputs = walk.named_values.outputs_of(&ModuleInstance::root());
        Ok(diags)
    }

    async fn plan_destroy(&self, prev_run: &State, options: &PlanOptions, plan: &mut Plan) -> Result<Diagnostics> {
        let mut diags = Diagnostics::new();
        let refreshed = if options.refresh_mode == RefreshMode::None {
            prev_run.clone()
        } else {
            debug!("Refreshing before planning destroy");
            let refresh_options = options.clone().with_mode(PlanMode::RefreshOnly);
            let mut refresh_plan = Plan::new(PlanMode::RefreshOnly, prev_run.clone(), "");
            diags.append(self.plan_walk(prev_run, &refresh_options, &mut refresh_plan).await?);
            if diags.has_errors() {
                return Ok(diags);
            }
            refresh_plan.prior_state
        };

        let graph = plan_destroy_graph(&self.config, &refreshed, options)?;
        let walk = self.walk_context(
            WalkOperation::PlanDestroy,
            options.clone(),
            &refreshed,
            prev_run,
            Changes::new(),
        );
        diags.append(self.walk(graph, &walk).await);
        plan.prior_state = refreshed;
        plan.changes = walk.changes.snapshot();
        Ok(diags)
    }

    /// Applies a plan and returns the new state.
    ///
    /// On failure the returned state still records everything that was
    /// applied before the error.
    pub async fn apply(&self, plan: &Plan) -> (State, Diagnostics) {
        let mut diags = Diagnostics::new();
        if plan.errored {
            diags.push_error(PlanError::Errored.into());
            return (plan.prior_state.clone(), diags);
        }
        let found = self.config_hash();
        if !ConfigHasher::hashes_match(&plan.config_hash, &found) {
            diags.push_error(
                PlanError::StalePlan {
                    expected: plan.config_hash.clone(),
                    found,
                }
                .into(),
            );
            return (plan.prior_state.clone(), diags);
        }

        info!("Applying {} changes", plan.changes.resources.len());
        let mut state = plan.prior_state.clone();
        state.root_outputs.clear();
        let destroy = plan.mode == PlanMode::Destroy;
        let graph = match apply_graph(&self.config, &state, &plan.changes, destroy) {
            Ok(graph) => graph,
            Err(err) => {
                diags.push_error(err);
                return (state, diags);
            }
        };

        let mut options = PlanOptions::new().with_mode(plan.mode);
        options.variables.clone_from(&plan.variables);
        let walk = self.walk_context(
            WalkOperation::Apply,
            options,
            &state,
            &plan.prev_run_state,
            plan.changes.clone(),
        );
        diags.append(self.walk(graph, &walk).await);

        let mut new_state = walk.state.snapshot();
        new_state.touch();
        (new_state, diags)
    }

    /// Builds one of the engine's graphs without walking it.
    ///
    /// The apply graph needs a plan, so one is computed first.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be built or, for the apply
    /// graph, if planning fails.
    pub async fn graph(&self, kind: GraphType, state: &State, options: PlanOptions) -> Result<Graph<Node>> {
        match kind {
            GraphType::Validate => validate_graph(&self.config),
            GraphType::Plan => plan_graph(&self.config, state, &options),
            GraphType::PlanDestroy => plan_destroy_graph(&self.config, state, &options),
            GraphType::Apply => {
                let (plan, diags) = self.plan(state, options).await;
                if let Some(err) = diags.errors().next() {
                    return Err(EngineError::internal(format!(
                        "planning failed: {}: {}",
                        err.summary, err.detail
                    )));
                }
                apply_graph(
                    &self.config,
                    &plan.prior_state,
                    &plan.changes,
                    plan.mode == PlanMode::Destroy,
                )
            }
        }
    }
}
