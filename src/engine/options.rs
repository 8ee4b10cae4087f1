//! Options for engine operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::addrs::{AbsResourceInstance, Target};
use crate::error::ConfigError;
use crate::plans::PlanMode;
use crate::value::Value;

/// Default bound on concurrent provider calls.
pub const DEFAULT_PARALLELISM: usize = 10;

/// How prior objects are refreshed before planning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Refresh every instance that has a prior object.
    #[default]
    Full,
    /// Never refresh.
    None,
    /// Refresh only instances whose configuration changed since the last
    /// apply, plus data sources that depend on managed resources.
    Config,
}

impl fmt::Display for RefreshMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::None => write!(f, "none"),
            Self::Config => write!(f, "config"),
        }
    }
}

impl FromStr for RefreshMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" | "true" => Ok(Self::Full),
            "none" | "false" => Ok(Self::None),
            "config" => Ok(Self::Config),
            other => Err(ConfigError::ValidationError {
                message: format!("unknown refresh mode {other:?}; expected full, none or config"),
                field: Some("refresh".to_string()),
            }),
        }
    }
}

/// Refresh counters shared by every instance visited during one plan.
#[derive(Debug, Default)]
pub struct RefreshStats {
    managed_total: AtomicUsize,
    managed_refreshed: AtomicUsize,
    managed_skipped: AtomicUsize,
    data_total: AtomicUsize,
    data_refreshed: AtomicUsize,
    data_skipped: AtomicUsize,
}

/// A point-in-time copy of [`RefreshStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshCounts {
    /// Managed instances considered.
    pub managed_total: usize,
    /// Managed instances refreshed.
    pub managed_refreshed: usize,
    /// Managed instances whose refresh was skipped.
    pub managed_skipped: usize,
    /// Data source instances considered.
    pub data_total: usize,
    /// Data source instances read.
    pub data_refreshed: usize,
    /// Data source instances whose read was skipped.
    pub data_skipped: usize,
}

impl RefreshStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one managed instance.
    pub fn record_managed(&self, refreshed: bool) {
        self.managed_total.fetch_add(1, Ordering::Relaxed);
        if refreshed {
            self.managed_refreshed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.managed_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Counts one data source instance.
    pub fn record_data(&self, refreshed: bool) {
        self.data_total.fetch_add(1, Ordering::Relaxed);
        if refreshed {
            self.data_refreshed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.data_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reads all counters.
    #[must_use]
    pub fn counts(&self) -> RefreshCounts {
        RefreshCounts {
            managed_total: self.managed_total.load(Ordering::Relaxed),
            managed_refreshed: self.managed_refreshed.load(Ordering::Relaxed),
            managed_skipped: self.managed_skipped.load(Ordering::Relaxed),
            data_total: self.data_total.load(Ordering::Relaxed),
            data_refreshed: self.data_refreshed.load(Ordering::Relaxed),
            data_skipped: self.data_skipped.load(Ordering::Relaxed),
        }
    }
}

/// An import requested through plan options rather than configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTarget {
    /// Instance to import into.
    pub addr: AbsResourceInstance,
    /// Provider-specific object id.
    pub id: String,
}

/// Options for [`Context::plan`](super::Context::plan).
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Planning mode.
    pub mode: PlanMode,
    /// Refresh policy.
    pub refresh_mode: RefreshMode,
    /// Limit planning to these addresses and their dependencies.
    pub targets: Vec<Target>,
    /// Exclude these addresses and everything that depends on them.
    pub excludes: Vec<Target>,
    /// Instances to replace even if their configuration is unchanged.
    pub force_replace: Vec<AbsResourceInstance>,
    /// Root module input variables.
    pub variables: BTreeMap<String, Value>,
    /// Optional counters updated by every resource instance.
    pub refresh_stats: Option<Arc<RefreshStats>>,
    /// Imports in addition to the configuration's `imports` blocks.
    pub imports: Vec<ImportTarget>,
    /// Report output evaluation failures as warnings instead of errors.
    pub warn_on_output_errors: bool,
}

impl PlanOptions {
    /// Options for a normal plan with full refresh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the plan mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: PlanMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the refresh mode.
    #[must_use]
    pub const fn with_refresh_mode(mut self, refresh_mode: RefreshMode) -> Self {
        self.refresh_mode = refresh_mode;
        self
    }

    /// Attaches shared refresh counters.
    #[must_use]
    pub fn with_refresh_stats(mut self, stats: Arc<RefreshStats>) -> Self {
        self.refresh_stats = Some(stats);
        self
    }

    /// Sets a root input variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// The kind of walk a graph is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalkOperation {
    /// Static validation; no provider is configured.
    Validate,
    /// Normal or refresh-only planning.
    Plan,
    /// Planning the destruction of every object in state.
    PlanDestroy,
    /// Applying a plan.
    Apply,
}

impl fmt::Display for WalkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => write!(f, "validate"),
            Self::Plan => write!(f, "plan"),
            Self::PlanDestroy => write!(f, "plan-destroy"),
            Self::Apply => write!(f, "apply"),
        }
    }
}

/// Graph types that [`Context::graph`](super::Context::graph) can render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    /// The validate graph.
    Validate,
    /// The plan graph.
    #[default]
    Plan,
    /// The plan graph for destroy mode.
    PlanDestroy,
    /// The apply graph of a freshly computed plan.
    Apply,
}

impl FromStr for GraphType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validate" => Ok(Self::Validate),
            "plan" => Ok(Self::Plan),
            "destroy" | "plan-destroy" => Ok(Self::PlanDestroy),
            "apply" => Ok(Self::Apply),
            other => Err(ConfigError::ValidationError {
                message: format!("unknown graph type {other:?}"),
                field: Some("type".to_string()),
            }),
        }
    }
}
