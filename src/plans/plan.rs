//! Saved plans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::fs;
use tracing::info;

use crate::addrs::{AbsResourceInstance, Target};
use crate::error::{ConfigError, EngineError, Result};
use crate::states::State;
use crate::value::Value;

use super::action::Action;
use super::changes::{Changes, ResourceInstanceChange, ResourceInstanceMove};

/// What a plan is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Converge real objects to the configuration.
    #[default]
    Normal,
    /// Destroy every object in state.
    Destroy,
    /// Only update state to match real objects.
    RefreshOnly,
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Destroy => write!(f, "destroy"),
            Self::RefreshOnly => write!(f, "refresh-only"),
        }
    }
}

/// The result of planning, and the input to apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Planning mode.
    pub mode: PlanMode,
    /// Planned changes.
    pub changes: Changes,
    /// Objects that changed outside of the engine since the last run.
    #[serde(default)]
    pub drifted: Vec<ResourceInstanceChange>,
    /// Objects moved to new addresses before planning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub moves: Vec<ResourceInstanceMove>,
    /// State after refresh. Apply starts from this.
    pub prior_state: State,
    /// State as it was before refresh.
    pub prev_run_state: State,
    /// Fingerprint of the configuration the plan was made from.
    pub config_hash: String,
    /// Root input variable values used for planning.
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    /// Planned root output values.
    #[serde(default)]
    pub root_outputs: BTreeMap<String, Value>,
    /// Target filters in effect.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Exclude filters in effect.
    #[serde(default)]
    pub excludes: Vec<Target>,
    /// Instances the user asked to replace.
    #[serde(default)]
    pub force_replace: Vec<AbsResourceInstance>,
    /// Set when planning reported errors. Errored plans cannot be applied.
    #[serde(default)]
    pub errored: bool,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
}

impl Plan {
    /// Creates an empty plan over a prior state.
    #[must_use]
    pub fn new(mode: PlanMode, prior_state: State, config_hash: impl Into<String>) -> Self {
        Self {
            mode,
            changes: Changes::new(),
            drifted: Vec::new(),
            moves: Vec::new(),
            prev_run_state: prior_state.clone(),
            prior_state,
            config_hash: config_hash.into(),
            variables: BTreeMap::new(),
            root_outputs: BTreeMap::new(),
            targets: Vec::new(),
            excludes: Vec::new(),
            force_replace: Vec::new(),
            errored: false,
            created_at: Utc::now(),
        }
    }

    /// Returns true if apply would change anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
            || !self.moves.is_empty()
            || (self.mode == PlanMode::RefreshOnly && self.prior_state != self.prev_run_state)
    }

    /// Number of instances to add, change and destroy.
    #[must_use]
    pub fn summary_counts(&self) -> (usize, usize, usize) {
        let mut add = 0;
        let mut change = 0;
        let mut destroy = 0;
        for c in &self.changes.resources {
            match c.action {
                Action::Create => add += 1,
                Action::Update => change += 1,
                Action::Delete => destroy += 1,
                Action::DeleteThenCreate | Action::CreateThenDelete => {
                    add += 1;
                    destroy += 1;
                }
                Action::NoOp | Action::Read | Action::Forget => {}
            }
        }
        (add, change, destroy)
    }

    /// Writes the plan as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        info!("Saved plan to {}", path.display());
        Ok(())
    }

    /// Reads a plan written by [`Plan::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or not a plan.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EngineError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|e| {
            EngineError::Config(ConfigError::ParseError {
                message: format!("invalid plan file: {e}"),
                location: Some(path.display().to_string()),
            })
        })
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (add, change, destroy) = self.summary_counts();
        if self.changes.is_empty() {
            return match self.moves.len() {
                0 => write!(f, "No changes."),
                moved => write!(f, "No changes. {moved} object(s) moved to new addresses."),
            };
        }
        write!(f, "Plan: {add} to add, {change} to change, {destroy} to destroy.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{AbsProviderConfig, ModulePath, Provider};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("plan.json");

        let mut plan = Plan::new(PlanMode::Normal, State::new(), "abc");
        plan.changes.upsert(ResourceInstanceChange::new(
            "test_instance.a".parse().expect("addr"),
            AbsProviderConfig::new(ModulePath::root(), Provider::default_for("test"), None),
            Action::DeleteThenCreate,
            Value::map([("ami", Value::from("old"))]),
            Value::map([("ami", Value::from("new")), ("id", Value::Unknown)]),
        ));
        plan.save(&path).await.expect("save");

        let loaded = Plan::load(&path).await.expect("load");
        assert_eq!(loaded.changes, plan.changes);
        assert_eq!(loaded.summary_counts(), (1, 0, 1));
        assert_eq!(loaded.to_string(), "Plan: 1 to add, 0 to change, 1 to destroy.");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = Plan::load(Path::new("/nonexistent/plan.json")).await.expect_err("missing");
        assert!(matches!(err, EngineError::Config(ConfigError::FileNotFound { .. })));
    }
}
