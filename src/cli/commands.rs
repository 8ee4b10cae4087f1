//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::addrs::{AbsResourceInstance, Target};
use crate::engine::{GraphType, PlanOptions, RefreshMode};
use crate::plans::PlanMode;
use crate::value::Value;

/// Graphform - plan and apply declarative infrastructure graphs.
#[derive(Parser, Debug)]
#[command(name = "graphform")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the root module file.
    #[arg(short, long, global = true, env = "GRAPHFORM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the state file.
    #[arg(short, long, global = true, env = "GRAPHFORM_STATE")]
    pub state: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration against provider schemas.
    Validate,

    /// Compute and display a plan.
    Plan {
        /// Planning options.
        #[command(flatten)]
        args: PlanArgs,

        /// Save the plan to this file.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Apply a saved plan, or plan and apply in one step.
    Apply {
        /// Saved plan file.
        plan_file: Option<PathBuf>,

        /// Planning options, used when no plan file is given.
        #[command(flatten)]
        args: PlanArgs,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Print a graph in DOT format.
    Graph {
        /// Graph to render (plan, apply, destroy, validate).
        #[arg(long = "type", default_value = "plan")]
        kind: GraphType,

        /// Planning options.
        #[command(flatten)]
        args: PlanArgs,
    },

    /// Inspect and manage state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Options shared by every command that plans.
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
    /// Refresh policy (full, none, config).
    #[arg(long, default_value = "full")]
    pub refresh: RefreshMode,

    /// Only refresh state; plan no changes.
    #[arg(long, conflicts_with = "destroy")]
    pub refresh_only: bool,

    /// Plan the destruction of every object in state.
    #[arg(long)]
    pub destroy: bool,

    /// Limit planning to these addresses and their dependencies.
    #[arg(long = "target", value_name = "ADDR")]
    pub targets: Vec<Target>,

    /// Exclude these addresses and everything depending on them.
    #[arg(long = "exclude", value_name = "ADDR")]
    pub excludes: Vec<Target>,

    /// Replace these instances even if unchanged.
    #[arg(long = "replace", value_name = "ADDR")]
    pub replace: Vec<AbsResourceInstance>,

    /// Root input variable, as `name=value`. Values are parsed as JSON when
    /// possible.
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, Value)>,

    /// Report output evaluation errors as warnings.
    #[arg(long)]
    pub lenient_outputs: bool,
}

impl PlanArgs {
    /// Converts the arguments into engine options.
    #[must_use]
    pub fn to_options(&self) -> PlanOptions {
        let mode = if self.destroy {
            PlanMode::Destroy
        } else if self.refresh_only {
            PlanMode::RefreshOnly
        } else {
            PlanMode::Normal
        };
        let mut options = PlanOptions::new()
            .with_mode(mode)
            .with_refresh_mode(self.refresh);
        options.targets.clone_from(&self.targets);
        options.excludes.clone_from(&self.excludes);
        options.force_replace.clone_from(&self.replace);
        options.warn_on_output_errors = self.lenient_outputs;
        for (name, value) in &self.vars {
            options.variables.insert(name.clone(), value.clone());
        }
        options
    }
}

fn parse_var(s: &str) -> Result<(String, Value), String> {
    let (name, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {s:?}"))?;
    if name.is_empty() {
        return Err(format!("missing variable name in {s:?}"));
    }
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map_or_else(|_| Value::from(raw), Value::from);
    Ok((name.to_string(), value))
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show the whole state.
    Show,

    /// List recorded resource instances.
    List,

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plan_args() {
        let cli = Cli::try_parse_from([
            "graphform",
            "plan",
            "--refresh",
            "config",
            "--target",
            "test_instance.a",
            "--var",
            "n=3",
            "--var",
            "name=web",
        ])
        .expect("parse");
        let Commands::Plan { args, out } = cli.command else {
            panic!("expected plan");
        };
        assert!(out.is_none());
        let options = args.to_options();
        assert_eq!(options.refresh_mode, RefreshMode::Config);
        assert_eq!(options.mode, PlanMode::Normal);
        assert_eq!(options.targets.len(), 1);
        assert_eq!(options.variables.get("n"), Some(&Value::from(3_i64)));
        assert_eq!(options.variables.get("name"), Some(&Value::from("web")));
    }

    #[test]
    fn test_refresh_only_conflicts_with_destroy() {
        let parsed = Cli::try_parse_from(["graphform", "plan", "--refresh-only", "--destroy"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_parse_var_rejects_missing_equals() {
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=3").is_err());
    }
}
