//! Output formatting for CLI commands.
//!
//! This module renders plans, diagnostics and state either as colored text
//! with tables or as JSON.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ConfigHasher;
use crate::diagnostics::{Diagnostics, Severity};
use crate::engine::RefreshCounts;
use crate::plans::{Action, ActionReason, Plan, PlanMode, ResourceInstanceChange};
use crate::states::{LockInfo, ObjectStatus, State};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Planned change row for table display.
#[derive(Tabled)]
struct ChangeRow {
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// State instance row for table display.
#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Deposed")]
    deposed: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when rendering JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &Plan) -> String {
        let mut output = String::new();

        if !plan.drifted.is_empty() {
            let _ = writeln!(output, "\n{}", "Objects changed outside of graphform:".bold());
            for change in &plan.drifted {
                let _ = writeln!(output, "  {} {}", Self::format_action(change.action), change.addr);
            }
        }

        let visible: Vec<&ResourceInstanceChange> = plan
            .changes
            .resources
            .iter()
            .filter(|c| c.action != Action::NoOp)
            .collect();

        if visible.is_empty() {
            let message = match plan.mode {
                PlanMode::RefreshOnly if plan.has_changes() => {
                    "Refreshed state will be recorded on apply."
                }
                _ => "No changes. Infrastructure matches the configuration.",
            };
            let _ = writeln!(output, "\n{} {message}", "✓".green());
            return output;
        }

        let _ = writeln!(output, "\nPlan ({} mode)", plan.mode);
        let _ = writeln!(output, "   Config hash: {}\n", ConfigHasher::new().short_hash(&plan.config_hash));

        let rows: Vec<ChangeRow> = visible
            .iter()
            .map(|c| ChangeRow {
                action: Self::format_action(c.action),
                address: c.deposed.as_ref().map_or_else(
                    || c.addr.to_string(),
                    |key| format!("{} (deposed {key})", c.addr),
                ),
                reason: Self::format_reason(c),
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let (add, change, destroy) = plan.summary_counts();
        let _ = writeln!(
            output,
            "\nPlan: {} to add, {} to change, {} to destroy.",
            add.to_string().green(),
            change.to_string().yellow(),
            destroy.to_string().red()
        );
        output
    }

    /// Formats diagnostics, errors first.
    #[must_use]
    pub fn format_diagnostics(&self, diags: &Diagnostics) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(diags).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                for diag in diags.errors().chain(diags.warnings()) {
                    let label = match diag.severity {
                        Severity::Error => "Error:".red().bold(),
                        Severity::Warning => "Warning:".yellow().bold(),
                    };
                    let _ = writeln!(output, "\n{label} {}", diag.summary);
                    if let Some(subject) = &diag.subject {
                        let _ = writeln!(output, "  on {subject}");
                    }
                    if !diag.detail.is_empty() {
                        let _ = writeln!(output, "\n  {}", diag.detail);
                    }
                }
                output
            }
        }
    }

    /// Formats refresh counters.
    #[must_use]
    pub fn format_refresh_counts(&self, counts: &RefreshCounts) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(counts).unwrap_or_default(),
            OutputFormat::Text => format!(
                "Refreshed {} of {} managed resources, {} of {} data sources",
                counts.managed_refreshed, counts.managed_total, counts.data_refreshed, counts.data_total
            ),
        }
    }

    /// Formats the whole state.
    #[must_use]
    pub fn format_state(&self, state: &State) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => {
                let mut output = String::new();
                let _ = writeln!(output, "\nState {}", state.lineage.to_string().bold());
                let _ = writeln!(output, "   Serial: {}", state.serial);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated.format("%Y-%m-%d %H:%M:%S"));
                let _ = writeln!(output, "   Instances: {}\n", state.instances().len());
                output.push_str(&self.format_state_list(state));
                if !state.root_outputs.is_empty() {
                    let _ = writeln!(output, "\nOutputs:");
                    for (name, value) in &state.root_outputs {
                        let _ = writeln!(output, "   {name} = {value}");
                    }
                }
                output
            }
        }
    }

    /// Formats one row per recorded instance.
    #[must_use]
    pub fn format_state_list(&self, state: &State) -> String {
        let rows: Vec<InstanceRow> = state
            .resources
            .iter()
            .flat_map(|(addr, resource)| {
                resource.instances.iter().map(move |(key, instance)| InstanceRow {
                    address: addr.instance(key.clone()).to_string(),
                    provider: resource.provider.to_string(),
                    status: instance
                        .current
                        .as_ref()
                        .map_or_else(|| "-".dimmed().to_string(), |o| Self::format_status(o.status)),
                    deposed: instance.deposed.len(),
                })
            })
            .collect();
        match self.format {
            OutputFormat::Json => {
                let addrs: Vec<&str> = rows.iter().map(|r| r.address.as_str()).collect();
                serde_json::to_string_pretty(&addrs).unwrap_or_default()
            }
            OutputFormat::Text if rows.is_empty() => "No resources recorded.\n".to_string(),
            OutputFormat::Text => format!("{}\n", Table::new(rows)),
        }
    }

    /// Formats a lock record.
    #[must_use]
    pub fn format_lock(&self, lock: &LockInfo) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(lock).unwrap_or_default(),
            OutputFormat::Text => format!(
                "State locked: {} by {} ({}s remaining)",
                lock.lock_id,
                lock.holder,
                lock.remaining_secs()
            ),
        }
    }

    /// Formats an action with color.
    fn format_action(action: Action) -> String {
        let text = format!("{} {action}", action.symbol().trim());
        match action {
            Action::Create => text.green().to_string(),
            Action::Update => text.yellow().to_string(),
            Action::Delete => text.red().to_string(),
            Action::DeleteThenCreate | Action::CreateThenDelete => text.magenta().to_string(),
            Action::Read => text.cyan().to_string(),
            Action::NoOp | Action::Forget => text.dimmed().to_string(),
        }
    }

    fn format_reason(change: &ResourceInstanceChange) -> String {
        let reason = match change.action_reason {
            ActionReason::None if change.importing.is_some() => "import",
            ActionReason::None => "",
            ActionReason::ReplaceBecauseTainted => "tainted",
            ActionReason::ReplaceByRequest => "replace requested",
            ActionReason::ReplaceBecauseCannotUpdate => "forces replacement",
            ActionReason::DeleteBecauseNoResourceConfig => "no longer in configuration",
            ActionReason::DeleteBecauseWrongRepetition => "instance key no longer produced",
            ActionReason::DeleteBecauseNoModule => "module instance removed",
            ActionReason::ReadBecauseDependencyPending => "depends on pending changes",
            ActionReason::ReadBecauseConfigUnknown => "configuration known after apply",
        };
        if change.requires_replace.is_empty() {
            reason.to_string()
        } else {
            format!("{reason}: {}", change.requires_replace.join(", "))
        }
    }

    fn format_status(status: ObjectStatus) -> String {
        match status {
            ObjectStatus::Ready => "ready".green().to_string(),
            ObjectStatus::Tainted => "tainted".red().to_string(),
            ObjectStatus::Planned => "planned".yellow().to_string(),
        }
    }
}
