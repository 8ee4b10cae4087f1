//! Command-line interface for graphform.
//!
//! Argument definitions live in `commands`, rendering of plans, state and
//! diagnostics in `output`.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, PlanArgs, StateCommands};
pub use output::OutputFormatter;
