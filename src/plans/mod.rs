//! Planned changes and saved plans.

mod action;
mod changes;
mod plan;

pub use action::{Action, ActionReason};
pub use changes::{Changes, Importing, ResourceInstanceChange, ResourceInstanceMove, SyncChanges};
pub use plan::{Plan, PlanMode};
