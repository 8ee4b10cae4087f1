//! Custom conditions from `lifecycle` blocks.
//!
//! A condition that is not yet known is skipped; it is checked again on a
//! later pass once its inputs are known. Null and non-boolean results are
//! errors in their own right.

use std::fmt;
use tracing::{debug, trace};

use crate::addrs::AbsResourceInstance;
use crate::config::ConditionBlock;
use crate::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use crate::eval::RepetitionData;
use crate::value::Value;

use super::walk_context::EvalContext;

/// Which list of conditions is being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConditionKind {
    /// Checked before the instance is planned or applied.
    Precondition,
    /// Checked against the planned or applied object.
    Postcondition,
}

impl ConditionKind {
    const fn summary(self) -> &'static str {
        match self {
            Self::Precondition => "Resource precondition failed",
            Self::Postcondition => "Resource postcondition failed",
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precondition => write!(f, "precondition"),
            Self::Postcondition => write!(f, "postcondition"),
        }
    }
}

/// The conditions of one resource instance and the scope to check them in.
pub(super) struct ConditionCheck<'a> {
    /// Module instance scope of the resource.
    pub ctx: &'a EvalContext,
    /// The instance being checked.
    pub addr: &'a AbsResourceInstance,
    /// `count` or `for_each` data of the instance.
    pub repetition: &'a RepetitionData,
}

impl ConditionCheck<'_> {
    /// Checks `checks` in order and reports every failure.
    ///
    /// `self_value` binds `self`; preconditions pass `None`.
    pub(super) fn run(
        &self,
        kind: ConditionKind,
        checks: &[ConditionBlock],
        self_value: Option<&Value>,
    ) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for (index, check) in checks.iter().enumerate() {
            if let Some(diag) = self.check_one(kind, check, self_value) {
                let subject = self.ctx.module().map(|m| SourceRange {
                    filename: m.filename.clone(),
                    path: format!(
                        "resources.{}.lifecycle.{kind}[{index}]",
                        self.addr.resource.resource
                    ),
                });
                diags.push(diag.with_subject(subject));
            }
        }
        diags
    }

    fn check_one(&self, kind: ConditionKind, check: &ConditionBlock, self_value: Option<&Value>) -> Option<Diagnostic> {
        let addr = self.addr;
        let result = match self.ctx.evaluate_with_self(&check.condition, self.repetition, self_value) {
            Ok(value) => value,
            Err(err) => return Some(Diagnostic::from(err)),
        };
        let passed = match result {
            Value::Unknown => {
                trace!("Deferring {kind} of {addr}: result not yet known");
                return None;
            }
            Value::Bool(b) => b,
            Value::String(s) if s == "true" || s == "false" => s == "true",
            Value::Null => {
                return Some(Diagnostic::error(
                    "Invalid condition result",
                    format!("The {kind} of {addr} must return either true or false, not null."),
                ));
            }
            other => {
                return Some(Diagnostic::error(
                    "Invalid condition result",
                    format!("The {kind} of {addr} must return either true or false, not {other}."),
                ));
            }
        };
        if passed {
            return None;
        }

        debug!("{kind} of {addr} failed");
        let message = match self.ctx.evaluate_with_self(&check.error_message, self.repetition, self_value) {
            Ok(Value::String(text)) if !text.is_empty() => text,
            Ok(_) => format!("The {kind} of {addr} failed."),
            Err(err) => format!("The {kind} of {addr} failed, and its error message could not be evaluated: {err}"),
        };
        Some(Diagnostic::error(kind.summary(), message))
    }
}
