//! Change actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What apply will do to one resource instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Nothing changes. Still recorded so apply can see the instance.
    NoOp,
    /// Create a new object.
    Create,
    /// Read a data source during apply.
    Read,
    /// Update the object in place.
    Update,
    /// Destroy the old object, then create the new one.
    DeleteThenCreate,
    /// Create the new object, then destroy the old one.
    CreateThenDelete,
    /// Destroy the object.
    Delete,
    /// Drop the object from state without destroying it.
    Forget,
}

impl Action {
    /// Returns true for either replace ordering.
    #[must_use]
    pub const fn is_replace(self) -> bool {
        matches!(self, Self::DeleteThenCreate | Self::CreateThenDelete)
    }

    /// Returns true if apply creates or updates an object.
    #[must_use]
    pub const fn creates(self) -> bool {
        matches!(
            self,
            Self::Create | Self::Update | Self::Read | Self::NoOp | Self::DeleteThenCreate | Self::CreateThenDelete
        )
    }

    /// Returns true if apply destroys or forgets an object.
    #[must_use]
    pub const fn destroys(self) -> bool {
        matches!(
            self,
            Self::Delete | Self::Forget | Self::DeleteThenCreate | Self::CreateThenDelete
        )
    }

    /// Single-character symbol used in plan rendering.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::NoOp => " ",
            Self::Create => "+",
            Self::Read => "<=",
            Self::Update => "~",
            Self::DeleteThenCreate => "-/+",
            Self::CreateThenDelete => "+/-",
            Self::Delete => "-",
            Self::Forget => ".",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoOp => "no-op",
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::DeleteThenCreate => "replace",
            Self::CreateThenDelete => "replace (create first)",
            Self::Delete => "delete",
            Self::Forget => "forget",
        };
        write!(f, "{s}")
    }
}

/// Why an action was chosen, when it is not obvious from the diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionReason {
    /// No special reason.
    #[default]
    None,
    /// The object is tainted.
    ReplaceBecauseTainted,
    /// The user asked for a replacement.
    ReplaceByRequest,
    /// A force-new attribute changed.
    ReplaceBecauseCannotUpdate,
    /// The resource is no longer in configuration.
    DeleteBecauseNoResourceConfig,
    /// The instance key is no longer produced by `count`/`for_each`.
    DeleteBecauseWrongRepetition,
    /// The module instance is no longer expanded.
    DeleteBecauseNoModule,
    /// A data source depends on a managed resource with pending changes.
    ReadBecauseDependencyPending,
    /// A data source configuration contains unknown values.
    ReadBecauseConfigUnknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_both_creates_and_destroys() {
        for action in [Action::DeleteThenCreate, Action::CreateThenDelete] {
            assert!(action.is_replace());
            assert!(action.creates());
            assert!(action.destroys());
        }
        assert!(!Action::Delete.creates());
        assert!(Action::Forget.destroys());
        assert!(!Action::NoOp.destroys());
    }
}
