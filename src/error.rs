//! Error types for the graphform engine.
//!
//! This module provides the error hierarchy for every stage of an engine
//! invocation: configuration loading, graph construction, provider calls,
//! state storage and planning. Errors are converted into
//! [`Diagnostics`](crate::diagnostics::Diagnostics) before they reach callers
//! of [`Context`](crate::engine::Context).

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the graphform engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Graph construction and walk errors.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Provider errors.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// State management errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Several independent errors reported together.
    #[error("{}", join_errors(.0))]
    Multiple(Vec<EngineError>),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_errors(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Duplicate declaration.
    #[error("Duplicate {kind} name: {name}")]
    DuplicateName {
        /// Kind of declaration (resource, module call, variable, ...).
        kind: String,
        /// The duplicated name.
        name: String,
    },

    /// An address or reference string could not be parsed.
    #[error("Invalid address {input:?}: {message}")]
    InvalidAddress {
        /// The text that failed to parse.
        input: String,
        /// Why it failed.
        message: String,
    },

    /// A reference points at something that is not declared.
    #[error("Reference to undeclared {kind} {name:?}")]
    UndeclaredReference {
        /// Kind of object referenced.
        kind: String,
        /// Name that was referenced.
        name: String,
    },

    /// A count or for_each argument cannot be used to expand instances.
    #[error("Invalid {argument} argument for {addr}: {message}")]
    InvalidRepetition {
        /// Either `count` or `for_each`.
        argument: &'static str,
        /// The resource or module call being expanded.
        addr: String,
        /// Explanation.
        message: String,
    },

    /// A required input variable has no value.
    #[error("No value for required variable {name:?}")]
    MissingVariable {
        /// Variable name.
        name: String,
    },

    /// A provider chain supplies more than one instance key expression.
    #[error("Provider instance key for {addr} is specified more than once: {message}")]
    DuplicateProviderKey {
        /// The consumer or proxy whose chain conflicts.
        addr: String,
        /// Explanation.
        message: String,
    },
}

/// Graph construction and walk errors.
///
/// These indicate that the graph itself cannot be trusted and are fatal to
/// the whole operation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Cycles were found after transformation.
    #[error("Cycle detected: {cycles}")]
    Cycle {
        /// Rendered description of each cycle.
        cycles: String,
    },

    /// A vertex depends on itself.
    #[error("Self reference: {name}")]
    SelfReference {
        /// Name of the offending vertex.
        name: String,
    },

    /// A transformer step failed.
    #[error("Transformer {step} failed: {message}")]
    TransformFailed {
        /// Name of the failing step.
        step: String,
        /// Failure description.
        message: String,
    },

    /// Dynamic expansion of a vertex produced an invalid subgraph.
    #[error("Failed to expand {name}: {message}")]
    ExpansionFailed {
        /// Name of the expanding vertex.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Pending vertices remain but none can become ready.
    #[error("Walk stalled with {pending} vertices unable to run")]
    Stalled {
        /// Number of vertices left unvisited.
        pending: usize,
    },
}

/// Provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A provider configuration referenced by a consumer does not exist.
    #[error("Provider configuration not present: {addr} is required by {consumer}")]
    ConfigurationNotPresent {
        /// Missing provider configuration address.
        addr: String,
        /// Vertex that needs it.
        consumer: String,
    },

    /// No factory is registered for a provider.
    #[error("Provider {provider} is not available")]
    NotAvailable {
        /// Provider source address.
        provider: String,
    },

    /// The provider instance has not been configured yet.
    #[error("Provider {addr} is not initialized")]
    NotInitialized {
        /// Provider configuration address.
        addr: String,
    },

    /// The provider does not support the requested type.
    #[error("Provider {provider} does not support {kind} type {type_name:?}")]
    UnsupportedType {
        /// Provider source address.
        provider: String,
        /// `resource` or `data source`.
        kind: &'static str,
        /// Requested type.
        type_name: String,
    },

    /// A provider call returned an error.
    #[error("{operation} failed for {addr}: {message}")]
    CallFailed {
        /// Operation name.
        operation: &'static str,
        /// Address the call was made for.
        addr: String,
        /// Error description.
        message: String,
    },
}

/// State management errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// State file not found.
    #[error("State file not found: {path}")]
    NotFound {
        /// Path to the missing state file.
        path: PathBuf,
    },

    /// State is corrupted.
    #[error("State is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing state to storage failed.
    #[error("Failed to write state: {message}")]
    WriteFailed {
        /// Description of the failure.
        message: String,
    },

    /// State lock acquisition failed.
    #[error("Failed to acquire state lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// State lock is held by another process.
    #[error("State is locked by another process (lock holder: {holder}, since: {since})")]
    LockedByOther {
        /// Identifier of the lock holder.
        holder: String,
        /// When the lock was acquired.
        since: String,
    },

    /// Serialization error.
    #[error("Failed to serialize state: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Planning and apply errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// Requested options cannot be combined.
    #[error("Incompatible plan options: {message}")]
    IncompatibleOptions {
        /// Explanation.
        message: String,
    },

    /// The configuration changed after the plan was created.
    #[error("Saved plan is stale: configuration hash {expected} does not match {found}")]
    StalePlan {
        /// Hash recorded in the plan.
        expected: String,
        /// Hash of the current configuration.
        found: String,
    },

    /// The plan was produced by a run that reported errors.
    #[error("Cannot apply a plan that has errors")]
    Errored,

    /// A resource with `prevent_destroy` would be destroyed.
    #[error("Instance cannot be destroyed: {addr} has lifecycle.prevent_destroy set")]
    PreventDestroy {
        /// Instance address.
        addr: String,
    },

    /// The walk was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias for graphform operations.
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Creates an internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        Self::Config(ConfigError::ValidationError {
            message: message.into(),
            field,
        })
    }

    /// Creates an error from a failed provider call.
    #[must_use]
    pub fn provider_call(
        operation: &'static str,
        addr: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider(ProviderError::CallFailed {
            operation,
            addr: addr.into(),
            message: message.into(),
        })
    }

    /// Returns true if this error means the graph itself cannot be trusted.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        match self {
            Self::Graph(_) | Self::Provider(ProviderError::ConfigurationNotPresent { .. }) => true,
            Self::Multiple(errors) => errors.iter().any(Self::is_structural),
            _ => false,
        }
    }

    /// Returns true if this error is potentially retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::State(StateError::LockedByOther { .. } | StateError::LockFailed { .. })
        )
    }

    /// Detail line used when the error becomes a diagnostic: the inner
    /// message without the category prefix or a repeated summary.
    #[must_use]
    pub fn detail(&self) -> String {
        let message = match self {
            Self::Config(e) => e.to_string(),
            Self::Graph(e) => e.to_string(),
            Self::Provider(e) => e.to_string(),
            Self::State(e) => e.to_string(),
            Self::Plan(e) => e.to_string(),
            Self::Io(e) => e.to_string(),
            Self::Internal(message) => message.clone(),
            Self::Multiple(_) => self.to_string(),
        };
        match message
            .strip_prefix(self.summary())
            .and_then(|rest| rest.strip_prefix(": "))
        {
            Some(rest) if !rest.is_empty() => rest.to_string(),
            _ => message,
        }
    }

    /// Short summary line used when the error becomes a diagnostic.
    #[must_use]
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Config(ConfigError::InvalidRepetition { argument: "count", .. }) => {
                "Invalid count argument"
            }
            Self::Config(ConfigError::InvalidRepetition { .. }) => "Invalid for_each argument",
            Self::Config(ConfigError::MissingVariable { .. }) => "No value for required variable",
            Self::Config(_) => "Invalid configuration",
            Self::Graph(GraphError::Cycle { .. }) => "Cycle in dependency graph",
            Self::Graph(_) => "Invalid dependency graph",
            Self::Provider(ProviderError::ConfigurationNotPresent { .. }) => {
                "Provider configuration not present"
            }
            Self::Provider(_) => "Provider error",
            Self::State(_) => "State error",
            Self::Plan(PlanError::IncompatibleOptions { .. }) => "Incompatible plan options",
            Self::Plan(PlanError::PreventDestroy { .. }) => "Instance cannot be destroyed",
            Self::Plan(PlanError::Cancelled) => "Operation cancelled",
            Self::Plan(_) => "Plan error",
            Self::Multiple(_) => "Multiple errors",
            Self::Io(_) => "IO error",
            Self::Internal(_) => "Internal error",
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::State(StateError::SerializationError {
            message: err.to_string(),
        })
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(ConfigError::ParseError {
            message: err.to_string(),
            location: err.location().map(|loc| format!("line {}, column {}", loc.line(), loc.column())),
        })
    }
}
