// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![allow(clippy::module_name_repetitions)]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Graphform
//!
//! A graph-based plan and apply engine for declarative infrastructure
//! configurations.
//!
//! ## Overview
//!
//! Graphform loads a tree of YAML modules that declare resources, data
//! sources, providers, variables, locals and outputs. It compares them with
//! the state recorded by the previous run and produces a [`plans::Plan`]:
//! one action per resource instance (create, update, replace, delete, read,
//! forget or no-op). Applying the plan drives pluggable providers and
//! records the resulting objects in a new [`states::State`].
//!
//! ## Architecture
//!
//! 1. **Graph construction**: an ordered list of transformers builds a
//!    dependency graph from configuration and state.
//! 2. **Walk**: vertices run concurrently once their dependencies finish.
//!    Resources with `count` or `for_each` expand into instance vertices
//!    while the walk is running.
//! 3. **Instance planning**: each instance is refreshed (or not, depending on
//!    the refresh mode), diffed against its configuration and recorded.
//!
//! ## Modules
//!
//! - [`addrs`]: Module, resource, provider and reference addresses
//! - [`config`]: Configuration loading, validation and hashing
//! - [`graph`]: Generic DAG, transformer pipeline and concurrent walker
//! - [`engine`]: Graph builders, vertices and the [`Context`] entry points
//! - [`providers`]: Provider interface, schemas, registry and the echo provider
//! - [`plans`]: Planned changes and saved plans
//! - [`states`]: Recorded state and its storage
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! required_providers:
//!   echo:
//!     source: builtin/echo
//!
//! variables:
//!   - name: replicas
//!     default: 2
//!
//! resources:
//!   - type: echo_value
//!     name: web
//!     count: "${var.replicas}"
//!     attributes:
//!       image: nginx
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod addrs;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod eval;
pub mod graph;
pub mod plans;
pub mod providers;
pub mod states;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{Config, ConfigParser, ConfigValidator};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use engine::{Context, PlanOptions, RefreshMode, RefreshStats};
pub use error::{EngineError, Result};
pub use plans::{Plan, PlanMode};
pub use providers::{ProviderInterface, ProviderRegistry};
pub use states::{LocalStateStore, State, StateStore};
pub use value::Value;
