//! Configuration loading.
//!
//! This module handles everything that happens before a graph is built:
//! - Parsing module files and loading child modules recursively
//! - Compiling `${...}` expressions
//! - Static validation of declarations and references
//! - Computing configuration hashes for stale-plan detection

mod expr;
mod hash;
mod parser;
mod tree;
mod types;
mod validator;

pub use expr::{Expr, TemplatePart};
pub use hash::ConfigHasher;
pub use parser::{ConfigParser, DEFAULT_CONFIG_FILES, MAX_MODULE_DEPTH, find_config_file};
pub use tree::{Config, Module};
pub use types::{
    BlockMode, ConditionBlock, ImportBlock, Lifecycle, ModuleCallBlock, ModuleFile, MovedBlock,
    OutputBlock, ProviderBlock, ProviderPassing, RemovedBlock, RequiredProvider, ResourceBlock,
    VariableBlock,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
