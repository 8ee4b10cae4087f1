//! Expression evaluation and per-walk evaluation bookkeeping.
//!
//! The engine only depends on the [`Evaluator`] and [`Scope`] traits. The
//! bundled [`BuiltinEvaluator`] understands the `${...}` references of YAML
//! configurations.

mod evaluator;
mod expander;
mod named_values;

pub use evaluator::{BuiltinEvaluator, Evaluator, Scope, traverse};
pub use expander::{Expansion, InstanceExpander, RepetitionData};
pub use named_values::NamedValues;
