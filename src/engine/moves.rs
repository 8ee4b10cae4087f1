//! Address moves declared with `moved` blocks.
//!
//! Moves rewrite the previous run's state before anything is planned, so
//! every later step sees each object under its new address. Modules are
//! visited in tree order and blocks in declaration order, which lets a
//! block continue a chain started by an earlier one.

use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::addrs::{MoveEndpoint, ModuleInstance};
use crate::config::{Config, Module};
use crate::diagnostics::{Diagnostic, Diagnostics, SourceRange};
use crate::plans::ResourceInstanceMove;
use crate::states::State;

/// Applies every `moved` block to a copy of `prev_run`.
///
/// Returns the rewritten state and one record per moved instance. A move
/// whose destination is already occupied is skipped with a warning.
#[must_use]
pub fn apply_moves(config: &Config, prev_run: &State) -> (State, Vec<ResourceInstanceMove>, Diagnostics) {
    let mut state = prev_run.clone();
    let mut moves = Vec::new();
    let mut diags = Diagnostics::new();

    for module in config.modules() {
        for block in &module.file.moved {
            let (from, to) = match (block.from.parse::<MoveEndpoint>(), block.to.parse::<MoveEndpoint>()) {
                (Ok(from), Ok(to)) if from.same_kind(&to) => (from, to),
                _ => {
                    debug!("Skipping malformed move {} -> {}", block.from, block.to);
                    continue;
                }
            };
            for base in module_instances(&state, module) {
                let (src, dst) = (from.absolute(&base), to.absolute(&base));
                if let Some(warning) = apply_one(&mut state, &src, &dst, &mut moves) {
                    diags.push(warning.with_subject(Some(SourceRange {
                        filename: module.filename.clone(),
                        path: format!("moved.{}", block.from),
                    })));
                }
            }
        }
    }

    if !moves.is_empty() {
        info!("Moved {} object(s) to new addresses", moves.len());
    }
    (state, moves, diags)
}

/// Instances of `module` that have anything recorded.
fn module_instances(state: &State, module: &Module) -> BTreeSet<ModuleInstance> {
    state
        .resources
        .keys()
        .filter(|addr| module.path.is_ancestor_of(&addr.module.module()))
        .map(|addr| addr.module.truncate(module.path.depth()))
        .collect()
}

fn apply_one(
    state: &mut State,
    from: &MoveEndpoint,
    to: &MoveEndpoint,
    moves: &mut Vec<ResourceInstanceMove>,
) -> Option<Diagnostic> {
    let (found, moved) = match (from, to) {
        (MoveEndpoint::Resource(from), MoveEndpoint::Resource(to)) => {
            let keys: Vec<_> = state
                .resources
                .get(from)
                .map(|r| r.instances.keys().cloned().collect())
                .unwrap_or_default();
            let found = !keys.is_empty();
            let moved = found && state.move_resource(from, to);
            if moved {
                moves.extend(keys.into_iter().map(|key| ResourceInstanceMove {
                    from: from.instance(key.clone()),
                    to: to.instance(key),
                }));
            }
            (found, moved)
        }
        (MoveEndpoint::Instance(from), MoveEndpoint::Instance(to)) => {
            let found = state.instance(from).is_some_and(|i| !i.is_empty());
            let moved = found && state.move_instance(from, to);
            if moved {
                moves.push(ResourceInstanceMove {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            (found, moved)
        }
        _ => return None,
    };

    if moved {
        debug!("Moved {from} to {to}");
    }
    (found && !moved).then(|| {
        Diagnostic::warning(
            "Move destination already exists",
            format!("Cannot move {from} to {to} because an object is already recorded at {to}. The object stays at {from}."),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::{AbsProviderConfig, AbsResourceInstance, ModulePath, Provider};
    use crate::config::ConfigParser;
    use crate::states::ResourceInstanceObject;
    use crate::value::Value;

    fn config(main: &str, child: &str) -> Config {
        ConfigParser::new()
            .with_source("main.yaml", main)
            .with_source("child.yaml", child)
            .load_file("main.yaml")
            .expect("load")
    }

    fn addr(s: &str) -> AbsResourceInstance {
        s.parse().expect("address")
    }

    fn state_with(addrs: &[&str]) -> State {
        let provider = AbsProviderConfig::new(ModulePath::root(), Provider::default_for("test"), None);
        let mut state = State::new();
        for a in addrs {
            state.set_current(&addr(a), Some(ResourceInstanceObject::new(Value::from(*a))), &provider);
        }
        state
    }

    #[test]
    fn test_chained_moves_follow_declaration_order() {
        let cfg = config(
            "moved:\n  - from: test_instance.a\n    to: test_instance.b\n  - from: test_instance.b\n    to: test_instance.c\n",
            "",
        );
        let (state, moves, diags) = apply_moves(&cfg, &state_with(&["test_instance.a"]));
        assert!(!diags.has_errors());
        assert_eq!(state.instances(), vec![addr("test_instance.c")]);
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].from, addr("test_instance.a"));
        assert_eq!(moves[1].to, addr("test_instance.c"));
    }

    #[test]
    fn test_moves_in_child_module_apply_to_every_instance() {
        let main = "modules:\n  - name: net\n    source: child.yaml\n    count: 2\n";
        let child = "moved:\n  - from: test_instance.old[0]\n    to: test_instance.new\n";
        let prior = state_with(&["module.net[0].test_instance.old[0]", "module.net[1].test_instance.old[0]"]);
        let (state, moves, _) = apply_moves(&config(main, child), &prior);
        assert_eq!(moves.len(), 2);
        assert_eq!(
            state.instances(),
            vec![addr("module.net[0].test_instance.new"), addr("module.net[1].test_instance.new")]
        );
    }

    #[test]
    fn test_occupied_destination_is_a_warning() {
        let cfg = config("moved:\n  - from: test_instance.a\n    to: test_instance.b\n", "");
        let prior = state_with(&["test_instance.a", "test_instance.b"]);
        let (state, moves, diags) = apply_moves(&cfg, &prior);
        assert!(moves.is_empty());
        assert_eq!(state, prior);
        assert!(!diags.has_errors());
        assert!(diags.iter().any(|d| d.summary == "Move destination already exists"));
    }
}
