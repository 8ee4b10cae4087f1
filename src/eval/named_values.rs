//! Evaluated input variables, locals and outputs for every module instance.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::addrs::ModuleInstance;
use crate::value::Value;

type ValueMap = RwLock<BTreeMap<(ModuleInstance, String), Value>>;

/// Synchronized storage for named values produced during a walk.
#[derive(Debug, Default)]
pub struct NamedValues {
    variables: ValueMap,
    locals: ValueMap,
    outputs: ValueMap,
}

fn set(map: &ValueMap, module: &ModuleInstance, name: &str, value: Value) {
    map.write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert((module.clone(), name.to_string()), value);
}

fn get(map: &ValueMap, module: &ModuleInstance, name: &str) -> Option<Value> {
    map.read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&(module.clone(), name.to_string()))
        .cloned()
}

impl NamedValues {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an input variable value.
    pub fn set_variable(&self, module: &ModuleInstance, name: &str, value: Value) {
        set(&self.variables, module, name, value);
    }

    /// An input variable value, if it has been evaluated.
    #[must_use]
    pub fn variable(&self, module: &ModuleInstance, name: &str) -> Option<Value> {
        get(&self.variables, module, name)
    }

    /// Records a local value.
    pub fn set_local(&self, module: &ModuleInstance, name: &str, value: Value) {
        set(&self.locals, module, name, value);
    }

    /// A local value, if it has been evaluated.
    #[must_use]
    pub fn local(&self, module: &ModuleInstance, name: &str) -> Option<Value> {
        get(&self.locals, module, name)
    }

    /// Records an output value.
    pub fn set_output(&self, module: &ModuleInstance, name: &str, value: Value) {
        set(&self.outputs, module, name, value);
    }

    /// An output value, if it has been evaluated.
    #[must_use]
    pub fn output(&self, module: &ModuleInstance, name: &str) -> Option<Value> {
        get(&self.outputs, module, name)
    }

    /// Every evaluated output of one module instance.
    #[must_use]
    pub fn outputs_of(&self, module: &ModuleInstance) -> BTreeMap<String, Value> {
        self.outputs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|((m, _), _)| m == module)
            .map(|((_, name), value)| (name.clone(), value.clone()))
            .collect()
    }
}
