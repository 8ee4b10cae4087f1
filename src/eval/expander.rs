//! Instance expansion bookkeeping.
//!
//! Module calls and resources record how they expanded once their `count`
//! or `for_each` has been evaluated. Later vertices ask the expander which
//! instances exist instead of re-evaluating repetition expressions.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use crate::addrs::{AbsResource, AbsResourceInstance, InstanceKey, ModuleInstance, ModulePath};
use crate::error::ConfigError;
use crate::value::Value;

/// How one module call or resource expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// No repetition argument: exactly one instance with no key.
    Single,
    /// `count`: integer keys `0..n`.
    Count(usize),
    /// `for_each`: string keys with their values.
    ForEach(BTreeMap<String, Value>),
}

/// Values of `count.index`, `each.key` and `each.value` for one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepetitionData {
    /// `count.index`, when expanded by `count`.
    pub count_index: Option<Value>,
    /// `each.key`, when expanded by `for_each`.
    pub each_key: Option<Value>,
    /// `each.value`, when expanded by `for_each`.
    pub each_value: Option<Value>,
}

impl RepetitionData {
    /// Repetition data where every symbol is available but unknown.
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            count_index: Some(Value::Unknown),
            each_key: Some(Value::Unknown),
            each_value: Some(Value::Unknown),
        }
    }
}

impl Expansion {
    /// Interprets an evaluated `count` argument.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is unknown, null, negative or not a
    /// whole number.
    pub fn from_count(value: &Value, addr: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidRepetition {
            argument: "count",
            addr: addr.to_string(),
            message: message.to_string(),
        };
        if !value.is_known() {
            return Err(invalid(
                "the count value depends on values that cannot be determined until apply",
            ));
        }
        if value.is_null() {
            return Err(invalid("the count value is null"));
        }
        let n = value
            .as_i64()
            .ok_or_else(|| invalid("the count value must be a whole number"))?;
        let n = usize::try_from(n).map_err(|_| invalid("the count value must not be negative"))?;
        Ok(Self::Count(n))
    }

    /// Interprets an evaluated `for_each` argument.
    ///
    /// A map expands to one instance per key. A list of strings is treated as
    /// a set, with `each.value` equal to `each.key`.
    ///
    /// # Errors
    ///
    /// Returns an error when the value or any of its keys is unknown, when it
    /// is null, or when it is neither a map nor a list of strings.
    pub fn from_for_each(value: &Value, addr: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidRepetition {
            argument: "for_each",
            addr: addr.to_string(),
            message: message.to_string(),
        };
        match value {
            Value::Unknown => Err(invalid(
                "the for_each value depends on values that cannot be determined until apply",
            )),
            Value::Null => Err(invalid("the for_each value is null")),
            Value::Map(entries) => Ok(Self::ForEach(entries.clone())),
            Value::List(items) => {
                let mut entries = BTreeMap::new();
                for item in items {
                    match item {
                        Value::String(key) => {
                            entries.insert(key.clone(), item.clone());
                        }
                        Value::Unknown => {
                            return Err(invalid(
                                "the for_each set includes values that cannot be determined until apply",
                            ));
                        }
                        _ => return Err(invalid("for_each sets must contain only strings")),
                    }
                }
                Ok(Self::ForEach(entries))
            }
            _ => Err(invalid("the for_each value must be a map or a set of strings")),
        }
    }

    /// Instance keys in order.
    #[must_use]
    pub fn keys(&self) -> Vec<InstanceKey> {
        match self {
            Self::Single => vec![InstanceKey::NoKey],
            Self::Count(n) => (0..*n)
                .map(|i| InstanceKey::Int(i64::try_from(i).unwrap_or(i64::MAX)))
                .collect(),
            Self::ForEach(entries) => entries.keys().cloned().map(InstanceKey::String).collect(),
        }
    }

    /// Repetition data for one instance key.
    #[must_use]
    pub fn repetition_data(&self, key: &InstanceKey) -> RepetitionData {
        match (self, key) {
            (Self::Count(_), InstanceKey::Int(i)) => RepetitionData {
                count_index: Some(Value::from(*i)),
                ..RepetitionData::default()
            },
            (Self::ForEach(entries), InstanceKey::String(k)) => RepetitionData {
                count_index: None,
                each_key: Some(Value::from(k.as_str())),
                each_value: Some(entries.get(k).cloned().unwrap_or_default()),
            },
            _ => RepetitionData::default(),
        }
    }

    /// True if `key` is one of the keys this expansion produces.
    #[must_use]
    pub fn has_key(&self, key: &InstanceKey) -> bool {
        match (self, key) {
            (Self::Single, InstanceKey::NoKey) => true,
            (Self::Count(n), InstanceKey::Int(i)) => usize::try_from(*i).is_ok_and(|i| i < *n),
            (Self::ForEach(entries), InstanceKey::String(k)) => entries.contains_key(k),
            _ => false,
        }
    }
}

/// Records expansions for one walk.
#[derive(Debug, Default)]
pub struct InstanceExpander {
    modules: RwLock<BTreeMap<(ModuleInstance, String), Expansion>>,
    resources: RwLock<BTreeMap<AbsResource, Expansion>>,
}

impl InstanceExpander {
    /// Creates an empty expander.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records how a module call expanded inside one parent instance.
    pub fn set_module_expansion(&self, parent: &ModuleInstance, call: &str, expansion: Expansion) {
        self.modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((parent.clone(), call.to_string()), expansion);
    }

    /// How a module call expanded inside one parent instance.
    #[must_use]
    pub fn module_expansion(&self, parent: &ModuleInstance, call: &str) -> Option<Expansion> {
        self.modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(parent.clone(), call.to_string()))
            .cloned()
    }

    /// Every known instance of a static module path.
    ///
    /// Paths whose calls have not been expanded yet have no instances.
    #[must_use]
    pub fn module_instances(&self, path: &ModulePath) -> Vec<ModuleInstance> {
        let Some(parent) = path.parent() else {
            return vec![ModuleInstance::root()];
        };
        let Some(call) = path.call_name() else {
            return vec![ModuleInstance::root()];
        };
        self.module_instances(&parent)
            .into_iter()
            .flat_map(|instance| {
                let keys = self
                    .module_expansion(&instance, call)
                    .map(|e| e.keys())
                    .unwrap_or_default();
                keys.into_iter()
                    .map(move |key| instance.child(call, key))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Repetition data of the module call that produced `instance`.
    #[must_use]
    pub fn module_repetition(&self, instance: &ModuleInstance) -> RepetitionData {
        let (Some(parent), Some(step)) = (instance.parent(), instance.last_step()) else {
            return RepetitionData::default();
        };
        self.module_expansion(&parent, &step.name)
            .map(|e| e.repetition_data(&step.key))
            .unwrap_or_default()
    }

    /// True if `instance` is one of the currently expanded module instances.
    #[must_use]
    pub fn module_instance_exists(&self, instance: &ModuleInstance) -> bool {
        let mut current = ModuleInstance::root();
        for step in instance.steps() {
            let exists = self
                .module_expansion(&current, &step.name)
                .is_some_and(|e| e.has_key(&step.key));
            if !exists {
                return false;
            }
            current = current.child(&step.name, step.key.clone());
        }
        true
    }

    /// Records how a resource expanded.
    pub fn set_resource_expansion(&self, addr: &AbsResource, expansion: Expansion) {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(addr.clone(), expansion);
    }

    /// How a resource expanded, if it has been.
    #[must_use]
    pub fn resource_expansion(&self, addr: &AbsResource) -> Option<Expansion> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(addr)
            .cloned()
    }

    /// Instances of an expanded resource.
    #[must_use]
    pub fn resource_instances(&self, addr: &AbsResource) -> Vec<AbsResourceInstance> {
        self.resource_expansion(addr)
            .map(|e| e.keys().into_iter().map(|key| addr.instance(key)).collect())
            .unwrap_or_default()
    }

    /// Repetition data for one resource instance.
    #[must_use]
    pub fn resource_repetition(&self, addr: &AbsResourceInstance) -> RepetitionData {
        self.resource_expansion(&addr.abs_resource())
            .map(|e| e.repetition_data(&addr.resource.key))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addrs::Resource;

    #[test]
    fn test_count_expansion() {
        let exp = Expansion::from_count(&Value::from(3_i64), "test_instance.a").expect("count");
        assert_eq!(
            exp.keys(),
            vec![InstanceKey::Int(0), InstanceKey::Int(1), InstanceKey::Int(2)]
        );
        assert_eq!(
            exp.repetition_data(&InstanceKey::Int(1)).count_index,
            Some(Value::from(1_i64))
        );
        assert!(exp.has_key(&InstanceKey::Int(2)));
        assert!(!exp.has_key(&InstanceKey::Int(3)));
    }

    #[test]
    fn test_count_rejects_unknown_and_negative() {
        let err = Expansion::from_count(&Value::Unknown, "test_instance.a").expect_err("unknown");
        assert!(err.to_string().contains("cannot be determined until apply"));
        assert!(Expansion::from_count(&Value::from(-1_i64), "test_instance.a").is_err());
        assert!(Expansion::from_count(&Value::Null, "test_instance.a").is_err());
    }

    #[test]
    fn test_for_each_set_and_map() {
        let set = Value::List(vec![Value::from("b"), Value::from("a")]);
        let exp = Expansion::from_for_each(&set, "test_instance.a").expect("set");
        assert_eq!(
            exp.keys(),
            vec![InstanceKey::String("a".to_string()), InstanceKey::String("b".to_string())]
        );
        let rep = exp.repetition_data(&InstanceKey::String("a".to_string()));
        assert_eq!(rep.each_value, Some(Value::from("a")));

        let map = Value::map([("x", Value::from(1_i64))]);
        let exp = Expansion::from_for_each(&map, "test_instance.a").expect("map");
        let rep = exp.repetition_data(&InstanceKey::String("x".to_string()));
        assert_eq!(rep.each_key, Some(Value::from("x")));
        assert_eq!(rep.each_value, Some(Value::from(1_i64)));

        assert!(Expansion::from_for_each(&Value::Unknown, "test_instance.a").is_err());
        assert!(Expansion::from_for_each(&Value::List(vec![Value::Unknown]), "test_instance.a").is_err());
    }

    #[test]
    fn test_module_instances_nested() {
        let expander = InstanceExpander::new();
        let root = ModuleInstance::root();
        expander.set_module_expansion(&root, "a", Expansion::Count(2));
        for i in 0..2 {
            let parent = root.child("a", InstanceKey::Int(i));
            expander.set_module_expansion(&parent, "b", Expansion::Single);
        }

        let path = ModulePath::root().child("a").child("b");
        let instances = expander.module_instances(&path);
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].to_string(), "module.a[1].module.b");
        assert!(expander.module_instance_exists(&instances[0]));
        let gone: ModuleInstance = "module.a[5]".parse().expect("parse");
        assert!(!expander.module_instance_exists(&gone));

        let rep = expander.module_repetition(&root.child("a", InstanceKey::Int(1)));
        assert_eq!(rep.count_index, Some(Value::from(1_i64)));
    }

    #[test]
    fn test_resource_instances() {
        let expander = InstanceExpander::new();
        let addr = Resource::managed("test_instance", "a").absolute(ModuleInstance::root());
        assert!(expander.resource_instances(&addr).is_empty());
        expander.set_resource_expansion(&addr, Expansion::Single);
        let instances = expander.resource_instances(&addr);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].to_string(), "test_instance.a");
    }
}
