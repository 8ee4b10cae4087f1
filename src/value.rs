//! Dynamic attribute values.
//!
//! Resource configuration, state objects and planned values all share the
//! [`Value`] model. A value may be [`Value::Unknown`] while planning when it
//! depends on something that is only decided during apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Key used to encode unknown values in JSON.
const UNKNOWN_SENTINEL: &str = "__unknown__";

/// A dynamically typed attribute value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Value not known until apply.
    Unknown,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(serde_json::Number),
    /// String.
    String(String),
    /// Ordered list (also used for sets).
    List(Vec<Value>),
    /// Object or map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Builds a map value from key/value pairs.
    #[must_use]
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns true for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true unless the value itself is unknown.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Returns true if no unknown value appears anywhere inside.
    #[must_use]
    pub fn is_wholly_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) => items.iter().all(Self::is_wholly_known),
            Self::Map(entries) => entries.values().all(Self::is_wholly_known),
            _ => true,
        }
    }

    /// Returns true for null or an empty list/map.
    #[must_use]
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::List(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Returns the string content, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns an integer, if this is a whole number.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns the boolean content, if this is a bool.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the map entries, if this is a map.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up an attribute of a map value.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&Self> {
        self.as_map().and_then(|m| m.get(name))
    }

    /// Looks up an element by list index or map key.
    ///
    /// Indexing into an unknown value yields unknown.
    #[must_use]
    pub fn index(&self, key: &Self) -> Option<Self> {
        match (self, key) {
            (Self::Unknown, _) | (_, Self::Unknown) => Some(Self::Unknown),
            (Self::List(items), key) => {
                let idx = usize::try_from(key.as_i64()?).ok()?;
                items.get(idx).cloned()
            }
            (Self::Map(entries), Self::String(k)) => entries.get(k).cloned(),
            _ => None,
        }
    }

    /// Renders a primitive for string interpolation.
    ///
    /// Returns `None` for collections and null.
    #[must_use]
    pub fn to_template_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Compares two values treating null and empty collections as equal.
    ///
    /// The rule applies recursively through list elements and map entries.
    /// An unknown value is never equivalent to anything, including another
    /// unknown.
    #[must_use]
    pub fn equivalent_ignoring_empty(&self, other: &Self) -> bool {
        if self.is_null_or_empty() && other.is_null_or_empty() {
            return true;
        }
        match (self, other) {
            (Self::Unknown, _) | (_, Self::Unknown) => false,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent_ignoring_empty(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                let null = Self::Null;
                a.keys().chain(b.keys()).all(|k| {
                    a.get(k)
                        .unwrap_or(&null)
                        .equivalent_ignoring_empty(b.get(k).unwrap_or(&null))
                })
            }
            (Self::Number(a), Self::Number(b)) => a.as_f64() == b.as_f64(),
            (Self::Number(n), Self::String(s)) | (Self::String(s), Self::Number(n)) => {
                n.to_string() == *s
            }
            _ => self == other,
        }
    }

    /// Replaces every unknown inside `self` with null.
    #[must_use]
    pub fn unknown_as_null(&self) -> Self {
        match self {
            Self::Unknown => Self::Null,
            Self::List(items) => Self::List(items.iter().map(Self::unknown_as_null).collect()),
            Self::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.unknown_as_null()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number((n as u64).into())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(entries) => {
                if entries.len() == 1 && entries.get(UNKNOWN_SENTINEL) == Some(&serde_json::Value::Bool(true)) {
                    return Self::Unknown;
                }
                Self::Map(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Unknown => {
                let mut sentinel = serde_json::Map::new();
                sentinel.insert(UNKNOWN_SENTINEL.to_string(), Self::Bool(true));
                Self::Object(sentinel)
            }
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Unknown => write!(f, "(known after apply)"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k} = {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_empty_are_equivalent() {
        assert!(Value::Null.equivalent_ignoring_empty(&Value::List(vec![])));
        assert!(Value::Map(BTreeMap::new()).equivalent_ignoring_empty(&Value::Null));
        assert!(!Value::Null.equivalent_ignoring_empty(&Value::from("")));
    }

    #[test]
    fn test_equivalence_is_recursive() {
        let config = Value::map([
            ("ami", Value::from("bar")),
            ("tags", Value::Null),
            ("block", Value::List(vec![Value::map([("rules", Value::Null)])])),
        ]);
        let prior = Value::map([
            ("ami", Value::from("bar")),
            ("tags", Value::Map(BTreeMap::new())),
            ("block", Value::List(vec![Value::map([("rules", Value::List(vec![]))])])),
        ]);
        assert!(config.equivalent_ignoring_empty(&prior));

        let changed = Value::map([("ami", Value::from("new-ami"))]);
        assert!(!changed.equivalent_ignoring_empty(&prior));
    }

    #[test]
    fn test_unknown_never_equivalent() {
        assert!(!Value::Unknown.equivalent_ignoring_empty(&Value::Unknown));
        assert!(!Value::Unknown.equivalent_ignoring_empty(&Value::Null));
    }

    #[test]
    fn test_json_round_trip_keeps_unknown() {
        let value = Value::map([("id", Value::Unknown), ("ami", Value::from("bar"))]);
        let json = serde_json::to_string(&value).expect("serialize");
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, value);
        assert!(!back.is_wholly_known());
    }

    #[test]
    fn test_index() {
        let list = Value::List(vec![Value::from("a"), Value::from("b")]);
        assert_eq!(list.index(&Value::from(1_i64)), Some(Value::from("b")));
        assert_eq!(list.index(&Value::from(5_i64)), None);
        assert_eq!(Value::Unknown.index(&Value::from(0_i64)), Some(Value::Unknown));
    }
}
