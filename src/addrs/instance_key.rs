//! Instance keys for expanded resources and module calls.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::value::Value;

/// Discriminator between sibling instances of one resource or module call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum InstanceKey {
    /// The single instance of something without `count` or `for_each`.
    #[default]
    NoKey,
    /// An instance produced by `count`.
    Int(i64),
    /// An instance produced by `for_each`.
    String(String),
}

impl InstanceKey {
    /// Returns the key as a value, for `count.index` and `each.key`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::NoKey => Value::Null,
            Self::Int(i) => Value::from(*i),
            Self::String(s) => Value::from(s.as_str()),
        }
    }

    const fn type_rank(&self) -> u8 {
        match self {
            Self::NoKey => 0,
            Self::Int(_) => 1,
            Self::String(_) => 2,
        }
    }
}

impl Ord for InstanceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for InstanceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoKey => Ok(()),
            Self::Int(i) => write!(f, "[{i}]"),
            Self::String(s) => write!(f, "[{s:?}]"),
        }
    }
}

impl FromStr for InstanceKey {
    type Err = ConfigError;

    /// Parses the rendered form: empty, `[0]` or `["k"]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::NoKey);
        }
        let invalid = || ConfigError::InvalidAddress {
            input: s.to_string(),
            message: "expected [N] or [\"key\"]".to_string(),
        };
        let inner = s
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(invalid)?;
        if inner.starts_with('"') {
            return serde_json::from_str::<String>(inner)
                .map(Self::String)
                .map_err(|_| invalid());
        }
        inner.parse().map(Self::Int).map_err(|_| invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        let mut keys = vec![
            InstanceKey::String("b".to_string()),
            InstanceKey::Int(2),
            InstanceKey::NoKey,
            InstanceKey::String("a".to_string()),
            InstanceKey::Int(0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                InstanceKey::NoKey,
                InstanceKey::Int(0),
                InstanceKey::Int(2),
                InstanceKey::String("a".to_string()),
                InstanceKey::String("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(InstanceKey::NoKey.to_string(), "");
        assert_eq!(InstanceKey::Int(3).to_string(), "[3]");
        assert_eq!(InstanceKey::String("k".to_string()).to_string(), "[\"k\"]");
    }

    #[test]
    fn test_parse_rendered_form() {
        assert_eq!("".parse::<InstanceKey>().expect("parse"), InstanceKey::NoKey);
        assert_eq!("[4]".parse::<InstanceKey>().expect("parse"), InstanceKey::Int(4));
        assert_eq!(
            "[\"blue\"]".parse::<InstanceKey>().expect("parse"),
            InstanceKey::String("blue".to_string())
        );
        assert!("4".parse::<InstanceKey>().is_err());
    }
}
