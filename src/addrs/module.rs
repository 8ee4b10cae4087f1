//! Module paths, static and expanded.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::parse::{parse_steps, Step};
use super::InstanceKey;

/// Static path of module calls from the root, e.g. `module.net.module.subnet`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModulePath(Vec<String>);

impl ModulePath {
    /// The root module.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns true for the root module.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a child module call.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        let mut steps = self.0.clone();
        steps.push(name.to_string());
        Self(steps)
    }

    /// Path of the calling module, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Name of the last module call, `None` for the root.
    #[must_use]
    pub fn call_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Module call names from the root.
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.0
    }

    /// Number of module calls in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Returns true if `other` is this module or one of its descendants.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Converts to an unexpanded module instance (every key `NoKey`).
    #[must_use]
    pub fn unkeyed_instance(&self) -> ModuleInstance {
        ModuleInstance(
            self.0
                .iter()
                .map(|name| ModuleInstanceStep {
                    name: name.clone(),
                    key: InstanceKey::NoKey,
                })
                .collect(),
        )
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "module.{name}")?;
        }
        Ok(())
    }
}

/// One step of a module instance path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleInstanceStep {
    /// Module call name.
    pub name: String,
    /// Instance key of the call.
    pub key: InstanceKey,
}

/// Expanded path of module call instances, e.g. `module.net[0]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleInstance(Vec<ModuleInstanceStep>);

impl ModuleInstance {
    /// The root module instance.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Returns true for the root module instance.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Instance of a child module call.
    #[must_use]
    pub fn child(&self, name: &str, key: InstanceKey) -> Self {
        let mut steps = self.0.clone();
        steps.push(ModuleInstanceStep {
            name: name.to_string(),
            key,
        });
        Self(steps)
    }

    /// The calling module instance, `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The last step, `None` for the root.
    #[must_use]
    pub fn last_step(&self) -> Option<&ModuleInstanceStep> {
        self.0.last()
    }

    /// Steps from the root.
    #[must_use]
    pub fn steps(&self) -> &[ModuleInstanceStep] {
        &self.0
    }

    /// `other`'s steps appended to this instance's.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        Self(self.0.iter().chain(&other.0).cloned().collect())
    }

    /// The first `depth` steps.
    #[must_use]
    pub fn truncate(&self, depth: usize) -> Self {
        Self(self.0[..depth.min(self.0.len())].to_vec())
    }

    /// Static module path of this instance.
    #[must_use]
    pub fn module(&self) -> ModulePath {
        ModulePath(self.0.iter().map(|s| s.name.clone()).collect())
    }

    /// Returns true if `other` is this instance or one of its descendants.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Target matching: a `NoKey` step in `self` matches any key.
    #[must_use]
    pub fn target_contains(&self, other: &Self) -> bool {
        if other.0.len() < self.0.len() {
            return false;
        }
        self.0.iter().zip(&other.0).all(|(ours, theirs)| {
            ours.name == theirs.name && (ours.key == InstanceKey::NoKey || ours.key == theirs.key)
        })
    }

    /// Parses leading `module.NAME[KEY]` steps, returning the rest.
    pub(crate) fn from_steps(steps: &[Step]) -> (Self, &[Step]) {
        let mut path = Vec::new();
        let mut rest = steps;
        while let [Step::Attr(kw), Step::Attr(name), tail @ ..] = rest {
            if kw != "module" {
                break;
            }
            let (key, tail) = match tail {
                [Step::Index(key), tail @ ..] => (key.clone(), tail),
                _ => (InstanceKey::NoKey, tail),
            };
            path.push(ModuleInstanceStep {
                name: name.clone(),
                key,
            });
            rest = tail;
        }
        (Self(path), rest)
    }
}

impl fmt::Display for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "module.{}{}", step.name, step.key)?;
        }
        Ok(())
    }
}

impl FromStr for ModuleInstance {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::root());
        }
        let steps = parse_steps(s)?;
        let (module, rest) = Self::from_steps(&steps);
        if !rest.is_empty() {
            return Err(ConfigError::InvalidAddress {
                input: s.to_string(),
                message: "expected only module steps".to_string(),
            });
        }
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_instance_round_trip() {
        let addr: ModuleInstance = r#"module.a[0].module.b["x"]"#.parse().expect("parse");
        assert_eq!(addr.to_string(), r#"module.a[0].module.b["x"]"#);
        assert_eq!(addr.module().to_string(), "module.a.module.b");
        assert_eq!(addr.parent().expect("parent").to_string(), "module.a[0]");
    }

    #[test]
    fn test_target_contains() {
        let any: ModuleInstance = "module.a".parse().expect("parse");
        let zero: ModuleInstance = "module.a[0]".parse().expect("parse");
        let one: ModuleInstance = "module.a[1].module.b".parse().expect("parse");
        assert!(any.target_contains(&zero));
        assert!(any.target_contains(&one));
        assert!(!zero.target_contains(&one));
        assert!(!one.target_contains(&any));
    }

    #[test]
    fn test_module_path_ancestry() {
        let root = ModulePath::root();
        let child = root.child("a");
        let grandchild = child.child("b");
        assert!(root.is_ancestor_of(&grandchild));
        assert!(child.is_ancestor_of(&grandchild));
        assert!(!grandchild.is_ancestor_of(&child));
        assert_eq!(grandchild.parent(), Some(child));
    }
}
