//! Provider source and configuration addresses.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

use super::parse::{parse_steps, Step};
use super::{InstanceKey, ModuleInstance, ModulePath};

/// Namespace given to providers referenced only by local name.
pub const DEFAULT_PROVIDER_NAMESPACE: &str = "default";

/// Fully qualified provider source, `namespace/type`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Provider {
    /// Publishing namespace.
    pub namespace: String,
    /// Provider type, e.g. `test`.
    pub type_name: String,
}

impl Provider {
    /// Creates a provider source address.
    #[must_use]
    pub fn new(namespace: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
        }
    }

    /// The provider implied by a bare local name.
    #[must_use]
    pub fn default_for(type_name: impl Into<String>) -> Self {
        Self::new(DEFAULT_PROVIDER_NAMESPACE, type_name)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.type_name)
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidAddress {
            input: s.to_string(),
            message: "expected a provider source like \"namespace/type\"".to_string(),
        };
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [type_name] if !type_name.is_empty() => Ok(Self::default_for(*type_name)),
            [namespace, type_name] if !namespace.is_empty() && !type_name.is_empty() => {
                Ok(Self::new(*namespace, *type_name))
            }
            _ => Err(invalid()),
        }
    }
}

/// A provider configuration reference as written inside one module, `test.east`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalProviderConfig {
    /// Local name declared in `required_providers` (or implied).
    pub local_name: String,
    /// Optional alias.
    pub alias: Option<String>,
}

impl LocalProviderConfig {
    /// Creates a local provider reference.
    #[must_use]
    pub fn new(local_name: impl Into<String>, alias: Option<String>) -> Self {
        Self {
            local_name: local_name.into(),
            alias,
        }
    }
}

impl fmt::Display for LocalProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}.{alias}", self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

impl FromStr for LocalProviderConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = parse_steps(s)?;
        match steps.as_slice() {
            [Step::Attr(name)] => Ok(Self::new(name.clone(), None)),
            [Step::Attr(name), Step::Attr(alias)] => Ok(Self::new(name.clone(), Some(alias.clone()))),
            _ => Err(ConfigError::InvalidAddress {
                input: s.to_string(),
                message: "expected NAME or NAME.ALIAS".to_string(),
            }),
        }
    }
}

/// An absolute provider configuration address,
/// `module.a.provider["default/test"].east`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsProviderConfig {
    /// Static module path the configuration lives in.
    pub module: ModulePath,
    /// Provider source.
    pub provider: Provider,
    /// Optional alias.
    pub alias: Option<String>,
}

impl AbsProviderConfig {
    /// Creates a provider configuration address.
    #[must_use]
    pub const fn new(module: ModulePath, provider: Provider, alias: Option<String>) -> Self {
        Self {
            module,
            provider,
            alias,
        }
    }

    /// The configuration this one would inherit from in the parent module.
    ///
    /// Only unaliased configurations in non-root modules inherit.
    #[must_use]
    pub fn inherited(&self) -> Option<Self> {
        if self.alias.is_some() {
            return None;
        }
        let parent = self.module.parent()?;
        Some(Self::new(parent, self.provider.clone(), None))
    }

    /// Returns true for the unaliased configuration of a provider.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.alias.is_none()
    }
}

impl fmt::Display for AbsProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.module.is_root() {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "provider[{:?}]", self.provider.to_string())?;
        if let Some(alias) = &self.alias {
            write!(f, ".{alias}")?;
        }
        Ok(())
    }
}

impl FromStr for AbsProviderConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = parse_steps(s)?;
        let (module, rest) = ModuleInstance::from_steps(&steps);
        if module.steps().iter().any(|step| step.key != InstanceKey::NoKey) {
            return Err(ConfigError::InvalidAddress {
                input: s.to_string(),
                message: "provider configurations cannot be in module instances".to_string(),
            });
        }
        let invalid = || ConfigError::InvalidAddress {
            input: s.to_string(),
            message: "expected provider[\"namespace/type\"] or provider[\"namespace/type\"].alias"
                .to_string(),
        };
        let (source, alias) = match rest {
            [Step::Attr(kw), Step::Index(InstanceKey::String(source))] if kw == "provider" => {
                (source, None)
            }
            [Step::Attr(kw), Step::Index(InstanceKey::String(source)), Step::Attr(alias)]
                if kw == "provider" =>
            {
                (source, Some(alias.clone()))
            }
            _ => return Err(invalid()),
        };
        Ok(Self::new(module.module(), source.parse()?, alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abs_provider_config_round_trip() {
        let addr: AbsProviderConfig = r#"module.a.provider["default/test"].east"#.parse().expect("parse");
        assert_eq!(addr.module.to_string(), "module.a");
        assert_eq!(addr.alias.as_deref(), Some("east"));
        assert_eq!(addr.to_string(), r#"module.a.provider["default/test"].east"#);

        let root: AbsProviderConfig = r#"provider["default/test"]"#.parse().expect("parse");
        assert!(root.module.is_root());
        assert!(root.is_default());
    }

    #[test]
    fn test_inherited() {
        let child = AbsProviderConfig::new(
            ModulePath::root().child("a").child("b"),
            Provider::default_for("test"),
            None,
        );
        let parent = child.inherited().expect("inherits");
        assert_eq!(parent.module.to_string(), "module.a");
        let root = parent.inherited().expect("inherits");
        assert!(root.module.is_root());
        assert!(root.inherited().is_none());

        let aliased = AbsProviderConfig::new(
            ModulePath::root().child("a"),
            Provider::default_for("test"),
            Some("east".to_string()),
        );
        assert!(aliased.inherited().is_none());
    }

    #[test]
    fn test_provider_source_parse() {
        assert_eq!("test".parse::<Provider>().expect("parse"), Provider::default_for("test"));
        assert_eq!(
            "builtin/echo".parse::<Provider>().expect("parse"),
            Provider::new("builtin", "echo")
        );
        assert!("a/b/c".parse::<Provider>().is_err());
    }
}
