//! Provider schemas.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::addrs::ResourceMode;
use crate::value::Value;

/// Shape of an attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// String, number or bool.
    #[default]
    Primitive,
    /// Ordered list.
    List,
    /// Unordered set, compared as a list.
    Set,
    /// String-keyed map.
    Map,
    /// Nested block (object or list of objects).
    NestedBlock,
}

/// One attribute of a resource or data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Value shape.
    pub kind: AttributeKind,
    /// Must be set in configuration.
    #[serde(default)]
    pub required: bool,
    /// Set by the provider when not configured.
    #[serde(default)]
    pub computed: bool,
    /// Changing it requires replacing the object.
    #[serde(default)]
    pub force_new: bool,
}

impl Attribute {
    /// An optional configurable attribute.
    #[must_use]
    pub const fn optional(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: false,
            computed: false,
            force_new: false,
        }
    }

    /// A required configurable attribute.
    #[must_use]
    pub const fn required(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: true,
            computed: false,
            force_new: false,
        }
    }

    /// A provider-computed attribute.
    #[must_use]
    pub const fn computed(kind: AttributeKind) -> Self {
        Self {
            kind,
            required: false,
            computed: true,
            force_new: false,
        }
    }

    /// Marks the attribute as forcing replacement.
    #[must_use]
    pub const fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

/// Attributes of one resource type, data source or provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Attributes by name.
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Names of attributes that are purely provider-computed.
    pub fn computed_only(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.computed && !a.required)
            .map(|(name, _)| name.as_str())
    }

    /// Names of attributes that configuration controls.
    pub fn configurable(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .filter(|(_, a)| !a.computed)
            .map(|(name, _)| name.as_str())
    }

    /// Attribute names whose values differ between `prior` and `planned`
    /// and that force replacement.
    #[must_use]
    pub fn replace_paths(&self, prior: &Value, planned: &Value) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.force_new)
            .filter(|(name, _)| {
                let before = prior.get_attr(name).unwrap_or(&Value::Null);
                let after = planned.get_attr(name).unwrap_or(&Value::Null);
                !before.equivalent_ignoring_empty(after)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of required attributes missing from a configuration value.
    #[must_use]
    pub fn missing_required(&self, config: &Value) -> Vec<String> {
        self.attributes
            .iter()
            .filter(|(_, a)| a.required)
            .filter(|(name, _)| config.get_attr(name).is_none_or(Value::is_null))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names in a configuration value that the schema does not declare.
    #[must_use]
    pub fn unknown_attributes(&self, config: &Value) -> Vec<String> {
        config
            .as_map()
            .map(|m| {
                m.keys()
                    .filter(|k| !self.attributes.contains_key(*k))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Everything a provider declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSchema {
    /// Provider configuration schema.
    pub provider: Schema,
    /// Managed resource types.
    pub resource_types: BTreeMap<String, Schema>,
    /// Data source types.
    pub data_sources: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Schema for a resource or data source type.
    #[must_use]
    pub fn schema_for(&self, mode: ResourceMode, type_name: &str) -> Option<&Schema> {
        match mode {
            ResourceMode::Managed => self.resource_types.get(type_name),
            ResourceMode::Data => self.data_sources.get(type_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_schema() -> Schema {
        Schema::new()
            .with_attribute("id", Attribute::computed(AttributeKind::Primitive))
            .with_attribute("ami", Attribute::required(AttributeKind::Primitive))
            .with_attribute("type", Attribute::optional(AttributeKind::Primitive).force_new())
            .with_attribute("tags", Attribute::optional(AttributeKind::Map))
    }

    #[test]
    fn test_configurable_excludes_computed() {
        let schema = instance_schema();
        let configurable: Vec<&str> = schema.configurable().collect();
        assert_eq!(configurable, vec!["ami", "tags", "type"]);
        assert_eq!(schema.computed_only().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn test_replace_paths() {
        let schema = instance_schema();
        let prior = Value::map([("ami", Value::from("a")), ("type", Value::from("small"))]);
        let same_type = Value::map([("ami", Value::from("b")), ("type", Value::from("small"))]);
        assert!(schema.replace_paths(&prior, &same_type).is_empty());

        let new_type = Value::map([("ami", Value::from("a")), ("type", Value::from("large"))]);
        assert_eq!(schema.replace_paths(&prior, &new_type), vec!["type"]);
    }

    #[test]
    fn test_missing_and_unknown_attributes() {
        let schema = instance_schema();
        let config = Value::map([("bogus", Value::from(true))]);
        assert_eq!(schema.missing_required(&config), vec!["ami"]);
        assert_eq!(schema.unknown_attributes(&config), vec!["bogus"]);
    }
}
