//! Configuration expressions.
//!
//! Any string value may interpolate references with `${...}`. A string that
//! consists of exactly one interpolation evaluates to the referenced value
//! itself; anything else is a template and evaluates to a string. `$${`
//! escapes a literal `${`.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

use crate::addrs::Reference;
use crate::error::ConfigError;
use crate::value::Value;

/// One piece of a string template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Literal text.
    Literal(String),
    /// Interpolated reference.
    Interp(Reference),
}

/// An unevaluated configuration expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A constant.
    Literal(Value),
    /// A bare reference, `${var.x}`.
    Ref(Reference),
    /// A string with interpolations.
    Template(Vec<TemplatePart>),
    /// A list of expressions.
    List(Vec<Expr>),
    /// A map of expressions.
    Map(BTreeMap<String, Expr>),
}

impl Default for Expr {
    fn default() -> Self {
        Self::Literal(Value::Null)
    }
}

impl Expr {
    /// Compiles a raw configuration value.
    ///
    /// # Errors
    ///
    /// Returns an error for unterminated interpolations or invalid references.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::String(s) => Self::parse_string(s),
            Value::List(items) => items
                .iter()
                .map(Self::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Self::List),
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), Self::from_value(v)?)))
                .collect::<Result<BTreeMap<_, _>, ConfigError>>()
                .map(Self::Map),
            other => Ok(Self::Literal(other.clone())),
        }
    }

    /// Compiles a single string.
    ///
    /// # Errors
    ///
    /// Returns an error for unterminated interpolations or invalid references.
    pub fn parse_string(input: &str) -> Result<Self, ConfigError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = input;

        while let Some(pos) = rest.find("${") {
            if rest[..pos].ends_with('$') {
                literal.push_str(&rest[..pos - 1]);
                literal.push_str("${");
                rest = &rest[pos + 2..];
                continue;
            }
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 2..];
            let end = after.find('}').ok_or_else(|| ConfigError::ParseError {
                message: format!("unterminated interpolation in {input:?}"),
                location: None,
            })?;
            let reference: Reference = after[..end].trim().parse()?;
            if !literal.is_empty() {
                parts.push(TemplatePart::Literal(std::mem::take(&mut literal)));
            }
            parts.push(TemplatePart::Interp(reference));
            rest = &after[end + 1..];
        }
        literal.push_str(rest);

        if parts.is_empty() {
            return Ok(Self::Literal(Value::String(literal)));
        }
        if !literal.is_empty() {
            parts.push(TemplatePart::Literal(literal));
        }
        if let [TemplatePart::Interp(reference)] = parts.as_slice() {
            return Ok(Self::Ref(reference.clone()));
        }
        Ok(Self::Template(parts))
    }

    /// Every reference in the expression, in source order.
    #[must_use]
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<&'a Reference>) {
        match self {
            Self::Literal(_) => {}
            Self::Ref(r) => out.push(r),
            Self::Template(parts) => out.extend(parts.iter().filter_map(|p| match p {
                TemplatePart::Interp(r) => Some(r),
                TemplatePart::Literal(_) => None,
            })),
            Self::List(items) => items.iter().for_each(|e| e.collect_references(out)),
            Self::Map(entries) => entries.values().for_each(|e| e.collect_references(out)),
        }
    }

    /// The constant value, if the expression has no references.
    #[must_use]
    pub fn as_literal(&self) -> Option<Value> {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Ref(_) | Self::Template(_) => None,
            Self::List(items) => items.iter().map(Self::as_literal).collect::<Option<Vec<_>>>().map(Value::List),
            Self::Map(entries) => entries
                .iter()
                .map(|(k, v)| v.as_literal().map(|v| (k.clone(), v)))
                .collect::<Option<BTreeMap<_, _>>>()
                .map(Value::Map),
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}
