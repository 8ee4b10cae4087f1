//! Expression evaluation.

use crate::addrs::{Referenceable, TraversalStep};
use crate::config::{Expr, TemplatePart};
use crate::error::{ConfigError, EngineError, Result};
use crate::value::Value;

/// Resolves the subjects of references for an evaluator.
pub trait Scope {
    /// Returns the value a reference subject currently has.
    ///
    /// Attribute and index traversal after the subject is applied by the
    /// evaluator, not by the scope.
    ///
    /// # Errors
    ///
    /// Returns an error when the subject does not exist in this scope.
    fn resolve(&self, subject: &Referenceable) -> Result<Value>;
}

/// Evaluates configuration expressions in a scope.
pub trait Evaluator: Send + Sync {
    /// Evaluates one expression.
    ///
    /// # Errors
    ///
    /// Returns an error when a reference cannot be resolved or a template
    /// interpolates a value that has no string form.
    fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> Result<Value>;
}

/// Evaluator for the `${...}` reference language of YAML configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEvaluator;

impl BuiltinEvaluator {
    /// Creates the evaluator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Evaluator for BuiltinEvaluator {
    fn evaluate(&self, expr: &Expr, scope: &dyn Scope) -> Result<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ref(reference) => {
                let subject = scope.resolve(&reference.subject)?;
                Ok(traverse(subject, &reference.remaining))
            }
            Expr::Template(parts) => {
                let mut out = String::new();
                let mut unknown = false;
                for part in parts {
                    match part {
                        TemplatePart::Literal(text) => out.push_str(text),
                        TemplatePart::Interp(reference) => {
                            let value =
                                traverse(scope.resolve(&reference.subject)?, &reference.remaining);
                            if !value.is_known() {
                                unknown = true;
                                continue;
                            }
                            let text = value.to_template_string().ok_or_else(|| {
                                EngineError::Config(ConfigError::ValidationError {
                                    message: format!(
                                        "cannot interpolate {reference} into a string: value is {value}"
                                    ),
                                    field: None,
                                })
                            })?;
                            out.push_str(&text);
                        }
                    }
                }
                if unknown {
                    return Ok(Value::Unknown);
                }
                Ok(Value::String(out))
            }
            Expr::List(items) => items
                .iter()
                .map(|item| self.evaluate(item, scope))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            Expr::Map(entries) => entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.evaluate(v, scope)?)))
                .collect::<Result<_>>()
                .map(Value::Map),
        }
    }
}

/// Applies attribute and index steps to a value.
///
/// Missing attributes and out-of-range indexes yield null; traversing an
/// unknown value yields unknown.
#[must_use]
pub fn traverse(mut value: Value, steps: &[TraversalStep]) -> Value {
    for step in steps {
        if !value.is_known() {
            return Value::Unknown;
        }
        value = match step {
            TraversalStep::Attr(name) => value.get_attr(name).cloned().unwrap_or_default(),
            TraversalStep::Index(key) => value.index(&key.to_value()).unwrap_or_default(),
        };
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MapScope(BTreeMap<String, Value>);

    impl Scope for MapScope {
        fn resolve(&self, subject: &Referenceable) -> Result<Value> {
            self.0.get(&subject.to_string()).cloned().ok_or_else(|| {
                EngineError::Config(ConfigError::UndeclaredReference {
                    kind: "value".to_string(),
                    name: subject.to_string(),
                })
            })
        }
    }

    fn scope() -> MapScope {
        MapScope(BTreeMap::from([
            ("var.ami".to_string(), Value::from("bar")),
            ("count.index".to_string(), Value::from(2_i64)),
            (
                "test_instance.a".to_string(),
                Value::map([("id", Value::Unknown), ("tags", Value::map([("env", Value::from("dev"))]))]),
            ),
        ]))
    }

    fn eval(text: &str) -> Result<Value> {
        let expr = Expr::parse_string(text).expect("parse");
        BuiltinEvaluator::new().evaluate(&expr, &scope())
    }

    #[test]
    fn test_bare_reference_keeps_type() {
        assert_eq!(eval("${count.index}").expect("eval"), Value::from(2_i64));
        assert_eq!(eval("${test_instance.a.tags.env}").expect("eval"), Value::from("dev"));
        assert_eq!(eval("${test_instance.a.missing}").expect("eval"), Value::Null);
    }

    #[test]
    fn test_template_concatenates() {
        assert_eq!(
            eval("ami-${var.ami}-${count.index}").expect("eval"),
            Value::from("ami-bar-2")
        );
    }

    #[test]
    fn test_template_with_unknown_is_unknown() {
        assert_eq!(eval("id-${test_instance.a.id}").expect("eval"), Value::Unknown);
    }

    #[test]
    fn test_template_rejects_collections() {
        assert!(eval("tags: ${test_instance.a.tags}").is_err());
    }

    #[test]
    fn test_undeclared_reference_fails() {
        assert!(eval("${var.nope}").is_err());
    }
}
