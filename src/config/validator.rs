//! Static configuration validation.
//!
//! These checks need no provider and no state. They catch mistakes that
//! would otherwise surface halfway through a walk.

use crate::addrs::{AbsResourceInstance, ConfigResource, MoveEndpoint, Referenceable};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ConfigError, EngineError, Result};
use std::collections::HashSet;
use tracing::debug;

use super::expr::Expr;
use super::tree::{Config, Module};
use super::types::ProviderPassing;

/// Validator for module trees.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<ValidationError>,
}

/// A single validation finding.
#[derive(Debug)]
pub struct ValidationError {
    /// File the finding is in.
    pub filename: String,
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

/// Which repetition symbols an expression may use.
#[derive(Debug, Clone, Copy, Default)]
struct RepetitionScope {
    count: bool,
    each: bool,
    self_object: bool,
}

impl RepetitionScope {
    const NONE: Self = Self {
        count: false,
        each: false,
        self_object: false,
    };

    const fn of(count: Option<&Expr>, for_each: Option<&Expr>) -> Self {
        Self {
            count: count.is_some(),
            each: for_each.is_some(),
            self_object: false,
        }
    }

    const fn with_self(self) -> Self {
        Self {
            self_object: true,
            ..self
        }
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates every module of a configuration.
    #[must_use]
    pub fn validate(&self, config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        for module in config.modules() {
            Self::validate_names(module, &mut result);
            Self::validate_repetition(module, &mut result);
            Self::validate_providers(module, &mut result);
            Self::validate_references(module, &mut result);
            Self::validate_removed(config, module, &mut result);
            Self::validate_moved(config, module, &mut result);
            Self::validate_unused_variables(module, &mut result);
        }
        Self::validate_imports(config, &mut result);

        debug!(
            "Configuration validation finished with {} error(s) and {} warning(s)",
            result.error_count(),
            result.warning_count()
        );
        result
    }

    /// Checks name syntax and duplicate declarations.
    fn validate_names(module: &Module, result: &mut ValidationResult) {
        let mut seen = HashSet::new();
        for var in &module.file.variables {
            check_name(result, module, "variable", &var.name, format!("variables.{}", var.name), &mut seen);
        }
        let mut seen = HashSet::new();
        for name in module.file.locals.keys() {
            check_name(result, module, "local", name, format!("locals.{name}"), &mut seen);
        }
        let mut seen = HashSet::new();
        for res in &module.file.resources {
            let field = format!("resources.{}", res.addr());
            if !is_valid_name(&res.type_name) || !is_valid_name(&res.name) {
                result.error(module, field.clone(), format!("invalid resource address {:?}", res.addr().to_string()));
            }
            if !seen.insert(res.addr().to_string()) {
                result.error(module, field, duplicate("resource", &res.addr().to_string()));
            }
        }
        let mut seen = HashSet::new();
        for call in &module.file.modules {
            check_name(result, module, "module call", &call.name, format!("modules.{}", call.name), &mut seen);
        }
        let mut seen = HashSet::new();
        for output in &module.file.outputs {
            check_name(result, module, "output", &output.name, format!("outputs.{}", output.name), &mut seen);
        }
        let mut seen = HashSet::new();
        for provider in &module.file.providers {
            let local = provider.local_config().to_string();
            if !seen.insert(local.clone()) {
                result.error(module, format!("providers.{local}"), duplicate("provider configuration", &local));
            }
        }
    }

    /// Rejects `count` and `for_each` on the same block.
    fn validate_repetition(module: &Module, result: &mut ValidationResult) {
        for res in &module.file.resources {
            if res.count.is_some() && res.for_each.is_some() {
                result.error(
                    module,
                    format!("resources.{}", res.addr()),
                    "\"count\" and \"for_each\" cannot be used together",
                );
            }
        }
        for call in &module.file.modules {
            if call.count.is_some() && call.for_each.is_some() {
                result.error(
                    module,
                    format!("modules.{}", call.name),
                    "\"count\" and \"for_each\" cannot be used together",
                );
            }
        }
    }

    /// Checks provider local names and instance key chains.
    fn validate_providers(module: &Module, result: &mut ValidationResult) {
        let declared = |name: &str| {
            module.file.required_providers.contains_key(name)
                || module.file.providers.iter().any(|p| p.name == name)
                || module.passed_providers.contains(name)
        };

        for (local, required) in &module.file.required_providers {
            if let Err(err) = required.source.parse::<crate::addrs::Provider>() {
                result.error(module, format!("required_providers.{local}"), err.to_string());
            }
        }

        for res in &module.file.resources {
            let field = format!("resources.{}", res.addr());
            let local = match module.resource_provider_config(res) {
                Ok(local) => local,
                Err(err) => {
                    result.error(module, field, err.to_string());
                    continue;
                }
            };
            if res.provider.is_some()
                && !declared(&local.local_name)
                && local.local_name != res.addr().implied_provider()
            {
                result.error(
                    module,
                    field.clone(),
                    format!("provider local name {:?} is not declared", local.local_name),
                );
            }
            if res.provider_key.is_some() && key_passed_in(module, &local.local_name) {
                result.error(
                    module,
                    field,
                    format!(
                        "provider instance key for {local} is already set by the calling module"
                    ),
                );
            }
        }

        for call in &module.file.modules {
            for (child_name, passing) in &call.providers {
                let field = format!("modules.{}.providers.{child_name}", call.name);
                let parent: crate::addrs::LocalProviderConfig = match passing.parent().parse() {
                    Ok(parent) => parent,
                    Err(err) => {
                        result.error(module, field, err.to_string());
                        continue;
                    }
                };
                if !declared(&parent.local_name) {
                    result.error(
                        module,
                        field.clone(),
                        format!("provider local name {:?} is not declared", parent.local_name),
                    );
                }
                if passing.key().is_some() && key_passed_in(module, &parent.local_name) {
                    result.error(
                        module,
                        field,
                        format!("provider instance key for {parent} is specified more than once"),
                    );
                }
            }
        }
    }

    /// Checks that every reference names something declared in scope.
    fn validate_references(module: &Module, result: &mut ValidationResult) {
        for (name, expr) in &module.file.locals {
            Self::check_expr(module, expr, RepetitionScope::NONE, &format!("locals.{name}"), result);
        }
        for provider in &module.file.providers {
            let scope = RepetitionScope {
                each: provider.for_each.is_some(),
                ..RepetitionScope::NONE
            };
            let field = format!("providers.{}", provider.local_config());
            for expr in provider.config.values() {
                Self::check_expr(module, expr, scope, &field, result);
            }
            if let Some(for_each) = &provider.for_each {
                Self::check_expr(module, for_each, RepetitionScope::NONE, &field, result);
            }
        }
        for res in &module.file.resources {
            let field = format!("resources.{}", res.addr());
            let scope = RepetitionScope::of(res.count.as_ref(), res.for_each.as_ref());
            for expr in res.attributes.values().chain(res.provider_key.as_ref()) {
                Self::check_expr(module, expr, scope, &field, result);
            }
            for expr in res.count.iter().chain(res.for_each.as_ref()) {
                Self::check_expr(module, expr, RepetitionScope::NONE, &field, result);
            }
            for dep in &res.depends_on {
                Self::check_depends_on(module, dep, &field, result);
            }
            for (kind, checks, scope) in [
                ("precondition", &res.lifecycle.precondition, scope),
                ("postcondition", &res.lifecycle.postcondition, scope.with_self()),
            ] {
                let field = format!("{field}.lifecycle.{kind}");
                for check in checks {
                    Self::check_expr(module, &check.condition, scope, &field, result);
                    Self::check_expr(module, &check.error_message, scope, &field, result);
                }
            }
        }
        for call in &module.file.modules {
            let field = format!("modules.{}", call.name);
            let scope = RepetitionScope::of(call.count.as_ref(), call.for_each.as_ref());
            for expr in call.inputs.values().chain(call.providers.values().filter_map(ProviderPassing::key)) {
                Self::check_expr(module, expr, scope, &field, result);
            }
            for expr in call.count.iter().chain(call.for_each.as_ref()) {
                Self::check_expr(module, expr, RepetitionScope::NONE, &field, result);
            }
            for dep in &call.depends_on {
                Self::check_depends_on(module, dep, &field, result);
            }
            if let Some(child) = module.children.get(&call.name) {
                for input in call.inputs.keys() {
                    if child.variable(input).is_none() {
                        result.error(
                            module,
                            format!("{field}.inputs.{input}"),
                            format!("module {:?} declares no variable {input:?}", call.name),
                        );
                    }
                }
            }
        }
        for output in &module.file.outputs {
            Self::check_expr(
                module,
                &output.value,
                RepetitionScope::NONE,
                &format!("outputs.{}", output.name),
                result,
            );
        }
    }

    fn check_depends_on(module: &Module, dep: &str, field: &str, result: &mut ValidationResult) {
        match Expr::parse_string(&format!("${{{dep}}}")) {
            Ok(expr) => Self::check_expr(module, &expr, RepetitionScope::NONE, field, result),
            Err(err) => result.error(module, field.to_string(), err.to_string()),
        }
    }

    fn check_expr(
        module: &Module,
        expr: &Expr,
        scope: RepetitionScope,
        field: &str,
        result: &mut ValidationResult,
    ) {
        for reference in expr.references() {
            let problem = match &reference.subject {
                Referenceable::InputVariable(name) if module.variable(name).is_none() => {
                    Some(undeclared("input variable", name))
                }
                Referenceable::LocalValue(name) if !module.file.locals.contains_key(name) => {
                    Some(undeclared("local value", name))
                }
                Referenceable::ModuleCall(name) => match module.children.get(name) {
                    None if module.module_call(name).is_none() => Some(undeclared("module call", name)),
                    Some(child) => reference
                        .module_output()
                        .filter(|output| child.output(output).is_none())
                        .map(|output| undeclared("output", &format!("module.{name}.{output}"))),
                    None => None,
                },
                Referenceable::Resource(_) | Referenceable::ResourceInstance(_) => {
                    reference.subject.resource().and_then(|res| {
                        module
                            .resource(res)
                            .is_none()
                            .then(|| undeclared("resource", &res.to_string()))
                    })
                }
                Referenceable::CountIndex if !scope.count => Some(ConfigError::ValidationError {
                    message: "count.index is only valid in blocks that set \"count\"".to_string(),
                    field: None,
                }),
                Referenceable::EachKey | Referenceable::EachValue if !scope.each => {
                    Some(ConfigError::ValidationError {
                        message: "each.key and each.value are only valid in blocks that set \"for_each\""
                            .to_string(),
                        field: None,
                    })
                }
                Referenceable::SelfObject if !scope.self_object => Some(ConfigError::ValidationError {
                    message: "self is only valid in resource postconditions".to_string(),
                    field: None,
                }),
                _ => None,
            };
            if let Some(err) = problem {
                let message = match err {
                    ConfigError::ValidationError { message, .. } => message,
                    other => other.to_string(),
                };
                result.error(module, field.to_string(), message);
            }
        }
    }

    /// A `removed` block must not name a resource that is still configured.
    fn validate_removed(config: &Config, module: &Module, result: &mut ValidationResult) {
        for removed in &module.file.removed {
            let field = format!("removed.{}", removed.from);
            match removed.from.parse::<ConfigResource>() {
                Ok(addr) => {
                    let mut full = module.path.clone();
                    for step in addr.module.steps() {
                        full = full.child(step);
                    }
                    if config.resource(&addr.resource.in_module(full)).is_some() {
                        result.error(
                            module,
                            field,
                            format!("{} is removed but still declared in configuration", removed.from),
                        );
                    }
                }
                Err(err) => result.error(module, field, err.to_string()),
            }
        }
    }

    /// Both ends of a `moved` block must be the same kind of address for the
    /// same resource type, and a moved resource must no longer be declared.
    fn validate_moved(config: &Config, module: &Module, result: &mut ValidationResult) {
        for moved in &module.file.moved {
            let field = format!("moved.{}", moved.from);
            let (from, to) = match (moved.from.parse::<MoveEndpoint>(), moved.to.parse::<MoveEndpoint>()) {
                (Ok(from), Ok(to)) => (from, to),
                (Err(err), _) | (_, Err(err)) => {
                    result.error(module, field, err.to_string());
                    continue;
                }
            };
            if from == to {
                result.error(module, field, format!("{} is moved to itself", moved.from));
            } else if !from.same_kind(&to) {
                result.error(
                    module,
                    field,
                    "a whole resource can only move to another resource, and an instance to another instance",
                );
            } else if from.resource().type_name != to.resource().type_name
                || from.resource().mode != to.resource().mode
            {
                result.error(
                    module,
                    field,
                    format!("cannot move {} to {}: the resource types differ", moved.from, moved.to),
                );
            } else if matches!(from, MoveEndpoint::Resource(_))
                && config.resource(&from.config_resource(&module.path)).is_some()
            {
                result.error(
                    module,
                    field,
                    format!("{} is moved but still declared in configuration", moved.from),
                );
            }
        }
    }

    /// Import targets must exist in configuration.
    fn validate_imports(config: &Config, result: &mut ValidationResult) {
        for import in &config.root.file.imports {
            let field = format!("imports.{}", import.to);
            match import.to.parse::<AbsResourceInstance>() {
                Ok(addr) => {
                    if config.resource(&addr.config_resource()).is_none() {
                        result.error(
                            &config.root,
                            field,
                            format!("import target {} is not declared in configuration", import.to),
                        );
                    }
                }
                Err(err) => result.error(&config.root, field, err.to_string()),
            }
        }
    }

    fn validate_unused_variables(module: &Module, result: &mut ValidationResult) {
        let used: HashSet<&str> = module_exprs(module)
            .flat_map(Expr::references)
            .filter_map(|r| match &r.subject {
                Referenceable::InputVariable(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        for var in &module.file.variables {
            if !used.contains(var.name.as_str()) {
                result.warn(
                    module,
                    format!("variables.{}", var.name),
                    format!("variable {:?} is declared but never used", var.name),
                );
            }
        }
    }
}

fn check_name(
    result: &mut ValidationResult,
    module: &Module,
    kind: &str,
    name: &str,
    field: String,
    seen: &mut HashSet<String>,
) {
    if !is_valid_name(name) {
        result.error(module, field.clone(), format!("invalid {kind} name {name:?}"));
    }
    if !seen.insert(name.to_string()) {
        result.error(module, field, duplicate(kind, name));
    }
}

fn duplicate(kind: &str, name: &str) -> String {
    ConfigError::DuplicateName {
        kind: kind.to_string(),
        name: name.to_string(),
    }
    .to_string()
}

fn undeclared(kind: &str, name: &str) -> ConfigError {
    ConfigError::UndeclaredReference {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

/// Returns true if the calling module passes this provider with a key.
fn key_passed_in(module: &Module, local_name: &str) -> bool {
    module.file.providers.iter().all(|p| p.name != local_name)
        && module.keyed_providers.contains(local_name)
}

fn module_exprs(module: &Module) -> impl Iterator<Item = &Expr> {
    let file = &module.file;
    file.locals
        .values()
        .chain(file.providers.iter().flat_map(|p| p.config.values().chain(p.for_each.as_ref())))
        .chain(file.resources.iter().flat_map(|r| {
            r.attributes
                .values()
                .chain(r.count.as_ref())
                .chain(r.for_each.as_ref())
                .chain(r.provider_key.as_ref())
                .chain(
                    r.lifecycle
                        .precondition
                        .iter()
                        .chain(&r.lifecycle.postcondition)
                        .flat_map(|c| [&c.condition, &c.error_message]),
                )
        }))
        .chain(file.modules.iter().flat_map(|m| {
            m.inputs
                .values()
                .chain(m.count.as_ref())
                .chain(m.for_each.as_ref())
                .chain(m.providers.values().filter_map(ProviderPassing::key))
        }))
        .chain(file.outputs.iter().map(|o| &o.value))
}

/// Names start with a letter or underscore and continue with letters,
/// digits, underscores or hyphens.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl ValidationResult {
    fn error(&mut self, module: &Module, field: String, message: impl Into<String>) {
        self.errors.push(ValidationError {
            filename: module.filename.clone(),
            field,
            message: message.into(),
        });
    }

    fn warn(&mut self, module: &Module, field: String, message: impl Into<String>) {
        self.warnings.push(ValidationError {
            filename: module.filename.clone(),
            field,
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Converts the first error into an `Err`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any check failed.
    pub fn into_result(self) -> Result<Self> {
        match self.errors.first() {
            None => Ok(self),
            Some(first) => Err(EngineError::validation(
                first.message.clone(),
                Some(first.field.clone()),
            )),
        }
    }

    /// Converts every finding into a diagnostic.
    #[must_use]
    pub fn into_diagnostics(self) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let subject = |e: &ValidationError| {
            Some(crate::diagnostics::SourceRange {
                filename: e.filename.clone(),
                path: e.field.clone(),
            })
        };
        for err in &self.errors {
            diags.push(Diagnostic::error("Invalid configuration", err.message.clone()).with_subject(subject(err)));
        }
        for warning in &self.warnings {
            diags.push(
                Diagnostic::warning("Configuration warning", warning.message.clone())
                    .with_subject(subject(warning)),
            );
        }
        diags
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.filename, self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn validate(main: &str) -> ValidationResult {
        validate_with_child(main, "")
    }

    fn validate_with_child(main: &str, child: &str) -> ValidationResult {
        let config = ConfigParser::new()
            .with_source("main.yaml", main)
            .with_source("child.yaml", child)
            .load_file("main.yaml")
            .expect("load");
        ConfigValidator::new().validate(&config)
    }

    fn messages(result: &ValidationResult) -> Vec<String> {
        result.errors.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("test_instance"));
        assert!(is_valid_name("my-res-1"));
        assert!(is_valid_name("_private"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("a.b"));
        assert!(!is_valid_name("a b"));
    }

    #[test]
    fn test_valid_config_passes() {
        let result = validate(
            r#"
variables:
  - name: ami
resources:
  - type: test_instance
    name: a
    count: 2
    attributes:
      ami: "${var.ami}"
      index: "${count.index}"
  - type: test_instance
    name: b
    attributes:
      peer: "${test_instance.a[0].id}"
outputs:
  - name: id
    value: "${test_instance.b.id}"
"#,
        );
        assert!(result.is_valid(), "{:?}", messages(&result));
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_duplicates_and_repetition() {
        let result = validate(
            r"
resources:
  - type: test_instance
    name: a
    count: 1
    for_each: {}
  - type: test_instance
    name: a
",
        );
        let all = messages(&result).join("\n");
        assert!(all.contains("Duplicate resource name"));
        assert!(all.contains("cannot be used together"));
    }

    #[test]
    fn test_undeclared_references() {
        let result = validate(
            r#"
resources:
  - type: test_instance
    name: a
    attributes:
      x: "${var.missing}"
      y: "${local.nope}"
      z: "${test_instance.ghost.id}"
      w: "${count.index}"
"#,
        );
        assert_eq!(result.error_count(), 4, "{:?}", messages(&result));
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_module_output_reference() {
        let main = r#"
modules:
  - name: child
    source: child.yaml
    inputs:
      undeclared: 1
outputs:
  - name: ok
    value: "${module.child.value}"
  - name: bad
    value: "${module.child.nope}"
"#;
        let child = r"
outputs:
  - name: value
    value: 1
";
        let result = validate_with_child(main, child);
        let all = messages(&result).join("\n");
        assert_eq!(result.error_count(), 2, "{all}");
        assert!(all.contains("module.child.nope"));
        assert!(all.contains("declares no variable"));
    }

    #[test]
    fn test_removed_and_import_targets() {
        let result = validate(
            r"
resources:
  - type: test_instance
    name: a
removed:
  - from: test_instance.a
imports:
  - to: test_instance.missing
    id: i-1
",
        );
        let all = messages(&result).join("\n");
        assert!(all.contains("still declared"));
        assert!(all.contains("import target"));
    }

    #[test]
    fn test_moved_blocks() {
        let result = validate(
            r"
resources:
  - type: test_instance
    name: kept
  - type: test_instance
    name: b
moved:
  - from: test_instance.kept
    to: test_instance.b
  - from: test_instance.x[0]
    to: test_instance.b
  - from: test_instance.y
    to: other_thing.y
  - from: test_instance.z
    to: test_instance.z
  - from: test_instance.old
    to: test_instance.b
",
        );
        let all = messages(&result).join("\n");
        assert_eq!(result.error_count(), 4, "{all}");
        assert!(all.contains("still declared"));
        assert!(all.contains("only move to another resource"));
        assert!(all.contains("resource types differ"));
        assert!(all.contains("moved to itself"));
    }

    #[test]
    fn test_self_only_in_postconditions() {
        let result = validate(
            r#"
variables:
  - name: enabled
resources:
  - type: test_instance
    name: a
    attributes:
      peer: "${self.id}"
    lifecycle:
      precondition:
        - condition: "${self.ready}"
          error_message: not ready
      postcondition:
        - condition: "${self.ready}"
          error_message: "${var.enabled} ${self.id}"
"#,
        );
        assert_eq!(result.error_count(), 2, "{:?}", messages(&result));
        assert!(messages(&result).iter().all(|m| m.contains("only valid in resource postconditions")));
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_duplicate_provider_key_in_chain() {
        let main = r#"
providers:
  - name: test
    for_each:
      a: 1
modules:
  - name: child
    source: child.yaml
    providers:
      test:
        from: test
        key: a
"#;
        let child = r#"
resources:
  - type: test_instance
    name: r
    provider: test
    provider_key: b
"#;
        let result = validate_with_child(main, child);
        assert!(messages(&result).join("\n").contains("already set by the calling module"));
    }

    #[test]
    fn test_unused_variable_warning() {
        let result = validate("variables:\n  - name: unused\n    default: 1\n");
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 1);
        let diags = result.into_diagnostics();
        assert_eq!(diags.warnings().count(), 1);
    }
}
