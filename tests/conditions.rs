//! Lifecycle conditions and `moved` blocks.

mod common;

use common::{MockProvider, addr, context, object, state_with};
use graphform::diagnostics::Diagnostics;
use graphform::engine::PlanOptions;
use graphform::plans::Action;
use graphform::states::{ResourceInstanceObject, State};
use graphform::Value;

fn error_detail(diags: &Diagnostics, summary: &str) -> String {
    diags
        .errors()
        .find(|d| d.summary == summary)
        .map(|d| d.detail.clone())
        .unwrap_or_else(|| panic!("no {summary:?} error in {diags:?}"))
}

#[tokio::test]
async fn test_failed_precondition_blocks_planning() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
variables:
  - name: enabled
    default: false
resources:
  - type: test_instance
    name: a
    attributes:
      ami: base
    lifecycle:
      precondition:
        - condition: "${var.enabled}"
          error_message: "the feature flag must be enabled"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    assert!(plan.errored);
    assert_eq!(
        error_detail(&diags, "Resource precondition failed"),
        "the feature flag must be enabled"
    );
    assert_eq!(provider.count("plan"), 0);
    assert!(plan.changes.resource_instance(&addr("test_instance.a")).is_none());
}

#[tokio::test]
async fn test_null_condition_is_invalid() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
locals:
  check: null
resources:
  - type: test_instance
    name: a
    lifecycle:
      precondition:
        - condition: "${local.check}"
          error_message: unused
"#,
        &provider,
    );

    let (_, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    let detail = error_detail(&diags, "Invalid condition result");
    assert!(detail.contains("not null"), "{detail}");
    assert!(detail.contains("test_instance.a"), "{detail}");
}

#[tokio::test]
async fn test_postcondition_checks_planned_object() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      value: false
    lifecycle:
      postcondition:
        - condition: "${self.value}"
          error_message: "value of ${self.id} must be true"
        - condition: "${self.healthy}"
          error_message: not healthy
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    assert!(plan.errored);
    // `self.healthy` stays unknown until apply.
    assert_eq!(diags.errors().count(), 1, "{diags:?}");
    let failed = diags.errors().next().expect("one error");
    assert_eq!(failed.summary, "Resource postcondition failed");
    assert!(failed.subject.as_ref().is_some_and(|s| s.path.ends_with("lifecycle.postcondition[0]")));
    let change = plan.changes.resource_instance(&addr("test_instance.a")).expect("change");
    assert_eq!(change.action, Action::Create);
}

#[tokio::test]
async fn test_postcondition_checks_applied_object() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: sick
    lifecycle:
      postcondition:
        - condition: "${self.healthy}"
          error_message: "${self.id} is not healthy"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let (state, diags) = ctx.apply(&plan).await;
    assert_eq!(error_detail(&diags, "Resource postcondition failed"), "id-1 is not healthy");
    let recorded = state.current(&addr("test_instance.a")).expect("object kept");
    assert_eq!(recorded.value.get_attr("healthy"), Some(&Value::Bool(false)));
}

#[tokio::test]
async fn test_unchanged_instance_checks_conditions_on_apply() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: gate
    attributes:
      ami: sick
  - type: test_instance
    name: a
    attributes:
      ami: base
    lifecycle:
      postcondition:
        - condition: "${test_instance.gate.healthy}"
          error_message: the gate is unhealthy
"#,
        &provider,
    );
    let healthy = ResourceInstanceObject::new(Value::map([
        ("id", Value::from("ia")),
        ("ami", Value::from("base")),
        ("healthy", Value::Bool(true)),
    ]));
    let prior = state_with(&[("test_instance.a", healthy)]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let a = plan.changes.resource_instance(&addr("test_instance.a")).expect("a");
    assert_eq!(a.action, Action::NoOp);

    let (state, diags) = ctx.apply(&plan).await;
    assert_eq!(
        error_detail(&diags, "Resource postcondition failed"),
        "the gate is unhealthy"
    );
    assert_eq!(provider.count("update"), 0);
    assert!(state.current(&addr("test_instance.a")).is_some());
}

const RENAMED: &str = r"
resources:
  - type: test_instance
    name: new
    attributes:
      ami: base
moved:
  - from: test_instance.old
    to: test_instance.new
";

#[tokio::test]
async fn test_moved_resource_keeps_its_object() {
    let provider = MockProvider::new();
    let ctx = context(RENAMED, &provider);
    let prior = state_with(&[("test_instance.old", object(&[("id", "i1"), ("ami", "base")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(plan.summary_counts(), (0, 0, 0));
    assert_eq!(plan.moves.len(), 1);
    assert_eq!(plan.moves[0].from, addr("test_instance.old"));
    assert!(plan.has_changes());
    let change = plan.changes.resource_instance(&addr("test_instance.new")).expect("new");
    assert_eq!(change.action, Action::NoOp);
    assert!(plan.changes.resource_instance(&addr("test_instance.old")).is_none());

    let (state, diags) = ctx.apply(&plan).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert!(state.current(&addr("test_instance.old")).is_none());
    let moved = state.current(&addr("test_instance.new")).expect("moved object");
    assert_eq!(moved.value.get_attr("id"), Some(&Value::from("i1")));
    assert_eq!(provider.count("create"), 0);
    assert_eq!(provider.count("destroy"), 0);
}

#[tokio::test]
async fn test_move_onto_existing_object_is_skipped() {
    let provider = MockProvider::new();
    let ctx = context(RENAMED, &provider);
    let prior = state_with(&[
        ("test_instance.old", object(&[("id", "i1"), ("ami", "base")])),
        ("test_instance.new", object(&[("id", "i2"), ("ami", "base")])),
    ]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert!(plan.moves.is_empty());
    assert!(diags.warnings().any(|d| d.summary == "Move destination already exists"));
    let old = plan.changes.resource_instance(&addr("test_instance.old")).expect("old");
    assert_eq!(old.action, Action::Delete);
}
