//! Action selection of the plan walk.

mod common;

use common::{MockProvider, addr, context, object, state_with};
use graphform::addrs::{AbsProviderConfig, ModulePath, Provider};
use graphform::engine::PlanOptions;
use graphform::plans::{Action, ActionReason, PlanMode};
use graphform::states::{ObjectStatus, State};
use graphform::Value;

#[tokio::test]
async fn test_count_creates_each_instance() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
variables:
  - name: replicas
    default: 2
resources:
  - type: test_instance
    name: web
    count: "${var.replicas}"
    attributes:
      ami: "web-${count.index}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(plan.summary_counts(), (2, 0, 0));

    let second = plan
        .changes
        .resource_instance(&addr("test_instance.web[1]"))
        .expect("second instance");
    assert_eq!(second.action, Action::Create);
    assert_eq!(second.after.get_attr("ami"), Some(&Value::from("web-1")));
    assert_eq!(second.after.get_attr("id"), Some(&Value::Unknown));
}

#[tokio::test]
async fn test_root_variable_overrides_default() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
variables:
  - name: replicas
    default: 2
resources:
  - type: test_instance
    name: web
    count: "${var.replicas}"
"#,
        &provider,
    );

    let options = PlanOptions::new().with_variable("replicas", Value::from(3_i64));
    let (plan, diags) = ctx.plan(&Default::default(), options).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(plan.summary_counts(), (3, 0, 0));
}

#[tokio::test]
async fn test_missing_variable_is_an_error() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
variables:
  - name: image
resources:
  - type: test_instance
    name: a
    attributes:
      ami: "${var.image}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(diags.has_errors());
    assert!(plan.errored);
    assert_eq!(provider.count("plan"), 0);
}

#[tokio::test]
async fn test_force_new_attribute_replaces() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      zone: west
"#,
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "i-1"), ("zone", "east")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::DeleteThenCreate);
    assert_eq!(change.action_reason, ActionReason::ReplaceBecauseCannotUpdate);
    assert_eq!(change.requires_replace, vec!["zone"]);
    assert_eq!(change.after.get_attr("id"), Some(&Value::Unknown));
}

#[tokio::test]
async fn test_create_before_destroy_replace() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    lifecycle:
      create_before_destroy: true
    attributes:
      zone: west
"#,
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "i-1"), ("zone", "east")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::CreateThenDelete);
}

#[tokio::test]
async fn test_tainted_object_is_replaced() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: bar\n",
        &provider,
    );
    let tainted = object(&[("id", "i-1"), ("ami", "bar")]).with_status(ObjectStatus::Tainted);
    let prior = state_with(&[("test_instance.a", tainted)]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::DeleteThenCreate);
    assert_eq!(change.action_reason, ActionReason::ReplaceBecauseTainted);
}

#[tokio::test]
async fn test_replace_by_request() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: bar\n",
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "i-1"), ("ami", "bar")]))]);

    let mut options = PlanOptions::new();
    options.force_replace.push(addr("test_instance.a"));
    let (plan, diags) = ctx.plan(&prior, options).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action_reason, ActionReason::ReplaceByRequest);
}

#[tokio::test]
async fn test_ignore_changes_keeps_recorded_value() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    lifecycle:
      ignore_changes: [ami]
    attributes:
      ami: new-ami
"#,
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "i-1"), ("ami", "bar")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::NoOp);
}

#[tokio::test]
async fn test_removed_resource_is_deleted() {
    let provider = MockProvider::new();
    let ctx = context("resources: []\n", &provider);
    let prior = state_with(&[("test_instance.gone", object(&[("id", "i-1")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.gone"))
        .expect("change");
    assert_eq!(change.action, Action::Delete);
    assert_eq!(change.action_reason, ActionReason::DeleteBecauseNoResourceConfig);
    assert_eq!(provider.details("read"), vec!["i-1"]);
}

#[tokio::test]
async fn test_shrinking_count_deletes_extra_instances() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    count: 1\n",
        &provider,
    );
    let prior = state_with(&[
        ("test_instance.a[0]", object(&[("id", "i-0")])),
        ("test_instance.a[1]", object(&[("id", "i-1")])),
    ]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let kept = plan
        .changes
        .resource_instance(&addr("test_instance.a[0]"))
        .expect("kept");
    assert_eq!(kept.action, Action::NoOp);
    let extra = plan
        .changes
        .resource_instance(&addr("test_instance.a[1]"))
        .expect("extra");
    assert_eq!(extra.action, Action::Delete);
    assert_eq!(extra.action_reason, ActionReason::DeleteBecauseWrongRepetition);
}

#[tokio::test]
async fn test_removed_block_forgets_object() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
removed:
  - from: test_instance.legacy
    destroy: false
"#,
        &provider,
    );
    let prior = state_with(&[("test_instance.legacy", object(&[("id", "i-1")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.legacy"))
        .expect("change");
    assert_eq!(change.action, Action::Forget);
    assert!(diags.warnings().any(|d| d.summary == "Some objects will no longer be managed"));
}

#[tokio::test]
async fn test_vanished_object_is_recreated() {
    let provider = MockProvider::new();
    provider.vanish("i-1");
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: bar\n",
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "i-1"), ("ami", "bar")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::Create);
    assert_eq!(plan.drifted.len(), 1);
}

#[tokio::test]
async fn test_targets_limit_the_plan() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
"#,
        &provider,
    );

    let mut options = PlanOptions::new();
    options.targets.push("test_instance.a".parse().expect("target"));
    let (plan, diags) = ctx.plan(&Default::default(), options).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert!(plan.changes.resource_instance(&addr("test_instance.a")).is_some());
    assert!(plan.changes.resource_instance(&addr("test_instance.b")).is_none());
    assert!(diags.warnings().any(|d| d.summary == "Resource targeting is in effect"));
}

#[tokio::test]
async fn test_target_includes_dependencies() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
    attributes:
      value: "${test_instance.a.id}"
  - type: test_instance
    name: c
"#,
        &provider,
    );

    let mut options = PlanOptions::new();
    options.targets.push("test_instance.b".parse().expect("target"));
    let (plan, diags) = ctx.plan(&Default::default(), options).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert!(plan.changes.resource_instance(&addr("test_instance.a")).is_some());
    assert!(plan.changes.resource_instance(&addr("test_instance.b")).is_some());
    assert!(plan.changes.resource_instance(&addr("test_instance.c")).is_none());
}

#[tokio::test]
async fn test_excluded_resource_and_dependents_are_skipped() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
    attributes:
      value: "${test_instance.a.id}"
  - type: test_instance
    name: c
"#,
        &provider,
    );

    let mut options = PlanOptions::new();
    options.excludes.push("test_instance.a".parse().expect("exclude"));
    let (plan, diags) = ctx.plan(&Default::default(), options).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert!(plan.changes.resource_instance(&addr("test_instance.a")).is_none());
    assert!(plan.changes.resource_instance(&addr("test_instance.b")).is_none());
    assert!(plan.changes.resource_instance(&addr("test_instance.c")).is_some());
}

#[tokio::test]
async fn test_unknown_reference_propagates_into_plan() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
    attributes:
      value: "${test_instance.a.id}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let b = plan
        .changes
        .resource_instance(&addr("test_instance.b"))
        .expect("change");
    assert_eq!(b.after.get_attr("value"), Some(&Value::Unknown));
}

#[tokio::test]
async fn test_data_source_waits_for_pending_dependency() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: bar
  - type: test_data_source
    name: d
    mode: data
    depends_on:
      - test_instance.a
    attributes:
      input: x
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let read = plan
        .changes
        .resource_instance(&addr("data.test_data_source.d"))
        .expect("deferred read");
    assert_eq!(read.action, Action::Read);
    assert_eq!(read.action_reason, ActionReason::ReadBecauseDependencyPending);
    assert_eq!(provider.count("read_data"), 0);
}

#[tokio::test]
async fn test_data_source_read_during_plan() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_data_source
    name: d
    mode: data
    attributes:
      input: x
  - type: test_instance
    name: a
    attributes:
      ami: "${data.test_data_source.d.result}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("read_data"), 1);
    assert!(plan.changes.resource_instance(&addr("data.test_data_source.d")).is_none());
    let a = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(a.after.get_attr("ami"), Some(&Value::from("x")));
}

#[tokio::test]
async fn test_import_block_adopts_object() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
imports:
  - to: test_instance.a
    id: i-123
resources:
  - type: test_instance
    name: a
    attributes:
      ami: bar
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.details("import"), vec!["i-123"]);
    assert_eq!(provider.details("read"), vec!["i-123"]);
    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::Update);
    assert_eq!(change.importing.as_ref().map(|i| i.id.as_str()), Some("i-123"));
}

#[tokio::test]
async fn test_prevent_destroy_fails_destroy_plan() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    lifecycle:
      prevent_destroy: true
"#,
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "i-1")]))]);

    let (plan, diags) = ctx
        .plan(&prior, PlanOptions::new().with_mode(PlanMode::Destroy))
        .await;
    assert!(diags.has_errors());
    assert!(plan.errored);
}

#[tokio::test]
async fn test_destroy_plan_deletes_everything() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
  - type: test_instance
    name: b
    attributes:
      value: "${test_instance.a.id}"
"#,
        &provider,
    );
    let prior = state_with(&[
        ("test_instance.a", object(&[("id", "i-a")])),
        ("test_instance.b", object(&[("id", "i-b"), ("value", "i-a")])),
        ("test_instance.orphan", object(&[("id", "i-o")])),
    ]);

    let (plan, diags) = ctx
        .plan(&prior, PlanOptions::new().with_mode(PlanMode::Destroy))
        .await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(plan.summary_counts(), (0, 0, 3));
    assert_eq!(provider.count("read"), 3);
    assert_eq!(provider.count("plan"), 0);
}

#[tokio::test]
async fn test_keyed_provider_instances() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
providers:
  - name: test
    for_each: ["east", "west"]
    config:
      region: "${each.value}"
resources:
  - type: test_instance
    name: a
    for_each: ["east", "west"]
    provider_key: "${each.key}"
    attributes:
      zone: "${each.value}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(plan.summary_counts(), (2, 0, 0));

    let mut regions: Vec<String> = provider
        .configured()
        .iter()
        .filter_map(|c| c.get_attr("region").and_then(Value::as_str).map(str::to_string))
        .collect();
    regions.sort();
    assert_eq!(regions, vec!["east", "west"]);
}

#[tokio::test]
async fn test_unknown_attribute_is_rejected() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      colour: red\n",
        &provider,
    );

    let (plan, diags) = ctx.plan(&Default::default(), PlanOptions::new()).await;
    assert!(diags.has_errors());
    assert!(plan.errored);
}

#[tokio::test]
async fn test_stored_provider_without_configuration_is_an_error() {
    let provider = MockProvider::new();
    let ctx = context("resources: []\n", &provider);
    let gone = AbsProviderConfig::new(ModulePath::root(), Provider::default_for("test"), Some("gone".to_string()));
    let mut prior = State::new();
    prior.set_current(&addr("test_instance.a"), Some(object(&[("id", "ia")])), &gone);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;

    assert!(plan.errored);
    let error = diags
        .errors()
        .find(|d| d.summary == "Provider configuration not present")
        .expect("missing provider error");
    assert!(error.detail.contains("gone"), "{error:?}");
    assert!(!error.detail.contains("Provider configuration not present"), "{error:?}");
    assert_eq!(provider.count("destroy"), 0);
}
