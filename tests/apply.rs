//! Applying plans produced by the engine.

mod common;

use common::{MockProvider, addr, context, object, state_with};
use graphform::engine::{GraphType, PlanOptions};
use graphform::graph::Vertex;
use graphform::plans::{Action, PlanMode};
use graphform::states::State;
use graphform::{Context, Value};

fn position(log: &[String], entry: &str) -> usize {
    log.iter()
        .position(|e| e == entry)
        .unwrap_or_else(|| panic!("{entry:?} not in {log:?}"))
}

async fn plan_and_apply(ctx: &Context, prior: &State, options: PlanOptions) -> State {
    let (plan, diags) = ctx.plan(prior, options).await;
    assert!(!diags.has_errors(), "plan: {diags:?}");
    let (state, diags) = ctx.apply(&plan).await;
    assert!(!diags.has_errors(), "apply: {diags:?}");
    state
}

const CHAIN: &str = r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: base
  - type: test_instance
    name: b
    attributes:
      ami: app
      value: "${test_instance.a.id}"
outputs:
  - name: a_id
    value: "${test_instance.a.id}"
"#;

#[tokio::test]
async fn test_apply_creates_in_dependency_order() {
    let provider = MockProvider::new();
    let ctx = context(CHAIN, &provider);

    let state = plan_and_apply(&ctx, &State::new(), PlanOptions::new()).await;

    let a = state.current(&addr("test_instance.a")).expect("a");
    let b = state.current(&addr("test_instance.b")).expect("b");
    let a_id = a.value.get_attr("id").cloned().expect("a id");
    assert!(a_id.is_known());
    assert_eq!(b.value.get_attr("value"), Some(&a_id));
    assert_eq!(b.dependencies, vec![addr("test_instance.a").config_resource()]);
    assert_eq!(state.root_outputs.get("a_id"), Some(&a_id));
}

#[tokio::test]
async fn test_second_plan_after_apply_has_no_changes() {
    let provider = MockProvider::new();
    let ctx = context(CHAIN, &provider);
    let state = plan_and_apply(&ctx, &State::new(), PlanOptions::new()).await;

    provider.reset();
    let (plan, diags) = ctx.plan(&state, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert!(!plan.has_changes());
    assert_eq!(plan.changes.count(Action::NoOp), 2);
    assert_eq!(provider.count("read"), 2);
}

#[tokio::test]
async fn test_noop_changes_apply_without_provider_calls() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: bar\n",
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);

    let (plan, _) = ctx.plan(&prior, PlanOptions::new()).await;
    provider.reset();
    let (state, diags) = ctx.apply(&plan).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("create") + provider.count("update") + provider.count("destroy"), 0);
    assert!(state.current(&addr("test_instance.a")).is_some());
}

#[tokio::test]
async fn test_destroy_removes_dependents_first() {
    let provider = MockProvider::new();
    let ctx = context(CHAIN, &provider);
    let state = plan_and_apply(&ctx, &State::new(), PlanOptions::new()).await;
    let a_id = state
        .current(&addr("test_instance.a"))
        .and_then(|o| o.value.get_attr("id").and_then(Value::as_str).map(str::to_string))
        .expect("a id");
    let b_id = state
        .current(&addr("test_instance.b"))
        .and_then(|o| o.value.get_attr("id").and_then(Value::as_str).map(str::to_string))
        .expect("b id");

    provider.reset();
    let state = plan_and_apply(&ctx, &state, PlanOptions::new().with_mode(PlanMode::Destroy)).await;

    let log = provider.log();
    assert!(position(&log, &format!("destroy {b_id}")) < position(&log, &format!("destroy {a_id}")));
    assert!(state.instances().is_empty());
    assert!(state.root_outputs.is_empty());
}

#[tokio::test]
async fn test_update_waits_for_destroy_of_dependent() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: base2\n",
        &provider,
    );
    let b = object(&[("id", "ib"), ("ami", "app")])
        .with_dependencies(vec![addr("test_instance.a").config_resource()]);
    let prior = state_with(&[
        ("test_instance.a", object(&[("id", "ia"), ("ami", "base")])),
        ("test_instance.b", b),
    ]);

    let graph = ctx
        .graph(GraphType::Apply, &prior, PlanOptions::new())
        .await
        .expect("graph");
    let update = graph.find(|v| v.name() == "test_instance.a").expect("update vertex");
    let destroy = graph
        .find(|v| v.name() == "test_instance.b (destroy)")
        .expect("destroy vertex");
    assert!(graph.ancestors(update).contains(&destroy));

    provider.reset();
    plan_and_apply(&ctx, &prior, PlanOptions::new()).await;
    let log = provider.log();
    assert!(position(&log, "destroy ib") < position(&log, "update ia"));
}

#[tokio::test]
async fn test_replace_destroys_before_creating() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      zone: west\n",
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "old"), ("zone", "east")]))]);

    let state = plan_and_apply(&ctx, &prior, PlanOptions::new()).await;

    let log = provider.log();
    assert!(position(&log, "destroy old") < position(&log, "create id-1"));
    let current = state.current(&addr("test_instance.a")).expect("replacement");
    assert_eq!(current.value.get_attr("zone"), Some(&Value::from("west")));
}

#[tokio::test]
async fn test_create_before_destroy_creates_first() {
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
    let prior = state_with(&[("test_instance.a", object(&[("id", "old"), ("zone", "east")]))]);

    let state = plan_and_apply(&ctx, &prior, PlanOptions::new()).await;

    let log = provider.log();
    assert!(position(&log, "create id-1") < position(&log, "destroy old"));
    let instance = state
        .resources
        .values()
        .flat_map(|r| r.instances.values())
        .next()
        .expect("instance");
    assert!(instance.deposed.is_empty());
    let current = instance.current.as_ref().expect("current");
    assert_eq!(current.value.get_attr("id"), Some(&Value::from("id-1")));
    assert!(current.create_before_destroy);
}

#[tokio::test]
async fn test_orphan_is_destroyed_on_apply() {
    let provider = MockProvider::new();
    let ctx = context("resources: []\n", &provider);
    let prior = state_with(&[("test_instance.gone", object(&[("id", "i-gone")]))]);

    let state = plan_and_apply(&ctx, &prior, PlanOptions::new()).await;

    assert_eq!(provider.details("destroy"), vec!["i-gone"]);
    assert!(state.current(&addr("test_instance.gone")).is_none());
}

#[tokio::test]
async fn test_forget_drops_object_without_destroying() {
    let provider = MockProvider::new();
    let ctx = context(
        "removed:\n  - from: test_instance.legacy\n    destroy: false\n",
        &provider,
    );
    let prior = state_with(&[("test_instance.legacy", object(&[("id", "i-1")]))]);

    let state = plan_and_apply(&ctx, &prior, PlanOptions::new()).await;

    assert_eq!(provider.count("destroy"), 0);
    assert!(state.current(&addr("test_instance.legacy")).is_none());
}

#[tokio::test]
async fn test_deferred_data_source_read_on_apply() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
  - type: test_data_source
    name: d
    mode: data
    attributes:
      input: "${test_instance.a.id}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(
        plan.changes
            .resource_instance(&addr("data.test_data_source.d"))
            .map(|c| c.action),
        Some(Action::Read)
    );
    assert_eq!(provider.count("read_data"), 0);

    let (state, diags) = ctx.apply(&plan).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.details("read_data"), vec!["id-1"]);
    let data = state.current(&addr("data.test_data_source.d")).expect("data");
    assert_eq!(data.value.get_attr("result"), Some(&Value::from("id-1")));
}

#[tokio::test]
async fn test_failed_create_keeps_other_results() {
    let provider = MockProvider::new();
    provider.fail_apply_for("broken");
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: good
    attributes:
      ami: fine
  - type: test_instance
    name: bad
    attributes:
      ami: broken
  - type: test_instance
    name: after
    attributes:
      value: "${test_instance.bad.id}"
"#,
        &provider,
    );

    let (plan, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    let (state, diags) = ctx.apply(&plan).await;

    assert!(diags.has_errors());
    assert_eq!(diags.errors().count(), 1);
    assert!(state.current(&addr("test_instance.good")).is_some());
    assert!(state.current(&addr("test_instance.bad")).is_none());
    assert!(state.current(&addr("test_instance.after")).is_none());
}

#[tokio::test]
async fn test_stale_plan_is_rejected() {
    let provider = MockProvider::new();
    let planned = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: one\n",
        &provider,
    );
    let (plan, _) = planned.plan(&State::new(), PlanOptions::new()).await;

    let edited = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      ami: two\n",
        &provider,
    );
    provider.reset();
    let (state, diags) = edited.apply(&plan).await;

    assert!(diags.has_errors());
    assert!(diags.errors().any(|d| d.detail.contains("stale") || d.summary.contains("stale")));
    assert!(provider.log().is_empty());
    assert!(state.instances().is_empty());
}

#[tokio::test]
async fn test_errored_plan_is_rejected() {
    let provider = MockProvider::new();
    let ctx = context(
        "resources:\n  - type: test_instance\n    name: a\n    attributes:\n      colour: red\n",
        &provider,
    );
    let (plan, diags) = ctx.plan(&State::new(), PlanOptions::new()).await;
    assert!(plan.errored);
    assert!(diags.has_errors());

    provider.reset();
    let (_, diags) = ctx.apply(&plan).await;
    assert!(diags.has_errors());
    assert_eq!(provider.count("create"), 0);
}
