//! Refresh policy behaviour of the plan walk.

mod common;

use std::sync::Arc;

use common::{MockProvider, addr, context, object, state_with};
use graphform::engine::{PlanOptions, RefreshMode, RefreshStats};
use graphform::plans::{Action, ActionReason, PlanMode};

const SINGLE: &str = r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: bar
"#;

const SINGLE_CHANGED: &str = r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: new-ami
"#;

fn config_refresh() -> PlanOptions {
    PlanOptions::new().with_refresh_mode(RefreshMode::Config)
}

#[tokio::test]
async fn test_config_refresh_skips_unchanged_instance() {
    let provider = MockProvider::new();
    let ctx = context(SINGLE, &provider);
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);

    let (plan, diags) = ctx.plan(&prior, config_refresh()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("read"), 0);

    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::NoOp);
}

#[tokio::test]
async fn test_config_refresh_reads_changed_instance() {
    let provider = MockProvider::new();
    let ctx = context(SINGLE_CHANGED, &provider);
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);

    let (plan, diags) = ctx.plan(&prior, config_refresh()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.details("read"), vec!["foo"]);

    let change = plan
        .changes
        .resource_instance(&addr("test_instance.a"))
        .expect("change");
    assert_eq!(change.action, Action::Update);
}

#[tokio::test]
async fn test_config_refresh_reads_only_changed_resources() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: a
  - type: test_instance
    name: b
    attributes:
      ami: b
  - type: test_instance
    name: c
    attributes:
      ami: c-changed
"#,
        &provider,
    );
    let prior = state_with(&[
        ("test_instance.a", object(&[("id", "ia"), ("ami", "a")])),
        ("test_instance.b", object(&[("id", "ib"), ("ami", "b")])),
        ("test_instance.c", object(&[("id", "ic"), ("ami", "c")])),
    ]);

    let (_, diags) = ctx.plan(&prior, config_refresh()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.details("read"), vec!["ic"]);
}

#[tokio::test]
async fn test_config_refresh_reads_and_deletes_orphan() {
    let provider = MockProvider::new();
    let ctx = context(SINGLE, &provider);
    let prior = state_with(&[
        ("test_instance.a", object(&[("id", "foo"), ("ami", "bar")])),
        ("test_instance.gone", object(&[("id", "igone"), ("ami", "old")])),
    ]);
    let stats = Arc::new(RefreshStats::new());

    let (plan, diags) = ctx
        .plan(&prior, config_refresh().with_refresh_stats(Arc::clone(&stats)))
        .await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.details("read"), vec!["igone"]);

    let change = plan
        .changes
        .resource_instance(&addr("test_instance.gone"))
        .expect("orphan change");
    assert_eq!(change.action, Action::Delete);
    assert_eq!(change.action_reason, ActionReason::DeleteBecauseNoResourceConfig);

    let counts = stats.counts();
    assert_eq!(counts.managed_total, 2);
    assert_eq!(counts.managed_refreshed, 1);
    assert_eq!(counts.managed_skipped, 1);
    assert_eq!(counts.managed_total, counts.managed_refreshed + counts.managed_skipped);
}

#[tokio::test]
async fn test_config_refresh_counts_new_instance_as_refreshed() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: bar
  - type: test_instance
    name: b
    attributes:
      ami: fresh
"#,
        &provider,
    );
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);
    let stats = Arc::new(RefreshStats::new());

    let (plan, diags) = ctx
        .plan(&prior, config_refresh().with_refresh_stats(Arc::clone(&stats)))
        .await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("read"), 0);
    assert_eq!(
        plan.changes
            .resource_instance(&addr("test_instance.b"))
            .map(|c| c.action),
        Some(Action::Create)
    );

    let counts = stats.counts();
    assert_eq!(counts.managed_total, 2);
    assert_eq!(counts.managed_refreshed, 1);
    assert_eq!(counts.managed_skipped, 1);
}

#[tokio::test]
async fn test_full_refresh_always_reads() {
    let provider = MockProvider::new();
    let ctx = context(SINGLE, &provider);
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);

    let (plan, diags) = ctx.plan(&prior, PlanOptions::new()).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("read"), 1);
    assert!(!plan.has_changes());
}

#[tokio::test]
async fn test_no_refresh_never_reads() {
    let provider = MockProvider::new();
    let ctx = context(SINGLE_CHANGED, &provider);
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);
    let stats = Arc::new(RefreshStats::new());

    let options = PlanOptions::new()
        .with_refresh_mode(RefreshMode::None)
        .with_refresh_stats(Arc::clone(&stats));
    let (plan, diags) = ctx.plan(&prior, options).await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("read"), 0);
    assert_eq!(plan.summary_counts(), (0, 1, 0));

    let counts = stats.counts();
    assert_eq!(counts.managed_total, 1);
    assert_eq!(counts.managed_skipped, 1);
}

#[tokio::test]
async fn test_refresh_stats_in_config_mode() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_instance
    name: a
    attributes:
      ami: a
  - type: test_instance
    name: b
    attributes:
      ami: b-changed
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
    let prior = state_with(&[
        ("test_instance.a", object(&[("id", "ia"), ("ami", "a")])),
        ("test_instance.b", object(&[("id", "ib"), ("ami", "b")])),
        ("data.test_data_source.d", object(&[("input", "x"), ("result", "x")])),
    ]);
    let stats = Arc::new(RefreshStats::new());

    let (_, diags) = ctx
        .plan(&prior, config_refresh().with_refresh_stats(Arc::clone(&stats)))
        .await;
    assert!(!diags.has_errors(), "{diags:?}");

    let counts = stats.counts();
    assert_eq!(counts.managed_total, 2);
    assert_eq!(counts.managed_refreshed, 1);
    assert_eq!(counts.managed_skipped, 1);
    assert_eq!(counts.data_total, 1);
    assert_eq!(counts.data_refreshed, 1);
    assert_eq!(provider.count("read_data"), 1);

    let advisory = diags
        .warnings()
        .find(|d| d.summary == "Selective refresh mode")
        .expect("selective refresh warning");
    assert!(advisory.detail.contains("1 of 2 managed resources"));
}

#[tokio::test]
async fn test_config_refresh_skips_independent_data_source() {
    let provider = MockProvider::new();
    let ctx = context(
        r#"
resources:
  - type: test_data_source
    name: d
    mode: data
    attributes:
      input: x
"#,
        &provider,
    );
    let prior = state_with(&[("data.test_data_source.d", object(&[("input", "x"), ("result", "x")]))]);
    let stats = Arc::new(RefreshStats::new());

    let (_, diags) = ctx
        .plan(&prior, config_refresh().with_refresh_stats(Arc::clone(&stats)))
        .await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("read_data"), 0);
    assert_eq!(stats.counts().data_skipped, 1);
}

#[tokio::test]
async fn test_config_refresh_rejected_with_refresh_only() {
    let provider = MockProvider::new();
    let ctx = context(SINGLE, &provider);
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);

    let options = config_refresh().with_mode(PlanMode::RefreshOnly);
    let (plan, diags) = ctx.plan(&prior, options).await;
    assert!(diags.has_errors());
    assert!(plan.errored);
    assert!(provider.log().is_empty(), "unexpected calls: {:?}", provider.log());
}

#[tokio::test]
async fn test_refresh_only_records_drift_without_changes() {
    let provider = MockProvider::new();
    provider.vanish("foo");
    let ctx = context(SINGLE, &provider);
    let prior = state_with(&[("test_instance.a", object(&[("id", "foo"), ("ami", "bar")]))]);

    let (plan, diags) = ctx
        .plan(&prior, PlanOptions::new().with_mode(PlanMode::RefreshOnly))
        .await;
    assert!(!diags.has_errors(), "{diags:?}");
    assert_eq!(provider.count("plan"), 0);
    assert!(plan.changes.resources.is_empty());
    assert!(plan.prior_state.current(&addr("test_instance.a")).is_none());
    assert_eq!(plan.drifted.len(), 1);
    assert_eq!(plan.drifted[0].action, Action::Delete);
    assert!(plan.has_changes());
}
