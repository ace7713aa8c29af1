use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use metricsql::error::{CompileError, ErrorKind};
use metricsql::executor::{cancel_pair, CancelSignal, Executor, ExecutorError};
use metricsql::model::{
    DataType, Dimension, DimensionDef, Measure, MeasureCompute, MeasureDef, MetricsView, Query,
    Security, Sort, TimeRange,
};
use metricsql::plan::{Builder, JoinKind, PlanTree};
use metricsql::rewrite::{PassContext, Pipeline, RewritePass};
use metricsql::sql::Dialect;

fn view() -> MetricsView {
    MetricsView::new("sales", "orders")
        .with_time_dimension("created_at")
        .with_dimension(DimensionDef::column("region"))
        .with_dimension(DimensionDef::column("created_at").with_type(DataType::Timestamp))
        .with_measure(MeasureDef::simple("revenue", "SUM(amount)"))
        .with_measure(MeasureDef::simple("region_revenue", "SUM(amount)").per(&["region"]))
}

fn context<'a>(view: &'a MetricsView, dialect: Dialect, cancel: &'a CancelSignal) -> PassContext<'a> {
    PassContext {
        view,
        dialect: dialect.dialect(),
        execution_time: Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
        row_cap: None,
        approximate_comparisons: false,
        executor: None,
        cancel,
        subquery_timeout: std::time::Duration::from_secs(1),
    }
}

fn build(view: &MetricsView, dialect: Dialect, query: &Query) -> PlanTree {
    Builder::new(view, &Security::open(), dialect.dialect())
        .build(query)
        .unwrap()
}

struct Total(f64);

#[async_trait]
impl Executor for Total {
    async fn query_scalar(&self, _: Query, _: &CancelSignal) -> Result<Option<f64>, ExecutorError> {
        Ok(Some(self.0))
    }
}

struct WaitsForCancel;

#[async_trait]
impl Executor for WaitsForCancel {
    async fn query_scalar(&self, _: Query, cancel: &CancelSignal) -> Result<Option<f64>, ExecutorError> {
        cancel.cancelled().await;
        Err("aborted".into())
    }
}

fn share_query() -> Query {
    Query::new("sales")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::computed(
            "share",
            MeasureCompute::PercentOfTotal {
                measure: "revenue".into(),
                total: None,
            },
        ))
        .with_time_range(TimeRange::expression("last month"))
}

#[tokio::test]
async fn test_query_passes_run_in_order() {
    let view = view();
    let cancel = CancelSignal::never();
    let executor = Total(50.0);
    let mut ctx = context(&view, Dialect::Druid, &cancel);
    ctx.executor = Some(&executor);

    let query = Pipeline::new().rewrite_query(share_query(), &ctx).await.unwrap();

    let range = query.time_range.as_ref().unwrap();
    assert_eq!(range.start, Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()));
    assert_eq!(range.end, Some(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()));
    assert_eq!(query.limit, Some(100_001));
    assert_eq!(query.effective_row_cap, Some(100_000));
    assert!(matches!(
        query.measures[0].compute,
        Some(MeasureCompute::PercentOfTotal { total: Some(t), .. }) if t == 50.0
    ));
}

#[tokio::test]
async fn test_missing_executor_names_pass() {
    let view = view();
    let cancel = CancelSignal::never();
    let ctx = context(&view, Dialect::DuckDb, &cancel);

    let err = Pipeline::new()
        .rewrite_query(share_query(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::Rewrite {
            pass: RewritePass::PercentOfTotal,
            ..
        }
    ));
}

#[tokio::test]
async fn test_cancel_aborts_subquery() {
    let view = view();
    let (handle, signal) = cancel_pair();
    let mut ctx = context(&view, Dialect::DuckDb, &signal);
    ctx.executor = Some(&WaitsForCancel);

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        handle.cancel();
    });
    let err = Pipeline::new()
        .rewrite_query(share_query(), &ctx)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(err.to_string().contains("percent of total"));
}

#[tokio::test]
async fn test_tree_passes_approximate_then_normalize() {
    let view = view();
    let cancel = CancelSignal::never();
    let mut ctx = context(&view, Dialect::Druid, &cancel);
    ctx.approximate_comparisons = true;

    let query = Query::new("sales")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::new("revenue"))
        .with_measure(Measure::computed(
            "revenue_prev",
            MeasureCompute::ComparisonValue {
                measure: "revenue".into(),
            },
        ))
        .with_sort(Sort::desc("revenue_prev"));
    let tree = build(&view, Dialect::Druid, &query);
    let tree = Pipeline::new().rewrite_tree(tree, &query, &ctx).unwrap();

    let root = tree.root().unwrap();
    assert_eq!(root.joins[0].kind, JoinKind::Right);
    assert!(root.normalized);
    assert!(root.group_by);
    assert_eq!(
        root.dimensions[0].expr.serialize(Dialect::Druid.dialect()),
        "\"comparison_period\".\"region\""
    );
    assert_eq!(
        root.measures[1].expr.serialize(Dialect::Druid.dialect()),
        "ANY_VALUE(\"comparison_period\".\"revenue\")"
    );
}

#[tokio::test]
async fn test_ascending_sort_without_nulls_ordering_keeps_full_join() {
    let view = view();
    let cancel = CancelSignal::never();
    let mut ctx = context(&view, Dialect::Druid, &cancel);
    ctx.approximate_comparisons = true;

    let query = Query::new("sales")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::computed(
            "revenue_delta",
            MeasureCompute::ComparisonDelta {
                measure: "revenue".into(),
            },
        ))
        .with_sort(Sort::asc("region"));
    let tree = build(&view, Dialect::Druid, &query);
    let tree = Pipeline::new().rewrite_tree(tree, &query, &ctx).unwrap();
    assert_eq!(tree.root().unwrap().joins[0].kind, JoinKind::Full);
}

#[tokio::test]
async fn test_per_join_normalized_on_druid_only() {
    let view = view();
    let cancel = CancelSignal::never();
    let query = Query::new("sales")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::new("revenue"))
        .with_measure(Measure::new("region_revenue"));

    for (dialect, expect) in [(Dialect::Druid, true), (Dialect::Postgres, false)] {
        let ctx = context(&view, dialect, &cancel);
        let tree = build(&view, dialect, &query);
        let tree = Pipeline::new().rewrite_tree(tree, &query, &ctx).unwrap();
        let joined: Vec<_> = tree.blocks().filter(|b| !b.joins.is_empty()).collect();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].normalized, expect, "{dialect}");
    }
}
