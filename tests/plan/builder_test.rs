use chrono::{DateTime, TimeZone, Utc};
use metricsql::error::{CompileError, ErrorKind};
use metricsql::model::{
    DataType, Dimension, DimensionDef, Expression, Measure, MeasureCompute, MeasureDef,
    MetricsView, Operator, Query, Security, Subquery, TimeGrain, TimeRange, Value,
};
use metricsql::plan::{Builder, PlanTree, Source};
use metricsql::sql::Dialect;

fn view() -> MetricsView {
    let mut view = MetricsView::new("shop", "orders")
        .with_time_dimension("created_at")
        .with_dimension(DimensionDef::column("region"))
        .with_dimension(DimensionDef::column("store"))
        .with_dimension(DimensionDef::column("email"))
        .with_dimension(DimensionDef::column("amount_band").with_expression("CASE WHEN amount > 100 THEN 'high' ELSE 'low' END"))
        .with_dimension(DimensionDef::column("created_at").with_type(DataType::Timestamp))
        .with_measure(MeasureDef::simple("revenue", "SUM(amount)"))
        .with_measure(MeasureDef::simple("orders", "COUNT(*)"))
        .with_measure(MeasureDef::derived(
            "aov",
            "revenue / NULLIF(orders, 0)",
            &["revenue", "orders"],
        ));
    view.database_schema = Some("sales".into());
    view.measures[0].display_name = Some("Revenue".into());
    view
}

fn build_with(dialect: Dialect, security: &Security, query: &Query) -> Result<PlanTree, CompileError> {
    let view = view();
    Builder::new(&view, security, dialect.dialect()).build(query)
}

fn build(dialect: Dialect, query: &Query) -> PlanTree {
    build_with(dialect, &Security::open(), query).unwrap()
}

fn sql(tree: &PlanTree, dialect: Dialect) -> (String, Vec<Value>) {
    metricsql::emit::emit(tree, dialect.dialect()).unwrap()
}

#[test]
fn test_source_table_is_schema_qualified() {
    let q = Query::new("shop").with_measure(Measure::new("revenue"));
    let tree = build(Dialect::Postgres, &q);
    let root = tree.root().unwrap();
    assert_eq!(
        root.source,
        Source::Table {
            schema: Some("sales".into()),
            name: "orders".into()
        }
    );
    assert!(!root.group_by);
    assert_eq!(root.measures[0].display_name, "Revenue");
    assert_eq!(
        sql(&tree, Dialect::Postgres).0,
        "SELECT SUM(amount) AS \"revenue\" FROM \"sales\".\"orders\""
    );
}

#[test]
fn test_rows_mode_selects_accessible_dimensions() {
    let mut q = Query::new("shop");
    q.rows = true;
    let security = Security::open().with_exclude(["email"]);
    let tree = build_with(Dialect::DuckDb, &security, &q).unwrap();
    let root = tree.root().unwrap();
    let names: Vec<&str> = root.dimensions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["region", "store", "amount_band", "created_at"]);
    assert!(root.measures.is_empty());
    assert!(!root.group_by);
}

#[test]
fn test_expression_dimension_is_parenthesized() {
    let q = Query::new("shop")
        .with_dimension(Dimension::new("amount_band"))
        .with_measure(Measure::new("orders"));
    let (text, _) = sql(&build(Dialect::DuckDb, &q), Dialect::DuckDb);
    assert_eq!(
        text,
        "SELECT (CASE WHEN amount > 100 THEN 'high' ELSE 'low' END) AS \"amount_band\", COUNT(*) AS \"orders\" \
         FROM \"sales\".\"orders\" GROUP BY (CASE WHEN amount > 100 THEN 'high' ELSE 'low' END)"
    );
}

#[test]
fn test_time_grain_in_query_zone() {
    let q = Query::new("shop")
        .with_dimension(Dimension::new("created_at").with_grain(TimeGrain::Day).with_alias("day"))
        .with_measure(Measure::new("revenue"))
        .with_time_zone("America/New_York");
    let tree = build(Dialect::Postgres, &q);
    let day = &tree.root().unwrap().dimensions[0];
    assert_eq!(day.name, "day");
    assert_eq!(
        day.expr.serialize(Dialect::Postgres.dialect()),
        "date_trunc('day', \"created_at\", 'America/New_York')"
    );
}

#[test]
fn test_count_distinct_measure() {
    let q = Query::new("shop")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::computed(
            "stores",
            MeasureCompute::CountDistinct {
                dimension: "store".into(),
            },
        ));
    let tree = build(Dialect::DuckDb, &q);
    assert_eq!(
        tree.root().unwrap().measures[0]
            .expr
            .serialize(Dialect::DuckDb.dialect()),
        "COUNT(DISTINCT \"store\")"
    );
}

#[test]
fn test_subquery_in_where() {
    let sub = Subquery {
        dimension: "store".into(),
        measures: vec!["revenue".into()],
        filter: None,
        having: Some(Expression::compare(Operator::Gt, "revenue", 1000)),
    };
    let q = Query::new("shop")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::new("orders"))
        .with_where(Expression::in_subquery("store", sub));
    let (text, args) = sql(&build(Dialect::Postgres, &q), Dialect::Postgres);
    assert_eq!(
        text,
        "SELECT \"region\" AS \"region\", COUNT(*) AS \"orders\" FROM \"sales\".\"orders\" \
         WHERE \"store\" IN (SELECT \"store\" AS \"store\" FROM \"sales\".\"orders\" GROUP BY \"store\" HAVING SUM(amount) > $1) \
         GROUP BY \"region\""
    );
    assert_eq!(args, vec![Value::Int(1000)]);
}

#[test]
fn test_subquery_follows_its_period_window() {
    let day = |m: u32| -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, m, 1, 0, 0, 0).unwrap() };
    let sub = Subquery {
        dimension: "store".into(),
        measures: vec![],
        filter: None,
        having: None,
    };
    let q = Query::new("shop")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::new("revenue"))
        .with_measure(Measure::computed(
            "revenue_prev",
            MeasureCompute::ComparisonValue {
                measure: "revenue".into(),
            },
        ))
        .with_where(Expression::in_subquery("store", sub))
        .with_time_range(TimeRange::absolute(day(3), day(4)))
        .with_comparison_time_range(TimeRange::absolute(day(2), day(3)));
    let (_, args) = sql(&build(Dialect::Postgres, &q), Dialect::Postgres);
    let ts = |m: u32| Value::Timestamp(day(m));
    assert_eq!(
        args,
        vec![
            // base_period and its subquery
            ts(3), ts(4), ts(3), ts(4),
            // comparison_period and its subquery
            ts(2), ts(3), ts(2), ts(3),
        ]
    );
}

#[test]
fn test_having_on_derived_root_filters_outer_block() {
    let q = Query::new("shop")
        .with_dimension(Dimension::new("region"))
        .with_measure(Measure::new("aov"))
        .with_having(Expression::compare(Operator::Gte, "aov", 20));
    let tree = build(Dialect::DuckDb, &q);
    let root = tree.root().unwrap();
    assert!(root.having.is_none());
    assert_eq!(
        root.filter.as_ref().unwrap().serialize(Dialect::DuckDb.dialect()),
        "\"base_s0\".\"revenue\" / NULLIF(\"base_s0\".\"orders\", 0) >= ?"
    );
}

#[test]
fn test_unknown_name_after_validation_is_invariant() {
    let q = Query::new("shop").with_dimension(Dimension::new("ghost"));
    let err = build_with(Dialect::DuckDb, &Security::open(), &q).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invariant);
    assert!(err.is_internal());
}
