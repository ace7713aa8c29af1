use chrono::{TimeZone, Utc};
use metricsql::model::{
    DataType, Dimension, DimensionDef, Expression, Measure, MeasureCompute, MeasureDef,
    MetricsView, Operator, Query, Security, Sort, Subquery, TimeGrain, TimeRange,
};
use metricsql::validation::{self, ValidationError};

fn view() -> MetricsView {
    MetricsView::new("web", "events")
        .with_time_dimension("timestamp")
        .with_dimension(DimensionDef::column("country"))
        .with_dimension(DimensionDef::column("device"))
        .with_dimension(DimensionDef::column("user_id"))
        .with_dimension(DimensionDef::column("timestamp").with_type(DataType::Timestamp))
        .with_measure(MeasureDef::simple("views", "SUM(views)"))
        .with_measure(MeasureDef::simple("sessions", "COUNT(DISTINCT session_id)"))
        .with_measure(MeasureDef::derived(
            "views_per_session",
            "views / NULLIF(sessions, 0)",
            &["views", "sessions"],
        ))
        .with_measure(MeasureDef::simple("country_views", "SUM(views)").per(&["country"]))
}

fn check(q: &Query) -> Result<(), ValidationError> {
    validation::validate(q, &view(), &Security::open())
}

fn messages(q: &Query, security: &Security) -> Vec<String> {
    validation::validate_all(q, &view(), security)
        .into_iter()
        .map(|e| e.to_string())
        .collect()
}

#[test]
fn test_well_formed_query_passes() {
    let q = Query::new("web")
        .with_dimension(Dimension::new("country"))
        .with_dimension(Dimension::new("timestamp").with_grain(TimeGrain::Week).with_alias("week"))
        .with_measure(Measure::new("views_per_session"))
        .with_measure(Measure::new("country_views"))
        .with_where(Expression::in_list("device", vec!["ios", "android"]))
        .with_having(Expression::compare(Operator::Gt, "views_per_session", 2))
        .with_time_range(TimeRange::expression("last month"))
        .with_sort(Sort::desc("week"))
        .with_limit(50)
        .with_offset(10);
    check(&q).unwrap();
}

#[test]
fn test_errors_carry_paths() {
    let q = Query::new("web")
        .with_dimension(Dimension::new("country"))
        .with_measure(Measure::new("views"))
        .with_where(Expression::and(vec![
            Expression::eq("country", "US"),
            Expression::eq("planet", "Mars"),
        ]));
    assert_eq!(
        check(&q).unwrap_err().to_string(),
        "where.cond.exprs[1].cond.exprs[0].name: unknown dimension 'planet'"
    );
}

#[test]
fn test_collects_every_problem() {
    let q = Query::new("web")
        .with_dimension(Dimension::new("ghost"))
        .with_measure(Measure::new("phantom"))
        .with_sort(Sort::asc("nowhere"))
        .with_limit(-1);
    let errors = messages(&q, &Security::open());
    assert_eq!(
        errors,
        vec![
            "dimensions[0]: unknown dimension 'ghost'",
            "measures[0]: unknown measure 'phantom'",
            "sort[0]: cannot sort by 'nowhere': not a requested dimension or measure",
            "limit must be non-negative, got -1",
        ]
    );
}

#[test]
fn test_excluded_fields_are_inaccessible() {
    let security = Security::open().with_exclude(["user_id", "sessions"]);
    let q = Query::new("web")
        .with_dimension(Dimension::new("user_id"))
        .with_measure(Measure::new("sessions"))
        .with_where(Expression::neq("user_id", "42"));
    let errors = messages(&q, &security);
    assert!(errors.contains(&"dimensions[0]: field 'user_id' is not accessible".to_string()));
    assert!(errors.contains(&"measures[0]: field 'sessions' is not accessible".to_string()));
    assert!(errors.contains(&"where.cond.exprs[0].name: field 'user_id' is not accessible".to_string()));
}

#[test]
fn test_rows_mode_is_exclusive() {
    let mut q = Query::new("web").with_measure(Measure::new("views"));
    q.rows = true;
    assert_eq!(check(&q).unwrap_err(), ValidationError::RawRowsWithMeasures);
}

#[test]
fn test_membership_needs_list_or_subquery() {
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_where(Expression::cond(
            Operator::In,
            vec![Expression::name("country"), Expression::value("US")],
        ));
    assert_eq!(
        check(&q).unwrap_err().to_string(),
        "where.cond.exprs[1]: malformed expression: right operand of 'in' must be a list literal or a subquery"
    );
}

#[test]
fn test_binary_operator_arity() {
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_where(Expression::cond(Operator::Eq, vec![Expression::name("country")]));
    assert_eq!(
        check(&q).unwrap_err().to_string(),
        "where.cond.exprs: malformed expression: operator 'eq' takes exactly 2 operands, got 1"
    );
}

#[test]
fn test_subquery_having_scoped_to_its_measures() {
    let sub = Subquery {
        dimension: "country".into(),
        measures: vec!["views".into()],
        filter: None,
        having: Some(Expression::compare(Operator::Gt, "sessions", 10)),
    };
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_where(Expression::in_subquery("country", sub));
    assert_eq!(
        check(&q).unwrap_err().to_string(),
        "where.cond.exprs[1].subquery.having.cond.exprs[0].name: unknown measure 'sessions'"
    );
}

#[test]
fn test_having_requires_measures() {
    let q = Query::new("web")
        .with_dimension(Dimension::new("country"))
        .with_having(Expression::eq("country", "US"));
    assert_eq!(check(&q).unwrap_err(), ValidationError::HavingWithoutMeasures);
}

#[test]
fn test_comparison_measure_needs_comparison_range() {
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_measure(Measure::computed(
            "views_prev",
            MeasureCompute::ComparisonValue {
                measure: "views".into(),
            },
        ))
        .with_time_range(TimeRange::expression("this week"));
    assert_eq!(
        check(&q).unwrap_err().to_string(),
        "measure 'views_prev' compares periods but no comparison_time_range is set"
    );
}

#[test]
fn test_per_dimension_must_be_requested() {
    let q = Query::new("web")
        .with_dimension(Dimension::new("device"))
        .with_measure(Measure::new("country_views"));
    assert!(matches!(
        check(&q),
        Err(ValidationError::InvalidMeasureCompute { ref reason, .. })
            if reason.contains("aggregated per 'country'")
    ));
}

#[test]
fn test_inverted_absolute_range() {
    let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_time_range(TimeRange::absolute(start, end));
    assert!(matches!(
        check(&q),
        Err(ValidationError::InvalidTimeRange { ref path, .. }) if path == "time_range"
    ));
}

#[test]
fn test_time_range_without_time_dimension() {
    let view = MetricsView::new("flat", "t")
        .with_dimension(DimensionDef::column("country"))
        .with_measure(MeasureDef::simple("views", "SUM(views)"));
    let q = Query::new("flat")
        .with_measure(Measure::new("views"))
        .with_time_range(TimeRange::expression("today"));
    assert_eq!(
        validation::validate(&q, &view, &Security::open()).unwrap_err(),
        ValidationError::MissingTimeDimension {
            path: "time_range".into()
        }
    );
}

#[test]
fn test_derived_measure_cycle_is_schema_error() {
    let view = MetricsView::new("loop", "t")
        .with_measure(MeasureDef::derived("a", "b + 1", &["b"]))
        .with_measure(MeasureDef::derived("b", "a + 1", &["a"]));
    let err = validation::validate_schema(&view).unwrap_err();
    assert!(matches!(err, ValidationError::InvalidSchema(ref m) if m.contains("depends on itself")));

    // Query validation reports the schema problem alone.
    let q = Query::new("loop").with_measure(Measure::new("a"));
    let errors = validation::validate_all(&q, &view, &Security::open());
    assert_eq!(errors.len(), 1);
}

#[test]
fn test_derived_reference_to_unknown_measure() {
    let view = MetricsView::new("broken", "t").with_measure(MeasureDef::derived(
        "ratio",
        "hits / misses",
        &["hits", "misses"],
    ));
    let err = validation::validate_schema(&view).unwrap_err();
    assert!(err.to_string().contains("references unknown measure"), "{err}");
}

#[test]
fn test_subquery_per_dimension_must_be_its_dimension() {
    let by_device = Subquery {
        dimension: "device".into(),
        measures: vec!["country_views".into()],
        filter: None,
        having: None,
    };
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_where(Expression::in_subquery("device", by_device));
    assert_eq!(
        check(&q).unwrap_err().to_string(),
        "where.cond.exprs[1].subquery.measures[0]: measure 'country_views' is aggregated per 'country', which must be a requested dimension"
    );

    let by_country = Subquery {
        dimension: "country".into(),
        measures: vec!["country_views".into()],
        filter: None,
        having: None,
    };
    let q = Query::new("web")
        .with_measure(Measure::new("views"))
        .with_where(Expression::in_subquery("country", by_country));
    check(&q).unwrap();
}
