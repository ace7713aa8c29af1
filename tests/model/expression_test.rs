use metricsql::model::{Condition, Expression, Operator, Query, Subquery, Value};
use serde_json::json;

fn parse(value: serde_json::Value) -> Expression {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_nested_condition_from_wire() {
    let e = parse(json!({"cond": {"op": "and", "exprs": [
        {"cond": {"op": "eq", "exprs": [{"name": "country"}, {"val": "US"}]}},
        {"cond": {"op": "in", "exprs": [{"name": "device"}, {"val": ["ios", "android"]}]}}
    ]}}));

    assert_eq!(
        e,
        Expression::and(vec![
            Expression::eq("country", "US"),
            Expression::in_list("device", vec!["ios", "android"]),
        ])
    );
}

#[test]
fn test_literal_kinds() {
    assert_eq!(parse(json!({"val": 3})), Expression::Value(Value::Int(3)));
    assert_eq!(parse(json!({"val": 2.5})), Expression::Value(Value::Float(2.5)));
    assert_eq!(parse(json!({"val": true})), Expression::Value(Value::Bool(true)));
    assert_eq!(
        parse(json!({"val": [1, null]})),
        Expression::Value(Value::List(vec![Value::Int(1), Value::Null]))
    );
    // Timestamps travel as strings.
    assert_eq!(
        parse(json!({"val": "2024-01-01T00:00:00Z"})),
        Expression::value("2024-01-01T00:00:00Z")
    );
}

#[test]
fn test_explicit_null_is_not_absent() {
    let e = parse(json!({"cond": {"op": "eq", "exprs": [{"name": "region"}, {"val": null}]}}));
    match e {
        Expression::Condition(Condition { op, exprs }) => {
            assert_eq!(op, Operator::Eq);
            assert_eq!(exprs[1], Expression::null());
        }
        other => panic!("expected condition, got {other:?}"),
    }
}

#[test]
fn test_malformed_nested_expression_is_rejected() {
    let err = serde_json::from_value::<Expression>(
        json!({"cond": {"op": "or", "exprs": [{"name": "a"}, {}]}}),
    )
    .unwrap_err();
    assert!(err.to_string().contains("no variant populated"), "{err}");

    let err = serde_json::from_value::<Expression>(
        json!({"name": "a", "cond": {"op": "and", "exprs": []}}),
    )
    .unwrap_err();
    assert!(err.to_string().contains("multiple variants populated: name, cond"), "{err}");
}

#[test]
fn test_unknown_operator_is_rejected() {
    let err = serde_json::from_value::<Expression>(
        json!({"cond": {"op": "between", "exprs": []}}),
    )
    .unwrap_err();
    assert!(err.to_string().contains("between"), "{err}");
}

#[test]
fn test_subquery_wire_form() {
    let e = parse(json!({"cond": {"op": "in", "exprs": [
        {"name": "store"},
        {"subquery": {
            "dimension": "store",
            "measures": ["revenue"],
            "where": {"cond": {"op": "eq", "exprs": [{"name": "region"}, {"val": "EU"}]}},
            "having": {"cond": {"op": "gt", "exprs": [{"name": "revenue"}, {"val": 1000}]}}
        }}
    ]}}));

    let expected = Expression::in_subquery(
        "store",
        Subquery {
            dimension: "store".into(),
            measures: vec!["revenue".into()],
            filter: Some(Expression::eq("region", "EU")),
            having: Some(Expression::compare(Operator::Gt, "revenue", 1000)),
        },
    );
    assert_eq!(e, expected);
}

#[test]
fn test_serialized_form_omits_unset_variants() {
    let e = Expression::and(vec![Expression::neq("device", "tv"), Expression::ilike("city", "new%")]);
    let json = serde_json::to_value(&e).unwrap();
    assert_eq!(
        json,
        json!({"cond": {"op": "and", "exprs": [
            {"cond": {"op": "neq", "exprs": [{"name": "device"}, {"val": "tv"}]}},
            {"cond": {"op": "ilike", "exprs": [{"name": "city"}, {"val": "new%"}]}}
        ]}})
    );
    let back: Expression = serde_json::from_value(json).unwrap();
    assert_eq!(back, e);
}

#[test]
fn test_query_where_clause() {
    let q: Query = serde_json::from_value(json!({
        "metrics_view": "web",
        "measures": [{"name": "views"}],
        "where": {"cond": {"op": "nin", "exprs": [{"name": "country"}, {"val": ["CN", "RU"]}]}}
    }))
    .unwrap();
    assert_eq!(q.filter, Some(Expression::not_in_list("country", vec!["CN", "RU"])));
}
