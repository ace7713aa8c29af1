use std::cell::Cell;

use metricsql::model::{Expression, Operator, Subquery, Value};
use metricsql::sql::{Dialect, TokenStream};
use metricsql::translate::{PlanSubquery, TranslateError, TranslateResult, Translator};

/// Dimension scope over the base table.
fn base_columns(name: &str) -> Option<TokenStream> {
    match name {
        "country" | "device" | "city" => Some(TokenStream::ident(name)),
        "referrer_host" => Some(TokenStream::raw("(split_part(referrer, '/', 3))")),
        _ => None,
    }
}

/// Output scope of a derived block.
fn block_outputs(name: &str) -> Option<TokenStream> {
    matches!(name, "views" | "country").then(|| TokenStream::qualified("base_s0", name))
}

/// Plans every subquery as a fixed SELECT carrying one bound argument.
struct FixedPlanner {
    calls: Cell<usize>,
}

impl PlanSubquery for FixedPlanner {
    fn plan_subquery(&self, subquery: &Subquery) -> TranslateResult<TokenStream> {
        self.calls.set(self.calls.get() + 1);
        let mut ts = TokenStream::raw(format!("SELECT {} FROM t WHERE views > ", subquery.dimension));
        ts.push(metricsql::sql::Token::Param(Value::Int(500)));
        Ok(ts)
    }
}

fn translate(dialect: Dialect, expr: &Expression) -> (String, Vec<Value>) {
    Translator::new(dialect.dialect(), &base_columns)
        .translate_sql(expr)
        .unwrap()
}

#[test]
fn test_filter_on_every_dialect_binds_same_args() {
    let e = Expression::and(vec![
        Expression::in_list("country", vec!["US", "CA"]),
        Expression::neq("device", "tv"),
    ]);
    for dialect in Dialect::ALL {
        let (sql, args) = translate(dialect, &e);
        assert_eq!(
            args,
            vec![Value::from("US"), Value::from("CA"), Value::from("tv")],
            "{dialect}: {sql}"
        );
    }
}

#[test]
fn test_placeholders_number_in_walk_order() {
    let e = Expression::or(vec![
        Expression::compare(Operator::Lte, "city", "M"),
        Expression::in_list("device", vec!["ios", "android"]),
    ]);
    assert_eq!(
        translate(Dialect::Postgres, &e).0,
        "(\"city\" <= $1 OR \"device\" IN ($2, $3))"
    );
    assert_eq!(
        translate(Dialect::TSql, &e).0,
        "([city] <= @p1 OR [device] IN (@p2, @p3))"
    );
}

#[test]
fn test_expression_dimension_is_inlined() {
    let e = Expression::cond(
        Operator::Like,
        vec![Expression::name("referrer_host"), Expression::value("%google%")],
    );
    assert_eq!(
        translate(Dialect::DuckDb, &e),
        (
            "(split_part(referrer, '/', 3)) LIKE ?".into(),
            vec![Value::from("%google%")]
        )
    );

    let e = Expression::cond(
        Operator::Nlike,
        vec![Expression::name("city"), Expression::value("San%")],
    );
    assert_eq!(translate(Dialect::MySql, &e).0, "`city` NOT LIKE ?");
}

#[test]
fn test_case_insensitive_match_per_backend() {
    let e = Expression::ilike("city", "new%");
    assert_eq!(translate(Dialect::Snowflake, &e).0, "\"city\" ILIKE ?");
    assert_eq!(translate(Dialect::BigQuery, &e).0, "LOWER(`city`) LIKE LOWER(?)");
}

#[test]
fn test_null_literal_and_membership() {
    let e = Expression::neq("country", Value::Null);
    assert_eq!(translate(Dialect::DuckDb, &e), ("\"country\" IS NOT NULL".into(), vec![]));

    let e = Expression::in_list::<Value>("city", vec![Value::Null]);
    assert_eq!(translate(Dialect::DuckDb, &e), ("\"city\" IS NULL".into(), vec![]));
}

#[test]
fn test_having_scope_resolves_block_outputs() {
    let e = Expression::and(vec![
        Expression::compare(Operator::Gt, "views", 100),
        Expression::eq("country", "US"),
    ]);
    let (sql, args) = Translator::new(Dialect::DuckDb.dialect(), &block_outputs)
        .translate_sql(&e)
        .unwrap();
    assert_eq!(sql, "(\"base_s0\".\"views\" > ? AND \"base_s0\".\"country\" = ?)");
    assert_eq!(args, vec![Value::Int(100), Value::from("US")]);

    let err = Translator::new(Dialect::DuckDb.dialect(), &block_outputs)
        .translate(&Expression::eq("device", "tv"))
        .unwrap_err();
    assert_eq!(err.to_string(), "unknown field 'device'");
}

#[test]
fn test_subquery_params_share_numbering() {
    let planner = FixedPlanner { calls: Cell::new(0) };
    let sub = Subquery {
        dimension: "city".into(),
        measures: vec!["views".into()],
        filter: None,
        having: None,
    };
    let e = Expression::and(vec![
        Expression::eq("country", "US"),
        Expression::in_subquery("city", sub),
    ]);
    let (sql, args) = Translator::new(Dialect::Postgres.dialect(), &base_columns)
        .with_subqueries(&planner)
        .translate_sql(&e)
        .unwrap();
    assert_eq!(
        sql,
        "(\"country\" = $1 AND \"city\" IN (SELECT city FROM t WHERE views > $2))"
    );
    assert_eq!(args, vec![Value::from("US"), Value::Int(500)]);
    assert_eq!(planner.calls.get(), 1);
}

#[test]
fn test_invalid_membership_operand() {
    let e = Expression::cond(
        Operator::Nin,
        vec![Expression::name("city"), Expression::name("country")],
    );
    let err = Translator::new(Dialect::DuckDb.dialect(), &base_columns)
        .translate(&e)
        .unwrap_err();
    assert!(matches!(err, TranslateError::InvalidOperand { op: Operator::Nin, .. }));
    assert_eq!(
        err.to_string(),
        "invalid operand for 'nin': expected a list literal or subquery, got field 'country'"
    );
}

#[test]
fn test_comparison_arity() {
    let e = Expression::cond(
        Operator::Gte,
        vec![Expression::name("city"), Expression::value(1), Expression::value(2)],
    );
    let err = Translator::new(Dialect::DuckDb.dialect(), &base_columns)
        .translate(&e)
        .unwrap_err();
    assert_eq!(err.to_string(), "operator 'gte' takes exactly 2 operands, got 3");
}
