//! Filter and condition expressions.
//!
//! An [`Expression`] is exactly one of a field reference, a literal, a
//! condition over child expressions, or a subquery. On the wire it is an
//! object with exactly one of `name`, `val`, `cond`, `subquery` set:
//!
//! ```json
//! {"cond": {"op": "and", "exprs": [
//!     {"cond": {"op": "eq", "exprs": [{"name": "country"}, {"val": "US"}]}},
//!     {"cond": {"op": "in", "exprs": [{"name": "device"}, {"val": ["ios", "android"]}]}}
//! ]}}
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use super::value::Value;
use crate::validation::ValidationError;

/// Condition operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Ilike,
    Nilike,
    Like,
    Nlike,
    And,
    Or,
}

impl Operator {
    /// Operators that take exactly two operands.
    pub fn is_binary(self) -> bool {
        !matches!(self, Operator::And | Operator::Or)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::Nin)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::In => "in",
            Operator::Nin => "nin",
            Operator::Ilike => "ilike",
            Operator::Nilike => "nilike",
            Operator::Like => "like",
            Operator::Nlike => "nlike",
            Operator::And => "and",
            Operator::Or => "or",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An operator applied to ordered child expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub op: Operator,
    #[serde(default)]
    pub exprs: Vec<Expression>,
}

/// A single-column subquery over the same metrics view.
///
/// Selects `dimension` grouped, optionally filtered by `where` on the rows
/// and by `having` on `measures`. Used as `x IN (subquery)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subquery {
    pub dimension: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub measures: Vec<String>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub having: Option<Expression>,
}

/// Expression tagged union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawExpression", into = "RawExpression")]
pub enum Expression {
    /// Reference to a dimension or measure.
    Name(String),
    /// Literal, including null and lists.
    Value(Value),
    Condition(Condition),
    Subquery(Box<Subquery>),
}

/// Wire form of [`Expression`]: an object with optional fields, exactly one
/// of which must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExpression {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `Some(Value::Null)` for an explicit `"val": null`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub val: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subquery: Option<Box<Subquery>>,
}

fn deserialize_present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl TryFrom<RawExpression> for Expression {
    type Error = ValidationError;

    fn try_from(raw: RawExpression) -> Result<Self, Self::Error> {
        match (raw.name, raw.val, raw.cond, raw.subquery) {
            (Some(name), None, None, None) => Ok(Expression::Name(name)),
            (None, Some(val), None, None) => Ok(Expression::Value(val)),
            (None, None, Some(cond), None) => Ok(Expression::Condition(cond)),
            (None, None, None, Some(sub)) => Ok(Expression::Subquery(sub)),
            (None, None, None, None) => Err(ValidationError::MalformedExpression {
                path: "expression".into(),
                reason: "no variant populated; expected one of name, val, cond, subquery".into(),
            }),
            (name, val, cond, sub) => {
                let set: Vec<&str> = [
                    name.is_some().then_some("name"),
                    val.is_some().then_some("val"),
                    cond.is_some().then_some("cond"),
                    sub.is_some().then_some("subquery"),
                ]
                .into_iter()
                .flatten()
                .collect();
                Err(ValidationError::MalformedExpression {
                    path: "expression".into(),
                    reason: format!("multiple variants populated: {}", set.join(", ")),
                })
            }
        }
    }
}

impl From<Expression> for RawExpression {
    fn from(expr: Expression) -> Self {
        match expr {
            Expression::Name(name) => RawExpression {
                name: Some(name),
                ..Default::default()
            },
            Expression::Value(val) => RawExpression {
                val: Some(val),
                ..Default::default()
            },
            Expression::Condition(cond) => RawExpression {
                cond: Some(cond),
                ..Default::default()
            },
            Expression::Subquery(sub) => RawExpression {
                subquery: Some(sub),
                ..Default::default()
            },
        }
    }
}

// =============================================================================
// Constructors
// =============================================================================

impl Expression {
    pub fn name(name: impl Into<String>) -> Self {
        Expression::Name(name.into())
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Expression::Value(value.into())
    }

    pub fn null() -> Self {
        Expression::Value(Value::Null)
    }

    pub fn cond(op: Operator, exprs: Vec<Expression>) -> Self {
        Expression::Condition(Condition { op, exprs })
    }

    pub fn eq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cond(Operator::Eq, vec![Self::name(name), Self::value(value)])
    }

    pub fn neq(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cond(Operator::Neq, vec![Self::name(name), Self::value(value)])
    }

    pub fn compare(op: Operator, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cond(op, vec![Self::name(name), Self::value(value)])
    }

    pub fn in_list<V: Into<Value>>(name: impl Into<String>, values: Vec<V>) -> Self {
        Self::cond(Operator::In, vec![Self::name(name), Self::value(values)])
    }

    pub fn not_in_list<V: Into<Value>>(name: impl Into<String>, values: Vec<V>) -> Self {
        Self::cond(Operator::Nin, vec![Self::name(name), Self::value(values)])
    }

    pub fn in_subquery(name: impl Into<String>, subquery: Subquery) -> Self {
        Self::cond(
            Operator::In,
            vec![Self::name(name), Expression::Subquery(Box::new(subquery))],
        )
    }

    pub fn ilike(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::cond(
            Operator::Ilike,
            vec![Self::name(name), Self::value(pattern.into())],
        )
    }

    pub fn and(exprs: Vec<Expression>) -> Self {
        Self::cond(Operator::And, exprs)
    }

    pub fn or(exprs: Vec<Expression>) -> Self {
        Self::cond(Operator::Or, exprs)
    }

    /// Conjunction of the present expressions; `None` if all are absent.
    pub fn and_all(exprs: impl IntoIterator<Item = Option<Expression>>) -> Option<Expression> {
        let mut present: Vec<Expression> = exprs.into_iter().flatten().collect();
        match present.len() {
            0 => None,
            1 => present.pop(),
            _ => Some(Self::and(present)),
        }
    }
}
