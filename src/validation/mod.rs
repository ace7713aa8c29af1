//! Validation of queries against a metrics view and access policy.
//!
//! Validation is pure: it never touches the database and never mutates the
//! query. Errors name the offending field by path (`where.cond.exprs[1]`,
//! `measures[2].compute`, ...).

use std::collections::HashSet;

use crate::model::{
    Expression, MeasureCompute, MetricsView, Operator, Query, Security, Subquery, TimeRange,
    Value,
};

/// Validation error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("raw rows mode cannot be combined with dimensions")]
    RawRowsWithDimensions,

    #[error("raw rows mode cannot be combined with measures")]
    RawRowsWithMeasures,

    #[error("{path}: unknown dimension '{name}'")]
    UnknownDimension { path: String, name: String },

    #[error("{path}: unknown measure '{name}'")]
    UnknownMeasure { path: String, name: String },

    #[error("{path}: field '{name}' is not accessible")]
    FieldNotAccessible { path: String, name: String },

    #[error("duplicate output field '{name}'")]
    DuplicateField { name: String },

    #[error("{path}: cannot sort by '{name}': {reason}")]
    InvalidSort {
        path: String,
        name: String,
        reason: String,
    },

    #[error("limit must be non-negative, got {0}")]
    NegativeLimit(i64),

    #[error("offset must be non-negative, got {0}")]
    NegativeOffset(i64),

    #[error("having requires at least one measure")]
    HavingWithoutMeasures,

    #[error("{path}: malformed expression: {reason}")]
    MalformedExpression { path: String, reason: String },

    #[error("{path}: time grain on non-time dimension '{dimension}'")]
    InvalidTimeGrain { path: String, dimension: String },

    #[error("{path}: invalid time range: {reason}")]
    InvalidTimeRange { path: String, reason: String },

    #[error("{path}: a time range requires a time dimension")]
    MissingTimeDimension { path: String },

    #[error("measure '{measure}' compares periods but no comparison_time_range is set")]
    MissingComparisonTimeRange { measure: String },

    #[error("{path}: {reason}")]
    InvalidMeasureCompute { path: String, reason: String },

    #[error("invalid metrics view: {0}")]
    InvalidSchema(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a query; returns the first problem found.
pub fn validate(query: &Query, view: &MetricsView, security: &Security) -> ValidationResult<()> {
    match validate_all(query, view, security).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Validate a query, collecting every problem.
pub fn validate_all(query: &Query, view: &MetricsView, security: &Security) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let v = Validator {
        view,
        security,
        query,
    };

    if let Err(e) = validate_schema(view) {
        errors.push(e);
        return errors;
    }

    v.validate_mode(&mut errors);
    v.validate_dimensions(&mut errors);
    v.validate_measures(&mut errors);
    v.validate_unique_outputs(&mut errors);
    v.validate_sort(&mut errors);
    v.validate_pagination(&mut errors);
    v.validate_filters(&mut errors);
    v.validate_time_ranges(&mut errors);

    errors
}

/// Validate the metrics view itself: measure references resolve and derived
/// measures are acyclic.
pub fn validate_schema(view: &MetricsView) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for name in view
        .dimensions
        .iter()
        .map(|d| &d.name)
        .chain(view.measures.iter().map(|m| &m.name))
    {
        if !seen.insert(name.as_str()) {
            return Err(ValidationError::InvalidSchema(format!(
                "'{name}' is defined more than once in view '{}'",
                view.name
            )));
        }
    }
    for m in &view.measures {
        if m.is_derived() && !m.per.is_empty() {
            return Err(ValidationError::InvalidSchema(format!(
                "derived measure '{}' cannot be aggregated per dimension",
                m.name
            )));
        }
        for dim in &m.per {
            if view.dimension(dim).is_none() {
                return Err(ValidationError::InvalidSchema(format!(
                    "measure '{}' is per unknown dimension '{dim}'",
                    m.name
                )));
            }
        }
    }
    let all: Vec<&str> = view.measures.iter().map(|m| m.name.as_str()).collect();
    view.measure_levels(&all).map(|_| ())
}

struct Validator<'a> {
    view: &'a MetricsView,
    security: &'a Security,
    query: &'a Query,
}

/// Which names an expression may reference.
#[derive(Clone, Copy)]
enum Scope<'a> {
    /// Schema dimensions (where clauses, security filters).
    Dimensions,
    /// Outputs of the query (having).
    Outputs,
    /// A subquery's dimension and measures (subquery having).
    SubqueryOutputs(&'a Subquery),
}

impl<'a> Validator<'a> {
    fn validate_mode(&self, errors: &mut Vec<ValidationError>) {
        if self.query.rows {
            if !self.query.dimensions.is_empty() {
                errors.push(ValidationError::RawRowsWithDimensions);
            }
            if !self.query.measures.is_empty() {
                errors.push(ValidationError::RawRowsWithMeasures);
            }
        }
    }

    fn check_dimension(&self, path: &str, name: &str, errors: &mut Vec<ValidationError>) -> bool {
        if self.view.dimension(name).is_none() {
            errors.push(ValidationError::UnknownDimension {
                path: path.into(),
                name: name.into(),
            });
            return false;
        }
        if !self.security.can_access_field(name) {
            errors.push(ValidationError::FieldNotAccessible {
                path: path.into(),
                name: name.into(),
            });
            return false;
        }
        true
    }

    fn check_measure(&self, path: &str, name: &str, errors: &mut Vec<ValidationError>) -> bool {
        if self.view.measure(name).is_none() {
            errors.push(ValidationError::UnknownMeasure {
                path: path.into(),
                name: name.into(),
            });
            return false;
        }
        if !self.security.can_access_field(name) {
            errors.push(ValidationError::FieldNotAccessible {
                path: path.into(),
                name: name.into(),
            });
            return false;
        }
        true
    }

    fn validate_dimensions(&self, errors: &mut Vec<ValidationError>) {
        for (i, dim) in self.query.dimensions.iter().enumerate() {
            let path = format!("dimensions[{i}]");
            if !self.check_dimension(&path, &dim.name, errors) {
                continue;
            }
            if dim.time_grain.is_some() {
                let temporal = self
                    .view
                    .dimension(&dim.name)
                    .is_some_and(|d| d.data_type.is_temporal());
                if !temporal {
                    errors.push(ValidationError::InvalidTimeGrain {
                        path,
                        dimension: dim.name.clone(),
                    });
                }
            }
        }
    }

    fn validate_measures(&self, errors: &mut Vec<ValidationError>) {
        let requested_dims: HashSet<&str> =
            self.query.dimensions.iter().map(|d| d.name.as_str()).collect();

        for (i, measure) in self.query.measures.iter().enumerate() {
            let path = format!("measures[{i}]");
            if measure.compute.is_some() && self.view.measure(&measure.name).is_some() {
                errors.push(ValidationError::InvalidMeasureCompute {
                    path: format!("{path}.name"),
                    reason: format!("computed measure '{}' shadows a schema measure", measure.name),
                });
                continue;
            }
            match &measure.compute {
                None => {
                    if !self.check_measure(&path, &measure.name, errors) {
                        continue;
                    }
                }
                Some(MeasureCompute::Count) => {}
                Some(MeasureCompute::CountDistinct { dimension }) => {
                    self.check_dimension(&format!("{path}.compute.dimension"), dimension, errors);
                    continue;
                }
                Some(compute) => {
                    let base = compute.base_measure().unwrap_or_default();
                    if !self.check_measure(&format!("{path}.compute.measure"), base, errors) {
                        continue;
                    }
                    if compute.is_comparison() && self.query.comparison_time_range.is_none() {
                        errors.push(ValidationError::MissingComparisonTimeRange {
                            measure: measure.name.clone(),
                        });
                    }
                    if let MeasureCompute::PercentOfTotal {
                        total: Some(total), ..
                    } = compute
                    {
                        if !total.is_finite() {
                            errors.push(ValidationError::InvalidMeasureCompute {
                                path: format!("{path}.compute.total"),
                                reason: "total must be a finite number".into(),
                            });
                        }
                    }
                }
            }

            let Some(schema_name) = measure.schema_measure() else {
                continue;
            };
            self.check_per_dimensions(&path, schema_name, &requested_dims, errors);
        }
    }

    /// Per-grain dimensions of a measure and everything it reads must be
    /// among `requested`.
    fn check_per_dimensions(
        &self,
        path: &str,
        measure: &str,
        requested: &HashSet<&str>,
        errors: &mut Vec<ValidationError>,
    ) {
        let Ok(levels) = self.view.measure_levels(&[measure]) else {
            return;
        };
        for def in levels.iter().flatten() {
            for per in &def.per {
                if !requested.contains(per.as_str()) {
                    errors.push(ValidationError::InvalidMeasureCompute {
                        path: path.into(),
                        reason: format!(
                            "measure '{}' is aggregated per '{per}', which must be a requested dimension",
                            def.name
                        ),
                    });
                }
            }
        }
    }

    fn validate_unique_outputs(&self, errors: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for name in self.query.output_names() {
            if !seen.insert(name) {
                errors.push(ValidationError::DuplicateField { name: name.into() });
            }
        }
    }

    fn validate_sort(&self, errors: &mut Vec<ValidationError>) {
        let outputs: HashSet<&str> = self.query.output_names().collect();
        for (i, sort) in self.query.sort.iter().enumerate() {
            let path = format!("sort[{i}]");
            if self.query.rows {
                if self.view.dimension(&sort.name).is_none()
                    || !self.security.can_access_field(&sort.name)
                {
                    errors.push(ValidationError::InvalidSort {
                        path,
                        name: sort.name.clone(),
                        reason: "not an accessible dimension".into(),
                    });
                }
            } else if !outputs.contains(sort.name.as_str()) {
                errors.push(ValidationError::InvalidSort {
                    path,
                    name: sort.name.clone(),
                    reason: "not a requested dimension or measure".into(),
                });
            }
        }
    }

    fn validate_pagination(&self, errors: &mut Vec<ValidationError>) {
        if let Some(limit) = self.query.limit.filter(|l| *l < 0) {
            errors.push(ValidationError::NegativeLimit(limit));
        }
        if let Some(offset) = self.query.offset.filter(|o| *o < 0) {
            errors.push(ValidationError::NegativeOffset(offset));
        }
    }

    fn validate_filters(&self, errors: &mut Vec<ValidationError>) {
        if let Some(filter) = &self.query.filter {
            self.validate_expression(filter, "where", Scope::Dimensions, errors);
        }
        if let Some(having) = &self.query.having {
            if self.query.measures.is_empty() {
                errors.push(ValidationError::HavingWithoutMeasures);
            } else {
                self.validate_expression(having, "having", Scope::Outputs, errors);
            }
        }
    }

    fn validate_time_ranges(&self, errors: &mut Vec<ValidationError>) {
        let ranges = [
            ("time_range", self.query.time_range.as_ref()),
            (
                "comparison_time_range",
                self.query.comparison_time_range.as_ref(),
            ),
        ];
        for (path, range) in ranges {
            let Some(range) = range else { continue };
            self.validate_time_range(path, range, errors);
        }
        if let Some(tz) = &self.query.time_zone {
            if tz.parse::<chrono_tz::Tz>().is_err() {
                errors.push(ValidationError::InvalidTimeRange {
                    path: "time_zone".into(),
                    reason: format!("unknown time zone '{tz}'"),
                });
            }
        }
    }

    fn validate_time_range(&self, path: &str, range: &TimeRange, errors: &mut Vec<ValidationError>) {
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                errors.push(ValidationError::InvalidTimeRange {
                    path: path.into(),
                    reason: format!("start {start} is after end {end}"),
                });
            }
        }
        if range.is_unbounded() {
            return;
        }
        match range.time_dimension.as_ref().or(self.view.time_dimension.as_ref()) {
            None => errors.push(ValidationError::MissingTimeDimension { path: path.into() }),
            Some(name) if !self.security.can_access_field(name) => {
                errors.push(ValidationError::FieldNotAccessible {
                    path: format!("{path}.time_dimension"),
                    name: name.clone(),
                })
            }
            Some(_) => {}
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn validate_expression(
        &self,
        expr: &Expression,
        path: &str,
        scope: Scope<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        match expr {
            Expression::Name(name) => self.validate_name(name, &format!("{path}.name"), scope, errors),
            Expression::Value(Value::List(_)) => {
                errors.push(ValidationError::MalformedExpression {
                    path: format!("{path}.val"),
                    reason: "a list literal is only valid as the right operand of in/nin".into(),
                });
            }
            Expression::Value(_) => {}
            Expression::Subquery(sub) => {
                self.validate_subquery(sub, &format!("{path}.subquery"), errors)
            }
            Expression::Condition(cond) => {
                let path = format!("{path}.cond");
                let n = cond.exprs.len();
                let arity_ok = if cond.op.is_binary() { n == 2 } else { n >= 2 };
                if !arity_ok {
                    let expected = if cond.op.is_binary() {
                        "exactly 2"
                    } else {
                        "at least 2"
                    };
                    errors.push(ValidationError::MalformedExpression {
                        path: format!("{path}.exprs"),
                        reason: format!("operator '{}' takes {expected} operands, got {n}", cond.op),
                    });
                    return;
                }
                for (i, child) in cond.exprs.iter().enumerate() {
                    let child_path = format!("{path}.exprs[{i}]");
                    if cond.op.is_membership() && i == 1 {
                        match child {
                            Expression::Value(Value::List(_)) => {}
                            Expression::Subquery(sub) => {
                                self.validate_subquery(sub, &format!("{child_path}.subquery"), errors)
                            }
                            _ => errors.push(ValidationError::MalformedExpression {
                                path: child_path,
                                reason: format!(
                                    "right operand of '{}' must be a list literal or a subquery",
                                    cond.op
                                ),
                            }),
                        }
                        continue;
                    }
                    if matches!(cond.op, Operator::Like | Operator::Nlike | Operator::Ilike | Operator::Nilike)
                        && i == 1
                        && matches!(child, Expression::Value(v) if !matches!(v, Value::String(_)))
                    {
                        errors.push(ValidationError::MalformedExpression {
                            path: child_path,
                            reason: format!("pattern for '{}' must be a string", cond.op),
                        });
                        continue;
                    }
                    self.validate_expression(child, &child_path, scope, errors);
                }
            }
        }
    }

    fn validate_name(&self, name: &str, path: &str, scope: Scope<'_>, errors: &mut Vec<ValidationError>) {
        match scope {
            Scope::Dimensions => {
                self.check_dimension(path, name, errors);
            }
            Scope::Outputs => {
                if self.query.dimension_by_output(name).is_none()
                    && self.query.measure_by_name(name).is_none()
                {
                    errors.push(ValidationError::UnknownMeasure {
                        path: path.into(),
                        name: name.into(),
                    });
                }
            }
            Scope::SubqueryOutputs(sub) => {
                if sub.dimension != name && !sub.measures.iter().any(|m| m == name) {
                    errors.push(ValidationError::UnknownMeasure {
                        path: path.into(),
                        name: name.into(),
                    });
                }
            }
        }
    }

    fn validate_subquery(&self, sub: &Subquery, path: &str, errors: &mut Vec<ValidationError>) {
        self.check_dimension(&format!("{path}.dimension"), &sub.dimension, errors);
        let grouped_by = HashSet::from([sub.dimension.as_str()]);
        for (i, m) in sub.measures.iter().enumerate() {
            let measure_path = format!("{path}.measures[{i}]");
            if self.check_measure(&measure_path, m, errors) {
                self.check_per_dimensions(&measure_path, m, &grouped_by, errors);
            }
        }
        if let Some(filter) = &sub.filter {
            self.validate_expression(filter, &format!("{path}.where"), Scope::Dimensions, errors);
        }
        if let Some(having) = &sub.having {
            if sub.measures.is_empty() {
                errors.push(ValidationError::HavingWithoutMeasures);
            } else {
                self.validate_expression(
                    having,
                    &format!("{path}.having"),
                    Scope::SubqueryOutputs(sub),
                    errors,
                );
            }
        }
    }
}
