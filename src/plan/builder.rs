//! Builds a [`PlanTree`] from a validated, rewritten query.
//!
//! A period (the whole query, or one side of a comparison) is a chain of
//! stages. Stage 0 aggregates the base table. Per-grain measures add a stage
//! that left-joins one child per measure; each level of derived measures adds
//! a stage over the previous one. Intermediate stages carry every measure
//! computed so far; the last stage projects only what its consumer reads.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::{
    ComparisonJoin, FieldNode, JoinChild, JoinKind, OrderField, PlanTree, SelectBlock, Source,
    BASE_PERIOD_ALIAS, COMPARISON_PERIOD_ALIAS, ROOT_ALIAS,
};
use crate::emit;
use crate::error::{CompileError, CompileResult};
use crate::model::{
    Dimension, DimensionDef, Expression, Measure, MeasureCompute, MeasureDef, MetricsView, Query,
    Security, Subquery, TimeRange, Value,
};
use crate::sql::{SqlDialect, Token, TokenStream, TruncOptions};
use crate::translate::{PlanSubquery, TranslateError, TranslateResult, Translator};

/// Bare words of a derived expression. Quoted literals and identifiers are
/// matched whole so names inside them are never substituted.
static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|`[^`]*`|[A-Za-z_][A-Za-z0-9_]*"#).unwrap()
});

/// What the last stage of a period selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    /// The query's outputs, in request order.
    Outputs,
    /// Every measure a comparison root reads.
    Period,
}

/// Measures available in one stage, by name, in computation order.
#[derive(Debug, Default)]
struct StageScope {
    order: Vec<String>,
    exprs: HashMap<String, TokenStream>,
}

impl StageScope {
    fn insert(&mut self, name: &str, expr: TokenStream) {
        if self.exprs.insert(name.to_string(), expr).is_none() {
            self.order.push(name.to_string());
        }
    }

    fn get(&self, name: &str) -> CompileResult<&TokenStream> {
        self.exprs
            .get(name)
            .ok_or_else(|| CompileError::invariant(format!("measure '{name}' was not planned")))
    }

    /// The same measures, read from the block `alias`.
    fn lifted(&self, alias: &str) -> StageScope {
        let mut scope = StageScope::default();
        for name in &self.order {
            scope.insert(name, TokenStream::qualified(alias, name));
        }
        scope
    }

    fn fields(&self, view: &MetricsView) -> Vec<FieldNode> {
        self.order
            .iter()
            .map(|name| {
                let display = view.measure(name).map_or(name.as_str(), MeasureDef::display_name);
                FieldNode::new(name, display, self.exprs[name].clone())
            })
            .collect()
    }
}

/// Plan builder for one metrics view, security context and dialect.
pub struct Builder<'a> {
    view: &'a MetricsView,
    security: &'a Security,
    dialect: &'a dyn SqlDialect,
}

impl<'a> Builder<'a> {
    pub fn new(view: &'a MetricsView, security: &'a Security, dialect: &'a dyn SqlDialect) -> Self {
        Self {
            view,
            security,
            dialect,
        }
    }

    /// Build the plan tree for `query`.
    ///
    /// The query must have passed validation and the query-level rewrite
    /// passes; names that fail to resolve here are compiler defects.
    pub fn build(&self, query: &Query) -> CompileResult<PlanTree> {
        if !query.pivot_on.is_empty() {
            return Err(CompileError::unsupported(self.dialect.name(), "pivot"));
        }

        let mut tree = PlanTree::new(ROOT_ALIAS);
        if query.rows {
            self.build_rows(query, &mut tree)?;
        } else if query.has_comparison_measures() {
            self.build_comparison(query, &mut tree)?;
        } else {
            self.build_period(
                query,
                ROOT_ALIAS,
                query.time_range.as_ref(),
                Projection::Outputs,
                &mut tree,
            )?;
        }
        self.finish_root(query, &mut tree)?;

        tracing::debug!(
            target: "metricsql::plan",
            view = %self.view.name,
            blocks = tree.len(),
            "built plan tree"
        );
        Ok(tree)
    }

    // =========================================================================
    // Shapes
    // =========================================================================

    fn build_rows(&self, query: &Query, tree: &mut PlanTree) -> CompileResult<()> {
        let mut block = SelectBlock::new(ROOT_ALIAS, self.table());
        block.dimensions = self
            .view
            .dimensions
            .iter()
            .filter(|d| self.security.can_access_field(&d.name))
            .map(|d| FieldNode::new(&d.name, d.display_name(), definition_expr(d)))
            .collect();
        block.filter = self.base_filter(query, query.time_range.as_ref())?;
        tree.insert(block)
    }

    fn build_period(
        &self,
        query: &Query,
        alias: &str,
        range: Option<&TimeRange>,
        projection: Projection,
        tree: &mut PlanTree,
    ) -> CompileResult<()> {
        let opts = self.trunc_options(query);
        let dims = query
            .dimensions
            .iter()
            .map(|d| self.requested_dimension(d, &opts))
            .collect::<CompileResult<Vec<_>>>()?;
        let filter = self.base_filter(query, range)?;

        let mut needed: Vec<&str> = Vec::new();
        for name in query.measures.iter().filter_map(Measure::schema_measure) {
            if !needed.contains(&name) {
                needed.push(name);
            }
        }
        let levels = self.view.measure_levels(&needed)?;
        let (per, plain): (Vec<&MeasureDef>, Vec<&MeasureDef>) = levels
            .first()
            .map(|level| level.iter().copied().partition(|m| !m.per.is_empty()))
            .unwrap_or_default();

        let stages = 1 + usize::from(!per.is_empty()) + levels.len().saturating_sub(1);
        let alias_of = |i: usize| {
            if i + 1 == stages {
                alias.to_string()
            } else {
                format!("{alias}_s{i}")
            }
        };

        // Stage 0: aggregate the base table.
        let mut scope = StageScope::default();
        for m in &plain {
            scope.insert(&m.name, TokenStream::raw(&m.expression));
        }
        for m in &query.measures {
            match &m.compute {
                Some(MeasureCompute::Count) => scope.insert(&m.name, TokenStream::raw("COUNT(*)")),
                Some(MeasureCompute::CountDistinct { dimension }) => {
                    scope.insert(&m.name, self.count_distinct(dimension)?)
                }
                _ => {}
            }
        }
        let mut stage = 0;
        let mut block = SelectBlock::new(alias_of(stage), self.table());
        block.filter = filter.clone();
        block.group_by = !dims.is_empty();
        let mut stage_dims = dims.clone();

        if !per.is_empty() {
            block.dimensions = stage_dims;
            block.measures = scope.fields(self.view);
            tree.insert(block)?;

            let prev = alias_of(stage);
            stage += 1;
            let here = alias_of(stage);
            let mut next = SelectBlock::new(&here, Source::Block(prev.clone()));
            scope = scope.lifted(&prev);
            stage_dims = lift(&dims, &prev);

            for (k, m) in per.iter().enumerate() {
                let child_alias = format!("{here}_per{k}");
                let child_dims = m
                    .per
                    .iter()
                    .map(|p| {
                        query
                            .dimensions
                            .iter()
                            .position(|d| &d.name == p)
                            .map(|i| dims[i].clone())
                            .ok_or_else(|| {
                                CompileError::invariant(format!(
                                    "measure '{}' is aggregated per '{p}', which is not requested",
                                    m.name
                                ))
                            })
                    })
                    .collect::<CompileResult<Vec<_>>>()?;

                let mut child = SelectBlock::new(&child_alias, self.table());
                child.measures = vec![FieldNode::new(
                    &m.name,
                    m.display_name(),
                    TokenStream::raw(&m.expression),
                )];
                child.filter = filter.clone();
                child.group_by = true;

                let predicates: Vec<TokenStream> = child_dims
                    .iter()
                    .map(|f| {
                        self.dialect.join_on(
                            &TokenStream::qualified(&prev, &f.name),
                            &TokenStream::qualified(&child_alias, &f.name),
                        )
                    })
                    .collect();
                child.dimensions = child_dims;
                tree.insert(child)?;

                next.joins.push(JoinChild {
                    block: child_alias.clone(),
                    kind: JoinKind::Left,
                    on: Some(TokenStream::join(&predicates, Token::And)),
                });
                scope.insert(&m.name, TokenStream::qualified(&child_alias, &m.name));
            }
            block = next;
        }

        for level in levels.iter().skip(1) {
            block.dimensions = stage_dims;
            block.measures = scope.fields(self.view);
            tree.insert(block)?;

            let prev = alias_of(stage);
            stage += 1;
            block = SelectBlock::new(alias_of(stage), Source::Block(prev.clone()));
            scope = scope.lifted(&prev);
            stage_dims = lift(&dims, &prev);
            for m in level {
                let expr = self.derived_expr(m, &scope)?;
                scope.insert(&m.name, expr);
            }
        }

        block.dimensions = stage_dims;
        block.measures = match projection {
            Projection::Period => scope.fields(self.view),
            Projection::Outputs => query
                .measures
                .iter()
                .map(|m| self.output_measure(m, &scope))
                .collect::<CompileResult<Vec<_>>>()?,
        };
        tree.insert(block)
    }

    fn build_comparison(&self, query: &Query, tree: &mut PlanTree) -> CompileResult<()> {
        self.build_period(
            query,
            BASE_PERIOD_ALIAS,
            query.time_range.as_ref(),
            Projection::Period,
            tree,
        )?;
        self.build_period(
            query,
            COMPARISON_PERIOD_ALIAS,
            query.comparison_time_range.as_ref(),
            Projection::Period,
            tree,
        )?;

        let base = |name: &str| TokenStream::qualified(BASE_PERIOD_ALIAS, name);
        let prev = |name: &str| TokenStream::qualified(COMPARISON_PERIOD_ALIAS, name);

        let mut root = SelectBlock::new(ROOT_ALIAS, Source::Block(BASE_PERIOD_ALIAS.into()));
        let join = if query.dimensions.is_empty() {
            JoinChild {
                block: COMPARISON_PERIOD_ALIAS.into(),
                kind: JoinKind::Cross,
                on: None,
            }
        } else {
            if !self.dialect.supports_full_outer_join() {
                return Err(CompileError::unsupported(
                    self.dialect.name(),
                    "FULL OUTER JOIN for comparison measures",
                ));
            }
            let predicates: Vec<TokenStream> = query
                .dimensions
                .iter()
                .map(|d| self.dialect.join_on(&base(d.output_name()), &prev(d.output_name())))
                .collect();
            JoinChild {
                block: COMPARISON_PERIOD_ALIAS.into(),
                kind: JoinKind::Full,
                on: Some(TokenStream::join(&predicates, Token::And)),
            }
        };
        root.joins.push(join);

        for d in &query.dimensions {
            let name = d.output_name();
            let display = self.view.dimension(&d.name).map_or(name, DimensionDef::display_name);
            root.dimensions
                .push(FieldNode::new(name, display, coalesce(&base(name), &prev(name))));
        }

        for m in &query.measures {
            let expr = match &m.compute {
                None | Some(MeasureCompute::Count) | Some(MeasureCompute::CountDistinct { .. }) => {
                    base(&m.name)
                }
                Some(MeasureCompute::ComparisonValue { measure }) => prev(measure),
                Some(MeasureCompute::ComparisonDelta { measure }) => {
                    let mut ts = base(measure);
                    ts.keyword(Token::Minus).append(&prev(measure));
                    ts
                }
                Some(MeasureCompute::ComparisonRatio { measure }) => {
                    let mut delta = base(measure);
                    delta.keyword(Token::Minus).append(&prev(measure));
                    let mut ts = TokenStream::new();
                    ts.append_parens(&delta)
                        .keyword(Token::Div)
                        .append(&nullif_zero(&prev(measure)));
                    ts
                }
                Some(MeasureCompute::PercentOfTotal { measure, total }) => {
                    percent_of_total(&base(measure), *total)?
                }
            };
            root.measures.push(FieldNode::new(&m.name, self.measure_display(m), expr));
        }

        tree.insert(root)?;
        tree.comparison = Some(ComparisonJoin {
            base: BASE_PERIOD_ALIAS.into(),
            comparison: COMPARISON_PERIOD_ALIAS.into(),
        });
        Ok(())
    }

    /// Having, sort and pagination on the root block.
    fn finish_root(&self, query: &Query, tree: &mut PlanTree) -> CompileResult<()> {
        let having = match &query.having {
            Some(having) => {
                let root = tree.root()?;
                let resolve = |name: &str| root.field(name).map(|f| f.expr.clone());
                let planner = SubqueryPlanner {
                    builder: self,
                    outer: query,
                    range: query.time_range.as_ref(),
                };
                let translator = Translator::new(self.dialect, &resolve).with_subqueries(&planner);
                Some(translator.translate(having)?)
            }
            None => None,
        };

        let root = tree.root_mut()?;
        if let Some(having) = having {
            if root.is_aggregate() {
                root.having = Some(having);
            } else {
                root.add_filter(having);
            }
        }
        root.order = query
            .sort
            .iter()
            .map(|s| OrderField {
                name: s.name.clone(),
                desc: s.desc,
            })
            .collect();
        root.limit = query.limit.map(non_negative).transpose()?;
        root.offset = query.offset.map(non_negative).transpose()?;
        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn table(&self) -> Source {
        Source::Table {
            schema: self.view.database_schema.clone(),
            name: self.view.table.clone(),
        }
    }

    fn trunc_options(&self, query: &Query) -> TruncOptions {
        TruncOptions {
            time_zone: query.time_zone.clone().unwrap_or_else(|| "UTC".into()),
            first_day_of_week: self.view.first_day_of_week,
            first_month_of_year: self.view.first_month_of_year,
        }
    }

    fn dimension_expr(&self, name: &str) -> Option<TokenStream> {
        self.view.dimension(name).map(definition_expr)
    }

    fn requested_dimension(&self, dim: &Dimension, opts: &TruncOptions) -> CompileResult<FieldNode> {
        let def = self.view.dimension(&dim.name).ok_or_else(|| {
            CompileError::invariant(format!("dimension '{}' did not resolve", dim.name))
        })?;
        let mut expr = definition_expr(def);
        if let Some(grain) = dim.time_grain {
            let column = expr.serialize(self.dialect);
            let truncated = self.dialect.date_trunc(&column, grain, opts).ok_or_else(|| {
                CompileError::unsupported(
                    self.dialect.name(),
                    format!("truncation to {grain} in time zone {}", opts.time_zone),
                )
            })?;
            expr = TokenStream::raw(truncated);
        }
        Ok(FieldNode::new(dim.output_name(), def.display_name(), expr))
    }

    fn count_distinct(&self, dimension: &str) -> CompileResult<TokenStream> {
        let expr = self.dimension_expr(dimension).ok_or_else(|| {
            CompileError::invariant(format!("dimension '{dimension}' did not resolve"))
        })?;
        let mut ts = TokenStream::new();
        ts.push(Token::FunctionName("COUNT".into()))
            .lparen()
            .push(Token::Distinct)
            .space()
            .append(&expr)
            .rparen();
        Ok(ts)
    }

    /// Substitute measure references in a derived expression with their
    /// expressions in `scope`.
    fn derived_expr(&self, def: &MeasureDef, scope: &StageScope) -> CompileResult<TokenStream> {
        let mut resolved = HashMap::new();
        for reference in &def.references {
            resolved.insert(reference.as_str(), scope.get(reference)?.serialize(self.dialect));
        }
        let sql = IDENTIFIER.replace_all(&def.expression, |caps: &regex::Captures<'_>| {
            let word = &caps[0];
            resolved.get(word).cloned().unwrap_or_else(|| word.to_string())
        });
        Ok(TokenStream::raw(sql))
    }

    fn output_measure(&self, m: &Measure, scope: &StageScope) -> CompileResult<FieldNode> {
        let expr = match &m.compute {
            None | Some(MeasureCompute::Count) | Some(MeasureCompute::CountDistinct { .. }) => {
                scope.get(&m.name)?.clone()
            }
            Some(MeasureCompute::PercentOfTotal { measure, total }) => {
                percent_of_total(scope.get(measure)?, *total)?
            }
            Some(_) => {
                return Err(CompileError::invariant(format!(
                    "comparison measure '{}' planned without a comparison period",
                    m.name
                )))
            }
        };
        Ok(FieldNode::new(&m.name, self.measure_display(m), expr))
    }

    fn measure_display<'m>(&'m self, m: &'m Measure) -> &'m str {
        match &m.compute {
            None => self
                .view
                .measure(&m.name)
                .map_or(m.name.as_str(), MeasureDef::display_name),
            Some(_) => &m.name,
        }
    }

    /// Time bounds, the query's where clause and the security row filter,
    /// ANDed.
    fn base_filter(&self, query: &Query, range: Option<&TimeRange>) -> CompileResult<Option<TokenStream>> {
        let mut parts = Vec::new();

        if let Some(range) = range {
            if range.has_relative_fields() {
                return Err(CompileError::invariant(
                    "time range reached the builder unresolved",
                ));
            }
            if range.start.is_some() || range.end.is_some() {
                let name = range
                    .time_dimension
                    .as_deref()
                    .or(self.view.time_dimension.as_deref())
                    .ok_or_else(|| CompileError::invariant("time range without a time dimension"))?;
                let column = self.dimension_expr(name).ok_or_else(|| {
                    CompileError::invariant(format!("time dimension '{name}' did not resolve"))
                })?;
                if let Some(start) = range.start {
                    let mut ts = column.clone();
                    ts.keyword(Token::Gte).push(Token::Param(Value::Timestamp(start)));
                    parts.push(ts);
                }
                if let Some(end) = range.end {
                    let mut ts = column;
                    ts.keyword(Token::Lt).push(Token::Param(Value::Timestamp(end)));
                    parts.push(ts);
                }
            }
        }

        if let Some(filter) =
            Expression::and_all([query.filter.clone(), self.security.row_filter.clone()])
        {
            parts.push(self.translate_where(&filter, query, range)?);
        }

        Ok((!parts.is_empty()).then(|| TokenStream::join(&parts, Token::And)))
    }

    /// Translate a base filter; subqueries in it are bounded by `range`,
    /// the window of the block being filtered.
    fn translate_where(
        &self,
        expr: &Expression,
        query: &Query,
        range: Option<&TimeRange>,
    ) -> CompileResult<TokenStream> {
        let resolve = |name: &str| self.dimension_expr(name);
        let planner = SubqueryPlanner {
            builder: self,
            outer: query,
            range,
        };
        let translator = Translator::new(self.dialect, &resolve).with_subqueries(&planner);
        Ok(translator.translate(expr)?)
    }
}

/// Plans subquery expressions as single-column selects over the same view,
/// under the enclosing block's time range and the outer query's security.
struct SubqueryPlanner<'b, 'a> {
    builder: &'b Builder<'a>,
    outer: &'b Query,
    range: Option<&'b TimeRange>,
}

impl PlanSubquery for SubqueryPlanner<'_, '_> {
    fn plan_subquery(&self, sub: &Subquery) -> TranslateResult<TokenStream> {
        let query = Query {
            metrics_view: self.outer.metrics_view.clone(),
            dimensions: vec![Dimension::new(&sub.dimension)],
            measures: sub.measures.iter().map(Measure::new).collect(),
            filter: sub.filter.clone(),
            having: sub.having.clone(),
            time_range: self.range.cloned(),
            time_zone: self.outer.time_zone.clone(),
            ..Default::default()
        };
        let build = |query: &Query| -> CompileResult<TokenStream> {
            let mut tree = self.builder.build(query)?;
            // Measures only feed the having clause; IN needs one column.
            tree.root_mut()?.measures.clear();
            emit::emit_tokens(&tree, self.builder.dialect)
        };
        build(&query).map_err(|e| TranslateError::Build(Box::new(e)))
    }
}

fn definition_expr(def: &DimensionDef) -> TokenStream {
    match (&def.expression, &def.column) {
        (Some(expr), _) => TokenStream::raw(format!("({expr})")),
        (None, Some(column)) => TokenStream::ident(column),
        (None, None) => TokenStream::ident(&def.name),
    }
}

/// The same dimensions, read from the block `alias`.
fn lift(dims: &[FieldNode], alias: &str) -> Vec<FieldNode> {
    dims.iter()
        .map(|f| FieldNode::new(&f.name, &f.display_name, TokenStream::qualified(alias, &f.name)))
        .collect()
}

fn coalesce(a: &TokenStream, b: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName("COALESCE".into()))
        .lparen()
        .append(a)
        .comma()
        .space()
        .append(b)
        .rparen();
    ts
}

fn nullif_zero(expr: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName("NULLIF".into()))
        .lparen()
        .append(expr)
        .comma()
        .space()
        .push(Token::LitInt(0))
        .rparen();
    ts
}

/// `(expr) / ? * 100`, or NULL when the total is zero.
fn percent_of_total(expr: &TokenStream, total: Option<f64>) -> CompileResult<TokenStream> {
    let total = total.ok_or_else(|| {
        CompileError::invariant("percent-of-total measure reached the builder without a total")
    })?;
    let mut ts = TokenStream::new();
    if total == 0.0 {
        ts.push(Token::Null);
        return Ok(ts);
    }
    ts.append_parens(expr)
        .keyword(Token::Div)
        .push(Token::Param(Value::Float(total)))
        .keyword(Token::Mul)
        .push(Token::LitInt(100));
    Ok(ts)
}

fn non_negative(n: i64) -> CompileResult<u64> {
    u64::try_from(n).map_err(|_| CompileError::invariant(format!("negative row count {n}")))
}
