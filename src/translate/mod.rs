//! Expression translation: [`Expression`] trees to SQL token streams.
//!
//! Translation is a single recursive pass. Literals never appear in the SQL
//! text; each one becomes a [`Token::Param`] in the output stream, so the
//! argument list is exactly the params in walk order.
//!
//! Names are resolved through [`ResolveName`], which lets the same translator
//! serve WHERE clauses (names are dimension expressions over the base table)
//! and HAVING clauses (names are output fields of a select block).

use crate::error::CompileError;
use crate::model::{Condition, Expression, Operator, Subquery, Value};
use crate::sql::dialect::helpers;
use crate::sql::{SqlDialect, Token, TokenStream};

/// Translation error.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("operator '{0}' requires at least one operand")]
    EmptyLogical(Operator),

    #[error("operator '{op}' takes {expected} operands, got {got}")]
    Arity {
        op: Operator,
        expected: &'static str,
        got: usize,
    },

    #[error("unknown field '{0}'")]
    UnknownName(String),

    #[error("invalid operand for '{op}': {reason}")]
    InvalidOperand { op: Operator, reason: String },

    #[error("subquery expressions are not available in this context")]
    SubqueryUnavailable,

    #[error("{feature} is not supported by the {dialect} dialect")]
    Unsupported { dialect: String, feature: String },

    /// Planning a subquery failed.
    #[error(transparent)]
    Build(Box<CompileError>),
}

pub type TranslateResult<T> = Result<T, TranslateError>;

/// Resolves a field name to its SQL expression in the current scope.
pub trait ResolveName {
    fn resolve(&self, name: &str) -> Option<TokenStream>;
}

impl<F> ResolveName for F
where
    F: Fn(&str) -> Option<TokenStream>,
{
    fn resolve(&self, name: &str) -> Option<TokenStream> {
        self(name)
    }
}

/// Plans a subquery expression into a complete SELECT.
pub trait PlanSubquery {
    fn plan_subquery(&self, subquery: &Subquery) -> TranslateResult<TokenStream>;
}

/// Output buffer for one top-level translation.
#[derive(Debug, Default)]
pub struct TranslateContext {
    out: TokenStream,
}

impl TranslateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> TokenStream {
        self.out
    }
}

/// Translates expressions for one dialect and name scope.
pub struct Translator<'a> {
    dialect: &'a dyn SqlDialect,
    resolver: &'a dyn ResolveName,
    subqueries: Option<&'a dyn PlanSubquery>,
}

impl<'a> Translator<'a> {
    pub fn new(dialect: &'a dyn SqlDialect, resolver: &'a dyn ResolveName) -> Self {
        Self {
            dialect,
            resolver,
            subqueries: None,
        }
    }

    pub fn with_subqueries(mut self, planner: &'a dyn PlanSubquery) -> Self {
        self.subqueries = Some(planner);
        self
    }

    /// Translate to a token stream with embedded params.
    pub fn translate(&self, expr: &Expression) -> TranslateResult<TokenStream> {
        let mut ctx = TranslateContext::new();
        self.write(expr, &mut ctx)?;
        Ok(ctx.finish())
    }

    /// Translate to SQL text and its positional arguments.
    pub fn translate_sql(&self, expr: &Expression) -> TranslateResult<(String, Vec<Value>)> {
        Ok(self.translate(expr)?.to_sql(self.dialect))
    }

    fn write(&self, expr: &Expression, ctx: &mut TranslateContext) -> TranslateResult<()> {
        match expr {
            Expression::Name(name) => {
                let resolved = self
                    .resolver
                    .resolve(name)
                    .ok_or_else(|| TranslateError::UnknownName(name.clone()))?;
                ctx.out.append(&resolved);
            }
            Expression::Value(Value::List(items)) => self.write_list(items, ctx),
            Expression::Value(value) => {
                ctx.out.push(Token::Param(value.clone()));
            }
            Expression::Subquery(sub) => self.write_subquery(sub, ctx)?,
            Expression::Condition(cond) => self.write_condition(cond, ctx)?,
        }
        Ok(())
    }

    fn write_list(&self, items: &[Value], ctx: &mut TranslateContext) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                ctx.out.comma().space();
            }
            ctx.out.push(Token::Param(item.clone()));
        }
    }

    fn write_subquery(&self, sub: &Subquery, ctx: &mut TranslateContext) -> TranslateResult<()> {
        let planner = self.subqueries.ok_or(TranslateError::SubqueryUnavailable)?;
        let select = planner.plan_subquery(sub)?;
        ctx.out.append_parens(&select);
        Ok(())
    }

    fn write_condition(&self, cond: &Condition, ctx: &mut TranslateContext) -> TranslateResult<()> {
        if cond.op.is_logical() {
            return self.write_logical(cond, ctx);
        }
        let [left, right] = cond.exprs.as_slice() else {
            return Err(TranslateError::Arity {
                op: cond.op,
                expected: "exactly 2",
                got: cond.exprs.len(),
            });
        };

        match cond.op {
            Operator::Eq | Operator::Neq => self.write_equality(cond.op, left, right, ctx),
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                let token = match cond.op {
                    Operator::Lt => Token::Lt,
                    Operator::Lte => Token::Lte,
                    Operator::Gt => Token::Gt,
                    _ => Token::Gte,
                };
                self.write(left, ctx)?;
                ctx.out.keyword(token);
                self.write(right, ctx)
            }
            Operator::Like | Operator::Nlike => {
                self.write(left, ctx)?;
                self.write_like_keyword(cond.op == Operator::Nlike, Token::Like, ctx);
                self.write(right, ctx)
            }
            Operator::Ilike | Operator::Nilike => {
                let negated = cond.op == Operator::Nilike;
                if self.dialect.supports_ilike() {
                    self.write(left, ctx)?;
                    self.write_like_keyword(negated, Token::ILike, ctx);
                    self.write(right, ctx)
                } else {
                    let l = self.translate(left)?;
                    let r = self.translate(right)?;
                    ctx.out.append(&helpers::call("LOWER", &l));
                    self.write_like_keyword(negated, Token::Like, ctx);
                    ctx.out.append(&helpers::call("LOWER", &r));
                    Ok(())
                }
            }
            Operator::In | Operator::Nin => self.write_membership(cond.op, left, right, ctx),
            Operator::And | Operator::Or => unreachable!("logical operators handled above"),
        }
    }

    fn write_like_keyword(&self, negated: bool, token: Token, ctx: &mut TranslateContext) {
        ctx.out.space();
        if negated {
            ctx.out.push(Token::Not).space();
        }
        ctx.out.push(token).space();
    }

    fn write_logical(&self, cond: &Condition, ctx: &mut TranslateContext) -> TranslateResult<()> {
        if cond.exprs.is_empty() {
            return Err(TranslateError::EmptyLogical(cond.op));
        }
        let keyword = if cond.op == Operator::And {
            Token::And
        } else {
            Token::Or
        };
        ctx.out.lparen();
        for (i, child) in cond.exprs.iter().enumerate() {
            if i > 0 {
                ctx.out.keyword(keyword.clone());
            }
            self.write(child, ctx)?;
        }
        ctx.out.rparen();
        Ok(())
    }

    /// `= NULL` is never true in SQL; comparisons against a null literal
    /// become `IS [NOT] NULL`.
    fn write_equality(
        &self,
        op: Operator,
        left: &Expression,
        right: &Expression,
        ctx: &mut TranslateContext,
    ) -> TranslateResult<()> {
        let is_null = |e: &Expression| matches!(e, Expression::Value(Value::Null));
        let null_test = if op == Operator::Eq {
            Token::IsNull
        } else {
            Token::IsNotNull
        };
        match (is_null(left), is_null(right)) {
            (_, true) => {
                self.write(left, ctx)?;
                ctx.out.space().push(null_test);
            }
            (true, false) => {
                self.write(right, ctx)?;
                ctx.out.space().push(null_test);
            }
            (false, false) => {
                self.write(left, ctx)?;
                ctx.out.keyword(if op == Operator::Eq { Token::Eq } else { Token::Ne });
                self.write(right, ctx)?;
            }
        }
        Ok(())
    }

    fn write_membership(
        &self,
        op: Operator,
        left: &Expression,
        right: &Expression,
        ctx: &mut TranslateContext,
    ) -> TranslateResult<()> {
        let negated = op == Operator::Nin;
        let in_keyword = |ctx: &mut TranslateContext| {
            ctx.out.space();
            if negated {
                ctx.out.push(Token::Not).space();
            }
            ctx.out.push(Token::In).space();
        };

        let items = match right {
            Expression::Subquery(sub) => {
                self.write(left, ctx)?;
                in_keyword(ctx);
                return self.write_subquery(sub, ctx);
            }
            Expression::Value(Value::List(items)) => items,
            other => {
                return Err(TranslateError::InvalidOperand {
                    op,
                    reason: format!(
                        "expected a list literal or subquery, got {}",
                        describe(other)
                    ),
                })
            }
        };

        let has_null = items.iter().any(Value::is_null);
        let values: Vec<Value> = items.iter().filter(|v| !v.is_null()).cloned().collect();
        let null_test = if negated {
            Token::IsNotNull
        } else {
            Token::IsNull
        };

        if values.is_empty() {
            if has_null {
                self.write(left, ctx)?;
                ctx.out.space().push(null_test);
            } else {
                // Empty IN is always false, empty NOT IN always true.
                ctx.out
                    .push(Token::LitInt(1))
                    .keyword(Token::Eq)
                    .push(Token::LitInt(if negated { 1 } else { 0 }));
            }
            return Ok(());
        }

        let lhs = self.translate(left)?;
        if has_null {
            ctx.out.lparen();
        }
        ctx.out.append(&lhs);
        in_keyword(ctx);
        ctx.out.lparen();
        self.write_list(&values, ctx);
        ctx.out.rparen();
        if has_null {
            ctx.out
                .keyword(if negated { Token::And } else { Token::Or })
                .append(&lhs)
                .space()
                .push(null_test)
                .rparen();
        }
        Ok(())
    }
}

fn describe(expr: &Expression) -> String {
    match expr {
        Expression::Name(n) => format!("field '{n}'"),
        Expression::Value(v) => format!("{} literal", v.type_name()),
        Expression::Condition(c) => format!("'{}' condition", c.op),
        Expression::Subquery(_) => "subquery".into(),
    }
}
