//! SQL emitter: prints a finished [`PlanTree`] as one statement.
//!
//! Blocks are printed depth-first; children used as FROM sources or join
//! children become parenthesized derived tables under their alias. The whole
//! statement is one [`TokenStream`], so placeholders and arguments come out
//! of a single walk in matching order.

use crate::error::{CompileError, CompileResult};
use crate::model::Value;
use crate::plan::{JoinKind, PlanTree, SelectBlock, Source};
use crate::sql::{SqlDialect, Token, TokenStream};

/// Emit `tree` as SQL text plus positional arguments.
pub fn emit(tree: &PlanTree, dialect: &dyn SqlDialect) -> CompileResult<(String, Vec<Value>)> {
    Ok(emit_tokens(tree, dialect)?.to_sql(dialect))
}

/// Emit `tree` as a token stream, for embedding in another statement.
pub fn emit_tokens(tree: &PlanTree, dialect: &dyn SqlDialect) -> CompileResult<TokenStream> {
    let emitter = Emitter { tree, dialect };
    emitter.block(tree.root()?, 0)
}

struct Emitter<'a> {
    tree: &'a PlanTree,
    dialect: &'a dyn SqlDialect,
}

impl Emitter<'_> {
    fn block(&self, block: &SelectBlock, depth: usize) -> CompileResult<TokenStream> {
        // A well-formed tree is never deeper than it is large.
        if depth > self.tree.len() {
            return Err(CompileError::invariant(format!(
                "block '{}' is part of a reference cycle",
                block.alias
            )));
        }

        let mut out = TokenStream::new();
        out.push(Token::Select).space();
        self.select_list(block, &mut out)?;

        out.keyword(Token::From);
        match &block.source {
            Source::Table { schema, name } => {
                out.push(Token::QualifiedIdent {
                    schema: schema.clone(),
                    name: name.clone(),
                });
            }
            Source::Block(alias) => self.derived_table(alias, depth, &mut out)?,
        }

        for join in &block.joins {
            out.space();
            match join.kind {
                JoinKind::Left => out.push(Token::Left),
                JoinKind::Right => out.push(Token::Right),
                JoinKind::Full => out.push(Token::Full).space().push(Token::Outer),
                JoinKind::Cross => out.push(Token::Cross),
            };
            out.space().push(Token::Join).space();
            self.derived_table(&join.block, depth, &mut out)?;
            match (&join.on, join.kind) {
                (Some(on), JoinKind::Cross) => {
                    return Err(CompileError::invariant(format!(
                        "cross join to '{}' has a predicate: {}",
                        join.block,
                        on.serialize(self.dialect)
                    )))
                }
                (Some(on), _) => {
                    out.keyword(Token::On).append(on);
                }
                (None, JoinKind::Cross) => {}
                (None, kind) => {
                    return Err(CompileError::invariant(format!(
                        "{kind} join to '{}' has no predicate",
                        join.block
                    )))
                }
            }
        }

        if let Some(filter) = &block.filter {
            out.keyword(Token::Where).append(filter);
        }

        if block.group_by && !block.dimensions.is_empty() {
            out.keyword(Token::GroupBy);
            let keys: Vec<TokenStream> = if self.dialect.supports_group_by_ordinal() {
                (1..=block.dimensions.len())
                    .map(|i| {
                        let mut ts = TokenStream::new();
                        ts.push(Token::LitInt(i as i64));
                        ts
                    })
                    .collect()
            } else {
                block.dimensions.iter().map(|f| f.expr.clone()).collect()
            };
            out.append(&TokenStream::comma_separated(&keys));
        }

        if let Some(having) = &block.having {
            out.keyword(Token::Having).append(having);
        }

        self.order_by(block, &mut out)?;

        let pagination = self.dialect.emit_limit_offset(block.limit, block.offset);
        if !pagination.is_empty() {
            out.space().append(&pagination);
        }
        Ok(out)
    }

    fn select_list(&self, block: &SelectBlock, out: &mut TokenStream) -> CompileResult<()> {
        let items: Vec<TokenStream> = block
            .fields()
            .map(|field| {
                let mut ts = field.expr.clone();
                ts.keyword(Token::As).push(Token::Ident(field.name.clone()));
                ts
            })
            .collect();
        if items.is_empty() {
            return Err(CompileError::invariant(format!(
                "block '{}' selects nothing",
                block.alias
            )));
        }
        out.append(&TokenStream::comma_separated(&items));
        Ok(())
    }

    /// `(SELECT …) AS "alias"`
    fn derived_table(&self, alias: &str, depth: usize, out: &mut TokenStream) -> CompileResult<()> {
        let child = self.block(self.tree.block(alias)?, depth + 1)?;
        out.append_parens(&child)
            .keyword(Token::As)
            .push(Token::Ident(alias.to_string()));
        Ok(())
    }

    fn order_by(&self, block: &SelectBlock, out: &mut TokenStream) -> CompileResult<()> {
        if block.order.is_empty() {
            let paginated = block.limit.is_some() || block.offset.is_some();
            if paginated && self.dialect.requires_order_by_for_offset() {
                out.keyword(Token::OrderBy).push(Token::Raw("(SELECT NULL)".into()));
            }
            return Ok(());
        }

        let mut keys = Vec::with_capacity(block.order.len());
        for order in &block.order {
            let field = block.field(&order.name).ok_or_else(|| {
                CompileError::invariant(format!(
                    "block '{}' orders by '{}', which it does not select",
                    block.alias, order.name
                ))
            })?;
            let mut ts = field.expr.clone();
            if order.desc {
                ts.space().push(Token::Desc);
            }
            if self.dialect.supports_nulls_ordering() {
                ts.space().push(Token::NullsLast);
            }
            keys.push(ts);
        }
        out.keyword(Token::OrderBy).append(&TokenStream::comma_separated(&keys));
        Ok(())
    }
}
