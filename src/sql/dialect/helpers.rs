//! Shared helper functions for SQL dialect implementations.
//!
//! This module provides reusable building blocks that dialects can compose
//! to implement the `SqlDialect` trait with minimal duplication.

use super::super::token::{Token, TokenStream};
use super::TruncOptions;
use crate::model::TimeGrain;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, Snowflake, ClickHouse, Druid
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL, BigQuery
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL (SQL Server, Azure Synapse)
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

/// Quote string with single quotes (standard SQL).
pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Quote string with N prefix for Unicode (T-SQL).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

/// Quote string with backslash escaping (MySQL, BigQuery, ClickHouse).
pub fn quote_string_backslash(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

// =============================================================================
// Expression Builders
// =============================================================================

/// `NAME(expr)`
pub fn call(name: &str, expr: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.push(Token::FunctionName(name.into())).append_parens(expr);
    ts
}

/// `(l = r OR (l IS NULL AND r IS NULL))` for backends without a null-safe
/// equality operator.
pub fn null_safe_eq_expanded(left: &TokenStream, right: &TokenStream) -> TokenStream {
    let mut ts = TokenStream::new();
    ts.lparen()
        .append(left)
        .keyword(Token::Eq)
        .append(right)
        .keyword(Token::Or)
        .lparen()
        .append(left)
        .space()
        .push(Token::IsNull)
        .keyword(Token::And)
        .append(right)
        .space()
        .push(Token::IsNull)
        .rparen()
        .rparen();
    ts
}

// =============================================================================
// Pagination
// =============================================================================

/// Emit LIMIT ... OFFSET ... (standard SQL).
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// Emit OFFSET ... ROWS FETCH NEXT ... ROWS ONLY (T-SQL style).
/// Note: Requires ORDER BY clause in T-SQL
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();
    if limit.is_none() && offset.is_none() {
        return ts;
    }

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(off as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Time Truncation
// =============================================================================

/// `(expr + INTERVAL n UNIT)` / `(expr - INTERVAL n UNIT)`.
/// Used by: DuckDB, MySQL
pub fn interval_add(expr: &str, n: i64, unit: &str) -> String {
    if n < 0 {
        format!("({expr} - INTERVAL {} {unit})", -n)
    } else {
        format!("({expr} + INTERVAL {n} {unit})")
    }
}

/// Shift-truncate-unshift for calendars that don't start on Monday / January.
///
/// Weeks are shifted forward so the configured first day lands on Monday,
/// truncated, and shifted back. Quarters and years are shifted back by the
/// fiscal offset in months, truncated, and shifted forward.
pub fn calendar_trunc(
    expr: &str,
    grain: TimeGrain,
    opts: &TruncOptions,
    trunc: impl Fn(&str, TimeGrain) -> String,
    add_days: impl Fn(&str, i64) -> String,
    add_months: impl Fn(&str, i64) -> String,
) -> String {
    match grain {
        TimeGrain::Week if opts.week_shift_days() != 0 => {
            let k = i64::from(opts.week_shift_days());
            add_days(&trunc(&add_days(expr, k), grain), -k)
        }
        TimeGrain::Quarter | TimeGrain::Year if opts.year_shift_months() != 0 => {
            let m = i64::from(opts.year_shift_months());
            add_months(&trunc(&add_months(expr, -m), grain), m)
        }
        _ => trunc(expr, grain),
    }
}
