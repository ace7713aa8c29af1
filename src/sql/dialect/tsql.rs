//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! - Square bracket identifier quoting (`[name]`)
//! - `@pN` named placeholders
//! - OFFSET FETCH for pagination (requires ORDER BY)
//! - N'...' prefix for Unicode strings
//! - `DATETRUNC` (SQL Server 2022+); IANA zones are not understood, so only
//!   UTC truncation is offered

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;
use crate::sql::token::TokenStream;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        // T-SQL uses N'...' for Unicode strings
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@p{index}")
    }

    fn supports_nulls_ordering(&self) -> bool {
        // T-SQL 2022+ supports NULLS FIRST/LAST, but older versions don't
        false
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        if !opts.is_utc() {
            return None;
        }
        Some(helpers::calendar_trunc(
            expr,
            grain,
            opts,
            |e, g| {
                let part = match g {
                    TimeGrain::Week => "iso_week",
                    other => other.as_str(),
                };
                format!("DATETRUNC({part}, {e})")
            },
            |e, n| format!("DATEADD(day, {n}, {e})"),
            |e, n| format!("DATEADD(month, {n}, {e})"),
        ))
    }

    fn join_on(&self, left: &TokenStream, right: &TokenStream) -> TokenStream {
        helpers::null_safe_eq_expanded(left, right)
    }

    fn any_value(&self, expr: &TokenStream) -> TokenStream {
        helpers::call("MIN", expr)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }
}
