//! ClickHouse dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - Native ILIKE
//! - `any()` as the first-value aggregate
//! - `date_trunc(unit, ts, tz)` and `addDays`/`addMonths` arithmetic

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;
use crate::sql::token::TokenStream;

/// ClickHouse dialect.
#[derive(Debug, Clone, Copy)]
pub struct ClickHouse;

impl SqlDialect for ClickHouse {
    fn name(&self) -> &'static str {
        "clickhouse"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn supports_approximate_comparisons(&self) -> bool {
        true
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        let tz = self.quote_string(&opts.time_zone);
        Some(helpers::calendar_trunc(
            expr,
            grain,
            opts,
            |e, g| format!("date_trunc('{}', {e}, {tz})", g.as_str()),
            |e, n| format!("addDays({e}, {n})"),
            |e, n| format!("addMonths({e}, {n})"),
        ))
    }

    fn join_on(&self, left: &TokenStream, right: &TokenStream) -> TokenStream {
        helpers::null_safe_eq_expanded(left, right)
    }

    fn any_value(&self, expr: &TokenStream) -> TokenStream {
        // `FunctionName` upper-cases, and ClickHouse function names are
        // case-sensitive.
        let mut ts = TokenStream::raw("any");
        ts.append_parens(expr);
        ts
    }
}
