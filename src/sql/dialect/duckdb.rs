//! DuckDB SQL dialect.
//!
//! DuckDB is PostgreSQL-compatible with extensions:
//! - ANSI identifier quoting (`"`)
//! - Native ILIKE and NULLS FIRST/LAST
//! - `timezone(tz, ts)` for wall-clock conversion
//! - Cheap one-sided joins, so approximate comparisons are allowed

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    // Uses default emit_limit_offset (LIMIT ... OFFSET ...)

    fn supports_ilike(&self) -> bool {
        true
    }

    fn supports_approximate_comparisons(&self) -> bool {
        true
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        let tz = self.quote_string(&opts.time_zone);
        let local = if opts.is_utc() {
            expr.to_string()
        } else {
            format!("timezone({tz}, {expr})")
        };
        let truncated = helpers::calendar_trunc(
            &local,
            grain,
            opts,
            |e, g| format!("date_trunc('{}', {e})", g.as_str()),
            |e, n| helpers::interval_add(e, n, "DAY"),
            |e, n| helpers::interval_add(e, n, "MONTH"),
        );
        Some(if opts.is_utc() {
            truncated
        } else {
            format!("timezone({tz}, {truncated})")
        })
    }
}
