//! Apache Druid SQL dialect.
//!
//! Druid has relaxed grouping semantics around joins, so blocks with join
//! children are normalized (explicit GROUP BY, measures wrapped in
//! `ANY_VALUE`). Result sets default to a 100k row cap.
//!
//! - ANSI identifier quoting (`"`)
//! - `TIME_FLOOR(ts, period, origin, tz)` / `TIME_SHIFT` for truncation
//! - No null-safe equality operator; no NULLS FIRST/LAST

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;
use crate::sql::token::TokenStream;

/// Apache Druid dialect.
#[derive(Debug, Clone, Copy)]
pub struct Druid;

impl SqlDialect for Druid {
    fn name(&self) -> &'static str {
        "druid"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn supports_approximate_comparisons(&self) -> bool {
        true
    }

    fn requires_aggregate_normalization(&self) -> bool {
        true
    }

    fn default_row_cap(&self) -> u64 {
        100_000
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        let tz = self.quote_string(&opts.time_zone);
        Some(helpers::calendar_trunc(
            expr,
            grain,
            opts,
            |e, g| format!("TIME_FLOOR({e}, '{}', NULL, {tz})", g.iso_period()),
            |e, n| format!("TIME_SHIFT({e}, 'P1D', {n}, {tz})"),
            |e, n| format!("TIME_SHIFT({e}, 'P1M', {n}, {tz})"),
        ))
    }

    fn join_on(&self, left: &TokenStream, right: &TokenStream) -> TokenStream {
        helpers::null_safe_eq_expanded(left, right)
    }
}
