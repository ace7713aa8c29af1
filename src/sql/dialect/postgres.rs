//! PostgreSQL dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - `$n` positional placeholders
//! - Three-argument `date_trunc(field, source, zone)` (PostgreSQL 12+)

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;

/// PostgreSQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Postgres;

fn interval(expr: &str, n: i64, unit: &str) -> String {
    if n < 0 {
        format!("({expr} - INTERVAL '{} {unit}')", -n)
    } else {
        format!("({expr} + INTERVAL '{n} {unit}')")
    }
}

impl SqlDialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        let zone = (!opts.is_utc()).then(|| self.quote_string(&opts.time_zone));
        Some(helpers::calendar_trunc(
            expr,
            grain,
            opts,
            |e, g| match &zone {
                Some(tz) => format!("date_trunc('{}', {e}, {tz})", g.as_str()),
                None => format!("date_trunc('{}', {e})", g.as_str()),
            },
            |e, n| interval(e, n, "day"),
            |e, n| interval(e, n, "month"),
        ))
    }
}
