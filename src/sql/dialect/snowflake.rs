//! Snowflake dialect.
//!
//! - ANSI identifier quoting (`"`)
//! - Native ILIKE and NULLS FIRST/LAST
//! - `GROUP BY 1, 2` ordinals
//! - `CONVERT_TIMEZONE(tz, ts)` for wall-clock conversion

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;

/// Snowflake dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn supports_ilike(&self) -> bool {
        true
    }

    fn supports_group_by_ordinal(&self) -> bool {
        true
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        let local = if opts.is_utc() {
            expr.to_string()
        } else {
            format!(
                "CONVERT_TIMEZONE({}, {expr})",
                self.quote_string(&opts.time_zone)
            )
        };
        Some(helpers::calendar_trunc(
            &local,
            grain,
            opts,
            |e, g| format!("DATE_TRUNC('{}', {e})", g.as_str()),
            |e, n| format!("DATEADD(day, {n}, {e})"),
            |e, n| format!("DATEADD(month, {n}, {e})"),
        ))
    }
}
