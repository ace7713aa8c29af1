//! BigQuery dialect.
//!
//! - Backtick identifier quoting
//! - `TIMESTAMP_TRUNC(ts, WEEK(SUNDAY), tz)` with configurable week start
//! - `GROUP BY 1, 2` ordinals
//! - Fiscal years go through `DATETIME` arithmetic since `TIMESTAMP_ADD`
//!   has no MONTH part

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;

/// BigQuery dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

const WEEKDAYS: [&str; 7] = [
    "MONDAY",
    "TUESDAY",
    "WEDNESDAY",
    "THURSDAY",
    "FRIDAY",
    "SATURDAY",
    "SUNDAY",
];

fn part(grain: TimeGrain, opts: &TruncOptions) -> String {
    match grain {
        TimeGrain::Week => {
            let day = WEEKDAYS[usize::from(opts.first_day_of_week.clamp(1, 7) - 1)];
            format!("WEEK({day})")
        }
        other => other.as_str().to_uppercase(),
    }
}

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn supports_group_by_ordinal(&self) -> bool {
        true
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        let tz = self.quote_string(&opts.time_zone);
        let fiscal = matches!(grain, TimeGrain::Quarter | TimeGrain::Year)
            && opts.year_shift_months() != 0;
        if fiscal {
            let m = opts.year_shift_months();
            let g = part(grain, opts);
            return Some(format!(
                "TIMESTAMP(DATETIME_ADD(DATETIME_TRUNC(DATETIME_SUB(DATETIME({expr}, {tz}), INTERVAL {m} MONTH), {g}), INTERVAL {m} MONTH), {tz})"
            ));
        }
        let sub_day = matches!(
            grain,
            TimeGrain::Millisecond | TimeGrain::Second | TimeGrain::Minute | TimeGrain::Hour
        );
        Some(if sub_day || opts.is_utc() {
            format!("TIMESTAMP_TRUNC({expr}, {})", part(grain, opts))
        } else {
            format!("TIMESTAMP_TRUNC({expr}, {}, {tz})", part(grain, opts))
        })
    }
}
