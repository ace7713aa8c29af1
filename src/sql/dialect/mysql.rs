//! MySQL dialect.
//!
//! - Backtick identifier quoting
//! - No ILIKE, no FULL OUTER JOIN, no NULLS FIRST/LAST
//! - `<=>` null-safe equality
//! - No native truncation function; built from `DATE_FORMAT`

use super::helpers;
use super::{SqlDialect, TruncOptions};
use crate::model::TimeGrain;
use crate::sql::token::{Token, TokenStream};

/// MySQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

fn trunc(expr: &str, grain: TimeGrain) -> String {
    let format = |pattern: &str| format!("CAST(DATE_FORMAT({expr}, '{pattern}') AS DATETIME)");
    match grain {
        // Sub-second precision is rejected before this is reached.
        TimeGrain::Millisecond | TimeGrain::Second => format("%Y-%m-%d %H:%i:%s"),
        TimeGrain::Minute => format("%Y-%m-%d %H:%i:00"),
        TimeGrain::Hour => format("%Y-%m-%d %H:00:00"),
        TimeGrain::Day => format("%Y-%m-%d 00:00:00"),
        TimeGrain::Week => {
            format!("CAST(DATE_SUB(DATE({expr}), INTERVAL WEEKDAY({expr}) DAY) AS DATETIME)")
        }
        TimeGrain::Month => format("%Y-%m-01 00:00:00"),
        TimeGrain::Quarter => format!(
            "CAST(MAKEDATE(YEAR({expr}), 1) + INTERVAL (QUARTER({expr}) - 1) QUARTER AS DATETIME)"
        ),
        TimeGrain::Year => format("%Y-01-01 00:00:00"),
    }
}

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_backslash(s)
    }

    fn supports_full_outer_join(&self) -> bool {
        false
    }

    fn supports_nulls_ordering(&self) -> bool {
        false
    }

    fn date_trunc(&self, expr: &str, grain: TimeGrain, opts: &TruncOptions) -> Option<String> {
        if grain == TimeGrain::Millisecond {
            return None;
        }
        let tz = self.quote_string(&opts.time_zone);
        let local = if opts.is_utc() {
            expr.to_string()
        } else {
            format!("CONVERT_TZ({expr}, 'UTC', {tz})")
        };
        let truncated = helpers::calendar_trunc(
            &local,
            grain,
            opts,
            trunc,
            |e, n| helpers::interval_add(e, n, "DAY"),
            |e, n| helpers::interval_add(e, n, "MONTH"),
        );
        Some(if opts.is_utc() {
            truncated
        } else {
            format!("CONVERT_TZ({truncated}, {tz}, 'UTC')")
        })
    }

    fn join_on(&self, left: &TokenStream, right: &TokenStream) -> TokenStream {
        let mut ts = TokenStream::new();
        ts.append(left).space().push(Token::Raw("<=>".into())).space().append(right);
        ts
    }
}
