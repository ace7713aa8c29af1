//! Time grains, time ranges and calendar-aware truncation.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Time truncation granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGrain {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeGrain {
    pub const ALL: [TimeGrain; 9] = [
        TimeGrain::Millisecond,
        TimeGrain::Second,
        TimeGrain::Minute,
        TimeGrain::Hour,
        TimeGrain::Day,
        TimeGrain::Week,
        TimeGrain::Month,
        TimeGrain::Quarter,
        TimeGrain::Year,
    ];

    /// Lowercase unit name, as used by `date_trunc`.
    pub fn as_str(self) -> &'static str {
        match self {
            TimeGrain::Millisecond => "millisecond",
            TimeGrain::Second => "second",
            TimeGrain::Minute => "minute",
            TimeGrain::Hour => "hour",
            TimeGrain::Day => "day",
            TimeGrain::Week => "week",
            TimeGrain::Month => "month",
            TimeGrain::Quarter => "quarter",
            TimeGrain::Year => "year",
        }
    }

    /// ISO-8601 period of one grain (`PT1H`, `P1D`, ...).
    pub fn iso_period(self) -> &'static str {
        match self {
            TimeGrain::Millisecond => "PT0.001S",
            TimeGrain::Second => "PT1S",
            TimeGrain::Minute => "PT1M",
            TimeGrain::Hour => "PT1H",
            TimeGrain::Day => "P1D",
            TimeGrain::Week => "P1W",
            TimeGrain::Month => "P1M",
            TimeGrain::Quarter => "P3M",
            TimeGrain::Year => "P1Y",
        }
    }
}

impl std::fmt::Display for TimeGrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeGrain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let key = lower.strip_suffix('s').unwrap_or(&lower);
        TimeGrain::ALL
            .into_iter()
            .find(|g| g.as_str() == key)
            .ok_or_else(|| format!("unknown time grain '{s}'"))
    }
}

/// A time window over the view's time dimension.
///
/// Either absolute (`start`/`end`, end exclusive) or relative. Relative
/// fields are resolved against an anchor time by the time range pass, which
/// then clears them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// Free-form: `inf`, `today`, `yesterday`, `this <grain>`, `last [n] <grain>`,
    /// or an ISO-8601 duration ending at the anchor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_offset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_to_grain: Option<TimeGrain>,
    /// Overrides the metrics view's default time dimension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_dimension: Option<String>,
}

impl TimeRange {
    pub fn absolute(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn duration(iso: impl Into<String>) -> Self {
        Self {
            iso_duration: Some(iso.into()),
            ..Default::default()
        }
    }

    pub fn expression(expr: impl Into<String>) -> Self {
        Self {
            expression: Some(expr.into()),
            ..Default::default()
        }
    }

    pub fn has_relative_fields(&self) -> bool {
        self.expression.is_some()
            || self.iso_duration.is_some()
            || self.iso_offset.is_some()
            || self.round_to_grain.is_some()
    }

    /// Both bounds or neither, and nothing left to resolve.
    pub fn is_resolved(&self) -> bool {
        !self.has_relative_fields() && self.start.is_some() == self.end.is_some()
    }

    /// No bounds at all.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none() && !self.has_relative_fields()
    }
}

// =============================================================================
// Truncation
// =============================================================================

/// Calendar start conventions for local-time truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    /// 1 = Monday … 7 = Sunday.
    pub first_day_of_week: u8,
    /// 1 = January … 12 = December.
    pub first_month_of_year: u8,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            first_day_of_week: 1,
            first_month_of_year: 1,
        }
    }
}

/// Truncate `t` to the start of its `grain` bucket in `tz` wall-clock time.
///
/// Returns `None` if the bucket start does not exist in `tz` and cannot be
/// recovered by moving forward an hour (a DST gap at midnight).
pub fn truncate<T: TimeZone, Tz: TimeZone>(
    t: &DateTime<T>,
    grain: TimeGrain,
    tz: &Tz,
    calendar: Calendar,
) -> Option<DateTime<Tz>> {
    let local = t.with_timezone(tz).naive_local();
    let truncated = truncate_naive(local, grain, calendar)?;
    from_local(tz, truncated)
}

/// Resolve a wall-clock time in `tz`, taking the earlier instant on overlap
/// and skipping forward an hour on a gap.
pub fn from_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&naive).earliest().or_else(|| {
        let shifted = naive.checked_add_signed(chrono::Duration::hours(1))?;
        tz.from_local_datetime(&shifted).earliest()
    })
}

fn truncate_naive(t: NaiveDateTime, grain: TimeGrain, calendar: Calendar) -> Option<NaiveDateTime> {
    let date = t.date();
    let midnight = |d: NaiveDate| d.and_hms_opt(0, 0, 0);
    match grain {
        TimeGrain::Millisecond => t.with_nanosecond(t.nanosecond() / 1_000_000 * 1_000_000),
        TimeGrain::Second => t.with_nanosecond(0),
        TimeGrain::Minute => t.with_nanosecond(0)?.with_second(0),
        TimeGrain::Hour => t.with_nanosecond(0)?.with_second(0)?.with_minute(0),
        TimeGrain::Day => midnight(date),
        TimeGrain::Week => {
            let first = u32::from(calendar.first_day_of_week.clamp(1, 7));
            let back = (date.weekday().number_from_monday() + 7 - first) % 7;
            midnight(date.checked_sub_days(Days::new(u64::from(back)))?)
        }
        TimeGrain::Month => midnight(date.with_day(1)?),
        TimeGrain::Quarter | TimeGrain::Year => {
            let shift = Months::new(u32::from(calendar.first_month_of_year.clamp(1, 12) - 1));
            let fiscal = date.with_day(1)?.checked_sub_months(shift)?;
            let month = if grain == TimeGrain::Quarter {
                (fiscal.month0() / 3) * 3 + 1
            } else {
                1
            };
            midnight(fiscal.with_month(month)?.checked_add_months(shift)?)
        }
    }
}
