//! ISO-8601 durations with calendar-aware arithmetic.
//!
//! `P1M` added to January 31st lands on the last day of February, and `P1D`
//! across a DST change keeps the wall-clock time. Hours, minutes and seconds
//! are fixed-length and applied to the instant.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Days, Months, TimeDelta, TimeZone};
use regex::Regex;

use super::time::from_local;

static ISO_DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^P(?:(\d+)Y)?(?:(\d+)M)?(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$",
    )
    .expect("valid ISO-8601 duration regex")
});

/// A parsed ISO-8601 duration, or `inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Duration {
    /// Unbounded; clears both ends of a range.
    Infinite,
    Standard(StandardDuration),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StandardDuration {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid ISO-8601 duration '{0}'")]
pub struct InvalidDuration(pub String);

impl FromStr for Duration {
    type Err = InvalidDuration;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("inf") {
            return Ok(Duration::Infinite);
        }
        let upper = trimmed.to_ascii_uppercase();
        // "P" and "PT" alone match the regex but carry no components.
        if upper == "P" || upper.ends_with('T') {
            return Err(InvalidDuration(s.to_string()));
        }
        let caps = ISO_DURATION
            .captures(&upper)
            .ok_or_else(|| InvalidDuration(s.to_string()))?;
        let int = |i: usize| -> Result<u32, InvalidDuration> {
            caps.get(i)
                .map_or(Ok(0), |m| m.as_str().parse().map_err(|_| InvalidDuration(s.to_string())))
        };
        let seconds = caps
            .get(7)
            .map_or(Ok(0.0), |m| m.as_str().parse::<f64>())
            .map_err(|_| InvalidDuration(s.to_string()))?;
        Ok(Duration::Standard(StandardDuration {
            years: int(1)?,
            months: int(2)?,
            weeks: int(3)?,
            days: int(4)?,
            hours: int(5)?,
            minutes: int(6)?,
            seconds,
        }))
    }
}

impl StandardDuration {
    pub fn is_zero(&self) -> bool {
        *self == StandardDuration::default()
    }

    fn total_months(&self) -> u32 {
        self.years.saturating_mul(12).saturating_add(self.months)
    }

    fn total_days(&self) -> u64 {
        u64::from(self.weeks) * 7 + u64::from(self.days)
    }

    /// Hours, minutes and seconds as one delta; `None` when out of range.
    fn fixed(&self) -> Option<TimeDelta> {
        let millis = (self.seconds * 1000.0).round();
        if !millis.is_finite() || millis >= i64::MAX as f64 {
            return None;
        }
        TimeDelta::try_hours(i64::from(self.hours))?
            .checked_add(&TimeDelta::try_minutes(i64::from(self.minutes))?)?
            .checked_add(&TimeDelta::try_milliseconds(millis as i64)?)
    }

    /// `t + self`, with months and days applied in `t`'s wall-clock time.
    pub fn add_to<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = t.timezone();
        let local = t
            .naive_local()
            .checked_add_months(Months::new(self.total_months()))?
            .checked_add_days(Days::new(self.total_days()))?;
        from_local(&tz, local)?.checked_add_signed(self.fixed()?)
    }

    /// `t - self`, with months and days applied in `t`'s wall-clock time.
    pub fn sub_from<Tz: TimeZone>(&self, t: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = t.timezone();
        let local = t
            .naive_local()
            .checked_sub_months(Months::new(self.total_months()))?
            .checked_sub_days(Days::new(self.total_days()))?;
        from_local(&tz, local)?.checked_sub_signed(self.fixed()?)
    }
}
