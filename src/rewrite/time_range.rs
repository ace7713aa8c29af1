//! Time range resolution.
//!
//! Relative ranges (free-form expressions, ISO durations, offsets, rounding)
//! become absolute `[start, end)` pairs anchored at the execution time, with
//! calendar arithmetic done in the query's time zone. A range with nothing
//! relative left is returned unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::{PassContext, QueryPass, RewriteError, RewritePass, RewriteResult};
use crate::model::time::truncate;
use crate::model::{Calendar, Duration, Query, StandardDuration, TimeGrain, TimeRange};

pub struct TimeRangePass;

#[async_trait]
impl QueryPass for TimeRangePass {
    fn kind(&self) -> RewritePass {
        RewritePass::TimeRange
    }

    async fn apply(&self, mut query: Query, ctx: &PassContext<'_>) -> RewriteResult<Query> {
        let unresolved = |r: &Option<TimeRange>| r.as_ref().is_some_and(TimeRange::has_relative_fields);
        if !unresolved(&query.time_range) && !unresolved(&query.comparison_time_range) {
            tracing::trace!(target: "metricsql::rewrite", "time range pass skipped");
            return Ok(query);
        }

        let zone = query.time_zone.as_deref().unwrap_or("UTC");
        let tz: Tz = zone
            .parse()
            .map_err(|_| RewriteError::UnknownTimeZone(zone.to_string()))?;
        let resolver = Resolver {
            anchor: ctx.execution_time,
            tz,
            calendar: ctx.view.calendar(),
        };

        let primary = query.time_range.clone();
        if let Some(range) = &query.time_range {
            query.time_range = Some(resolver.resolve(range)?);
        }
        if let Some(range) = query.comparison_time_range.take() {
            let range = match &primary {
                Some(primary) => inherit(range, primary),
                None => range,
            };
            query.comparison_time_range = Some(resolver.resolve(&range)?);
        }

        tracing::debug!(
            target: "metricsql::rewrite",
            time_range = ?query.time_range,
            comparison_time_range = ?query.comparison_time_range,
            "resolved time ranges"
        );
        Ok(query)
    }
}

/// A comparison range that only names an offset takes its window from the
/// primary range.
fn inherit(mut comparison: TimeRange, primary: &TimeRange) -> TimeRange {
    let has_window = comparison.start.is_some()
        || comparison.end.is_some()
        || comparison.expression.is_some()
        || comparison.iso_duration.is_some();
    if has_window {
        return comparison;
    }
    comparison.start = primary.start;
    comparison.end = primary.end;
    comparison.expression = primary.expression.clone();
    comparison.iso_duration = primary.iso_duration.clone();
    if comparison.round_to_grain.is_none() {
        comparison.round_to_grain = primary.round_to_grain;
    }
    if comparison.time_dimension.is_none() {
        comparison.time_dimension = primary.time_dimension.clone();
    }
    comparison
}

/// Resolves ranges against one anchor, time zone and calendar.
#[derive(Debug, Clone)]
pub struct Resolver {
    pub anchor: DateTime<Utc>,
    pub tz: Tz,
    pub calendar: Calendar,
}

impl Resolver {
    pub fn new(anchor: DateTime<Utc>, tz: Tz, calendar: Calendar) -> Self {
        Self {
            anchor,
            tz,
            calendar,
        }
    }

    /// Resolve `range` to absolute bounds with every relative field cleared.
    pub fn resolve(&self, range: &TimeRange) -> RewriteResult<TimeRange> {
        if !range.has_relative_fields() {
            return Ok(range.clone());
        }

        let (mut start, mut end) = match (&range.expression, &range.iso_duration) {
            (Some(_), Some(_)) => {
                return Err(RewriteError::InvalidTimeRange(
                    "expression cannot be combined with iso_duration".into(),
                ))
            }
            (Some(expr), None) => {
                if range.start.is_some() || range.end.is_some() {
                    return Err(RewriteError::InvalidTimeRange(
                        "expression cannot be combined with start or end".into(),
                    ));
                }
                self.evaluate(expr)?
            }
            (None, Some(iso)) => self.apply_duration(range, iso)?,
            (None, None) => (range.start, range.end),
        };

        if let Some(offset) = &range.iso_offset {
            let offset = match offset.parse::<Duration>()? {
                Duration::Standard(d) => d,
                Duration::Infinite => {
                    return Err(RewriteError::InvalidTimeRange(
                        "iso_offset cannot be infinite".into(),
                    ))
                }
            };
            start = start.map(|t| self.sub(&offset, t)).transpose()?;
            end = end.map(|t| self.sub(&offset, t)).transpose()?;
        }

        if let Some(grain) = range.round_to_grain {
            start = start.map(|t| self.truncate(t, grain)).transpose()?;
            end = end.map(|t| self.truncate(t, grain)).transpose()?;
        }

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(RewriteError::InvalidTimeRange(format!(
                    "resolved start {s} is after end {e}"
                )));
            }
        }

        Ok(TimeRange {
            start,
            end,
            time_dimension: range.time_dimension.clone(),
            ..Default::default()
        })
    }

    fn apply_duration(&self, range: &TimeRange, iso: &str) -> RewriteResult<Bounds> {
        let duration = match iso.parse::<Duration>()? {
            Duration::Infinite => return Ok((None, None)),
            Duration::Standard(d) => d,
        };
        match (range.start, range.end) {
            (Some(_), Some(_)) => Err(RewriteError::InvalidTimeRange(
                "iso_duration cannot be combined with both start and end".into(),
            )),
            (Some(start), None) => Ok((Some(start), Some(self.add(&duration, start)?))),
            (None, Some(end)) => Ok((Some(self.sub(&duration, end)?), Some(end))),
            (None, None) => Ok((Some(self.sub(&duration, self.anchor)?), Some(self.anchor))),
        }
    }

    /// `inf`, `today`, `yesterday`, `this <grain>`, `last <grain>`,
    /// `last <n> <grain>`, or a trailing ISO duration.
    fn evaluate(&self, expr: &str) -> RewriteResult<Bounds> {
        let normalized = expr.trim().to_ascii_lowercase();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        match words.as_slice() {
            ["inf"] => Ok((None, None)),
            ["today"] => self.current(TimeGrain::Day),
            ["yesterday"] => self.previous(TimeGrain::Day, 1),
            ["this", grain] => self.current(parse_grain(grain, expr)?),
            ["last", grain] => self.previous(parse_grain(grain, expr)?, 1),
            ["last", count, grain] => {
                let count = count.parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                    RewriteError::InvalidTimeRange(format!("bad bucket count '{count}' in '{expr}'"))
                })?;
                self.previous(parse_grain(grain, expr)?, count)
            }
            [iso] if iso.starts_with('p') => {
                let range = TimeRange::duration(*iso);
                self.apply_duration(&range, iso)
            }
            _ => Err(RewriteError::InvalidTimeRange(format!(
                "unrecognized time expression '{expr}'"
            ))),
        }
    }

    /// The grain bucket containing the anchor.
    fn current(&self, grain: TimeGrain) -> RewriteResult<Bounds> {
        let start = self.truncate(self.anchor, grain)?;
        Ok((Some(start), Some(self.add(&grain_step(grain, 1), start)?)))
    }

    /// The `count` complete grain buckets before the anchor's.
    fn previous(&self, grain: TimeGrain, count: u32) -> RewriteResult<Bounds> {
        let end = self.truncate(self.anchor, grain)?;
        Ok((Some(self.sub(&grain_step(grain, count), end)?), Some(end)))
    }

    fn truncate(&self, t: DateTime<Utc>, grain: TimeGrain) -> RewriteResult<DateTime<Utc>> {
        truncate(&t, grain, &self.tz, self.calendar)
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| {
                RewriteError::InvalidTimeRange(format!("cannot truncate {t} to {grain} in {}", self.tz))
            })
    }

    fn add(&self, d: &StandardDuration, t: DateTime<Utc>) -> RewriteResult<DateTime<Utc>> {
        d.add_to(&t.with_timezone(&self.tz))
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| RewriteError::InvalidTimeRange(format!("{t} plus duration overflows")))
    }

    fn sub(&self, d: &StandardDuration, t: DateTime<Utc>) -> RewriteResult<DateTime<Utc>> {
        d.sub_from(&t.with_timezone(&self.tz))
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| RewriteError::InvalidTimeRange(format!("{t} minus duration overflows")))
    }
}

type Bounds = (Option<DateTime<Utc>>, Option<DateTime<Utc>>);

fn parse_grain(word: &str, expr: &str) -> RewriteResult<TimeGrain> {
    word.parse().map_err(|_| {
        RewriteError::InvalidTimeRange(format!("unknown grain '{word}' in '{expr}'"))
    })
}

/// `count` buckets of `grain` as a duration.
fn grain_step(grain: TimeGrain, count: u32) -> StandardDuration {
    let mut d = StandardDuration::default();
    match grain {
        TimeGrain::Millisecond => d.seconds = f64::from(count) / 1000.0,
        TimeGrain::Second => d.seconds = f64::from(count),
        TimeGrain::Minute => d.minutes = count,
        TimeGrain::Hour => d.hours = count,
        TimeGrain::Day => d.days = count,
        TimeGrain::Week => d.weeks = count,
        TimeGrain::Month => d.months = count,
        TimeGrain::Quarter => d.months = count.saturating_mul(3),
        TimeGrain::Year => d.years = count,
    }
    d
}
