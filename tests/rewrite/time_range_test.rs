use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use metricsql::executor::CancelSignal;
use metricsql::model::{Calendar, DataType, DimensionDef, Measure, MetricsView, Query, TimeGrain, TimeRange};
use metricsql::rewrite::time_range::Resolver;
use metricsql::rewrite::{PassContext, QueryPass, RewriteError, TimeRangePass};
use metricsql::sql::Dialect;

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// Friday 2024-03-15 10:30 UTC.
fn anchor() -> DateTime<Utc> {
    utc(2024, 3, 15, 10, 30)
}

fn resolver(tz: Tz, calendar: Calendar) -> Resolver {
    Resolver::new(anchor(), tz, calendar)
}

fn bounds(range: &TimeRange) -> (DateTime<Utc>, DateTime<Utc>) {
    (range.start.unwrap(), range.end.unwrap())
}

#[test]
fn test_last_week_starts_monday() {
    let r = resolver(Tz::UTC, Calendar::default());
    let resolved = r.resolve(&TimeRange::expression("last week")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2024, 3, 4, 0, 0), utc(2024, 3, 11, 0, 0)));
}

#[test]
fn test_this_week_with_sunday_start() {
    let calendar = Calendar {
        first_day_of_week: 7,
        ..Calendar::default()
    };
    let r = resolver(Tz::UTC, calendar);
    let resolved = r.resolve(&TimeRange::expression("this week")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2024, 3, 10, 0, 0), utc(2024, 3, 17, 0, 0)));
}

#[test]
fn test_fiscal_year_starting_april() {
    let calendar = Calendar {
        first_month_of_year: 4,
        ..Calendar::default()
    };
    let r = resolver(Tz::UTC, calendar);
    let resolved = r.resolve(&TimeRange::expression("this year")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2023, 4, 1, 0, 0), utc(2024, 4, 1, 0, 0)));
}

#[test]
fn test_yesterday_in_tokyo() {
    // 19:30 local on the 15th; local days start at 15:00 UTC.
    let r = resolver(Tz::Asia__Tokyo, Calendar::default());
    let resolved = r.resolve(&TimeRange::expression("yesterday")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2024, 3, 13, 15, 0), utc(2024, 3, 14, 15, 0)));
}

#[test]
fn test_trailing_day_across_dst_keeps_wall_clock() {
    // 08:00 EDT on the first day of daylight saving time.
    let r = Resolver::new(utc(2024, 3, 10, 12, 0), Tz::America__New_York, Calendar::default());
    let resolved = r.resolve(&TimeRange::duration("P1D")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2024, 3, 9, 13, 0), utc(2024, 3, 10, 12, 0)));
}

#[test]
fn test_start_plus_duration() {
    let r = resolver(Tz::UTC, Calendar::default());
    let range = TimeRange {
        start: Some(utc(2024, 1, 1, 0, 0)),
        iso_duration: Some("P2W".into()),
        ..Default::default()
    };
    let resolved = r.resolve(&range).unwrap();
    assert_eq!(bounds(&resolved), (utc(2024, 1, 1, 0, 0), utc(2024, 1, 15, 0, 0)));
}

#[test]
fn test_resolution_is_idempotent() {
    let r = resolver(Tz::Europe__London, Calendar::default());
    let once = r.resolve(&TimeRange::expression("last month")).unwrap();
    let twice = r.resolve(&once).unwrap();
    assert_eq!(once, twice);
    assert!(twice.is_resolved());
}

#[test]
fn test_malformed_inputs() {
    let r = resolver(Tz::UTC, Calendar::default());
    assert!(matches!(
        r.resolve(&TimeRange::expression("next week")),
        Err(RewriteError::InvalidTimeRange(_))
    ));
    assert!(matches!(
        r.resolve(&TimeRange::expression("last fortnight")),
        Err(RewriteError::InvalidTimeRange(_))
    ));
    assert!(matches!(
        r.resolve(&TimeRange::duration("P1X")),
        Err(RewriteError::InvalidDuration(_))
    ));
}

#[tokio::test]
async fn test_pass_resolves_both_ranges() {
    let view = MetricsView::new("sales", "orders")
        .with_time_dimension("created_at")
        .with_dimension(DimensionDef::column("created_at").with_type(DataType::Timestamp));
    let cancel = CancelSignal::never();
    let ctx = PassContext {
        view: &view,
        dialect: Dialect::DuckDb.dialect(),
        execution_time: anchor(),
        row_cap: None,
        approximate_comparisons: false,
        executor: None,
        cancel: &cancel,
        subquery_timeout: std::time::Duration::from_secs(1),
    };

    let query = Query::new("sales")
        .with_measure(Measure::new("revenue"))
        .with_time_range(TimeRange {
            iso_duration: Some("P7D".into()),
            round_to_grain: Some(TimeGrain::Day),
            ..Default::default()
        })
        .with_comparison_time_range(TimeRange {
            iso_offset: Some("P7D".into()),
            ..Default::default()
        });

    let query = TimeRangePass.apply(query, &ctx).await.unwrap();
    assert_eq!(
        bounds(query.time_range.as_ref().unwrap()),
        (utc(2024, 3, 8, 0, 0), utc(2024, 3, 15, 0, 0))
    );
    assert_eq!(
        bounds(query.comparison_time_range.as_ref().unwrap()),
        (utc(2024, 3, 1, 0, 0), utc(2024, 3, 8, 0, 0))
    );
}

#[tokio::test]
async fn test_pass_rejects_unknown_zone() {
    let view = MetricsView::new("sales", "orders").with_time_dimension("created_at");
    let cancel = CancelSignal::never();
    let ctx = PassContext {
        view: &view,
        dialect: Dialect::DuckDb.dialect(),
        execution_time: anchor(),
        row_cap: None,
        approximate_comparisons: false,
        executor: None,
        cancel: &cancel,
        subquery_timeout: std::time::Duration::from_secs(1),
    };

    let query = Query::new("sales")
        .with_time_range(TimeRange::expression("today"))
        .with_time_zone("Nowhere/Special");
    let err = TimeRangePass.apply(query, &ctx).await.unwrap_err();
    assert!(matches!(err, RewriteError::UnknownTimeZone(ref z) if z == "Nowhere/Special"));
}

#[test]
fn test_last_n_buckets() {
    let r = resolver(Tz::UTC, Calendar::default());
    let resolved = r.resolve(&TimeRange::expression("last 1 day")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2024, 3, 14, 0, 0), utc(2024, 3, 15, 0, 0)));

    let resolved = r.resolve(&TimeRange::expression("Last 3 Months")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2023, 12, 1, 0, 0), utc(2024, 3, 1, 0, 0)));

    let resolved = r.resolve(&TimeRange::expression("last 2 quarters")).unwrap();
    assert_eq!(bounds(&resolved), (utc(2023, 7, 1, 0, 0), utc(2024, 1, 1, 0, 0)));

    for bad in ["last 0 days", "last -1 days", "last many days"] {
        assert!(
            matches!(r.resolve(&TimeRange::expression(bad)), Err(RewriteError::InvalidTimeRange(_))),
            "accepted {bad:?}"
        );
    }
}

#[tokio::test]
async fn test_pass_reports_oversized_duration() {
    let view = MetricsView::new("sales", "orders").with_time_dimension("created_at");
    let cancel = CancelSignal::never();
    let ctx = PassContext {
        view: &view,
        dialect: Dialect::DuckDb.dialect(),
        execution_time: anchor(),
        row_cap: None,
        approximate_comparisons: false,
        executor: None,
        cancel: &cancel,
        subquery_timeout: std::time::Duration::from_secs(1),
    };

    let query = Query::new("sales")
        .with_measure(Measure::new("revenue"))
        .with_time_range(TimeRange::duration("PT1H99999999999999999999S"));
    let err = TimeRangePass.apply(query, &ctx).await.unwrap_err();
    assert!(matches!(err, RewriteError::InvalidTimeRange(_)), "{err:?}");
}
