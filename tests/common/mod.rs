//! Shared fixtures for the aggregation integration tests.
//!
//! Dates are written as ISO strings and parsed here so that test bodies
//! read like the snapshot payloads the API client returns.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use metric_rollup::{DailyPoint, DateRange, MetricName, MetricSnapshot, StaticFetcher};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn range(start: &str, end: &str) -> DateRange {
    DateRange::new(date(start), date(end)).unwrap()
}

pub fn points(entries: &[(&str, f64)]) -> Vec<DailyPoint> {
    entries
        .iter()
        .map(|(d, v)| DailyPoint::new(date(d), *v))
        .collect()
}

/// One point per day starting at `start`, all with `value`.
pub fn flat(start: &str, days: i64, value: f64) -> Vec<DailyPoint> {
    let first = date(start);
    (0..days)
        .map(|i| DailyPoint::new(first + Duration::days(i), value))
        .collect()
}

pub fn snapshot(entries: &[(&str, f64)]) -> MetricSnapshot {
    let series = points(entries);
    let total = series.iter().map(|p| p.value).sum();
    MetricSnapshot::new(total, series)
}

/// Register a store's snapshot for `window` together with a bare snapshot
/// carrying `previous_total` for the preceding window.
pub fn insert_pair(
    fetcher: &mut StaticFetcher,
    store: &str,
    metric: MetricName,
    window: DateRange,
    current: MetricSnapshot,
    previous_total: f64,
) {
    fetcher.insert_snapshot(store, metric, window, current);
    fetcher.insert_snapshot(
        store,
        metric,
        window.preceding(),
        MetricSnapshot::new(previous_total, Vec::new()),
    );
}

/// Register a window-level total with no sparkline, plus its previous total.
pub fn insert_totals(
    fetcher: &mut StaticFetcher,
    store: &str,
    metric: MetricName,
    window: DateRange,
    total: f64,
    previous_total: f64,
) {
    insert_pair(
        fetcher,
        store,
        metric,
        window,
        MetricSnapshot::new(total, Vec::new()),
        previous_total,
    );
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
