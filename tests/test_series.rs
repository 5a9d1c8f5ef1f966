//! Date-keyed series merging.

mod common;

use common::{date, points};
use metric_rollup::series::{ensure_unique_dates, merge, merge_all, total, zip_by_date};
use metric_rollup::{DailyPoint, MetricSnapshot, RollupError};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

#[test]
fn merge_sums_by_date_when_stores_have_gaps() {
    let store_a = points(&[("2024-03-01", 100.0), ("2024-03-02", 200.0)]);
    let store_b = points(&[("2024-03-01", 50.0)]);

    let merged = merge(&store_a, &store_b);
    assert_eq!(merged, points(&[("2024-03-01", 150.0), ("2024-03-02", 200.0)]));
}

#[test]
fn merge_keeps_dates_only_present_in_incoming() {
    let base = points(&[("2024-03-02", 5.0)]);
    let incoming = points(&[("2024-03-01", 1.0), ("2024-03-03", 3.0)]);

    let merged = merge(&base, &incoming);
    assert_eq!(
        merged,
        points(&[("2024-03-01", 1.0), ("2024-03-02", 5.0), ("2024-03-03", 3.0)])
    );
}

#[test]
fn merge_does_not_align_by_position() {
    // Same length, shifted by one day: index-based merging would add 1+10.
    let base = points(&[("2024-03-01", 1.0), ("2024-03-02", 2.0)]);
    let incoming = points(&[("2024-03-02", 10.0), ("2024-03-03", 20.0)]);

    let merged = merge(&base, &incoming);
    assert_eq!(merged.len(), 3);
    assert_eq!(merged[0].value, 1.0);
    assert_eq!(merged[1].value, 12.0);
    assert_eq!(merged[2].value, 20.0);
}

#[test]
fn merge_with_empty_base_copies_incoming() {
    let incoming = points(&[("2024-03-01", 7.0), ("2024-03-02", 8.0)]);
    assert_eq!(merge(&[], &incoming), incoming);
}

#[test]
fn merge_with_empty_incoming_returns_base() {
    let base = points(&[("2024-03-01", 7.0)]);
    assert_eq!(merge(&base, &[]), base);
}

#[test]
fn merge_output_is_sorted() {
    let base = points(&[("2024-03-05", 1.0), ("2024-03-01", 1.0)]);
    let incoming = points(&[("2024-03-03", 1.0)]);

    let merged = merge(&base, &incoming);
    let dates: Vec<_> = merged.iter().map(|p| p.date).collect();
    assert_eq!(dates, vec![date("2024-03-01"), date("2024-03-03"), date("2024-03-05")]);
}

#[test]
fn merge_all_folds_every_series() {
    let a = points(&[("2024-03-01", 1.0)]);
    let b = points(&[("2024-03-01", 2.0), ("2024-03-02", 2.0)]);
    let c = points(&[("2024-03-02", 3.0)]);

    let merged = merge_all([a.as_slice(), b.as_slice(), c.as_slice()]);
    assert_eq!(merged, points(&[("2024-03-01", 3.0), ("2024-03-02", 5.0)]));
    assert_eq!(total(&merged), 8.0);
}

#[test]
fn merge_all_of_nothing_is_empty() {
    assert!(merge_all(std::iter::empty::<&[DailyPoint]>()).is_empty());
}

// ---------------------------------------------------------------------------
// zip_by_date / validation
// ---------------------------------------------------------------------------

#[test]
fn zip_by_date_defaults_missing_side_to_zero() {
    let a = points(&[("2024-03-01", 1.0)]);
    let b = points(&[("2024-03-02", 2.0)]);

    let zipped = zip_by_date(&a, &b);
    assert_eq!(
        zipped,
        vec![(date("2024-03-01"), 1.0, 0.0), (date("2024-03-02"), 0.0, 2.0)]
    );
}

#[test]
fn duplicate_dates_are_rejected() {
    let series = points(&[("2024-03-01", 1.0), ("2024-03-01", 2.0)]);
    let err = ensure_unique_dates(&series).unwrap_err();
    assert!(matches!(err, RollupError::MisalignedSeries(_)));
}

#[test]
fn point_parse_rejects_timestamps() {
    assert!(DailyPoint::parse("2024-03-01", 1.0).is_ok());
    let err = DailyPoint::parse("2024-03-01T00:00:00Z", 1.0).unwrap_err();
    assert!(matches!(err, RollupError::MisalignedSeries(_)));
    assert!(DailyPoint::parse("03/01/2024", 1.0).is_err());
}

#[test]
fn snapshot_json_with_duplicate_dates_is_misaligned() {
    let json = r#"{
        "total": 3,
        "percent": 0,
        "trend": "equal",
        "series": [
            {"date": "2024-03-01", "value": 1},
            {"date": "2024-03-01", "value": 2}
        ]
    }"#;
    let err = MetricSnapshot::from_json_str(json).unwrap_err();
    assert!(matches!(err, RollupError::MisalignedSeries(_)));
}

#[test]
fn snapshot_json_parses_iso_dates() {
    let json = r#"{
        "total": 30,
        "percent": 12.5,
        "trend": "up",
        "series": [{"date": "2024-03-01", "value": 30}]
    }"#;
    let snapshot = MetricSnapshot::from_json_str(json).unwrap();
    assert_eq!(snapshot.total, 30.0);
    assert_eq!(snapshot.series[0].date, date("2024-03-01"));
}

#[test]
fn snapshot_json_with_timestamp_dates_fails() {
    let json = r#"{"total": 1, "series": [{"date": "2024-03-01T10:00:00Z", "value": 1}]}"#;
    assert!(MetricSnapshot::from_json_str(json).is_err());
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn series_strategy() -> impl Strategy<Value = Vec<DailyPoint>> {
    prop::collection::btree_map(0i64..40, -1000i32..1000, 0..12).prop_map(|entries| {
        let start = date("2024-01-01");
        entries
            .into_iter()
            .map(|(offset, value)| DailyPoint::new(start + chrono::Duration::days(offset), value as f64))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_merge_is_commutative(a in series_strategy(), b in series_strategy()) {
        prop_assert_eq!(merge(&a, &b), merge(&b, &a));
    }

    #[test]
    fn prop_merge_is_associative(
        a in series_strategy(),
        b in series_strategy(),
        c in series_strategy(),
    ) {
        let left = merge(&merge(&a, &b), &c);
        let right = merge(&a, &merge(&b, &c));
        let all = merge_all([a.as_slice(), b.as_slice(), c.as_slice()]);
        prop_assert_eq!(&left, &right);
        prop_assert_eq!(&left, &all);
    }

    #[test]
    fn prop_merge_preserves_total(a in series_strategy(), b in series_strategy()) {
        let merged = merge(&a, &b);
        prop_assert_eq!(total(&merged), total(&a) + total(&b));
        prop_assert!(merged.windows(2).all(|w| w[0].date < w[1].date));
    }
}
