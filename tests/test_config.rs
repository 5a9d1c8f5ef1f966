//! Configuration loading and recorded snapshot replay.

mod common;

use common::{assert_close, range};
use metric_rollup::{
    AggregateRequest, DateRange, EngineConfig, MetricName, PreviousWindow, RollupEngine, StaticFetcher,
    StoreScope, WeekStart, WeekdayLabels, WeekdayPolicy,
};
use std::io::Write;
use tempfile::NamedTempFile;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[test]
fn default_config() {
    let config = EngineConfig::default();
    assert_eq!(config.weekday_policy, WeekdayPolicy::Omit);
    assert_eq!(config.week_start, WeekStart::Sunday);
    assert_eq!(config.previous_window, PreviousWindow::Fetch);
    assert_eq!(config.weekday_labels, WeekdayLabels::english());
}

#[test]
fn config_from_json_fills_missing_fields_with_defaults() {
    let config = EngineConfig::from_json_str(
        r#"{
            "weekday_policy": "zero_fill",
            "week_start": "monday",
            "weekday_labels": ["So", "Mo", "Di", "Mi", "Do", "Fr", "Sa"]
        }"#,
    )
    .unwrap();

    assert_eq!(config.weekday_policy, WeekdayPolicy::ZeroFill);
    assert_eq!(config.week_start, WeekStart::Monday);
    assert_eq!(config.weekday_labels.label(1), "Mo");
    assert_eq!(config.previous_window, PreviousWindow::Fetch);
}

#[test]
fn config_rejects_wrong_label_count() {
    let result = EngineConfig::from_json_str(r#"{"weekday_labels": ["Mon"]}"#);
    assert!(result.is_err());
}

#[test]
fn config_from_file_feeds_the_builder() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{"previous_window": "from_snapshot_percent"}}"#).unwrap();
    file.flush().unwrap();

    let config = EngineConfig::from_json_file(file.path()).unwrap();
    let engine = RollupEngine::builder().config(config).build();
    assert_eq!(engine.config().previous_window, PreviousWindow::FromSnapshotPercent);
    assert!(engine.to_string().contains("FromSnapshotPercent"));
}

#[test]
fn config_from_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = EngineConfig::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, metric_rollup::RollupError::Io(_)));
}

// ---------------------------------------------------------------------------
// Recorded snapshots
// ---------------------------------------------------------------------------

const RECORDING: &str = r#"{
    "snapshots": [
        {
            "store": "north",
            "metric": "sales",
            "window": {"start": "2024-03-01", "end": "2024-03-02"},
            "snapshot": {
                "total": 300,
                "percent": 50,
                "trend": "up",
                "series": [
                    {"date": "2024-03-01", "value": 100},
                    {"date": "2024-03-02", "value": 200}
                ]
            }
        },
        {
            "store": "north",
            "metric": "sales",
            "window": {"start": "2024-02-28", "end": "2024-02-29"},
            "snapshot": {"total": 200}
        }
    ],
    "history": [
        {
            "store": "south",
            "metric": "sales",
            "series": [
                {"date": "2024-02-28", "value": 40},
                {"date": "2024-03-01", "value": 50}
            ]
        }
    ]
}"#;

#[tokio::test]
async fn recorded_snapshots_replay_through_the_engine() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(RECORDING.as_bytes()).unwrap();
    file.flush().unwrap();

    let fetcher = StaticFetcher::from_json_file(file.path()).unwrap();
    let engine = RollupEngine::builder().build();
    let request = AggregateRequest::new(
        &[MetricName::Sales],
        StoreScope::all(["south", "north"]),
        range("2024-03-01", "2024-03-02"),
    );

    let bundle = engine.aggregate(&fetcher, &request).await.unwrap();
    let sales = bundle.get(MetricName::Sales).unwrap();
    assert_eq!(sales.total, 350.0);
    assert_eq!(sales.previous_total, 240.0);
    assert_close(sales.percent, 110.0 / 240.0 * 100.0);
    assert_eq!(sales.series.len(), 2);
    assert_eq!(sales.series[0].value, 150.0);
}

#[test]
fn inverted_date_range_is_rejected_on_load() {
    let err = serde_json::from_str::<DateRange>(r#"{"start": "2024-03-05", "end": "2024-03-01"}"#)
        .unwrap_err();
    assert!(err.to_string().contains("after end"));

    let ok: DateRange = serde_json::from_str(r#"{"start": "2024-03-01", "end": "2024-03-01"}"#).unwrap();
    assert_eq!(ok.days(), 1);
}

#[test]
fn recording_with_inverted_window_is_rejected() {
    let json = r#"{
        "snapshots": [{
            "store": "x",
            "metric": "sales",
            "window": {"start": "2024-03-02", "end": "2024-03-01"},
            "snapshot": {"total": 1}
        }]
    }"#;
    assert!(matches!(
        StaticFetcher::from_json_str(json),
        Err(metric_rollup::RollupError::Json(_))
    ));
}

#[test]
fn request_with_inverted_window_does_not_deserialize() {
    let json = r#"{
        "metrics": ["sales"],
        "scope": {"kind": "single", "stores": "north"},
        "window": {"start": "2024-03-31", "end": "2024-03-01"},
        "bucketing": null
    }"#;
    assert!(serde_json::from_str::<AggregateRequest>(json).is_err());
}

#[test]
fn recording_with_duplicate_history_dates_is_rejected() {
    let json = r#"{
        "history": [{
            "store": "x",
            "metric": "orders",
            "series": [
                {"date": "2024-03-01", "value": 1},
                {"date": "2024-03-01", "value": 1}
            ]
        }]
    }"#;
    assert!(matches!(
        StaticFetcher::from_json_str(json),
        Err(metric_rollup::RollupError::MisalignedSeries(_))
    ));
}
