use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RollupError};

// ---------------------------------------------------------------------------
// DailyPoint: One metric value on one calendar day
// ---------------------------------------------------------------------------

/// One metric's value on one day for one store.
///
/// Points are keyed by ISO calendar date (`YYYY-MM-DD`), never by timestamp,
/// so that series coming from different stores can be aligned by date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl DailyPoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }

    /// Parse a point from an ISO calendar date string.
    ///
    /// Anything other than a bare `YYYY-MM-DD` date (timestamps, localized
    /// dates) is rejected with [`RollupError::MisalignedSeries`].
    pub fn parse(date: &str, value: f64) -> Result<Self> {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| {
            RollupError::MisalignedSeries(format!(
                "expected ISO calendar date (YYYY-MM-DD), got '{}': {}",
                date, e
            ))
        })?;
        Ok(Self::new(parsed, value))
    }
}

// ---------------------------------------------------------------------------
// Trend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Equal,
}

// ---------------------------------------------------------------------------
// MetricSnapshot: One store's result for one metric and window
// ---------------------------------------------------------------------------

/// One store's pre-aggregated result for a metric over a query window.
///
/// `total` is the window aggregate, `percent` the window-over-previous-window
/// change as computed by the snapshot layer, and `series` the daily sparkline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub total: f64,
    #[serde(default)]
    pub percent: f64,
    #[serde(default)]
    pub trend: Trend,
    #[serde(default)]
    pub series: Vec<DailyPoint>,
}

impl MetricSnapshot {
    pub fn new(total: f64, series: Vec<DailyPoint>) -> Self {
        Self {
            total,
            percent: 0.0,
            trend: Trend::Equal,
            series,
        }
    }

    /// Attach the snapshot layer's own window-over-window change.
    pub fn with_change(mut self, percent: f64, trend: Trend) -> Self {
        self.percent = percent;
        self.trend = trend;
        self
    }

    /// Parse a snapshot from the JSON shape returned by the API client.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let snapshot: MetricSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the one-point-per-date invariant of the sparkline.
    pub fn validate(&self) -> Result<()> {
        crate::series::ensure_unique_dates(&self.series)
    }
}
