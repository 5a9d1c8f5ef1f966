use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, RollupError};
use crate::models::MetricName;

pub const PERCENT_SCALE: f64 = 100.0;

/// Weekday names in Sunday-first order.
pub const ENGLISH_WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

pub const ADDITIVE_METRICS: [MetricName; 6] = [
    MetricName::Sales,
    MetricName::Orders,
    MetricName::Visitors,
    MetricName::Impressions,
    MetricName::Clicks,
    MetricName::Cost,
];

pub const RATIO_METRICS: [MetricName; 4] = [
    MetricName::BasketSize,
    MetricName::ConversionRate,
    MetricName::Ctr,
    MetricName::Roas,
];

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What to do with a weekday that has no occurrence in the bucketed range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekdayPolicy {
    /// Leave the weekday out of the output.
    #[default]
    Omit,
    /// Emit the weekday with `count = 0, sum = 0, average = 0`.
    ZeroFill,
}

/// First day of the canonical weekday order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

/// Where the previous-window totals used for growth come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviousWindow {
    /// Fetch the preceding window of equal length through the same fan-out.
    #[default]
    Fetch,
    /// Back each store's previous total out of its snapshot `total`/`percent`.
    FromSnapshotPercent,
}

// ---------------------------------------------------------------------------
// WeekdayLabels
// ---------------------------------------------------------------------------

/// Locale labels for the seven weekdays, Sunday first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct WeekdayLabels([String; 7]);

impl WeekdayLabels {
    pub fn english() -> Self {
        Self(ENGLISH_WEEKDAYS.map(String::from))
    }

    /// Build labels from exactly seven names, Sunday first.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        if names.len() != 7 {
            return Err(RollupError::InvalidArgument(format!(
                "expected 7 weekday labels, got {}",
                names.len()
            )));
        }
        let mut labels = Self::english().0;
        for (slot, name) in labels.iter_mut().zip(names) {
            *slot = name.as_ref().to_string();
        }
        Ok(Self(labels))
    }

    /// Label for a weekday given as days from Sunday (0..=6).
    pub fn label(&self, days_from_sunday: u32) -> &str {
        &self.0[(days_from_sunday % 7) as usize]
    }
}

impl Default for WeekdayLabels {
    fn default() -> Self {
        Self::english()
    }
}

impl TryFrom<Vec<String>> for WeekdayLabels {
    type Error = RollupError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::from_names(&names)
    }
}

impl From<WeekdayLabels> for Vec<String> {
    fn from(labels: WeekdayLabels) -> Self {
        labels.0.to_vec()
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weekday_policy: WeekdayPolicy,
    pub week_start: WeekStart,
    pub weekday_labels: WeekdayLabels,
    pub previous_window: PreviousWindow,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}
