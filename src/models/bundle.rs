use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::metric::{MetricKind, MetricName, RatioFormula};
use super::scope::{DateRange, StoreId};
use super::snapshot::{DailyPoint, Trend};

// ---------------------------------------------------------------------------
// AggregatedMetric: additive metric summed across a store scope
// ---------------------------------------------------------------------------

/// N per-store snapshots of one additive metric folded together.
///
/// `total` is the plain sum of the per-store totals and `series` the
/// date-keyed merge of their sparklines. Not meaningful for ratio metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedMetric {
    pub total: f64,
    pub series: Vec<DailyPoint>,
}

impl AggregatedMetric {
    pub fn new(total: f64, series: Vec<DailyPoint>) -> Self {
        Self { total, series }
    }
}

// ---------------------------------------------------------------------------
// DerivedRatio: ratio metric recombined from aggregated components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedRatio {
    pub formula: RatioFormula,
    pub value: f64,
    pub numerator_total: f64,
    pub denominator_total: f64,
    /// Per-date ratio computed from the date-aligned component series.
    pub series: Vec<DailyPoint>,
}

// ---------------------------------------------------------------------------
// PeriodBucket: one row of a re-bucketed series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBucket {
    pub label: String,
    pub sum: f64,
    pub count: u32,
    pub average: f64,
}

// ---------------------------------------------------------------------------
// QuarterRow: quarterly sales/orders with recombined basket size
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterRow {
    pub label: String,
    pub sales: f64,
    pub orders: f64,
    pub basket_size: f64,
}

// ---------------------------------------------------------------------------
// ConsolidatedBundle: what the presentation layer receives
// ---------------------------------------------------------------------------

/// Consolidated value of one requested metric over a store scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub metric: MetricName,
    pub kind: MetricKind,
    pub total: f64,
    pub previous_total: f64,
    pub percent: f64,
    pub trend: Trend,
    pub series: Vec<DailyPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<PeriodBucket>>,
}

impl MetricResult {
    /// A zeroed result, used when the scope resolves to no stores.
    pub fn zeroed(metric: MetricName) -> Self {
        Self {
            metric,
            kind: metric.kind(),
            total: 0.0,
            previous_total: 0.0,
            percent: 0.0,
            trend: Trend::Equal,
            series: Vec::new(),
            buckets: None,
        }
    }
}

/// Result of one aggregation request.
///
/// `partial` is set when one or more stores could not be included; those
/// stores are listed in `failed_stores` and excluded from every metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedBundle {
    pub window: DateRange,
    pub stores: Vec<StoreId>,
    pub failed_stores: Vec<StoreId>,
    pub partial: bool,
    pub metrics: BTreeMap<MetricName, MetricResult>,
}

impl ConsolidatedBundle {
    pub fn get(&self, metric: MetricName) -> Option<&MetricResult> {
        self.metrics.get(&metric)
    }

    /// Stores whose data made it into the bundle.
    pub fn included_stores(&self) -> Vec<&StoreId> {
        self.stores
            .iter()
            .filter(|s| !self.failed_stores.contains(s))
            .collect()
    }
}
