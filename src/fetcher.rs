//! The snapshot source consumed by the aggregation pipeline.
//!
//! [`SnapshotFetcher`] is the seam to the API client: one call per
//! (store, metric, window) returning that store's [`MetricSnapshot`].
//! Transport, retries and timeouts belong to the implementor.
//!
//! [`StaticFetcher`] answers from in-memory data, either exact snapshots or
//! per-store daily history cut to the requested window. It can be loaded from
//! a recorded JSON document, which makes it usable for replaying captured API
//! responses as well as for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Result, RollupError};
use crate::growth;
use crate::models::{DailyPoint, DateRange, MetricName, MetricSnapshot, StoreId};
use crate::series;

// ---------------------------------------------------------------------------
// SnapshotFetcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch one store's snapshot of one metric over `window`.
    async fn fetch(&self, store: &StoreId, metric: MetricName, window: &DateRange) -> Result<MetricSnapshot>;

    /// Whether the source reports `metric` directly.
    ///
    /// When `Clicks` or `Orders` are not reported they are derived per store
    /// from impressions and CTR, or from clicks and conversion rate.
    fn provides(&self, _metric: MetricName) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Recording: serialized form of a StaticFetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub snapshots: Vec<RecordedSnapshot>,
    #[serde(default)]
    pub history: Vec<RecordedHistory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedSnapshot {
    pub store: StoreId,
    pub metric: MetricName,
    pub window: DateRange,
    pub snapshot: MetricSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedHistory {
    pub store: StoreId,
    pub metric: MetricName,
    pub series: Vec<DailyPoint>,
}

// ---------------------------------------------------------------------------
// StaticFetcher
// ---------------------------------------------------------------------------

/// In-memory [`SnapshotFetcher`].
///
/// Lookup order for a request: an exact snapshot recorded for the window,
/// then the store's daily history for an additive metric (total and change
/// are computed from the history), otherwise a fetch error.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    snapshots: HashMap<(StoreId, MetricName, DateRange), MetricSnapshot>,
    history: HashMap<(StoreId, MetricName), Vec<DailyPoint>>,
    failing: HashSet<StoreId>,
    unreported: HashSet<MetricName>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_recording(recording: Recording) -> Result<Self> {
        let mut fetcher = Self::new();
        for entry in recording.snapshots {
            entry.snapshot.validate()?;
            fetcher.insert_snapshot(entry.store, entry.metric, entry.window, entry.snapshot);
        }
        for entry in recording.history {
            series::ensure_unique_dates(&entry.series)?;
            fetcher.insert_history(entry.store, entry.metric, entry.series);
        }
        Ok(fetcher)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let recording: Recording = serde_json::from_str(json)?;
        Self::from_recording(recording)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn insert_snapshot(
        &mut self,
        store: impl Into<StoreId>,
        metric: MetricName,
        window: DateRange,
        snapshot: MetricSnapshot,
    ) -> &mut Self {
        self.snapshots.insert((store.into(), metric, window), snapshot);
        self
    }

    pub fn insert_history(
        &mut self,
        store: impl Into<StoreId>,
        metric: MetricName,
        series: Vec<DailyPoint>,
    ) -> &mut Self {
        self.history.insert((store.into(), metric), series);
        self
    }

    /// Make every fetch for `store` fail.
    pub fn fail_store(&mut self, store: impl Into<StoreId>) -> &mut Self {
        self.failing.insert(store.into());
        self
    }

    /// Report `metric` as not directly available.
    pub fn without_metric(&mut self, metric: MetricName) -> &mut Self {
        self.unreported.insert(metric);
        self
    }

    /// Number of fetches served or failed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn from_history(&self, store: &StoreId, metric: MetricName, window: &DateRange) -> Option<MetricSnapshot> {
        if metric.is_ratio() {
            return None;
        }
        let history = self.history.get(&(store.clone(), metric))?;
        let cut = |range: &DateRange| -> Vec<DailyPoint> {
            let mut points: Vec<DailyPoint> =
                history.iter().copied().filter(|p| range.contains(p.date)).collect();
            points.sort_by_key(|p| p.date);
            points
        };

        let current = cut(window);
        let previous_total = series::total(&cut(&window.preceding()));
        let total = series::total(&current);
        let change = growth::growth(total, previous_total);
        Some(MetricSnapshot::new(total, current).with_change(change.percent, change.trend))
    }
}

#[async_trait]
impl SnapshotFetcher for StaticFetcher {
    async fn fetch(&self, store: &StoreId, metric: MetricName, window: &DateRange) -> Result<MetricSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let fail = |message: String| RollupError::Fetch {
            store: store.clone(),
            metric,
            message,
        };

        if self.failing.contains(store) {
            return Err(fail("store unavailable".to_string()));
        }
        if self.unreported.contains(&metric) {
            return Err(fail("metric not reported".to_string()));
        }

        if let Some(snapshot) = self.snapshots.get(&(store.clone(), metric, *window)) {
            return Ok(snapshot.clone());
        }
        self.from_history(store, metric, window)
            .ok_or_else(|| fail(format!("no data for {}", window)))
    }

    fn provides(&self, metric: MetricName) -> bool {
        !self.unreported.contains(&metric)
    }
}
