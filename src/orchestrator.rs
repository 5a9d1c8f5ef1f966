//! Fan-out, fold and reconcile per-store snapshots into a consolidated bundle.
//!
//! One request resolves its store scope, issues every (store, metric) fetch
//! concurrently, then folds the gathered snapshots: additive metrics first
//! (summed totals, date-keyed merged series), ratio metrics after, recombined
//! from the folded components. Growth is recomputed from aggregated current
//! and previous totals, never from per-store percentages.
//!
//! Failure policy is degrade-gracefully: a store with any failed current-window
//! fetch is left out of every metric and reported in `failed_stores` with
//! `partial = true`. A failed previous-window fetch only costs the store its
//! growth baseline, which then falls back to the change the current snapshot
//! reports. Only when every store in scope fails does the request fail.
//!
//! The pipeline keeps no state between calls. Superseded results are guarded
//! by [`GenerationGuard`].

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::bucket::{self, PeriodBucketer};
use crate::config::{EngineConfig, PreviousWindow};
use crate::error::{Result, RollupError};
use crate::fetcher::SnapshotFetcher;
use crate::growth;
use crate::models::{
    AggregatedMetric, ConsolidatedBundle, DateRange, MetricName, MetricResult, MetricSnapshot,
    PeriodBucket, RatioFormula, StoreId, StoreScope,
};
use crate::ratio;
use crate::series;

// ---------------------------------------------------------------------------
// AggregateRequest
// ---------------------------------------------------------------------------

/// Period re-bucketing applied to every metric of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucketing {
    DayOfWeek,
    Quarterly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRequest {
    pub metrics: Vec<MetricName>,
    pub scope: StoreScope,
    pub window: DateRange,
    #[serde(default)]
    pub bucketing: Option<Bucketing>,
}

impl AggregateRequest {
    pub fn new(metrics: &[MetricName], scope: StoreScope, window: DateRange) -> Self {
        Self {
            metrics: metrics.to_vec(),
            scope,
            window,
            bucketing: None,
        }
    }

    pub fn with_bucketing(mut self, bucketing: Bucketing) -> Self {
        self.bucketing = Some(bucketing);
        self
    }
}

// ---------------------------------------------------------------------------
// GenerationGuard: drop results of superseded requests
// ---------------------------------------------------------------------------

/// Monotonic request counter. Each new filter state takes a [`Ticket`];
/// a result is only accepted while its ticket is still the latest.
#[derive(Debug, Default)]
pub struct GenerationGuard {
    current: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket {
        let generation = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        Ticket { generation }
    }

    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.current() == ticket.generation
    }

    /// Pass `value` through if `ticket` is still current.
    pub fn accept<T>(&self, ticket: &Ticket, value: T) -> Result<T> {
        if self.is_current(ticket) {
            Ok(value)
        } else {
            debug!(
                generation = ticket.generation,
                latest = self.current(),
                "dropping superseded aggregation"
            );
            Err(RollupError::Superseded {
                generation: ticket.generation,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Fetch planning
// ---------------------------------------------------------------------------

/// What has to be fetched per store, and which additive metrics get folded.
#[derive(Debug, Default)]
struct FetchPlan {
    sources: BTreeSet<MetricName>,
    additive: BTreeSet<MetricName>,
}

impl FetchPlan {
    fn build<F: SnapshotFetcher + ?Sized>(metrics: &[MetricName], fetcher: &F) -> Result<Self> {
        let mut plan = Self::default();
        for metric in metrics {
            plan.require(*metric, fetcher)?;
        }
        Ok(plan)
    }

    fn require<F: SnapshotFetcher + ?Sized>(&mut self, metric: MetricName, fetcher: &F) -> Result<()> {
        if let Some(formula) = metric.formula() {
            self.require(formula.numerator(), fetcher)?;
            return self.require(formula.denominator(), fetcher);
        }

        self.additive.insert(metric);
        if fetcher.provides(metric) {
            self.sources.insert(metric);
            return Ok(());
        }

        // Counts the source does not report are rebuilt from a base count and
        // the store's own rate.
        let Some((base, rate)) = derivation(metric) else {
            return Err(RollupError::UnsupportedMetric(metric));
        };
        if !fetcher.provides(rate) {
            return Err(RollupError::UnsupportedMetric(metric));
        }
        self.sources.insert(rate);
        self.require(base, fetcher)
            .map_err(|_| RollupError::UnsupportedMetric(metric))
    }
}

// ---------------------------------------------------------------------------
// Per-store data
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreData {
    current: BTreeMap<MetricName, MetricSnapshot>,
    previous: BTreeMap<MetricName, f64>,
}

impl StoreData {
    /// The store's snapshot for an additive metric, deriving it when the
    /// source did not report it.
    fn resolve(&self, metric: MetricName) -> Option<MetricSnapshot> {
        if let Some(snapshot) = self.current.get(&metric) {
            return Some(snapshot.clone());
        }
        let (base, rate) = derivation(metric)?;
        let base = self.resolve(base)?;
        Some(ratio::apply_rate(&base, self.current.get(&rate)?))
    }

    fn resolve_previous(&self, metric: MetricName) -> Option<f64> {
        if let Some(total) = self.previous.get(&metric) {
            return Some(*total);
        }
        let (base, rate) = derivation(metric)?;
        let base = self.resolve_previous(base)?;
        Some(ratio::sum_of_rated([(base, *self.previous.get(&rate)?)]))
    }
}

/// `(base count, rate)` a count is rebuilt from when not reported directly.
fn derivation(metric: MetricName) -> Option<(MetricName, MetricName)> {
    match metric {
        MetricName::Clicks => Some((MetricName::Impressions, MetricName::Ctr)),
        MetricName::Orders => Some((MetricName::Clicks, MetricName::ConversionRate)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowTag {
    Current,
    Previous,
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Stateless aggregation pipeline bound to an [`EngineConfig`].
pub struct Aggregator<'a> {
    config: &'a EngineConfig,
}

impl<'a> Aggregator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Run one request end to end.
    ///
    /// An empty scope is not an error and yields a zeroed bundle. Fails with
    /// [`RollupError::AggregationFailure`] only when every store failed, and
    /// with [`RollupError::UnsupportedMetric`] when a metric can neither be
    /// fetched nor derived.
    pub async fn aggregate<F>(&self, fetcher: &F, request: &AggregateRequest) -> Result<ConsolidatedBundle>
    where
        F: SnapshotFetcher + ?Sized,
    {
        let stores = request.scope.resolve();
        let requested: BTreeSet<MetricName> = request.metrics.iter().copied().collect();

        if stores.is_empty() || requested.is_empty() {
            debug!(window = %request.window, stores = stores.len(), "nothing to aggregate");
            return Ok(self.zeroed(request, stores, &requested));
        }

        let plan = FetchPlan::build(&request.metrics, fetcher)?;
        let (data, failed) = self.gather(fetcher, &stores, &plan, &request.window).await;

        if data.is_empty() {
            warn!(stores = stores.len(), "every store in scope failed");
            return Err(RollupError::AggregationFailure { failed });
        }
        if !failed.is_empty() {
            let names: Vec<&str> = failed.iter().map(StoreId::as_str).collect();
            warn!(
                failed = ?names,
                included = data.len(),
                "aggregating with partial data"
            );
        }

        // Additive components first; ratios are derived from them.
        let mut current: BTreeMap<MetricName, AggregatedMetric> = BTreeMap::new();
        let mut previous: BTreeMap<MetricName, f64> = BTreeMap::new();
        for metric in &plan.additive {
            current.insert(*metric, fold_current(&data, *metric));
            previous.insert(*metric, fold_previous(&data, *metric));
        }

        let mut metrics = BTreeMap::new();
        for metric in &requested {
            let result = match metric.formula() {
                Some(formula) => self.ratio_result(formula, &current, &previous, request)?,
                None => self.additive_result(*metric, &current, &previous, request),
            };
            metrics.insert(*metric, result);
        }

        Ok(ConsolidatedBundle {
            window: request.window,
            stores,
            partial: !failed.is_empty(),
            failed_stores: failed,
            metrics,
        })
    }

    /// [`aggregate`](Self::aggregate), discarding the result if a newer
    /// request began on `guard` while this one was in flight.
    pub async fn aggregate_latest<F>(
        &self,
        fetcher: &F,
        request: &AggregateRequest,
        guard: &GenerationGuard,
    ) -> Result<ConsolidatedBundle>
    where
        F: SnapshotFetcher + ?Sized,
    {
        let ticket = guard.begin();
        let bundle = self.aggregate(fetcher, request).await;
        guard.accept(&ticket, bundle)?
    }

    /// Issue every fetch concurrently and split stores into usable data and
    /// failures. Stores come back in the sorted order they went out in.
    async fn gather<F>(
        &self,
        fetcher: &F,
        stores: &[StoreId],
        plan: &FetchPlan,
        window: &DateRange,
    ) -> (BTreeMap<StoreId, StoreData>, Vec<StoreId>)
    where
        F: SnapshotFetcher + ?Sized,
    {
        let previous_window = window.preceding();
        let fetch_previous = self.config.previous_window == PreviousWindow::Fetch;

        let mut jobs = Vec::new();
        for store in stores {
            for metric in &plan.sources {
                jobs.push((WindowTag::Current, store.clone(), *metric, *window));
                if fetch_previous {
                    jobs.push((WindowTag::Previous, store.clone(), *metric, previous_window));
                }
            }
        }
        debug!(
            stores = stores.len(),
            fetches = jobs.len(),
            window = %window,
            "fanning out snapshot fetches"
        );

        let results = join_all(jobs.into_iter().map(|(tag, store, metric, range)| async move {
            let result = fetcher.fetch(&store, metric, &range).await;
            (tag, store, metric, result)
        }))
        .await;

        let mut data: BTreeMap<StoreId, StoreData> = BTreeMap::new();
        let mut failed: BTreeSet<StoreId> = BTreeSet::new();
        let mut missing_previous: Vec<(StoreId, MetricName)> = Vec::new();
        for (tag, store, metric, result) in results {
            let snapshot = match result.and_then(|s| s.validate().map(|_| s)) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug_assert!(
                        !matches!(e, RollupError::MisalignedSeries(_)),
                        "snapshot for {} {} has a misaligned series: {}",
                        store,
                        metric,
                        e
                    );
                    match tag {
                        WindowTag::Current => {
                            warn!(store = %store, metric = %metric, error = %e, "store excluded from aggregation");
                            failed.insert(store.clone());
                        }
                        WindowTag::Previous => {
                            warn!(
                                store = %store,
                                metric = %metric,
                                error = %e,
                                "previous window unavailable, falling back to reported change"
                            );
                            missing_previous.push((store, metric));
                        }
                    }
                    continue;
                }
            };

            let entry = data.entry(store.clone()).or_default();
            match tag {
                WindowTag::Current => {
                    if !fetch_previous {
                        entry.previous.insert(metric, implied_previous(&store, metric, &snapshot));
                    }
                    entry.current.insert(metric, snapshot);
                }
                WindowTag::Previous => {
                    entry.previous.insert(metric, snapshot.total);
                }
            }
        }

        // Current data stays usable without its previous window.
        for (store, metric) in missing_previous {
            let Some(entry) = data.get_mut(&store) else {
                continue;
            };
            if let Some(snapshot) = entry.current.get(&metric) {
                let previous = implied_previous(&store, metric, snapshot);
                entry.previous.insert(metric, previous);
            }
        }

        for store in &failed {
            data.remove(store);
        }
        (data, failed.into_iter().collect())
    }

    fn additive_result(
        &self,
        metric: MetricName,
        current: &BTreeMap<MetricName, AggregatedMetric>,
        previous: &BTreeMap<MetricName, f64>,
        request: &AggregateRequest,
    ) -> MetricResult {
        let aggregated = current.get(&metric).cloned().unwrap_or_default();
        let previous_total = previous.get(&metric).copied().unwrap_or(0.0);
        let change = growth::growth(aggregated.total, previous_total);

        let buckets = request.bucketing.map(|mode| match mode {
            Bucketing::DayOfWeek => {
                PeriodBucketer::new(self.config).day_of_week(&aggregated.series, Some(&request.window))
            }
            Bucketing::Quarterly => bucket::quarterly(&bucket::monthly(&aggregated.series)),
        });

        MetricResult {
            metric,
            kind: metric.kind(),
            total: aggregated.total,
            previous_total,
            percent: change.percent,
            trend: change.trend,
            series: aggregated.series,
            buckets,
        }
    }

    fn ratio_result(
        &self,
        formula: RatioFormula,
        current: &BTreeMap<MetricName, AggregatedMetric>,
        previous: &BTreeMap<MetricName, f64>,
        request: &AggregateRequest,
    ) -> Result<MetricResult> {
        let derived = ratio::recombine(formula, current)?;
        let previous_value = ratio::ratio(
            formula,
            previous.get(&formula.numerator()).copied().unwrap_or(0.0),
            previous.get(&formula.denominator()).copied().unwrap_or(0.0),
        );
        let change = growth::growth(derived.value, previous_value);

        let buckets = match request.bucketing {
            Some(mode) => Some(self.ratio_buckets(formula, mode, current, &request.window)?),
            None => None,
        };

        Ok(MetricResult {
            metric: formula.metric(),
            kind: formula.metric().kind(),
            total: derived.value,
            previous_total: previous_value,
            percent: change.percent,
            trend: change.trend,
            series: derived.series,
            buckets,
        })
    }

    fn ratio_buckets(
        &self,
        formula: RatioFormula,
        mode: Bucketing,
        current: &BTreeMap<MetricName, AggregatedMetric>,
        window: &DateRange,
    ) -> Result<Vec<PeriodBucket>> {
        let component = |name: MetricName| {
            current
                .get(&name)
                .ok_or_else(|| RollupError::InvalidArgument(format!("{} requires component '{}'", formula, name)))
        };
        let numerator = component(formula.numerator())?;
        let denominator = component(formula.denominator())?;

        Ok(match mode {
            Bucketing::DayOfWeek => PeriodBucketer::new(self.config).day_of_week_ratio(
                formula,
                &numerator.series,
                &denominator.series,
                Some(window),
            ),
            Bucketing::Quarterly => bucket::quarterly_ratio(
                formula,
                &bucket::monthly(&numerator.series),
                &bucket::monthly(&denominator.series),
            ),
        })
    }

    fn zeroed(
        &self,
        request: &AggregateRequest,
        stores: Vec<StoreId>,
        requested: &BTreeSet<MetricName>,
    ) -> ConsolidatedBundle {
        let metrics = requested
            .iter()
            .map(|metric| {
                let mut result = MetricResult::zeroed(*metric);
                if request.bucketing.is_some() {
                    result.buckets = Some(Vec::new());
                }
                (*metric, result)
            })
            .collect();

        ConsolidatedBundle {
            window: request.window,
            stores,
            failed_stores: Vec::new(),
            partial: false,
            metrics,
        }
    }
}

/// Sum per-store totals and merge per-store series, in store order.
fn fold_current(data: &BTreeMap<StoreId, StoreData>, metric: MetricName) -> AggregatedMetric {
    let snapshots: Vec<MetricSnapshot> = data.values().filter_map(|d| d.resolve(metric)).collect();
    AggregatedMetric {
        total: snapshots.iter().map(|s| s.total).sum(),
        series: series::merge_all(snapshots.iter().map(|s| s.series.as_slice())),
    }
}

fn fold_previous(data: &BTreeMap<StoreId, StoreData>, metric: MetricName) -> f64 {
    data.values().filter_map(|d| d.resolve_previous(metric)).sum()
}

fn implied_previous(store: &StoreId, metric: MetricName, snapshot: &MetricSnapshot) -> f64 {
    match growth::implied_previous(snapshot.total, snapshot.percent, snapshot.trend) {
        Some(previous) => previous,
        None => {
            warn!(
                store = %store,
                metric = %metric,
                percent = snapshot.percent,
                "previous total not recoverable from reported change, using 0"
            );
            0.0
        }
    }
}
