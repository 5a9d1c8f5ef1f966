//! Multi-store metric aggregation for dashboard views.
//!
//! Takes independent per-store metric snapshots (total, change and daily
//! sparkline) and consolidates them over a store scope: series are merged by
//! calendar date, ratio metrics such as conversion rate or ROAS are recombined
//! from their summed components, daily series can be re-bucketed by quarter or
//! weekday, and period-over-period growth is recomputed from aggregated totals.
//!
//! # Quick start
//!
//! ```no_run
//! use metric_rollup::{AggregateRequest, DateRange, MetricName, RollupEngine, StaticFetcher, StoreScope};
//! use chrono::NaiveDate;
//!
//! # async fn example() -> metric_rollup::Result<()> {
//! let engine = RollupEngine::builder().build();
//! let fetcher = StaticFetcher::from_json_file("recorded.json")?;
//!
//! let window = DateRange::new(
//!     NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
//!     NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
//! )?;
//! let request = AggregateRequest::new(
//!     &[MetricName::Sales, MetricName::ConversionRate],
//!     StoreScope::all(["north", "south"]),
//!     window,
//! );
//! let bundle = engine.aggregate(&fetcher, &request).await?;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "async")]
pub mod async_client;
pub mod bucket;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod growth;
pub mod models;
pub mod orchestrator;
pub mod ratio;
pub mod series;

#[cfg(feature = "async")]
pub use async_client::{AggregationSession, SessionUpdate};
pub use bucket::PeriodBucketer;
pub use config::{EngineConfig, PreviousWindow, WeekStart, WeekdayLabels, WeekdayPolicy};
pub use error::{Result, RollupError};
pub use fetcher::{SnapshotFetcher, StaticFetcher};
pub use growth::Growth;
pub use models::{
    AggregatedMetric, ConsolidatedBundle, DailyPoint, DateRange, DerivedRatio, MetricKind, MetricName,
    MetricResult, MetricSnapshot, PeriodBucket, QuarterRow, RatioFormula, StoreId, StoreScope, Trend,
};
pub use orchestrator::{AggregateRequest, Aggregator, Bucketing, GenerationGuard, Ticket};

use std::fmt;

// ---------------------------------------------------------------------------
// RollupEngineBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and constructing a [`RollupEngine`].
///
/// Use [`RollupEngine::builder()`] to obtain a builder, chain configuration
/// methods, and call [`build()`](RollupEngineBuilder::build).
#[derive(Default)]
pub struct RollupEngineBuilder {
    config: EngineConfig,
}

impl RollupEngineBuilder {
    /// Replace the whole configuration, e.g. one loaded with
    /// [`EngineConfig::from_json_file`].
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Choose whether weekdays absent from a bucketed range are omitted or
    /// reported with a zero count. Defaults to [`WeekdayPolicy::Omit`].
    pub fn weekday_policy(mut self, policy: WeekdayPolicy) -> Self {
        self.config.weekday_policy = policy;
        self
    }

    /// First day of the canonical weekday order. Defaults to Sunday.
    pub fn week_start(mut self, start: WeekStart) -> Self {
        self.config.week_start = start;
        self
    }

    /// Locale labels for weekday buckets. Defaults to English.
    pub fn weekday_labels(mut self, labels: WeekdayLabels) -> Self {
        self.config.weekday_labels = labels;
        self
    }

    /// Where previous-window totals for growth come from.
    ///
    /// Defaults to [`PreviousWindow::Fetch`], which doubles the fan-out.
    pub fn previous_window(mut self, source: PreviousWindow) -> Self {
        self.config.previous_window = source;
        self
    }

    pub fn build(self) -> RollupEngine {
        RollupEngine {
            config: self.config,
        }
    }
}

// ---------------------------------------------------------------------------
// RollupEngine
// ---------------------------------------------------------------------------

/// The main entry point: a configuration plus accessors for the aggregation
/// pipeline and the period bucketer.
///
/// The engine holds no per-request state, so one instance can serve every
/// filter change of a view.
#[derive(Default)]
pub struct RollupEngine {
    config: EngineConfig,
}

impl RollupEngine {
    pub fn builder() -> RollupEngineBuilder {
        RollupEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Access the aggregation pipeline.
    pub fn aggregator(&self) -> Aggregator<'_> {
        Aggregator::new(&self.config)
    }

    /// Access the day-of-week bucketer configured with this engine's labels,
    /// week start and empty-weekday policy.
    pub fn bucketer(&self) -> PeriodBucketer<'_> {
        PeriodBucketer::new(&self.config)
    }

    /// Aggregate one request. See [`Aggregator::aggregate`].
    pub async fn aggregate<F>(&self, fetcher: &F, request: &AggregateRequest) -> Result<ConsolidatedBundle>
    where
        F: SnapshotFetcher + ?Sized,
    {
        self.aggregator().aggregate(fetcher, request).await
    }

    /// Aggregate one request, dropping the result if `guard` moved on to a
    /// newer request meanwhile. See [`Aggregator::aggregate_latest`].
    pub async fn aggregate_latest<F>(
        &self,
        fetcher: &F,
        request: &AggregateRequest,
        guard: &GenerationGuard,
    ) -> Result<ConsolidatedBundle>
    where
        F: SnapshotFetcher + ?Sized,
    {
        self.aggregator().aggregate_latest(fetcher, request, guard).await
    }
}

impl fmt::Display for RollupEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RollupEngine(weekday_policy={:?}, week_start={:?}, previous_window={:?})",
            self.config.weekday_policy, self.config.week_start, self.config.previous_window
        )
    }
}
