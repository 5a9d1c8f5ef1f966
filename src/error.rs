use crate::models::{MetricName, StoreId};

#[derive(Debug, thiserror::Error)]
pub enum RollupError {
    #[error("Fetch failed for store {store} ({metric}): {message}")]
    Fetch {
        store: StoreId,
        metric: MetricName,
        message: String,
    },

    #[error("Aggregation failed: every store in scope failed ({})", .failed.len())]
    AggregationFailure { failed: Vec<StoreId> },

    #[error("Misaligned series: {0}")]
    MisalignedSeries(String),

    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(MetricName),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Request superseded (generation {generation})")]
    Superseded { generation: u64 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RollupError>;
