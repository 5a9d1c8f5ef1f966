//! Request lifecycle for a dashboard view on a Tokio runtime.
//!
//! An [`AggregationSession`] owns an engine and a fetcher. Every filter change
//! is submitted as a new request: it takes a fresh generation, aborts the
//! task still running for the previous filter state, and runs on its own
//! task. Results are published through a [`tokio::sync::watch`] channel, and
//! only while their generation is still the latest, so a slow response for an
//! old filter never overwrites a fresher one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use metric_rollup::{AggregateRequest, AggregationSession, RollupEngine, StaticFetcher};
//!
//! # async fn example(request: AggregateRequest) {
//! let session = AggregationSession::new(RollupEngine::builder().build(), Arc::new(StaticFetcher::new()));
//! let mut updates = session.subscribe();
//!
//! session.submit(request);
//! updates.changed().await.unwrap();
//! println!("{:?}", *updates.borrow());
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::Result;
use crate::fetcher::SnapshotFetcher;
use crate::models::ConsolidatedBundle;
use crate::orchestrator::{AggregateRequest, GenerationGuard};
use crate::RollupEngine;

// ---------------------------------------------------------------------------
// SessionUpdate
// ---------------------------------------------------------------------------

/// Latest published state of a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionUpdate {
    /// Nothing has completed yet.
    #[default]
    Idle,
    Ready {
        generation: u64,
        bundle: ConsolidatedBundle,
    },
    Failed {
        generation: u64,
        message: String,
    },
}

impl SessionUpdate {
    pub fn generation(&self) -> u64 {
        match self {
            SessionUpdate::Idle => 0,
            SessionUpdate::Ready { generation, .. } | SessionUpdate::Failed { generation, .. } => *generation,
        }
    }

    pub fn bundle(&self) -> Option<&ConsolidatedBundle> {
        match self {
            SessionUpdate::Ready { bundle, .. } => Some(bundle),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// AggregationSession
// ---------------------------------------------------------------------------

pub struct AggregationSession {
    engine: Arc<RollupEngine>,
    fetcher: Arc<dyn SnapshotFetcher>,
    guard: Arc<GenerationGuard>,
    updates: Arc<watch::Sender<SessionUpdate>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
}

impl AggregationSession {
    pub fn new(engine: RollupEngine, fetcher: Arc<dyn SnapshotFetcher>) -> Self {
        let (updates, _) = watch::channel(SessionUpdate::Idle);
        Self {
            engine: Arc::new(engine),
            fetcher,
            guard: Arc::new(GenerationGuard::new()),
            updates: Arc::new(updates),
            in_flight: Mutex::new(None),
        }
    }

    /// Receive every published update.
    pub fn subscribe(&self) -> watch::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }

    /// The most recently published update.
    pub fn latest(&self) -> SessionUpdate {
        self.updates.borrow().clone()
    }

    pub fn current_generation(&self) -> u64 {
        self.guard.current()
    }

    /// Start aggregating `request` on a new task, superseding any request
    /// still in flight. Returns the request's generation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: AggregateRequest) -> u64 {
        let ticket = self.guard.begin();
        let engine = self.engine.clone();
        let fetcher = self.fetcher.clone();
        let guard = self.guard.clone();
        let updates = self.updates.clone();

        let handle = tokio::spawn(async move {
            let outcome = engine.aggregate(fetcher.as_ref(), &request).await;
            let generation = ticket.generation();
            if !guard.is_current(&ticket) {
                debug!(generation, "discarding result of superseded request");
                return;
            }
            let update = match outcome {
                Ok(bundle) => SessionUpdate::Ready { generation, bundle },
                Err(e) => SessionUpdate::Failed {
                    generation,
                    message: e.to_string(),
                },
            };
            // Never replace a newer generation's result.
            updates.send_if_modified(|latest| {
                if latest.generation() >= generation {
                    return false;
                }
                *latest = update;
                true
            });
        });

        if let Some(previous) = self.lock_in_flight().replace(handle) {
            previous.abort();
        }
        ticket.generation()
    }

    /// Aggregate `request` on the caller's task.
    ///
    /// Fails with [`RollupError::Superseded`](crate::RollupError::Superseded)
    /// if another request was started on this session before this one
    /// finished.
    pub async fn run(&self, request: &AggregateRequest) -> Result<ConsolidatedBundle> {
        let ticket = self.guard.begin();
        let outcome = self.engine.aggregate(self.fetcher.as_ref(), request).await;
        let bundle = self.guard.accept(&ticket, outcome)??;

        // Publish under this request's own generation; a request started
        // after the check above must still win.
        let generation = ticket.generation();
        self.updates.send_if_modified(|latest| {
            if latest.generation() >= generation {
                return false;
            }
            *latest = SessionUpdate::Ready {
                generation,
                bundle: bundle.clone(),
            };
            true
        });
        Ok(bundle)
    }

    /// Abort the in-flight request, if any, and invalidate its result.
    pub fn cancel(&self) {
        self.guard.begin();
        if let Some(handle) = self.lock_in_flight().take() {
            handle.abort();
        }
    }

    /// The in-flight slot only ever holds a handle, so a panic while it was
    /// locked leaves nothing half-written.
    fn lock_in_flight(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AggregationSession {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_in_flight().take() {
            handle.abort();
        }
    }
}
