//! Request lifecycle of an aggregation session. Requires the `async` feature.

#![cfg(feature = "async")]

mod common;

use async_trait::async_trait;
use common::{flat, range};
use metric_rollup::{
    AggregateRequest, AggregationSession, DateRange, MetricName, MetricSnapshot, RollupEngine,
    RollupError, SessionUpdate, SnapshotFetcher, StaticFetcher, StoreId, StoreScope,
};
use std::sync::Arc;
use std::time::Duration;

/// Answers requests for windows starting on `slow_start` only after a delay.
struct SlowFetcher {
    inner: StaticFetcher,
    slow_start: chrono::NaiveDate,
}

#[async_trait]
impl SnapshotFetcher for SlowFetcher {
    async fn fetch(
        &self,
        store: &StoreId,
        metric: MetricName,
        window: &DateRange,
    ) -> metric_rollup::Result<MetricSnapshot> {
        if window.start == self.slow_start {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        self.inner.fetch(store, metric, window).await
    }
}

fn session() -> AggregationSession {
    let mut inner = StaticFetcher::new();
    inner.insert_history("a", MetricName::Sales, flat("2024-01-01", 120, 1.0));
    let fetcher = SlowFetcher {
        inner,
        slow_start: common::date("2024-03-01"),
    };
    AggregationSession::new(RollupEngine::builder().build(), Arc::new(fetcher))
}

fn request(start: &str, end: &str) -> AggregateRequest {
    AggregateRequest::new(&[MetricName::Sales], StoreScope::single("a"), range(start, end))
}

#[tokio::test]
async fn newer_request_wins_over_slower_older_one() {
    let session = session();
    let mut updates = session.subscribe();

    let slow = session.submit(request("2024-03-01", "2024-03-10"));
    let fast = session.submit(request("2024-02-01", "2024-02-10"));
    assert!(fast > slow);

    updates.changed().await.unwrap();
    let latest = updates.borrow().clone();
    assert_eq!(latest.generation(), fast);
    assert_eq!(latest.bundle().unwrap().window, range("2024-02-01", "2024-02-10"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.latest().generation(), fast);
}

#[tokio::test]
async fn run_publishes_its_result() {
    let session = session();
    let bundle = session.run(&request("2024-02-01", "2024-02-10")).await.unwrap();
    assert_eq!(bundle.get(MetricName::Sales).unwrap().total, 10.0);

    match session.latest() {
        SessionUpdate::Ready { bundle: published, .. } => assert_eq!(published, bundle),
        other => panic!("unexpected update: {other:?}"),
    }
}

#[tokio::test]
async fn run_publishes_under_its_own_generation() {
    let session = session();
    let mut updates = session.subscribe();

    let slow = session.submit(request("2024-03-01", "2024-03-10"));
    session.run(&request("2024-02-01", "2024-02-10")).await.unwrap();
    assert_eq!(session.latest().generation(), slow + 1);

    let newer = session.submit(request("2024-01-01", "2024-01-05"));
    while session.latest().generation() != newer {
        updates.changed().await.unwrap();
    }

    let latest = session.latest();
    assert_eq!(latest.generation(), newer);
    assert_eq!(latest.bundle().unwrap().window, range("2024-01-01", "2024-01-05"));
}

#[tokio::test]
async fn run_overtaken_by_submit_is_superseded() {
    let session = session();
    let mut updates = session.subscribe();

    let slow = request("2024-03-01", "2024-03-10");
    let (outcome, fast) = tokio::join!(session.run(&slow), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.submit(request("2024-02-01", "2024-02-10"))
    });
    assert!(matches!(outcome, Err(RollupError::Superseded { .. })));

    while session.latest().generation() != fast {
        updates.changed().await.unwrap();
    }
    assert_eq!(session.latest().bundle().unwrap().window, range("2024-02-01", "2024-02-10"));
}

#[tokio::test]
async fn cancel_discards_in_flight_request() {
    let session = session();
    session.submit(request("2024-03-01", "2024-03-10"));
    session.cancel();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.latest(), SessionUpdate::Idle);
    assert_eq!(session.current_generation(), 2);
}

#[tokio::test]
async fn failures_are_published() {
    let session = session();
    let mut updates = session.subscribe();

    session.submit(AggregateRequest::new(
        &[MetricName::Sales],
        StoreScope::single("missing"),
        range("2024-02-01", "2024-02-10"),
    ));
    updates.changed().await.unwrap();

    let update = updates.borrow().clone();
    match &update {
        SessionUpdate::Failed { message, .. } => assert!(message.contains("every store")),
        other => panic!("unexpected update: {other:?}"),
    }
}
