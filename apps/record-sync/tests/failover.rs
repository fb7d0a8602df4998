//! Streaming Failover Integration Tests
//!
//! Covers the stream-to-polling switch, terminal stream errors, and
//! polling mode routing at the engine surface.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_test::assert_pending;

use record_sync::{
    DeliveryMode, FeedEvent, PlatformEvents, RecordQuery, RecordStore, RecordStream, StoreError,
    StoreErrorCode, StoreResult, SyncEngine, SyncError, SyncSettings, TransactionRecord,
};

/// Store with a scriptable stream and a fixed fetch result set.
struct FailoverStore {
    records: Mutex<Vec<TransactionRecord>>,
    fetch_failures: Mutex<VecDeque<StoreError>>,
    fetch_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    stream_tx: Mutex<Option<mpsc::Sender<StoreResult<Vec<TransactionRecord>>>>>,
}

impl FailoverStore {
    fn new(records: Vec<TransactionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fetch_failures: Mutex::new(VecDeque::new()),
            fetch_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            stream_tx: Mutex::new(None),
        }
    }

    fn fail_fetch_times(&self, count: usize, message: &str) {
        let mut failures = self.fetch_failures.lock();
        for _ in 0..count {
            failures.push_back(StoreError::new(message));
        }
    }

    /// Pushes one item onto the most recently opened stream.
    async fn push_stream(&self, item: StoreResult<Vec<TransactionRecord>>) {
        let tx = self.stream_tx.lock().clone().expect("no active stream");
        tx.send(item).await.expect("stream receiver dropped");
    }

    fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for FailoverStore {
    async fn subscribe(&self, _query: RecordQuery) -> RecordStream {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        *self.stream_tx.lock() = Some(tx);
        rx
    }

    async fn fetch(&self, _query: RecordQuery) -> StoreResult<Vec<TransactionRecord>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match self.fetch_failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(self.records.lock().clone()),
        }
    }

    async fn enable_network(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn disable_network(&self) -> StoreResult<()> {
        Ok(())
    }
}

fn spawn_engine(store: &Arc<FailoverStore>) -> SyncEngine {
    let (_, events) = PlatformEvents::channels();
    SyncEngine::new(
        Arc::clone(store) as Arc<dyn RecordStore>,
        SyncSettings::default(),
        events,
    )
}

fn sample_records(count: usize) -> Vec<TransactionRecord> {
    (0..count)
        .map(|i| {
            TransactionRecord::new(
                format!("t{i}"),
                format!("Transaction {i}"),
                Decimal::new(-450, 2), // -4.50
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            )
        })
        .collect()
}

fn assert_records(event: &FeedEvent, expected: usize) {
    match event {
        FeedEvent::Records(records) => assert_eq!(records.len(), expected),
        FeedEvent::Error(error) => panic!("expected records, got error: {error}"),
    }
}

// =============================================================================
// Streaming Delivery Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stream_records_reach_consumer() {
    let store = Arc::new(FailoverStore::new(sample_records(3)));
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    store.push_stream(Ok(sample_records(3))).await;

    assert_records(&feed.recv().await.unwrap(), 3);
    assert_eq!(feed.subscription().mode(), DeliveryMode::Streaming);
    assert!(!engine.is_in_polling_mode());

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_retryable_stream_error_keeps_stream() {
    let store = Arc::new(FailoverStore::new(sample_records(1)));
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    store
        .push_stream(Err(StoreError::with_code(
            StoreErrorCode::Unavailable,
            "backend temporarily unavailable",
        )))
        .await;
    store.push_stream(Ok(sample_records(1))).await;

    // The store retries unavailability itself; the stream stays up.
    assert_records(&feed.recv().await.unwrap(), 1);
    assert_eq!(feed.subscription().mode(), DeliveryMode::Streaming);
    assert!(!engine.is_in_polling_mode());
    assert_eq!(store.subscribe_calls(), 1);

    engine.shutdown().await;
}

// =============================================================================
// Transport Failover Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_transport_failure_fails_over_to_polling() {
    let store = Arc::new(FailoverStore::new(sample_records(3)));
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    let id_before = feed.id();
    let handle = feed.handle();
    store.push_stream(Ok(sample_records(3))).await;
    assert_records(&feed.recv().await.unwrap(), 3);

    let failed_at = Instant::now();
    store
        .push_stream(Err(StoreError::new("listen stream transport errored")))
        .await;

    // Same feed, now fed by the poller, within one poll interval.
    assert_records(&feed.recv().await.unwrap(), 3);
    assert!(failed_at.elapsed() <= Duration::from_millis(3000));
    assert_eq!(feed.id(), id_before);

    assert!(engine.is_in_polling_mode());
    assert_eq!(feed.subscription().mode(), DeliveryMode::Polling);
    assert!(engine.connection_state().last_error().is_some());
    assert_eq!(engine.polling_stats().active_subscriptions, 1);
    assert!(store.fetch_calls() >= 1);

    // The pre-failover handle still tears the subscription down.
    handle.unsubscribe();
    assert_eq!(engine.polling_stats().active_subscriptions, 0);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polling_mode_is_global_for_new_subscriptions() {
    let store = Arc::new(FailoverStore::new(sample_records(2)));
    let engine = spawn_engine(&store);

    let mut first = engine.subscribe_to_records(RecordQuery::all()).await;
    store
        .push_stream(Err(StoreError::new("rpc channel broke")))
        .await;
    assert_records(&first.recv().await.unwrap(), 2);
    assert!(engine.is_in_polling_mode());

    // New subscriptions bypass the stream API entirely.
    let mut second = engine.subscribe_to_records(RecordQuery::all()).await;
    assert_records(&second.recv().await.unwrap(), 2);
    assert_eq!(second.subscription().mode(), DeliveryMode::Polling);
    assert_eq!(store.subscribe_calls(), 1);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_disable_polling_mode_restores_streaming_for_new_feeds() {
    let store = Arc::new(FailoverStore::new(sample_records(1)));
    let engine = spawn_engine(&store);

    let mut first = engine.subscribe_to_records(RecordQuery::all()).await;
    store
        .push_stream(Err(StoreError::new("listen stream transport errored")))
        .await;
    assert_records(&first.recv().await.unwrap(), 1);
    assert!(engine.is_in_polling_mode());

    engine.disable_polling_mode();
    assert!(!engine.is_in_polling_mode());

    let second = engine.subscribe_to_records(RecordQuery::all()).await;
    assert_eq!(second.subscription().mode(), DeliveryMode::Streaming);
    assert_eq!(store.subscribe_calls(), 2);

    // The failed-over feed keeps polling regardless.
    assert_eq!(engine.polling_stats().active_subscriptions, 1);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polling_error_budget_closes_feed() {
    let store = Arc::new(FailoverStore::new(sample_records(1)));
    store.fail_fetch_times(5, "deadline exceeded on fetch");
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    store
        .push_stream(Err(StoreError::new("listen stream transport errored")))
        .await;

    // Five consecutive fetch failures exhaust the budget; the feed
    // ends without a terminal error event.
    assert!(feed.recv().await.is_none());
    assert_eq!(store.fetch_calls(), 5);
    assert_eq!(engine.polling_stats().active_subscriptions, 0);

    engine.shutdown().await;
}

// =============================================================================
// Terminal Error Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_terminal() {
    let store = Arc::new(FailoverStore::new(sample_records(1)));
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    store
        .push_stream(Err(StoreError::with_code(
            StoreErrorCode::PermissionDenied,
            "listener denied by security rules",
        )))
        .await;

    let event = feed.recv().await.unwrap();
    assert!(matches!(event, FeedEvent::Error(SyncError::PermissionDenied(_))));
    assert!(feed.recv().await.is_none());

    assert!(!engine.is_in_polling_mode());
    assert!(!feed.subscription().is_active());
    assert_eq!(store.subscribe_calls(), 1);

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_quota_exceeded_is_terminal() {
    let store = Arc::new(FailoverStore::new(sample_records(1)));
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    store
        .push_stream(Err(StoreError::with_code(
            StoreErrorCode::ResourceExhausted,
            "daily read quota exhausted",
        )))
        .await;

    let event = feed.recv().await.unwrap();
    assert!(matches!(event, FeedEvent::Error(SyncError::QuotaExceeded(_))));
    assert!(feed.recv().await.is_none());

    assert!(!engine.is_in_polling_mode());
    assert_eq!(engine.polling_stats().active_subscriptions, 0);

    engine.shutdown().await;
}

// =============================================================================
// Unsubscribe Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_detached_handle_unsubscribes_pending_feed() {
    let store = Arc::new(FailoverStore::new(Vec::new()));
    let engine = spawn_engine(&store);

    let mut feed = engine.subscribe_to_records(RecordQuery::all()).await;
    let handle = feed.handle();

    let mut recv = tokio_test::task::spawn(async move { feed.recv().await });
    assert_pending!(recv.poll());

    handle.unsubscribe();
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    // The forwarder observed the cancel and closed the feed channel.
    assert!(matches!(recv.poll(), Poll::Ready(None)));
    assert!(!handle.is_active());

    engine.shutdown().await;
}
