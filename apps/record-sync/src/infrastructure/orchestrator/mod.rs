//! Subscription Orchestrator
//!
//! The consumer-facing subscribe path. Opens live queries against the
//! store's streaming transport and, when that transport itself breaks,
//! re-registers the same consumer channel with the polling fallback.
//! The consumer keeps its [`RecordFeed`] and [`FeedHandle`]; delivery
//! mode is swapped underneath without the handle changing identity.
//!
//! # Stream error handling
//!
//! Every stream-level error is classified:
//!
//! - Transport protocol failure → tear down the stream, record the
//!   failure with the monitor, enter polling mode, re-register this
//!   subscription with the poller
//! - Permission denied / quota exceeded → deliver one terminal
//!   [`FeedEvent::Error`] and end the feed
//! - Anything else retryable → leave the stream alone; the store
//!   retries internally

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{RecordStore, RecordStream};
use crate::domain::classify::{ErrorClassification, StoreError, classify};
use crate::domain::records::RecordQuery;
use crate::domain::subscription::{
    DeliveryMode, FeedEvent, Subscription, SubscriptionId, SyncError,
};
use crate::infrastructure::monitor::ConnectionMonitor;
use crate::infrastructure::polling::PollingService;

/// Buffer for feed event channels.
///
/// Full snapshots are coarse-grained; the buffer only has to absorb a
/// short burst while the consumer catches up.
pub const FEED_EVENT_BUFFER: usize = 64;

// =============================================================================
// Feed Types
// =============================================================================

/// How to stop the current delivery mode.
enum Teardown {
    /// Cancel the stream forwarder task.
    Streaming(CancellationToken),
    /// Unsubscribe this id from the polling service.
    Polling(SubscriptionId),
    /// Already torn down; nothing left to stop.
    Done,
}

/// State shared between a feed, its handle clones, and the forwarder.
struct FeedInner {
    subscription: Mutex<Subscription>,
    teardown: Mutex<Teardown>,
    polling: Weak<PollingService>,
}

/// Unsubscribe handle for one subscription.
///
/// Clones all point at the same subscription. The handle survives
/// failover: after a stream-to-polling switch it tears down the
/// polling worker instead of the (gone) stream forwarder.
#[derive(Clone)]
pub struct FeedHandle {
    inner: Arc<FeedInner>,
}

impl FeedHandle {
    /// The subscription's opaque id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.inner.subscription.lock().id()
    }

    /// Snapshot of the subscription, including current delivery mode.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        self.inner.subscription.lock().clone()
    }

    /// Whether the subscription still delivers events.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.subscription.lock().is_active()
    }

    /// Stops delivery for whichever mode currently serves the
    /// subscription. Idempotent; repeat calls are no-ops.
    pub fn unsubscribe(&self) {
        let previous = {
            let mut teardown = self.inner.teardown.lock();
            std::mem::replace(&mut *teardown, Teardown::Done)
        };

        match previous {
            Teardown::Streaming(cancel) => {
                cancel.cancel();
            }
            Teardown::Polling(polling_id) => {
                if let Some(polling) = self.inner.polling.upgrade() {
                    polling.unsubscribe(&polling_id);
                }
            }
            Teardown::Done => return,
        }

        let mut subscription = self.inner.subscription.lock();
        subscription.deactivate();
        tracing::info!(subscription_id = %subscription.id(), "Unsubscribed");
    }
}

/// A live query feed handed to the consumer.
///
/// Dropping the feed unsubscribes.
pub struct RecordFeed {
    handle: FeedHandle,
    events: mpsc::Receiver<FeedEvent>,
}

impl RecordFeed {
    /// Receives the next feed event.
    ///
    /// `None` means the feed has ended: unsubscribed, terminally
    /// failed, or dropped by the polling error budget.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// The subscription's opaque id.
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.handle.id()
    }

    /// Snapshot of the subscription, including current delivery mode.
    #[must_use]
    pub fn subscription(&self) -> Subscription {
        self.handle.subscription()
    }

    /// A detachable unsubscribe handle.
    #[must_use]
    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }
}

impl Drop for RecordFeed {
    fn drop(&mut self) {
        self.handle.unsubscribe();
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Opens subscriptions and owns the streaming-to-polling failover.
pub struct SubscriptionOrchestrator {
    store: Arc<dyn RecordStore>,
    monitor: Arc<ConnectionMonitor>,
    polling: Arc<PollingService>,
    poll_interval: Duration,
}

impl SubscriptionOrchestrator {
    /// Creates the orchestrator.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        monitor: Arc<ConnectionMonitor>,
        polling: Arc<PollingService>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            monitor,
            polling,
            poll_interval,
        }
    }

    /// Opens a live query for `query`.
    ///
    /// Starts in streaming mode unless the polling service is already
    /// in polling mode, in which case the stream API is bypassed
    /// entirely. Either way the consumer sees the same feed surface.
    pub async fn subscribe_to_records(&self, query: RecordQuery) -> RecordFeed {
        let id = SubscriptionId::new();
        let (tx, rx) = mpsc::channel(FEED_EVENT_BUFFER);

        if self.polling.is_in_polling_mode() {
            tracing::info!(
                subscription_id = %id,
                mode = DeliveryMode::Polling.as_str(),
                "Opening subscription"
            );
            let polling_id = self.polling.subscribe(tx, query.clone(), self.poll_interval);
            let inner = Arc::new(FeedInner {
                subscription: Mutex::new(Subscription::new(id, query, DeliveryMode::Polling)),
                teardown: Mutex::new(Teardown::Polling(polling_id)),
                polling: Arc::downgrade(&self.polling),
            });
            return RecordFeed {
                handle: FeedHandle { inner },
                events: rx,
            };
        }

        tracing::info!(
            subscription_id = %id,
            mode = DeliveryMode::Streaming.as_str(),
            "Opening subscription"
        );
        let stream = self.store.subscribe(query.clone()).await;
        let stream_cancel = CancellationToken::new();
        let inner = Arc::new(FeedInner {
            subscription: Mutex::new(Subscription::new(
                id,
                query.clone(),
                DeliveryMode::Streaming,
            )),
            teardown: Mutex::new(Teardown::Streaming(stream_cancel.clone())),
            polling: Arc::downgrade(&self.polling),
        });

        let forwarder = StreamForwarder {
            inner: Arc::clone(&inner),
            monitor: Arc::clone(&self.monitor),
            polling: Arc::clone(&self.polling),
            query,
            poll_interval: self.poll_interval,
            cancel: stream_cancel,
        };
        tokio::spawn(forwarder.run(stream, tx));

        RecordFeed {
            handle: FeedHandle { inner },
            events: rx,
        }
    }
}

// =============================================================================
// Stream Forwarder
// =============================================================================

/// Task that relays one store stream onto a consumer channel and
/// performs failover when the stream's transport breaks.
struct StreamForwarder {
    inner: Arc<FeedInner>,
    monitor: Arc<ConnectionMonitor>,
    polling: Arc<PollingService>,
    query: RecordQuery,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl StreamForwarder {
    async fn run(self, mut stream: RecordStream, tx: mpsc::Sender<FeedEvent>) {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!(subscription_id = %self.subscription_id(), "Stream forwarder cancelled");
                    return;
                }
                item = stream.recv() => match item {
                    Some(Ok(records)) => {
                        if tx.send(FeedEvent::Records(records)).await.is_err() {
                            tracing::debug!(subscription_id = %self.subscription_id(), "Feed consumer dropped");
                            self.finish();
                            return;
                        }
                    }
                    Some(Err(error)) => match classify(&error) {
                        ErrorClassification::TransportProtocolFailure => {
                            // Dropping the stream receiver on return is
                            // the upstream unsubscribe.
                            self.fail_over(&error, tx);
                            return;
                        }
                        ErrorClassification::PermissionDenied => {
                            let _ = tx
                                .send(FeedEvent::Error(SyncError::PermissionDenied(
                                    error.message.clone(),
                                )))
                                .await;
                            self.finish();
                            return;
                        }
                        ErrorClassification::QuotaExceeded => {
                            let _ = tx
                                .send(FeedEvent::Error(SyncError::QuotaExceeded(
                                    error.message.clone(),
                                )))
                                .await;
                            self.finish();
                            return;
                        }
                        classification => {
                            tracing::debug!(
                                subscription_id = %self.subscription_id(),
                                class = classification.as_str(),
                                error = %error,
                                "Stream error retried by store, keeping stream"
                            );
                        }
                    },
                    None => {
                        tracing::debug!(subscription_id = %self.subscription_id(), "Store closed the stream");
                        self.finish();
                        return;
                    }
                }
            }
        }
    }

    /// Re-registers this subscription's consumer channel with the
    /// polling service and swaps the teardown to match.
    fn fail_over(&self, error: &StoreError, tx: mpsc::Sender<FeedEvent>) {
        let mut teardown = self.inner.teardown.lock();
        if matches!(*teardown, Teardown::Done) {
            // Consumer unsubscribed while the failure was in flight.
            return;
        }

        tracing::warn!(
            subscription_id = %self.subscription_id(),
            error = %error,
            "Stream transport failed, switching subscription to polling"
        );
        self.monitor.note_stream_error(&error.message);
        self.polling.enable_polling_mode();

        let polling_id = self.polling.subscribe(tx, self.query.clone(), self.poll_interval);
        *teardown = Teardown::Polling(polling_id);
        self.inner
            .subscription
            .lock()
            .set_mode(DeliveryMode::Polling);
    }

    /// Marks the feed finished so a later unsubscribe is a no-op.
    fn finish(&self) {
        *self.inner.teardown.lock() = Teardown::Done;
        self.inner.subscription.lock().deactivate();
    }

    fn subscription_id(&self) -> SubscriptionId {
        self.inner.subscription.lock().id()
    }
}

// =============================================================================
// Tests
// =============================================================================
