//! Polling Fallback Service
//!
//! Keeps live queries fresh when the store's streaming transport is
//! unusable. Each subscription gets its own timer task that fetches
//! the full result set on an interval and pushes it down the same
//! channel the stream would have used.
//!
//! # Design
//!
//! - One spawned worker per subscription, driven by a child
//!   [`CancellationToken`] so shutdown and unsubscribe share a path
//! - Consecutive fetch failures back off exponentially (capped) and a
//!   small error budget drops the subscription entirely; the channel
//!   closing is the consumer's only signal
//! - A service-wide polling-mode flag tells the orchestrator to start
//!   new subscriptions directly in polling instead of streaming
//!
//! The mode flag never resets itself. A host that has watched
//! connectivity recover (via the monitor) decides when streaming is
//! trustworthy again and calls [`PollingService::disable_polling_mode`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::RecordStore;
use crate::domain::records::RecordQuery;
use crate::domain::subscription::{FeedEvent, SubscriptionId};
use crate::infrastructure::backoff::backoff_delay;
use crate::infrastructure::config::PollingSettings;

// =============================================================================
// Types
// =============================================================================

/// Snapshot of the polling service for logs and health reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingStats {
    /// Subscriptions currently being served by a poll worker.
    pub active_subscriptions: usize,
    /// Whether new subscriptions start in polling mode.
    pub polling_mode: bool,
}

/// Handle the service keeps per running poll worker.
struct PollingSubscription {
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
}

// =============================================================================
// Polling Service
// =============================================================================

/// Interval-polling fallback for live queries.
pub struct PollingService {
    store: Arc<dyn RecordStore>,
    settings: PollingSettings,
    polling_mode: AtomicBool,
    subscriptions: Mutex<HashMap<SubscriptionId, PollingSubscription>>,
    cancel: CancellationToken,
}

impl PollingService {
    /// Creates the service. No workers run until [`Self::subscribe`].
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        settings: PollingSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            settings,
            polling_mode: AtomicBool::new(false),
            subscriptions: Mutex::new(HashMap::new()),
            cancel,
        }
    }

    /// Routes future subscriptions through polling.
    ///
    /// Existing streaming subscriptions are not touched; they fail
    /// over individually when their own streams error.
    pub fn enable_polling_mode(&self) {
        if !self.polling_mode.swap(true, Ordering::Relaxed) {
            tracing::info!("Entering polling mode");
        }
    }

    /// Routes future subscriptions through streaming again.
    pub fn disable_polling_mode(&self) {
        if self.polling_mode.swap(false, Ordering::Relaxed) {
            tracing::info!("Leaving polling mode");
        }
    }

    /// Whether new subscriptions should start in polling mode.
    #[must_use]
    pub fn is_in_polling_mode(&self) -> bool {
        self.polling_mode.load(Ordering::Relaxed)
    }

    /// Starts a poll worker for `query`, delivering on `sender`.
    ///
    /// The first fetch runs immediately; later fetches wait out
    /// `poll_interval` from the previous success. Returns the id to
    /// pass to [`Self::unsubscribe`].
    pub fn subscribe(
        self: &Arc<Self>,
        sender: mpsc::Sender<FeedEvent>,
        query: RecordQuery,
        poll_interval: Duration,
    ) -> SubscriptionId {
        let id = SubscriptionId::new();
        let cancel = self.cancel.child_token();
        let active = Arc::new(AtomicBool::new(true));

        self.subscriptions.lock().insert(
            id,
            PollingSubscription {
                cancel: cancel.clone(),
                active: Arc::clone(&active),
            },
        );

        tracing::info!(
            subscription_id = %id,
            interval_ms = poll_interval.as_millis(),
            "Starting polling subscription"
        );

        let worker = PollWorker {
            service: Arc::downgrade(self),
            store: Arc::clone(&self.store),
            id,
            query,
            sender,
            poll_interval,
            max_consecutive_errors: self.settings.max_consecutive_errors,
            max_backoff: self.settings.max_backoff,
            cancel,
            active,
        };
        tokio::spawn(worker.run());

        id
    }

    /// Stops and removes one subscription.
    ///
    /// Idempotent: returns `true` if the subscription was present,
    /// `false` if it was already gone. A fetch in flight when this is
    /// called completes but its result is discarded.
    pub fn unsubscribe(&self, id: &SubscriptionId) -> bool {
        let Some(subscription) = self.subscriptions.lock().remove(id) else {
            return false;
        };
        subscription.active.store(false, Ordering::SeqCst);
        subscription.cancel.cancel();
        tracing::debug!(subscription_id = %id, "Polling subscription removed");
        true
    }

    /// Stops every worker and clears the subscription map.
    pub fn cleanup_all(&self) {
        let drained: Vec<PollingSubscription> = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.drain().map(|(_, sub)| sub).collect()
        };
        if drained.is_empty() {
            return;
        }
        let count = drained.len();
        for subscription in drained {
            subscription.active.store(false, Ordering::SeqCst);
            subscription.cancel.cancel();
        }
        tracing::info!(count, "Cleared all polling subscriptions");
    }

    /// Number of subscriptions currently served by a worker.
    #[must_use]
    pub fn active_subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Current service snapshot.
    #[must_use]
    pub fn stats(&self) -> PollingStats {
        PollingStats {
            active_subscriptions: self.active_subscription_count(),
            polling_mode: self.is_in_polling_mode(),
        }
    }
}

// =============================================================================
// Poll Worker
// =============================================================================

/// The timer task behind one polling subscription.
struct PollWorker {
    service: Weak<PollingService>,
    store: Arc<dyn RecordStore>,
    id: SubscriptionId,
    query: RecordQuery,
    sender: mpsc::Sender<FeedEvent>,
    poll_interval: Duration,
    max_consecutive_errors: u32,
    max_backoff: Duration,
    cancel: CancellationToken,
    active: Arc<AtomicBool>,
}

impl PollWorker {
    async fn run(self) {
        let mut consecutive_errors: u32 = 0;
        let mut last_success: Option<Instant> = None;

        loop {
            if self.cancel.is_cancelled() || !self.active.load(Ordering::SeqCst) {
                break;
            }

            // A success elsewhere in this tick window means we are not
            // due yet; wait out the remainder instead of double-fetching.
            if let Some(at) = last_success {
                let since = at.elapsed();
                if since < self.poll_interval {
                    if !self.sleep_unless_cancelled(self.poll_interval - since).await {
                        break;
                    }
                    continue;
                }
            }

            match self.store.fetch(self.query.clone()).await {
                Ok(records) => {
                    if !self.active.load(Ordering::SeqCst) {
                        // Unsubscribed while the fetch was in flight.
                        break;
                    }
                    consecutive_errors = 0;
                    last_success = Some(Instant::now());
                    if self.sender.send(FeedEvent::Records(records)).await.is_err() {
                        tracing::debug!(subscription_id = %self.id, "Polling consumer dropped");
                        break;
                    }
                    if !self.sleep_unless_cancelled(self.poll_interval).await {
                        break;
                    }
                }
                Err(error) => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.max_consecutive_errors {
                        tracing::warn!(
                            subscription_id = %self.id,
                            consecutive_errors,
                            error = %error,
                            "Polling error budget exhausted, dropping subscription"
                        );
                        break;
                    }

                    let delay =
                        backoff_delay(self.poll_interval, consecutive_errors).min(self.max_backoff);
                    tracing::debug!(
                        subscription_id = %self.id,
                        consecutive_errors,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Poll failed, backing off"
                    );
                    if !self.sleep_unless_cancelled(delay).await {
                        break;
                    }
                }
            }
        }

        self.active.store(false, Ordering::SeqCst);
        if let Some(service) = self.service.upgrade() {
            service.subscriptions.lock().remove(&self.id);
        }
    }

    /// Returns `false` if cancelled before the delay elapsed.
    async fn sleep_unless_cancelled(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
