//! Connection Monitor
//!
//! Sole owner of [`ConnectionState`]. Consumes platform events (network
//! reachability, app lifecycle), supervises reconnect attempts with
//! exponential backoff, and publishes every state transition on a
//! watch channel so late subscribers always see the current snapshot.
//!
//! # Design
//!
//! - At most one reconnect loop is scheduled at a time; triggers that
//!   arrive while one is pending are absorbed by it
//! - Losing connectivity cancels the pending loop; regaining it resets
//!   the attempt counter and starts a fresh, immediate attempt
//! - After `max_attempts` consecutive failures the monitor parks with
//!   a terminal `last_error` until [`ConnectionMonitor::force_reconnect`]
//!   or a fresh network-restored event revives it
//! - Foregrounding verifies stream health with an `enable_network`
//!   probe; a transport-classed probe failure flips the polling
//!   service into polling mode for future subscribers

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    AppLifecycleEvent, NetworkStateChange, PlatformEvents, RecordStore,
};
use crate::domain::classify::{ErrorClassification, classify};
use crate::domain::connection::ConnectionState;
use crate::domain::subscription::SyncError;
use crate::infrastructure::backoff::ReconnectPolicy;
use crate::infrastructure::config::MonitorSettings;
use crate::infrastructure::polling::PollingService;

// =============================================================================
// Connection Monitor
// =============================================================================

/// A scheduled reconnect loop.
struct ReconnectTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns connection state and drives recovery.
pub struct ConnectionMonitor {
    store: Arc<dyn RecordStore>,
    policy: ReconnectPolicy,
    settle_delay: Duration,
    polling: Arc<PollingService>,
    state_tx: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    reconnect: Mutex<Option<ReconnectTask>>,
    cancel: CancellationToken,
}

impl ConnectionMonitor {
    /// Creates the monitor. The event loop starts with [`Self::run`].
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        settings: &MonitorSettings,
        polling: Arc<PollingService>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::new());
        Self {
            store,
            policy: ReconnectPolicy::from_monitor_settings(settings),
            settle_delay: settings.settle_delay,
            polling,
            state_tx,
            attempts: AtomicU32::new(0),
            reconnect: Mutex::new(None),
            cancel,
        }
    }

    /// Consumes platform events until cancelled or the host drops an
    /// event channel.
    pub async fn run(self: Arc<Self>, events: PlatformEvents) {
        let PlatformEvents {
            mut network,
            mut lifecycle,
        } = events;

        tracing::info!("Connection monitor started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!("Connection monitor cancelled");
                    break;
                }
                change = network.recv() => {
                    let Some(change) = change else {
                        tracing::debug!("Network event channel closed");
                        break;
                    };
                    self.on_network_change(change);
                }
                event = lifecycle.recv() => {
                    let Some(event) = event else {
                        tracing::debug!("Lifecycle event channel closed");
                        break;
                    };
                    self.on_lifecycle_event(event).await;
                }
            }
        }
    }

    /// A new receiver for connection state changes.
    ///
    /// The receiver observes the current snapshot immediately via
    /// `borrow`; only future transitions arrive as change
    /// notifications. Updates are conflated: a slow reader sees the
    /// latest state, not every intermediate one.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The current connection snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Cycles the store's network layer off and on.
    ///
    /// All open subscriptions are briefly interrupted while the
    /// network path is down. Success resets the attempt counter and
    /// publishes a connected state; failure records the error,
    /// re-enters the reconnect loop, and propagates.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NetworkCycle`] if either half of the cycle
    /// fails.
    pub async fn force_reconnect(self: &Arc<Self>) -> Result<(), SyncError> {
        tracing::info!("Forced reconnect requested");
        self.cancel_pending_reconnect();
        self.attempts.store(0, Ordering::SeqCst);
        self.publish(ConnectionState::stream_disconnected);

        let cycle = async {
            self.store.disable_network().await?;
            tokio::time::sleep(self.settle_delay).await;
            self.store.enable_network().await
        };

        match cycle.await {
            Ok(()) => {
                self.attempts.store(0, Ordering::SeqCst);
                self.publish(ConnectionState::stream_connected);
                tracing::info!("Forced reconnect succeeded");
                Ok(())
            }
            Err(error) => {
                tracing::warn!(error = %error, "Forced reconnect failed");
                self.publish(|state| state.stream_failed(error.message.as_str()));
                self.schedule_reconnect();
                Err(SyncError::NetworkCycle(error))
            }
        }
    }

    /// Records a stream-level failure observed outside the monitor
    /// (the orchestrator reports failover this way).
    pub fn note_stream_error(&self, message: &str) {
        tracing::warn!(error = message, "Stream failure reported");
        self.publish(|state| state.stream_failed(message));
    }

    /// Stops the event loop and any pending reconnect. Safe to call
    /// multiple times.
    pub fn cleanup(&self) {
        self.cancel.cancel();
        self.cancel_pending_reconnect();
    }

    // =========================================================================
    // Event Handling
    // =========================================================================

    fn on_network_change(self: &Arc<Self>, change: NetworkStateChange) {
        if change.is_connected {
            let was_offline = !self.state().is_online();
            self.publish(ConnectionState::came_online);
            if was_offline {
                tracing::info!("Network restored, attempting reconnect");
                self.attempts.store(0, Ordering::SeqCst);
                self.schedule_reconnect();
            }
        } else {
            tracing::info!("Network lost");
            self.publish(ConnectionState::went_offline);
            self.cancel_pending_reconnect();
        }
    }

    async fn on_lifecycle_event(self: &Arc<Self>, event: AppLifecycleEvent) {
        match event {
            AppLifecycleEvent::Active => {
                if self.state().is_online() {
                    self.verify_foreground().await;
                } else {
                    tracing::debug!("Foregrounded while offline, skipping stream verification");
                }
            }
            AppLifecycleEvent::Inactive | AppLifecycleEvent::Background => {
                tracing::trace!(?event, "Lifecycle event ignored");
            }
        }
    }

    /// Probes stream health after the app returns to the foreground.
    async fn verify_foreground(self: &Arc<Self>) {
        tracing::debug!("Verifying stream health after foreground");
        match self.store.enable_network().await {
            Ok(()) => {
                self.attempts.store(0, Ordering::SeqCst);
                self.publish(ConnectionState::stream_connected);
                tracing::info!("Stream verified healthy");
            }
            Err(error) => {
                let classification = classify(&error);
                tracing::warn!(
                    class = classification.as_str(),
                    error = %error,
                    "Stream verification failed"
                );
                if classification == ErrorClassification::TransportProtocolFailure {
                    self.polling.enable_polling_mode();
                }
                self.publish(|state| state.stream_failed(error.message.as_str()));
                self.schedule_reconnect();
            }
        }
    }

    // =========================================================================
    // Reconnect Loop
    // =========================================================================

    /// Starts the reconnect loop unless one is already pending.
    fn schedule_reconnect(self: &Arc<Self>) {
        let mut slot = self.reconnect.lock();
        if let Some(task) = slot.as_ref()
            && !task.handle.is_finished()
        {
            return;
        }

        let loop_cancel = self.cancel.child_token();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(monitor.reconnect_loop(loop_cancel.clone()));
        *slot = Some(ReconnectTask {
            cancel: loop_cancel,
            handle,
        });
    }

    fn cancel_pending_reconnect(&self) {
        if let Some(task) = self.reconnect.lock().take() {
            task.cancel.cancel();
        }
    }

    /// Retries `enable_network` on the policy's schedule until it
    /// succeeds, the attempt budget is spent, or the loop is cancelled.
    async fn reconnect_loop(self: Arc<Self>, loop_cancel: CancellationToken) {
        loop {
            if loop_cancel.is_cancelled() {
                tracing::debug!("Reconnect loop cancelled");
                return;
            }

            let attempt = self.attempts.load(Ordering::SeqCst);
            tracing::info!(attempt, "Reconnecting to record store");

            match self.store.enable_network().await {
                Ok(()) => {
                    if loop_cancel.is_cancelled() {
                        // Went offline mid-attempt; the success is stale
                        // and must not overwrite the offline state.
                        return;
                    }
                    self.attempts.store(0, Ordering::SeqCst);
                    self.publish(ConnectionState::stream_connected);
                    tracing::info!("Record store connection restored");
                    return;
                }
                Err(error) => {
                    if loop_cancel.is_cancelled() {
                        // Went offline mid-attempt; the failure is stale.
                        return;
                    }
                    self.publish(|state| state.stream_failed(error.message.as_str()));

                    if self.policy.attempts_exhausted(attempt) {
                        self.enter_failed(attempt);
                        return;
                    }

                    let delay = self.policy.delay(attempt);
                    self.attempts.store(attempt + 1, Ordering::SeqCst);
                    tracing::info!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "Reconnect attempt failed, backing off"
                    );

                    tokio::select! {
                        () = loop_cancel.cancelled() => {
                            tracing::debug!("Reconnect loop cancelled during backoff");
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Parks the monitor after the attempt budget is spent.
    fn enter_failed(&self, attempts: u32) {
        let message = format!("reconnect attempts exhausted after {attempts} attempts");
        tracing::error!(attempts, "Reconnect attempts exhausted, waiting for network recovery");
        self.publish(|state| state.stream_failed(message.as_str()));
    }

    fn publish(&self, transition: impl FnOnce(&ConnectionState) -> ConnectionState) {
        self.state_tx.send_modify(|state| *state = transition(state));
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::{RecordStream, StoreResult};
    use crate::domain::records::{RecordQuery, TransactionRecord};

    struct IdleStore;

    #[async_trait]
    impl RecordStore for IdleStore {
        async fn subscribe(&self, _query: RecordQuery) -> RecordStream {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            rx
        }

        async fn fetch(&self, _query: RecordQuery) -> StoreResult<Vec<TransactionRecord>> {
            Ok(Vec::new())
        }

        async fn enable_network(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn disable_network(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    fn make_monitor() -> Arc<ConnectionMonitor> {
        let store = Arc::new(IdleStore);
        let cancel = CancellationToken::new();
        let polling = Arc::new(PollingService::new(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            crate::infrastructure::config::PollingSettings::default(),
            cancel.child_token(),
        ));
        Arc::new(ConnectionMonitor::new(
            store,
            &MonitorSettings::default(),
            polling,
            cancel,
        ))
    }

    #[tokio::test]
    async fn initial_state_is_optimistic() {
        let monitor = make_monitor();
        let state = monitor.state();
        assert!(state.is_online());
        assert!(state.is_stream_connected());
        assert!(state.last_error().is_none());
    }

    #[tokio::test]
    async fn note_stream_error_publishes_degraded_state() {
        let monitor = make_monitor();
        let mut states = monitor.subscribe();

        monitor.note_stream_error("listen stream transport errored");

        assert!(states.changed().await.is_ok());
        let state = states.borrow().clone();
        assert!(state.is_online());
        assert!(!state.is_stream_connected());
        assert_eq!(state.last_error(), Some("listen stream transport errored"));
    }

    #[tokio::test]
    async fn late_subscriber_sees_current_snapshot() {
        let monitor = make_monitor();
        monitor.note_stream_error("first failure");

        let states = monitor.subscribe();
        let seen = states.borrow().clone();
        assert_eq!(seen, monitor.state());
        assert_eq!(seen.last_error(), Some("first failure"));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let monitor = make_monitor();
        monitor.cleanup();
        monitor.cleanup();
        assert!(monitor.cancel.is_cancelled());
    }
}
