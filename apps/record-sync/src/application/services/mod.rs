//! Application Services
//!
//! The composition root. [`SyncEngine`] wires the record store port to
//! the connection monitor, the polling fallback, and the subscription
//! orchestrator, and exposes the whole resilience layer behind one
//! facade.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PlatformEvents, RecordStore};
use crate::domain::connection::ConnectionState;
use crate::domain::records::RecordQuery;
use crate::domain::subscription::SyncError;
use crate::infrastructure::config::SyncSettings;
use crate::infrastructure::monitor::ConnectionMonitor;
use crate::infrastructure::orchestrator::{RecordFeed, SubscriptionOrchestrator};
use crate::infrastructure::polling::{PollingService, PollingStats};

// =============================================================================
// Sync Engine
// =============================================================================

/// Facade over the connection resilience layer.
///
/// Owns the background monitor task and the polling service, and hands
/// out [`RecordFeed`]s whose delivery mode fails over transparently.
/// Construction spawns the monitor, so the engine must be created from
/// within a Tokio runtime.
pub struct SyncEngine {
    monitor: Arc<ConnectionMonitor>,
    polling: Arc<PollingService>,
    orchestrator: SubscriptionOrchestrator,
    cancel: CancellationToken,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Builds the engine and starts the connection monitor on
    /// `events`.
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordStore>,
        settings: SyncSettings,
        events: PlatformEvents,
    ) -> Self {
        let cancel = CancellationToken::new();
        let polling = Arc::new(PollingService::new(
            Arc::clone(&store),
            settings.polling.clone(),
            cancel.child_token(),
        ));
        let monitor = Arc::new(ConnectionMonitor::new(
            Arc::clone(&store),
            &settings.monitor,
            Arc::clone(&polling),
            cancel.child_token(),
        ));
        let monitor_task = tokio::spawn(Arc::clone(&monitor).run(events));
        let orchestrator = SubscriptionOrchestrator::new(
            store,
            Arc::clone(&monitor),
            Arc::clone(&polling),
            settings.polling.poll_interval,
        );

        tracing::info!("Sync engine started");
        Self {
            monitor,
            polling,
            orchestrator,
            cancel,
            monitor_task: Mutex::new(Some(monitor_task)),
        }
    }

    /// Opens a live query feed for `query`.
    pub async fn subscribe_to_records(&self, query: RecordQuery) -> RecordFeed {
        self.orchestrator.subscribe_to_records(query).await
    }

    /// Watch channel of connection state snapshots.
    ///
    /// Intermediate states may be conflated; `borrow` always yields
    /// the latest.
    #[must_use]
    pub fn connection_states(&self) -> watch::Receiver<ConnectionState> {
        self.monitor.subscribe()
    }

    /// Current connection state snapshot.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Forces a full network cycle on the store transport.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NetworkCycle`] when the cycle fails; the
    /// monitor keeps retrying in the background regardless.
    pub async fn force_reconnect(&self) -> Result<(), SyncError> {
        self.monitor.force_reconnect().await
    }

    /// Whether new subscriptions bypass the stream API.
    #[must_use]
    pub fn is_in_polling_mode(&self) -> bool {
        self.polling.is_in_polling_mode()
    }

    /// Routes new subscriptions back to the stream API.
    ///
    /// Existing polling subscriptions keep polling; only subsequent
    /// subscribes take the streaming path again.
    pub fn disable_polling_mode(&self) {
        self.polling.disable_polling_mode();
    }

    /// Snapshot of polling fallback activity.
    #[must_use]
    pub fn polling_stats(&self) -> PollingStats {
        self.polling.stats()
    }

    /// Stops the monitor and all polling workers. Idempotent.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.polling.cleanup_all();
        self.monitor.cleanup();

        let task = self.monitor_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        tracing::info!("Sync engine stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
