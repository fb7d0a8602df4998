//! Port Interfaces
//!
//! Contracts between the sync layer and the systems around it,
//! following the Hexagonal Architecture pattern.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`RecordStore`]: the backing record store (streaming subscribe,
//!   one-shot fetch, network enable/disable)
//!
//! ## Driver Ports (Inbound)
//!
//! - [`PlatformEvents`]: network reachability and app lifecycle
//!   signals pushed in by the host platform

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::classify::StoreError;
use crate::domain::records::{RecordQuery, TransactionRecord};

/// Default buffer for platform event channels.
///
/// Reachability and lifecycle events are rare; a small buffer only has
/// to absorb bursts while the monitor is mid-reconnect.
pub const PLATFORM_EVENT_BUFFER: usize = 16;

// =============================================================================
// Record Store Port
// =============================================================================

/// Result of one store call.
pub type StoreResult<T> = Result<T, StoreError>;

/// Events produced by a streaming subscription.
///
/// Each item is either a fresh full result set or a stream-level error.
/// The store keeps the stream open across errors it can retry
/// internally; dropping the receiver is the unsubscribe signal.
pub type RecordStream = mpsc::Receiver<StoreResult<Vec<TransactionRecord>>>;

/// The backing record store.
///
/// Implementations wrap whichever SDK actually holds the ledger. The
/// sync layer only assumes these four operations and the error shape
/// of [`StoreError`]; everything else (caching, auth, persistence) is
/// the adapter's business.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Opens a long-lived streaming subscription for `query`.
    ///
    /// Returns immediately; results and stream-level errors arrive on
    /// the channel. Dropping the receiver unsubscribes upstream.
    async fn subscribe(&self, query: RecordQuery) -> RecordStream;

    /// One-shot fetch of the current result set for `query`.
    async fn fetch(&self, query: RecordQuery) -> StoreResult<Vec<TransactionRecord>>;

    /// Re-enables the store's network path.
    ///
    /// Also used as a liveness probe: success means the backend is
    /// reachable end to end.
    async fn enable_network(&self) -> StoreResult<()>;

    /// Disables the store's network path.
    async fn disable_network(&self) -> StoreResult<()>;
}

// =============================================================================
// Platform Event Port
// =============================================================================

/// Network reachability change reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStateChange {
    /// Whether the platform currently reports connectivity.
    pub is_connected: bool,
}

/// App lifecycle transition reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleEvent {
    /// App moved to the foreground.
    Active,
    /// App is transitioning away from the foreground.
    Inactive,
    /// App moved to the background.
    Background,
}

/// Receiver halves of the platform event channels.
///
/// Handed to [`ConnectionMonitor::run`] and consumed by value; the
/// host keeps the matching [`PlatformSenders`].
///
/// [`ConnectionMonitor::run`]: crate::infrastructure::monitor::ConnectionMonitor::run
#[derive(Debug)]
pub struct PlatformEvents {
    /// Network reachability changes.
    pub network: mpsc::Receiver<NetworkStateChange>,
    /// App lifecycle transitions.
    pub lifecycle: mpsc::Receiver<AppLifecycleEvent>,
}

/// Sender halves of the platform event channels.
#[derive(Debug, Clone)]
pub struct PlatformSenders {
    /// Network reachability changes.
    pub network: mpsc::Sender<NetworkStateChange>,
    /// App lifecycle transitions.
    pub lifecycle: mpsc::Sender<AppLifecycleEvent>,
}

impl PlatformEvents {
    /// Creates the paired platform event channels.
    #[must_use]
    pub fn channels() -> (PlatformSenders, Self) {
        let (network_tx, network_rx) = mpsc::channel(PLATFORM_EVENT_BUFFER);
        let (lifecycle_tx, lifecycle_rx) = mpsc::channel(PLATFORM_EVENT_BUFFER);
        (
            PlatformSenders {
                network: network_tx,
                lifecycle: lifecycle_tx,
            },
            Self {
                network: network_rx,
                lifecycle: lifecycle_rx,
            },
        )
    }
}

impl PlatformSenders {
    /// Reports a reachability change, ignoring a shut-down monitor.
    pub async fn network_changed(&self, is_connected: bool) {
        let _ = self.network.send(NetworkStateChange { is_connected }).await;
    }

    /// Reports a lifecycle transition, ignoring a shut-down monitor.
    pub async fn lifecycle_changed(&self, event: AppLifecycleEvent) {
        let _ = self.lifecycle.send(event).await;
    }
}
