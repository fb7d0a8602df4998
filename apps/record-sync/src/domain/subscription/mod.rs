//! Subscription Identity and Feed Events
//!
//! Domain types for one logical live query: its opaque id, which
//! delivery mode currently serves it, and the events a consumer sees.
//! The delivery mode is an implementation detail that consumers may
//! inspect but never have to act on; failover swaps the mode underneath
//! a subscription without changing its identity.

use std::fmt;

use uuid::Uuid;

use crate::domain::classify::StoreError;
use crate::domain::records::{RecordQuery, TransactionRecord};

// =============================================================================
// Types
// =============================================================================

/// Opaque identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How records currently reach a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Push updates over the store's streaming transport.
    Streaming,
    /// Interval fetches through the polling fallback.
    Polling,
}

impl DeliveryMode {
    /// Stable lowercase name for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Polling => "polling",
        }
    }
}

// =============================================================================
// Subscription Record
// =============================================================================

/// Snapshot of one logical live query.
///
/// The id and query are fixed for the life of the subscription; the
/// mode changes at failover and the active flag drops on unsubscribe
/// or terminal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    query: RecordQuery,
    mode: DeliveryMode,
    active: bool,
}

impl Subscription {
    /// Creates an active subscription in the given mode.
    #[must_use]
    pub const fn new(id: SubscriptionId, query: RecordQuery, mode: DeliveryMode) -> Self {
        Self {
            id,
            query,
            mode,
            active: true,
        }
    }

    /// The subscription's opaque id.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The date window this subscription watches.
    #[must_use]
    pub const fn query(&self) -> &RecordQuery {
        &self.query
    }

    /// The delivery mode currently serving this subscription.
    #[must_use]
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Whether the subscription still delivers events.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Switches delivery mode (streaming ⇄ polling failover).
    pub const fn set_mode(&mut self, mode: DeliveryMode) {
        self.mode = mode;
    }

    /// Marks the subscription as no longer delivering.
    pub const fn deactivate(&mut self) {
        self.active = false;
    }
}

// =============================================================================
// Feed Events
// =============================================================================

/// One event on a subscription's feed.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// A fresh result set for the subscription's query.
    ///
    /// Always the full current window, never a delta, so a consumer can
    /// replace its view wholesale regardless of delivery mode.
    Records(Vec<TransactionRecord>),
    /// A terminal failure; no further events follow.
    Error(SyncError),
}

// =============================================================================
// Sync Errors
// =============================================================================

/// Failures surfaced by the sync layer itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// The store refused access to the queried records.
    #[error("record store denied access: {0}")]
    PermissionDenied(String),

    /// The store's quota or rate limit is exhausted.
    #[error("record store quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A deliberate network cycle (disable, settle, enable) failed.
    #[error("network cycle failed: {0}")]
    NetworkCycle(#[from] StoreError),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = SubscriptionId::new();
        let b = SubscriptionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn failover_changes_mode_but_not_identity() {
        let id = SubscriptionId::new();
        let mut subscription = Subscription::new(id, RecordQuery::all(), DeliveryMode::Streaming);

        subscription.set_mode(DeliveryMode::Polling);

        assert_eq!(subscription.id(), id);
        assert_eq!(subscription.mode(), DeliveryMode::Polling);
        assert!(subscription.is_active());
    }

    #[test]
    fn deactivation_is_terminal_flag_only() {
        let mut subscription = Subscription::new(
            SubscriptionId::new(),
            RecordQuery::all(),
            DeliveryMode::Streaming,
        );
        subscription.deactivate();
        assert!(!subscription.is_active());
        assert_eq!(subscription.mode(), DeliveryMode::Streaming);
    }

    #[test]
    fn network_cycle_error_wraps_store_error() {
        let store_error = StoreError::new("enable failed");
        let error = SyncError::from(store_error.clone());
        assert!(matches!(error, SyncError::NetworkCycle(inner) if inner == store_error));
    }
}
