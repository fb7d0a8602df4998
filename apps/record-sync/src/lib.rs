#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Record Sync - Live Query Resilience Layer
//!
//! Keeps Tally's transaction ledger live against a flaky record store.
//! The store's streaming transport can wedge silently (the OS reports
//! connectivity while the stream protocol itself is broken), so this
//! layer classifies store errors, supervises reconnects with exponential
//! backoff, and transparently fails live queries over from streaming to
//! interval polling when the stream protocol breaks.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and classification logic
//!   - `records`: Transaction records and query windows
//!   - `classify`: Store error taxonomy and retryability
//!   - `connection`: Connectivity snapshots published to consumers
//!   - `subscription`: Subscription identity, delivery mode, feed events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Record store interface, platform event channels
//!   - `services`: The `SyncEngine` composition root
//!
//! - **Infrastructure**: Adapters and supervision machinery
//!   - `backoff`: Exponential delay schedule and retry helper
//!   - `monitor`: Connection state owner and reconnect supervisor
//!   - `polling`: Interval-polling fallback service
//!   - `orchestrator`: Streaming subscriptions with polling failover
//!   - `config`: Settings with environment overrides
//!   - `telemetry`: Tracing subscriber setup
//!
//! # Data Flow
//!
//! ```text
//! Record Store ──stream──► ┌──────────────┐
//!                          │ Orchestrator │──► FeedEvent ──► Consumer
//! Record Store ──fetch───► │  (failover)  │
//!                          └──────┬───────┘
//!        ┌─────────────┐          │ transport failure
//!        │   Monitor   │◄─────────┘
//!        │ (reconnect) │──► ConnectionState ──► UI banner
//!        └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure types and classification with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Supervision machinery and adapters.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::classify::{ErrorClassification, StoreError, StoreErrorCode, classify};
pub use domain::connection::ConnectionState;
pub use domain::records::{RecordQuery, TransactionRecord};
pub use domain::subscription::{
    DeliveryMode, FeedEvent, Subscription, SubscriptionId, SyncError,
};

// Ports
pub use application::ports::{
    AppLifecycleEvent, NetworkStateChange, PlatformEvents, PlatformSenders, RecordStore,
    RecordStream, StoreResult,
};

// Composition root
pub use application::services::SyncEngine;

// Backoff policy
pub use infrastructure::backoff::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MUTATION_RETRIES, ReconnectPolicy,
    backoff_delay, retry_with_backoff,
};

// Connection monitor
pub use infrastructure::monitor::ConnectionMonitor;

// Polling fallback
pub use infrastructure::polling::{PollingService, PollingStats};

// Subscription orchestrator
pub use infrastructure::orchestrator::{FeedHandle, RecordFeed, SubscriptionOrchestrator};

// Settings
pub use infrastructure::config::{MonitorSettings, PollingSettings, SyncSettings};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
