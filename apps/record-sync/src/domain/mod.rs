//! Domain Layer - Pure sync types and classification logic.
//!
//! This layer contains the core domain types for record synchronization
//! with no I/O dependencies. All types here are pure Rust with
//! serialization support where the host needs it.

/// Transaction records and query windows.
pub mod records;

/// Store error taxonomy and retryability classification.
pub mod classify;

/// Connectivity snapshots published to consumers.
pub mod connection;

/// Subscription identity, delivery mode, and feed events.
pub mod subscription;
