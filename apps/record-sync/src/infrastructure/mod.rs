//! Infrastructure Layer - Supervision machinery and adapters.
//!
//! Concrete machinery behind the application ports: backoff scheduling,
//! connection supervision, the polling fallback, and subscription
//! orchestration, plus settings and telemetry wiring.

/// Exponential backoff schedule and retry helper.
pub mod backoff;

/// Connection state ownership and reconnect supervision.
pub mod monitor;

/// Interval-polling fallback for broken streams.
pub mod polling;

/// Streaming subscriptions with transparent polling failover.
pub mod orchestrator;

/// Settings with environment overrides.
pub mod config;

/// Tracing subscriber setup.
pub mod telemetry;
