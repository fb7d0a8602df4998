//! Sync Layer Settings
//!
//! Tuning knobs for the connection monitor and the polling fallback.
//! Every knob has a sensible default; environment variables (prefix
//! `RECORD_SYNC_`) override individually and fall back to the default
//! when missing or unparseable.

use std::time::Duration;

use crate::infrastructure::backoff::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RECONNECT_ATTEMPTS};

/// Connection monitor settings.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Base reconnect delay; later attempts double it.
    pub base_delay: Duration,
    /// Reconnect attempts before parking in a failed state.
    pub max_attempts: u32,
    /// Pause between network disable and enable in a forced reconnect.
    pub settle_delay: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Polling fallback settings.
#[derive(Debug, Clone)]
pub struct PollingSettings {
    /// Interval between successful polls.
    pub poll_interval: Duration,
    /// Consecutive failures before a polling subscription is dropped.
    pub max_consecutive_errors: u32,
    /// Upper bound on the backoff between failed polls.
    pub max_backoff: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            max_consecutive_errors: 5,
            max_backoff: Duration::from_millis(30_000),
        }
    }
}

/// Complete sync layer configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    /// Connection monitor settings.
    pub monitor: MonitorSettings,
    /// Polling fallback settings.
    pub polling: PollingSettings,
}

impl SyncSettings {
    /// Creates configuration from environment variables.
    ///
    /// Unset or unparseable variables silently keep their defaults;
    /// there are no required variables.
    #[must_use]
    pub fn from_env() -> Self {
        let monitor = MonitorSettings {
            base_delay: parse_env_duration_millis(
                "RECORD_SYNC_BASE_DELAY_MS",
                MonitorSettings::default().base_delay,
            ),
            max_attempts: parse_env_u32(
                "RECORD_SYNC_MAX_RECONNECT_ATTEMPTS",
                MonitorSettings::default().max_attempts,
            ),
            settle_delay: parse_env_duration_millis(
                "RECORD_SYNC_SETTLE_DELAY_MS",
                MonitorSettings::default().settle_delay,
            ),
        };

        let polling = PollingSettings {
            poll_interval: parse_env_duration_millis(
                "RECORD_SYNC_POLL_INTERVAL_MS",
                PollingSettings::default().poll_interval,
            ),
            max_consecutive_errors: parse_env_u32(
                "RECORD_SYNC_MAX_CONSECUTIVE_ERRORS",
                PollingSettings::default().max_consecutive_errors,
            ),
            max_backoff: parse_env_duration_millis(
                "RECORD_SYNC_MAX_POLL_BACKOFF_MS",
                PollingSettings::default().max_backoff,
            ),
        };

        Self { monitor, polling }
    }
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
