//! Configuration Module
//!
//! Settings for the sync layer, loaded from environment variables with
//! parse-or-default fallbacks.

mod settings;

pub use settings::{MonitorSettings, PollingSettings, SyncSettings};
