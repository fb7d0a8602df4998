//! Connection State Snapshots
//!
//! What consumers (and the UI banner) know about connectivity: whether
//! the device is online, and whether the store's streaming transport is
//! healthy on top of that. The two are distinct because the failure
//! mode this layer exists for is precisely "OS says online, stream is
//! dead".
//!
//! Fields are private and every change goes through a transition
//! method, so `is_stream_connected` can never be observed `true` while
//! `is_online` is `false`.

// =============================================================================
// Connection State
// =============================================================================

/// Immutable snapshot of connectivity as published by the monitor.
///
/// Banner mapping: `!is_online()` renders offline, `is_online()` with
/// `!is_stream_connected()` renders syncing/degraded, both `true`
/// renders normal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    is_online: bool,
    is_stream_connected: bool,
    last_error: Option<String>,
}

impl ConnectionState {
    /// Initial snapshot: optimistically online and connected.
    ///
    /// Startup assumes health so the UI does not flash an offline
    /// banner before the first real signal arrives; the first platform
    /// event or stream error corrects the picture.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            is_online: true,
            is_stream_connected: true,
            last_error: None,
        }
    }

    /// Whether the platform reports network connectivity.
    #[must_use]
    pub const fn is_online(&self) -> bool {
        self.is_online
    }

    /// Whether the store's streaming transport is believed healthy.
    ///
    /// Only ever `true` while [`Self::is_online`] is `true`.
    #[must_use]
    pub const fn is_stream_connected(&self) -> bool {
        self.is_stream_connected
    }

    /// Most recent recorded failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Platform reported loss of connectivity.
    ///
    /// Takes the stream down with it; the last recorded error is kept.
    #[must_use]
    pub fn went_offline(&self) -> Self {
        Self {
            is_online: false,
            is_stream_connected: false,
            last_error: self.last_error.clone(),
        }
    }

    /// Platform reported connectivity restored.
    ///
    /// The stream stays down until a reconnect attempt proves it.
    #[must_use]
    pub fn came_online(&self) -> Self {
        Self {
            is_online: true,
            is_stream_connected: self.is_stream_connected,
            last_error: self.last_error.clone(),
        }
    }

    /// A reconnect or foreground verification succeeded.
    ///
    /// Success implies the device is online, so both flags are set and
    /// the recorded error is cleared.
    #[must_use]
    pub const fn stream_connected(&self) -> Self {
        Self {
            is_online: true,
            is_stream_connected: true,
            last_error: None,
        }
    }

    /// The stream is being cycled deliberately (forced reconnect).
    #[must_use]
    pub fn stream_disconnected(&self) -> Self {
        Self {
            is_online: self.is_online,
            is_stream_connected: false,
            last_error: self.last_error.clone(),
        }
    }

    /// A stream-level failure was observed or a reconnect attempt failed.
    #[must_use]
    pub fn stream_failed(&self, message: impl Into<String>) -> Self {
        Self {
            is_online: self.is_online,
            is_stream_connected: false,
            last_error: Some(message.into()),
        }
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
