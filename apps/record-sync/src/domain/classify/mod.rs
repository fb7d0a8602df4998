//! Store Error Classification
//!
//! The record store surfaces failures as a loosely structured pair of
//! optional error code and free-text message. Recovery decisions hang
//! off a small taxonomy derived from that pair, so classification is
//! kept pure and deterministic: same error in, same class out.
//!
//! # Precedence
//!
//! Rules apply in a fixed order and the first match wins:
//!
//! 1. Transport markers in the message → [`ErrorClassification::TransportProtocolFailure`]
//! 2. Coded rules (quota, permission, availability)
//! 3. Message fallbacks ("offline", "precondition")
//! 4. Everything else → [`ErrorClassification::Unknown`]
//!
//! The transport rule is deliberately first: a wedged stream protocol
//! often reports itself with an otherwise-generic code, and it is the
//! one failure that must trigger polling failover rather than another
//! reconnect of the same broken stream.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Store Errors
// =============================================================================

/// Coded reasons the record store attaches to failures, when it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreErrorCode {
    /// Per-account quota or rate limit exhausted.
    ResourceExhausted,
    /// Caller is not allowed to read the queried records.
    PermissionDenied,
    /// Store backend is unreachable or the client is offline.
    Unavailable,
    /// A store-side precondition failed (often persistence setup).
    FailedPrecondition,
    /// Call outlived its deadline.
    DeadlineExceeded,
    /// Operation aborted mid-flight, typically by a concurrent change.
    Aborted,
    /// Store-internal failure.
    Internal,
    /// Credentials missing or expired.
    Unauthenticated,
}

impl StoreErrorCode {
    /// Stable lowercase name for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResourceExhausted => "resource-exhausted",
            Self::PermissionDenied => "permission-denied",
            Self::Unavailable => "unavailable",
            Self::FailedPrecondition => "failed-precondition",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Aborted => "aborted",
            Self::Internal => "internal",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

/// A failure reported by the record store.
///
/// The code is optional: stream-level failures in particular tend to
/// arrive as bare messages, which is why classification also inspects
/// the text.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("record store error: {message}")]
pub struct StoreError {
    /// Coded reason, when the store supplied one.
    pub code: Option<StoreErrorCode>,
    /// Free-text description from the store.
    pub message: String,
}

impl StoreError {
    /// An uncoded error carrying only a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// An error with a coded reason.
    #[must_use]
    pub fn with_code(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Message substrings that identify a broken streaming transport.
///
/// Matched case-insensitively. "channel" covers the store SDK's
/// `WebChannelConnection` failures, the signature of a stream that the
/// OS still considers connected.
const TRANSPORT_MARKERS: [&str; 4] = ["channel", "rpc", "websocket", "transport"];

/// Recovery-relevant classes of store failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Short-lived network hiccup the store absorbs on its own.
    ///
    /// Never produced by [`classify`] today; kept in the taxonomy for
    /// hosts that classify their own I/O errors into the same space.
    TransientNetwork,
    /// Quota or rate limit exhausted. Retryable after backoff.
    QuotaExceeded,
    /// Access refused. Retrying cannot help.
    PermissionDenied,
    /// The streaming transport itself is broken. Retryable, but via
    /// polling failover rather than another stream attempt.
    TransportProtocolFailure,
    /// Client or backend offline. Retryable once connectivity returns.
    Offline,
    /// Unclassified failure. Treated as retryable.
    Unknown,
}

impl ErrorClassification {
    /// Whether retrying the failed operation can ever succeed.
    ///
    /// Everything except a permission refusal is worth retrying.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::PermissionDenied)
    }

    /// Stable lowercase name for log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient-network",
            Self::QuotaExceeded => "quota-exceeded",
            Self::PermissionDenied => "permission-denied",
            Self::TransportProtocolFailure => "transport-protocol-failure",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }
}

/// Classifies a store error into its recovery-relevant class.
///
/// Pure function of the error's code and message; see the module docs
/// for the precedence rules.
#[must_use]
pub fn classify(error: &StoreError) -> ErrorClassification {
    let message = error.message.to_lowercase();

    if TRANSPORT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
    {
        return ErrorClassification::TransportProtocolFailure;
    }

    match error.code {
        Some(StoreErrorCode::ResourceExhausted) => ErrorClassification::QuotaExceeded,
        Some(StoreErrorCode::PermissionDenied) => ErrorClassification::PermissionDenied,
        Some(StoreErrorCode::Unavailable | StoreErrorCode::FailedPrecondition) => {
            ErrorClassification::Offline
        }
        _ if message.contains("offline") || message.contains("precondition") => {
            ErrorClassification::Offline
        }
        _ => ErrorClassification::Unknown,
    }
}

// =============================================================================
// Tests
// =============================================================================
