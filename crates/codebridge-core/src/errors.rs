//! Error taxonomy for the bridge client.
//!
//! Only two variants ever escape the supervisor loop: [`BridgeError::HandshakeWriteFailed`]
//! (fatal) and [`BridgeError::AlreadyRunning`]. Dial failures are retried and
//! malformed inbound frames are dropped; both variants exist so the failure can
//! be logged with its cause.

use thiserror::Error;

/// Errors produced by the bridge client.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Opening the transport failed or timed out. Always retried.
    #[error("dial {url} failed: {reason}")]
    DialFailed {
        /// Address that was dialed.
        url: String,
        /// Underlying cause.
        reason: String,
    },

    /// Writing the auth or hello envelope failed on a freshly opened link.
    #[error("handshake write failed ({stage}): {reason}")]
    HandshakeWriteFailed {
        /// Which envelope failed (`auth` or `hello`).
        stage: &'static str,
        /// Underlying cause.
        reason: String,
    },

    /// No session is currently active.
    #[error("not connected")]
    NotConnected,

    /// The operation was abandoned because the client is shutting down.
    #[error("cancelled")]
    Cancelled,

    /// An inbound frame could not be decoded as an envelope.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A read or write on an established transport failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The session's outbound queue is saturated.
    #[error("outbound queue full")]
    QueueFull,

    /// An envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// `run` was called while another `run` is active on the same client.
    #[error("supervisor already running")]
    AlreadyRunning,
}

impl BridgeError {
    /// Whether the supervisor retries after this error instead of returning it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DialFailed { .. } | Self::Transport(_))
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
