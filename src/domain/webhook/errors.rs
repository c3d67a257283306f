//! Webhook error types.
//!
//! Covers signature verification and payload decoding. Unknown local
//! references are not errors: they are logged and acknowledged.

use thiserror::Error;

/// Errors that reject an inbound webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Signature header missing or malformed, or signature mismatch.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is in the future beyond clock skew tolerance.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Test-mode event delivered to a live deployment.
    #[error("Test mode events are not accepted")]
    LivemodeMismatch,

    /// Body or object could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Persisting the event or its effects failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the processor should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Database(_))
    }
}
