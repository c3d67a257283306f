//! Webhook verifier port.
//!
//! Authenticates a raw webhook delivery and parses it into an `InboundEvent`.

use crate::domain::webhook::{InboundEvent, WebhookError};

pub trait WebhookVerifier: Send + Sync {
    /// Verify `signature` over `payload` and parse the event.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`, `TimestampOutOfRange`, `InvalidTimestamp` when
    ///   authentication fails
    /// - `LivemodeMismatch` for test events on a live deployment
    /// - `ParseError` for malformed bodies
    fn verify(&self, payload: &[u8], signature: &str) -> Result<InboundEvent, WebhookError>;
}
