//! Stripe webhook signature verification.
//!
//! # Security
//!
//! - HMAC-SHA256 over `"{timestamp}.{payload}"` with constant-time comparison
//! - Replay window of 5 minutes, with 60 seconds of tolerated clock skew
//! - The signing secret is held as a `SecretString`

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::Timestamp;
use crate::domain::webhook::{InboundEvent, WebhookError};
use crate::ports::WebhookVerifier;

use super::webhook_types::{SignatureHeader, StripeWebhookEvent};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Verifies `Stripe-Signature` headers with the endpoint's signing secret.
pub struct StripeWebhookVerifier {
    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Reject test-mode events. Enabled on live deployments.
    require_livemode: bool,
}

impl StripeWebhookVerifier {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: SecretString::new(webhook_secret.into()),
            require_livemode: false,
        }
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    /// Verify against an explicit clock.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: Timestamp,
    ) -> Result<InboundEvent, WebhookError> {
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Malformed Stripe-Signature header");
            WebhookError::InvalidSignature
        })?;

        self.check_timestamp(header.timestamp, now)?;
        self.check_signature(payload, &header)?;

        let event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Signed webhook body could not be parsed");
            WebhookError::ParseError(e.to_string())
        })?;

        if self.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "Test mode event rejected");
            return Err(WebhookError::LivemodeMismatch);
        }

        let created = Timestamp::from_unix_secs(event.created)
            .ok_or_else(|| WebhookError::ParseError(format!("invalid created: {}", event.created)))?;
        let request_id = event.request_id();

        Ok(InboundEvent {
            id: event.id,
            event_type: event.event_type,
            created,
            data: event.data,
            pending_webhooks: event.pending_webhooks,
            request_id,
            livemode: event.livemode,
        })
    }

    fn check_timestamp(&self, signed_at: i64, now: Timestamp) -> Result<(), WebhookError> {
        let now = now.as_unix_secs();
        let Some(age) = now.checked_sub(signed_at) else {
            tracing::warn!(event_timestamp = signed_at, "Webhook timestamp out of range");
            return Err(WebhookError::InvalidTimestamp);
        };

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = signed_at,
                current_time = now,
                age_secs = age,
                "Webhook event too old - possible replay attack"
            );
            return Err(WebhookError::TimestampOutOfRange);
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = signed_at,
                current_time = now,
                "Webhook event from future - clock skew or manipulation"
            );
            return Err(WebhookError::InvalidTimestamp);
        }

        Ok(())
    }

    fn check_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let matched = header
            .v1_signatures
            .iter()
            .any(|provided| bool::from(expected.as_slice().ct_eq(provided.as_slice())));

        if !matched {
            tracing::warn!("Invalid webhook signature");
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }
}

impl WebhookVerifier for StripeWebhookVerifier {
    fn verify(&self, payload: &[u8], signature: &str) -> Result<InboundEvent, WebhookError> {
        self.verify_at(payload, signature, Timestamp::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::ProcessorEventKind;

    const SECRET: &str = "whsec_test_secret";
    const NOW: i64 = 1_700_000_000;

    fn now() -> Timestamp {
        Timestamp::from_unix_secs(NOW).unwrap()
    }

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn payload(livemode: bool) -> String {
        format!(
            r#"{{"id":"evt_1","type":"customer.subscription.deleted","created":{},"livemode":{},"pending_webhooks":1,"request":{{"id":"req_9"}},"data":{{"object":{{"id":"sub_1","status":"canceled"}}}}}}"#,
            NOW - 5,
            livemode
        )
    }

    #[test]
    fn verifies_and_converts_event() {
        let body = payload(false);
        let event = StripeWebhookVerifier::new(SECRET)
            .verify_at(body.as_bytes(), &sign(SECRET, NOW, &body), now())
            .unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.kind(), ProcessorEventKind::SubscriptionDeleted);
        assert_eq!(event.request_id, "req_9");
        assert_eq!(event.pending_webhooks, 1);
        assert_eq!(event.object()["id"], "sub_1");
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = payload(false);
        let result = StripeWebhookVerifier::new(SECRET).verify_at(
            body.as_bytes(),
            &sign("whsec_other", NOW, &body),
            now(),
        );
        assert_eq!(result.unwrap_err(), WebhookError::InvalidSignature);
    }

    #[test]
    fn rejects_tampered_body() {
        let body = payload(false);
        let signature = sign(SECRET, NOW, &body);
        let tampered = body.replace("sub_1", "sub_2");

        let result =
            StripeWebhookVerifier::new(SECRET).verify_at(tampered.as_bytes(), &signature, now());
        assert_eq!(result.unwrap_err(), WebhookError::InvalidSignature);
    }

    #[test]
    fn accepts_any_matching_v1_during_rotation() {
        let body = payload(false);
        let valid = sign(SECRET, NOW, &body);
        let v1 = valid.split_once(",v1=").unwrap().1;
        let header = format!("t={},v1={},v1={}", NOW, "00".repeat(32), v1);

        assert!(StripeWebhookVerifier::new(SECRET)
            .verify_at(body.as_bytes(), &header, now())
            .is_ok());
    }

    #[test]
    fn rejects_malformed_header() {
        let body = payload(false);
        let result = StripeWebhookVerifier::new(SECRET).verify_at(body.as_bytes(), "garbage", now());
        assert_eq!(result.unwrap_err(), WebhookError::InvalidSignature);
    }

    #[test]
    fn rejects_expired_timestamp() {
        let body = payload(false);
        let signed_at = NOW - MAX_TIMESTAMP_AGE_SECS - 1;
        let result = StripeWebhookVerifier::new(SECRET).verify_at(
            body.as_bytes(),
            &sign(SECRET, signed_at, &body),
            now(),
        );
        assert_eq!(result.unwrap_err(), WebhookError::TimestampOutOfRange);
    }

    #[test]
    fn future_timestamp_within_tolerance_is_accepted() {
        let body = payload(false);
        let verifier = StripeWebhookVerifier::new(SECRET);

        assert!(verifier
            .verify_at(body.as_bytes(), &sign(SECRET, NOW + 30, &body), now())
            .is_ok());
        assert_eq!(
            verifier
                .verify_at(body.as_bytes(), &sign(SECRET, NOW + 120, &body), now())
                .unwrap_err(),
            WebhookError::InvalidTimestamp
        );
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        let body = payload(false);
        let verifier = StripeWebhookVerifier::new(SECRET);

        let oldest = format!("t={},v1={}", i64::MIN, "00".repeat(32));
        assert_eq!(
            verifier.verify_at(body.as_bytes(), &oldest, now()).unwrap_err(),
            WebhookError::InvalidTimestamp
        );

        let newest = format!("t={},v1={}", i64::MAX, "00".repeat(32));
        assert_eq!(
            verifier.verify_at(body.as_bytes(), &newest, now()).unwrap_err(),
            WebhookError::InvalidTimestamp
        );
    }

    #[test]
    fn live_deployment_rejects_test_events() {
        let verifier = StripeWebhookVerifier::new(SECRET).with_require_livemode(true);

        let test_body = payload(false);
        assert_eq!(
            verifier
                .verify_at(test_body.as_bytes(), &sign(SECRET, NOW, &test_body), now())
                .unwrap_err(),
            WebhookError::LivemodeMismatch
        );

        let live_body = payload(true);
        assert!(verifier
            .verify_at(live_body.as_bytes(), &sign(SECRET, NOW, &live_body), now())
            .is_ok());
    }

    #[test]
    fn signed_garbage_is_a_parse_error() {
        let body = "not json";
        let result = StripeWebhookVerifier::new(SECRET).verify_at(
            body.as_bytes(),
            &sign(SECRET, NOW, body),
            now(),
        );
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }
}
