//! Closed set of processor event kinds the reconciler understands.

use serde_json::Value as JsonValue;

use super::{InvoiceSnapshot, SubscriptionSnapshot, WebhookError};

/// Processor event types with reconciliation side effects.
///
/// Everything else is recorded for deduplication and otherwise ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEventKind {
    SubscriptionDeleted,
    SubscriptionUpdated,
    InvoiceCreated,
    InvoiceUpdated,
    /// Recorded only. Carries the raw type string.
    Ignored(String),
}

impl ProcessorEventKind {
    /// Parse a processor event type string.
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "invoice.created" => Self::InvoiceCreated,
            "invoice.updated" => Self::InvoiceUpdated,
            other => Self::Ignored(other.to_string()),
        }
    }

    /// The processor event type string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::InvoiceCreated => "invoice.created",
            Self::InvoiceUpdated => "invoice.updated",
            Self::Ignored(raw) => raw,
        }
    }

    /// Decode `data.object` into the payload this kind carries.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::ParseError` if the object does not have the
    /// shape the kind requires.
    pub fn decode(&self, object: &JsonValue) -> Result<ProcessorEventPayload, WebhookError> {
        let payload = match self {
            Self::SubscriptionDeleted => {
                ProcessorEventPayload::SubscriptionDeleted(decode_object(self, object)?)
            }
            Self::SubscriptionUpdated => {
                ProcessorEventPayload::SubscriptionUpdated(decode_object(self, object)?)
            }
            Self::InvoiceCreated | Self::InvoiceUpdated => {
                ProcessorEventPayload::Invoice(decode_object(self, object)?)
            }
            Self::Ignored(raw) => ProcessorEventPayload::Ignored(raw.clone()),
        };
        Ok(payload)
    }
}

fn decode_object<T: serde::de::DeserializeOwned>(
    kind: &ProcessorEventKind,
    object: &JsonValue,
) -> Result<T, WebhookError> {
    serde_json::from_value(object.clone())
        .map_err(|e| WebhookError::ParseError(format!("invalid {} object: {}", kind.as_str(), e)))
}

/// Typed payload of a processor event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEventPayload {
    SubscriptionDeleted(SubscriptionSnapshot),
    SubscriptionUpdated(SubscriptionSnapshot),
    /// `invoice.created` and `invoice.updated` are handled identically.
    Invoice(InvoiceSnapshot),
    Ignored(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_event_types() {
        assert_eq!(
            ProcessorEventKind::parse("customer.subscription.deleted"),
            ProcessorEventKind::SubscriptionDeleted
        );
        assert_eq!(
            ProcessorEventKind::parse("invoice.updated"),
            ProcessorEventKind::InvoiceUpdated
        );
    }

    #[test]
    fn unknown_types_are_ignored_with_raw_name() {
        let kind = ProcessorEventKind::parse("charge.succeeded");
        assert_eq!(kind, ProcessorEventKind::Ignored("charge.succeeded".to_string()));
        assert_eq!(kind.as_str(), "charge.succeeded");
    }

    #[test]
    fn as_str_round_trips_known_kinds() {
        for kind in [
            ProcessorEventKind::SubscriptionDeleted,
            ProcessorEventKind::SubscriptionUpdated,
            ProcessorEventKind::InvoiceCreated,
            ProcessorEventKind::InvoiceUpdated,
        ] {
            assert_eq!(ProcessorEventKind::parse(kind.as_str()), kind);
        }
    }

    #[test]
    fn decode_subscription_object() {
        let payload = ProcessorEventKind::SubscriptionUpdated
            .decode(&json!({"id": "sub_1", "status": "past_due"}))
            .unwrap();
        match payload {
            ProcessorEventPayload::SubscriptionUpdated(snapshot) => {
                assert_eq!(snapshot.id, "sub_1");
                assert!(!snapshot.cancel_at_period_end);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_malformed_object() {
        let result = ProcessorEventKind::InvoiceCreated.decode(&json!({"amount_due": 5}));
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn decode_ignored_accepts_anything() {
        let payload = ProcessorEventKind::parse("ping").decode(&json!(null)).unwrap();
        assert_eq!(payload, ProcessorEventPayload::Ignored("ping".to_string()));
    }
}
