//! Inbound processor events and their deduplication record.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;

use super::ProcessorEventKind;

/// A verified processor event, as delivered.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    /// Processor's unique event id (`evt_...`).
    pub id: String,
    pub event_type: String,
    pub created: Timestamp,

    /// Full `data` member, stored as-is.
    pub data: JsonValue,

    /// Webhooks the processor still has queued for this event.
    pub pending_webhooks: i64,

    /// Id of the API request that caused the event, or empty.
    pub request_id: String,

    pub livemode: bool,
}

impl InboundEvent {
    pub fn kind(&self) -> ProcessorEventKind {
        ProcessorEventKind::parse(&self.event_type)
    }

    /// The affected object (`data.object`), or `null` if absent.
    pub fn object(&self) -> &JsonValue {
        self.data.get("object").unwrap_or(&JsonValue::Null)
    }
}

/// Stored copy of a processor event, keyed by the processor's event id.
///
/// Redelivery overwrites the payload in place. `processed_at` records the
/// first time reconciliation effects were committed for this id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorEvent {
    pub event_id: String,
    pub event_type: String,
    pub created: Timestamp,
    pub data: JsonValue,
    pub pending_webhooks: i64,
    pub request_id: String,
    pub first_received_at: Timestamp,
    pub last_received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
}

impl ProcessorEvent {
    /// Record for an event id seen for the first time.
    pub fn first_delivery(event: &InboundEvent, now: Timestamp) -> Self {
        Self {
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            created: event.created,
            data: event.data.clone(),
            pending_webhooks: event.pending_webhooks,
            request_id: event.request_id.clone(),
            first_received_at: now,
            last_received_at: now,
            processed_at: None,
        }
    }

    /// Overwrite with a redelivered copy of the same event.
    pub fn redelivered(mut self, event: &InboundEvent, now: Timestamp) -> Self {
        self.event_type = event.event_type.clone();
        self.created = event.created;
        self.data = event.data.clone();
        self.pending_webhooks = event.pending_webhooks;
        self.request_id = event.request_id.clone();
        self.last_received_at = now;
        self
    }

    pub fn was_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Stamp the first successful processing. Later calls keep the original time.
    pub fn mark_processed(&mut self, now: Timestamp) {
        if self.processed_at.is_none() {
            self.processed_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound(pending: i64) -> InboundEvent {
        InboundEvent {
            id: "evt_1".to_string(),
            event_type: "invoice.created".to_string(),
            created: Timestamp::from_unix_secs(1_700_000_000).unwrap(),
            data: json!({"object": {"id": "in_1"}}),
            pending_webhooks: pending,
            request_id: String::new(),
            livemode: false,
        }
    }

    #[test]
    fn object_reads_data_object() {
        assert_eq!(inbound(1).object()["id"], "in_1");
        let mut event = inbound(1);
        event.data = json!({});
        assert!(event.object().is_null());
    }

    #[test]
    fn redelivery_overwrites_payload_and_keeps_first_receipt() {
        let first_at = Timestamp::from_unix_secs(1_700_000_100).unwrap();
        let later = first_at.add_secs(60);

        let mut record = ProcessorEvent::first_delivery(&inbound(2), first_at);
        record.mark_processed(first_at);
        let record = record.redelivered(&inbound(1), later);

        assert_eq!(record.pending_webhooks, 1);
        assert_eq!(record.first_received_at, first_at);
        assert_eq!(record.last_received_at, later);
        assert_eq!(record.processed_at, Some(first_at));
    }

    #[test]
    fn mark_processed_keeps_first_time() {
        let t0 = Timestamp::from_unix_secs(1_700_000_000).unwrap();
        let mut record = ProcessorEvent::first_delivery(&inbound(1), t0);
        assert!(!record.was_processed());
        record.mark_processed(t0);
        record.mark_processed(t0.add_secs(5));
        assert_eq!(record.processed_at, Some(t0));
    }
}
