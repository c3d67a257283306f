//! ReconcileWebhookHandler - Command handler for processor webhooks.
//!
//! Mirrors processor-side subscription and invoice changes into local state.
//! Every write caused by one event is committed in a single transaction, and
//! redelivering the same event overwrites rather than duplicates.

use std::sync::Arc;

use crate::domain::foundation::{
    DomainError, ErrorCode, EventEnvelope, EventId, InvoiceId, SerializableDomainEvent,
    SubscriptionId, Timestamp,
};
use crate::domain::invoice::{upsert_items, Invoice, InvoiceRecorded};
use crate::domain::subscription::{
    CancellationSource, ReconcileOutcome, Subscription, SubscriptionCanceled,
    SubscriptionPastDue, SubscriptionReactivated, SubscriptionStatus,
};
use crate::domain::webhook::{
    InboundEvent, InvoiceSnapshot, ProcessorEvent, ProcessorEventPayload, SubscriptionSnapshot,
    WebhookError,
};
use crate::ports::{
    EventPublisher, InvoiceChanges, ReconciliationChanges, ReconciliationStore,
    SubscriptionRepository, WebhookVerifier,
};

use super::publish_committed;

/// Attempts at applying one event when a concurrent writer wins the version check.
const MAX_APPLY_ATTEMPTS: usize = 2;

/// Command to handle a raw webhook delivery.
#[derive(Debug, Clone)]
pub struct ReconcileWebhookCommand {
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header value.
    pub signature: String,
}

/// What reconciling an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Subscription moved to `canceled`.
    Canceled { subscription_id: SubscriptionId },
    /// Deletion for a subscription that was already canceled.
    AlreadyCanceled { subscription_id: SubscriptionId },
    /// Periods refreshed; status moved, stayed or was refused.
    Reconciled {
        subscription_id: SubscriptionId,
        outcome: ReconcileOutcome,
    },
    InvoiceRecorded { invoice_id: InvoiceId },
    /// The event references nothing known locally. Recorded only.
    UnknownReference,
    /// Event type without reconciliation effects. Recorded only.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct ReconcileWebhookResult {
    pub event_id: String,
    pub outcome: WebhookOutcome,
    /// True if this event id had already been processed before.
    pub redelivery: bool,
}

/// Writes and events planned for one event, before they are committed.
struct Plan {
    changes: ReconciliationChanges,
    outcome: WebhookOutcome,
    events: Vec<EventEnvelope>,
}

/// Handler for processor webhooks.
pub struct ReconcileWebhookHandler {
    verifier: Arc<dyn WebhookVerifier>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    store: Arc<dyn ReconciliationStore>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl ReconcileWebhookHandler {
    pub fn new(
        verifier: Arc<dyn WebhookVerifier>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        store: Arc<dyn ReconciliationStore>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            verifier,
            subscriptions,
            store,
            event_publisher,
        }
    }

    /// Verify the delivery, then ingest it.
    pub async fn handle(
        &self,
        cmd: ReconcileWebhookCommand,
    ) -> Result<ReconcileWebhookResult, WebhookError> {
        let event = self.verifier.verify(&cmd.payload, &cmd.signature)?;
        self.ingest(event).await
    }

    /// Reconcile an already verified event.
    pub async fn ingest(&self, event: InboundEvent) -> Result<ReconcileWebhookResult, WebhookError> {
        // 1. Decode the payload for its kind
        let kind = event.kind();
        let payload = kind.decode(event.object())?;

        // 2. Upsert the event record
        let previous = self.store.find_event(&event.id).await.map_err(database)?;
        let redelivery = previous.as_ref().map_or(false, ProcessorEvent::was_processed);
        let now = Timestamp::now();
        let mut record = match previous {
            Some(previous) => previous.redelivered(&event, now),
            None => ProcessorEvent::first_delivery(&event, now),
        };
        record.mark_processed(now);

        tracing::debug!(
            event_id = %event.id,
            event_type = %kind.as_str(),
            redelivery,
            "processing webhook event"
        );

        // 3. Plan and commit, re-reading once if a concurrent writer got in first
        let mut attempt = 1;
        let plan = loop {
            let plan = self.plan(&payload, record.clone(), now).await?;
            match self.store.apply(plan.changes.clone()).await {
                Ok(()) => break plan,
                Err(e) if e.code == ErrorCode::ConcurrentModification && attempt < MAX_APPLY_ATTEMPTS => {
                    tracing::warn!(event_id = %event.id, error = %e, "concurrent update, retrying webhook event");
                    attempt += 1;
                }
                Err(e) => return Err(database(e)),
            }
        };

        // 4. Publish events once per event id
        if redelivery {
            tracing::debug!(event_id = %event.id, "redelivered event, domain events already published");
        } else {
            publish_committed(&self.event_publisher, plan.events).await;
        }

        Ok(ReconcileWebhookResult {
            event_id: event.id,
            outcome: plan.outcome,
            redelivery,
        })
    }

    async fn plan(
        &self,
        payload: &ProcessorEventPayload,
        record: ProcessorEvent,
        now: Timestamp,
    ) -> Result<Plan, WebhookError> {
        match payload {
            ProcessorEventPayload::SubscriptionDeleted(snapshot) => {
                self.plan_deletion(snapshot, record, now).await
            }
            ProcessorEventPayload::SubscriptionUpdated(snapshot) => {
                self.plan_update(snapshot, record, now).await
            }
            ProcessorEventPayload::Invoice(snapshot) => self.plan_invoice(snapshot, record, now).await,
            ProcessorEventPayload::Ignored(event_type) => {
                tracing::debug!(event_type = %event_type, "event type has no reconciliation effects");
                Ok(record_only(record, WebhookOutcome::Ignored))
            }
        }
    }

    async fn plan_deletion(
        &self,
        snapshot: &SubscriptionSnapshot,
        record: ProcessorEvent,
        now: Timestamp,
    ) -> Result<Plan, WebhookError> {
        let Some(mut subscription) = self.find_subscription(&snapshot.id, &record).await? else {
            return Ok(record_only(record, WebhookOutcome::UnknownReference));
        };

        let previous_status = subscription.status;
        if previous_status == SubscriptionStatus::Canceled {
            tracing::debug!(subscription_id = %subscription.id, "subscription already canceled");
            return Ok(record_only(
                record,
                WebhookOutcome::AlreadyCanceled {
                    subscription_id: subscription.id,
                },
            ));
        }

        if let Err(e) = subscription.cancel_by_webhook(now) {
            tracing::warn!(subscription_id = %subscription.id, error = %e, "deletion not applicable");
            return Ok(record_only(
                record,
                WebhookOutcome::Reconciled {
                    subscription_id: subscription.id,
                    outcome: ReconcileOutcome::Rejected {
                        from: previous_status,
                        to: SubscriptionStatus::Canceled,
                    },
                },
            ));
        }

        tracing::info!(subscription_id = %subscription.id, from = %previous_status, "subscription canceled by processor");
        let event = SubscriptionCanceled {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            facility_id: subscription.facility_id,
            previous_status,
            source: CancellationSource::Processor,
            canceled_at: now,
        }
        .to_envelope()
        .map_err(database)?;

        Ok(Plan {
            outcome: WebhookOutcome::Canceled {
                subscription_id: subscription.id,
            },
            events: vec![with_cause(event, &record)],
            changes: ReconciliationChanges {
                event: record,
                subscription: Some(subscription),
                invoice: None,
            },
        })
    }

    async fn plan_update(
        &self,
        snapshot: &SubscriptionSnapshot,
        record: ProcessorEvent,
        now: Timestamp,
    ) -> Result<Plan, WebhookError> {
        let Some(mut subscription) = self.find_subscription(&snapshot.id, &record).await? else {
            return Ok(record_only(record, WebhookOutcome::UnknownReference));
        };

        let outcome = subscription.reconcile(
            snapshot.target_status(),
            snapshot.period_start(),
            snapshot.period_end(),
            now,
        );

        let mut events = Vec::new();
        match outcome {
            ReconcileOutcome::Unchanged => {}
            ReconcileOutcome::Transitioned { from, to } => {
                tracing::info!(subscription_id = %subscription.id, %from, %to, "subscription status reconciled");
                let event = match to {
                    SubscriptionStatus::Active => SubscriptionReactivated {
                        event_id: EventId::new(),
                        subscription_id: subscription.id,
                        facility_id: subscription.facility_id,
                        previous_status: from,
                        reactivated_at: now,
                    }
                    .to_envelope(),
                    SubscriptionStatus::PastDue => SubscriptionPastDue {
                        event_id: EventId::new(),
                        subscription_id: subscription.id,
                        facility_id: subscription.facility_id,
                        occurred_at: now,
                    }
                    .to_envelope(),
                    _ => SubscriptionCanceled {
                        event_id: EventId::new(),
                        subscription_id: subscription.id,
                        facility_id: subscription.facility_id,
                        previous_status: from,
                        source: CancellationSource::Processor,
                        canceled_at: now,
                    }
                    .to_envelope(),
                }
                .map_err(database)?;
                events.push(with_cause(event, &record));
            }
            ReconcileOutcome::Rejected { from, to } => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    %from,
                    %to,
                    "processor status has no transition, keeping local status"
                );
            }
        }

        Ok(Plan {
            outcome: WebhookOutcome::Reconciled {
                subscription_id: subscription.id,
                outcome,
            },
            events,
            changes: ReconciliationChanges {
                event: record,
                subscription: Some(subscription),
                invoice: None,
            },
        })
    }

    async fn plan_invoice(
        &self,
        snapshot: &InvoiceSnapshot,
        record: ProcessorEvent,
        now: Timestamp,
    ) -> Result<Plan, WebhookError> {
        let existing = self
            .store
            .find_invoice(&snapshot.id)
            .await
            .map_err(database)?;

        let (mut invoice, items) = match existing {
            Some(found) => found,
            None => {
                let parent = match snapshot.subscription.as_deref() {
                    Some(processor_id) => self.find_subscription(processor_id, &record).await?,
                    None => {
                        tracing::warn!(
                            event_id = %record.event_id,
                            invoice = %snapshot.id,
                            "invoice without subscription, ignoring"
                        );
                        None
                    }
                };
                let Some(parent) = parent else {
                    return Ok(record_only(record, WebhookOutcome::UnknownReference));
                };
                (Invoice::stub(parent.id, snapshot.id.clone(), now), Vec::new())
            }
        };

        invoice.apply_snapshot(snapshot, now);
        let items = upsert_items(invoice.id, items, &snapshot.lines.data);

        let event = InvoiceRecorded::from_invoice(&invoice)
            .to_envelope()
            .map_err(database)?;

        Ok(Plan {
            outcome: WebhookOutcome::InvoiceRecorded {
                invoice_id: invoice.id,
            },
            events: vec![with_cause(event, &record)],
            changes: ReconciliationChanges {
                event: record,
                subscription: None,
                invoice: Some(InvoiceChanges { invoice, items }),
            },
        })
    }

    /// Local subscription for a processor id. Unknown ids are logged, not errors.
    async fn find_subscription(
        &self,
        processor_subscription_id: &str,
        record: &ProcessorEvent,
    ) -> Result<Option<Subscription>, WebhookError> {
        let found = self
            .subscriptions
            .find_by_processor_id(processor_subscription_id)
            .await
            .map_err(database)?;
        if found.is_none() {
            tracing::warn!(
                event_id = %record.event_id,
                processor_subscription_id,
                "webhook references unknown subscription"
            );
        }
        Ok(found)
    }
}

fn record_only(record: ProcessorEvent, outcome: WebhookOutcome) -> Plan {
    Plan {
        changes: ReconciliationChanges::record_only(record),
        outcome,
        events: Vec::new(),
    }
}

fn with_cause(event: EventEnvelope, record: &ProcessorEvent) -> EventEnvelope {
    event.with_causation_id(record.event_id.clone())
}

fn database(err: DomainError) -> WebhookError {
    WebhookError::Database(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use rust_decimal::Decimal;
    use serde_json::{json, Value as JsonValue};

    struct AcceptAll;

    impl WebhookVerifier for AcceptAll {
        fn verify(&self, payload: &[u8], _signature: &str) -> Result<InboundEvent, WebhookError> {
            let value: JsonValue = serde_json::from_slice(payload)
                .map_err(|e| WebhookError::ParseError(e.to_string()))?;
            Ok(inbound_from(&value))
        }
    }

    struct RejectAll;

    impl WebhookVerifier for RejectAll {
        fn verify(&self, _payload: &[u8], _signature: &str) -> Result<InboundEvent, WebhookError> {
            Err(WebhookError::InvalidSignature)
        }
    }

    fn inbound_from(value: &JsonValue) -> InboundEvent {
        InboundEvent {
            id: value["id"].as_str().unwrap_or_default().to_string(),
            event_type: value["type"].as_str().unwrap_or_default().to_string(),
            created: Timestamp::now(),
            data: value["data"].clone(),
            pending_webhooks: 1,
            request_id: String::new(),
            livemode: false,
        }
    }

    fn event(id: &str, event_type: &str, object: JsonValue) -> InboundEvent {
        inbound_from(&json!({"id": id, "type": event_type, "data": {"object": object}}))
    }

    fn handler(fx: &Fixture) -> ReconcileWebhookHandler {
        ReconcileWebhookHandler::new(Arc::new(AcceptAll), fx.repository(), fx.store(), fx.publisher())
    }

    fn subscription_object(id: &str, status: &str, cancel_at_period_end: bool) -> JsonValue {
        json!({
            "id": id,
            "object": "subscription",
            "status": status,
            "cancel_at_period_end": cancel_at_period_end,
            "current_period_start": 1_700_000_000,
            "current_period_end": 1_702_592_000,
        })
    }

    fn invoice_object(subscription: &str, amount_due: i64, tax: JsonValue) -> JsonValue {
        json!({
            "id": "in_1",
            "object": "invoice",
            "subscription": subscription,
            "customer": "cus_1",
            "currency": "usd",
            "amount_due": amount_due,
            "subtotal": amount_due,
            "tax": tax,
            "total": amount_due,
            "period_start": 1_700_000_000,
            "period_end": 1_702_592_000,
            "receipt_number": null,
            "attempted": true,
            "attempt_count": 1,
            "paid": true,
            "closed": true,
            "date": 1_700_000_100,
            "charge": null,
            "lines": {"data": [
                {"id": "ii_1", "amount": amount_due, "currency": "usd", "description": null}
            ]}
        })
    }

    async fn pending_cancel(fx: &Fixture) -> Subscription {
        let mut sub = fx.active(&fx.staff_monthly, "sub_1").await;
        sub.request_cancellation(Timestamp::now()).unwrap();
        sub.version = fx.subscriptions.update(&sub).await.unwrap();
        sub
    }

    #[tokio::test]
    async fn deletion_cancels_pending_subscription() {
        let fx = Fixture::new();
        let sub = pending_cancel(&fx).await;

        let result = handler(&fx)
            .ingest(event("evt_1", "customer.subscription.deleted", subscription_object("sub_1", "canceled", false)))
            .await
            .unwrap();

        assert_eq!(result.outcome, WebhookOutcome::Canceled { subscription_id: sub.id });
        assert_eq!(fx.stored(sub.id).await.status, SubscriptionStatus::Canceled);
        let published = fx.events.published_events();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type, "subscription.canceled.v1");
        assert_eq!(published[0].metadata.causation_id.as_deref(), Some("evt_1"));
    }

    #[tokio::test]
    async fn past_due_then_recovery_round_trips_status() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_1").await;
        let handler = handler(&fx);

        handler
            .ingest(event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "past_due", false)))
            .await
            .unwrap();
        assert_eq!(fx.stored(sub.id).await.status, SubscriptionStatus::PastDue);

        handler
            .ingest(event("evt_2", "customer.subscription.updated", subscription_object("sub_1", "active", false)))
            .await
            .unwrap();

        let stored = fx.stored(sub.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert_eq!(stored.current_period_end, Timestamp::from_unix_secs(1_702_592_000));
        assert_eq!(
            fx.event_types(),
            vec!["subscription.past_due.v1", "subscription.reactivated.v1"]
        );
    }

    #[tokio::test]
    async fn active_with_scheduled_cancel_keeps_pending_cancel() {
        let fx = Fixture::new();
        let sub = pending_cancel(&fx).await;

        let result = handler(&fx)
            .ingest(event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "active", true)))
            .await
            .unwrap();

        assert_eq!(
            result.outcome,
            WebhookOutcome::Reconciled {
                subscription_id: sub.id,
                outcome: ReconcileOutcome::Unchanged
            }
        );
        let stored = fx.stored(sub.id).await;
        assert_eq!(stored.status, SubscriptionStatus::PendingCancel);
        assert_eq!(stored.current_period_start, Timestamp::from_unix_secs(1_700_000_000));
    }

    #[tokio::test]
    async fn processor_canceled_status_is_mirrored() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_1").await;

        handler(&fx)
            .ingest(event("evt_1", "customer.subscription.updated", subscription_object("sub_1", "canceled", false)))
            .await
            .unwrap();

        assert_eq!(fx.stored(sub.id).await.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn unknown_subscription_is_acknowledged_and_recorded() {
        let fx = Fixture::new();

        let result = handler(&fx)
            .ingest(event("evt_9", "customer.subscription.deleted", subscription_object("sub_nope", "canceled", false)))
            .await
            .unwrap();

        assert_eq!(result.outcome, WebhookOutcome::UnknownReference);
        assert!(fx.ledger.find_event("evt_9").await.unwrap().is_some());
        assert!(fx.events.published_events().is_empty());
    }

    #[tokio::test]
    async fn invoice_is_recorded_in_major_units() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_1").await;

        handler(&fx)
            .ingest(event("evt_1", "invoice.created", invoice_object("sub_1", 1225, JsonValue::Null)))
            .await
            .unwrap();

        let invoices = fx.ledger.invoices();
        assert_eq!(invoices.len(), 1);
        let invoice = &invoices[0];
        assert_eq!(invoice.subscription_id, sub.id);
        assert_eq!(invoice.amount_due, Decimal::new(1225, 2));
        assert_eq!(invoice.tax, Decimal::ZERO);
        assert_eq!(invoice.processor_charge_id, "");
        assert_eq!(invoice.receipt_number, "");
        assert_eq!(invoice.issued_at, Timestamp::from_unix_secs(1_700_000_100));
        let items = fx.ledger.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "");
        assert_eq!(fx.event_types(), vec!["invoice.recorded.v1"]);
    }

    #[tokio::test]
    async fn redelivery_overwrites_without_duplicates_or_republishing() {
        let fx = Fixture::new();
        fx.active(&fx.staff_monthly, "sub_1").await;
        let handler = handler(&fx);

        handler
            .ingest(event("evt_1", "invoice.created", invoice_object("sub_1", 1225, json!(100))))
            .await
            .unwrap();
        let result = handler
            .ingest(event("evt_1", "invoice.created", invoice_object("sub_1", 1500, json!(100))))
            .await
            .unwrap();

        assert!(result.redelivery);
        let invoices = fx.ledger.invoices();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].amount_due, Decimal::new(1500, 2));
        assert_eq!(invoices[0].tax, Decimal::new(100, 2));
        assert_eq!(fx.ledger.items().len(), 1);
        assert_eq!(fx.ledger.events().len(), 1);
        assert_eq!(fx.events.published_events().len(), 1);
    }

    #[tokio::test]
    async fn invoice_update_overwrites_existing_invoice() {
        let fx = Fixture::new();
        fx.active(&fx.staff_monthly, "sub_1").await;
        let handler = handler(&fx);

        handler
            .ingest(event("evt_1", "invoice.created", invoice_object("sub_1", 1225, JsonValue::Null)))
            .await
            .unwrap();
        handler
            .ingest(event("evt_2", "invoice.updated", invoice_object("sub_1", 2450, JsonValue::Null)))
            .await
            .unwrap();

        let invoices = fx.ledger.invoices();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].total, Decimal::new(2450, 2));
    }

    #[tokio::test]
    async fn invoice_for_unknown_subscription_is_recorded_only() {
        let fx = Fixture::new();

        let result = handler(&fx)
            .ingest(event("evt_1", "invoice.created", invoice_object("sub_missing", 1225, JsonValue::Null)))
            .await
            .unwrap();

        assert_eq!(result.outcome, WebhookOutcome::UnknownReference);
        assert!(fx.ledger.invoices().is_empty());
    }

    #[tokio::test]
    async fn other_event_types_are_recorded_only() {
        let fx = Fixture::new();

        let result = handler(&fx)
            .ingest(event("evt_1", "charge.succeeded", json!({"id": "ch_1"})))
            .await
            .unwrap();

        assert_eq!(result.outcome, WebhookOutcome::Ignored);
        assert_eq!(fx.ledger.events().len(), 1);
    }

    #[tokio::test]
    async fn malformed_object_is_parse_error() {
        let fx = Fixture::new();

        let err = handler(&fx)
            .ingest(event("evt_1", "customer.subscription.updated", json!({"status": 3})))
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::ParseError(_)));
        assert!(fx.ledger.events().is_empty());
    }

    #[tokio::test]
    async fn handle_verifies_before_ingesting() {
        let fx = Fixture::new();
        let handler = ReconcileWebhookHandler::new(
            Arc::new(RejectAll),
            fx.repository(),
            fx.store(),
            fx.publisher(),
        );

        let err = handler
            .handle(ReconcileWebhookCommand {
                payload: br#"{"id":"evt_1","type":"invoice.created","data":{"object":{}}}"#.to_vec(),
                signature: "t=1,v1=00".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err, WebhookError::InvalidSignature);
        assert!(fx.ledger.events().is_empty());
    }

    #[tokio::test]
    async fn handle_parses_verified_payload() {
        let fx = Fixture::new();
        let payload = json!({
            "id": "evt_5",
            "type": "customer.subscription.updated",
            "data": {"object": subscription_object("sub_unknown", "active", false)}
        });

        let result = handler(&fx)
            .handle(ReconcileWebhookCommand {
                payload: serde_json::to_vec(&payload).unwrap(),
                signature: String::new(),
            })
            .await
            .unwrap();

        assert_eq!(result.event_id, "evt_5");
        assert_eq!(result.outcome, WebhookOutcome::UnknownReference);
    }
}
