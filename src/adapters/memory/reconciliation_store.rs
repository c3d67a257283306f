//! In-memory reconciliation store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::foundation::DomainError;
use crate::domain::invoice::{Invoice, InvoiceItem};
use crate::domain::webhook::ProcessorEvent;
use crate::ports::{ReconciliationChanges, ReconciliationStore};

use super::subscription_repository::compare_and_swap;
use super::{poisoned, InMemorySubscriptionRepository};

#[derive(Default)]
struct Ledger {
    events: HashMap<String, ProcessorEvent>,
    /// Keyed by processor invoice id.
    invoices: HashMap<String, Invoice>,
    /// Keyed by processor item id.
    items: HashMap<String, InvoiceItem>,
}

/// Processor events and the invoice ledger, writing subscriptions through the
/// shared in-memory repository.
pub struct InMemoryReconciliationStore {
    subscriptions: Arc<InMemorySubscriptionRepository>,
    ledger: RwLock<Ledger>,
}

impl InMemoryReconciliationStore {
    pub fn new(subscriptions: Arc<InMemorySubscriptionRepository>) -> Self {
        Self {
            subscriptions,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    /// All stored events.
    pub fn events(&self) -> Vec<ProcessorEvent> {
        match self.ledger.read() {
            Ok(ledger) => ledger.events.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// All stored invoices.
    pub fn invoices(&self) -> Vec<Invoice> {
        match self.ledger.read() {
            Ok(ledger) => ledger.invoices.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// All stored invoice items.
    pub fn items(&self) -> Vec<InvoiceItem> {
        match self.ledger.read() {
            Ok(ledger) => ledger.items.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl ReconciliationStore for InMemoryReconciliationStore {
    async fn find_event(&self, event_id: &str) -> Result<Option<ProcessorEvent>, DomainError> {
        let ledger = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(ledger.events.get(event_id).cloned())
    }

    async fn find_invoice(
        &self,
        processor_invoice_id: &str,
    ) -> Result<Option<(Invoice, Vec<InvoiceItem>)>, DomainError> {
        let ledger = self.ledger.read().map_err(|_| poisoned("ledger"))?;
        Ok(ledger.invoices.get(processor_invoice_id).map(|invoice| {
            let items = ledger
                .items
                .values()
                .filter(|item| item.invoice_id == invoice.id)
                .cloned()
                .collect();
            (invoice.clone(), items)
        }))
    }

    async fn apply(&self, changes: ReconciliationChanges) -> Result<(), DomainError> {
        // Lock order: subscriptions, then ledger.
        let mut rows = self.subscriptions.write_rows()?;
        let mut ledger = self.ledger.write().map_err(|_| poisoned("ledger"))?;

        // The version check runs before any other write.
        if let Some(subscription) = &changes.subscription {
            compare_and_swap(&mut rows, subscription)?;
        }
        if let Some(invoice) = changes.invoice {
            for item in invoice.items {
                ledger.items.insert(item.processor_item_id.clone(), item);
            }
            ledger
                .invoices
                .insert(invoice.invoice.processor_invoice_id.clone(), invoice.invoice);
        }
        ledger
            .events
            .insert(changes.event.event_id.clone(), changes.event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{BillingInterval, IntervalUnit, Module, Plan};
    use crate::domain::foundation::{ErrorCode, FacilityId, Timestamp};
    use crate::domain::subscription::{ProcessorBilling, Subscription};
    use crate::domain::webhook::InboundEvent;
    use crate::ports::{InvoiceChanges, SubscriptionRepository};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn paid() -> Subscription {
        let plan = Plan::new("Resident", Module::Resident, Some(50)).unwrap();
        let interval =
            BillingInterval::new(plan, Decimal::from(99), IntervalUnit::Month, 1, "plan_r").unwrap();
        let billing = ProcessorBilling {
            processor_subscription_id: "sub_1".to_string(),
            current_period_start: None,
            current_period_end: None,
            trial_start: None,
            trial_end: None,
        };
        Subscription::start_paid(FacilityId::new(), &interval, billing, Timestamp::now())
    }

    fn event(id: &str) -> ProcessorEvent {
        let inbound = InboundEvent {
            id: id.to_string(),
            event_type: "invoice.created".to_string(),
            created: Timestamp::now(),
            data: json!({"object": {}}),
            pending_webhooks: 1,
            request_id: String::new(),
            livemode: false,
        };
        ProcessorEvent::first_delivery(&inbound, Timestamp::now())
    }

    #[tokio::test]
    async fn conflicting_subscription_write_discards_everything() {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let sub = paid();
        subscriptions.save(&sub).await.unwrap();
        let store = InMemoryReconciliationStore::new(subscriptions.clone());

        let mut stale = sub.clone();
        stale.version = 7;
        let invoice = Invoice::stub(sub.id, "in_1", Timestamp::now());
        let err = store
            .apply(ReconciliationChanges {
                event: event("evt_1"),
                subscription: Some(stale),
                invoice: Some(InvoiceChanges {
                    invoice,
                    items: vec![],
                }),
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ConcurrentModification);
        assert!(store.events().is_empty());
        assert!(store.invoices().is_empty());
    }

    #[tokio::test]
    async fn invoice_lookup_returns_its_items() {
        let subscriptions = Arc::new(InMemorySubscriptionRepository::new());
        let store = InMemoryReconciliationStore::new(subscriptions);
        let sub = paid();
        let invoice = Invoice::stub(sub.id, "in_1", Timestamp::now());
        let item = InvoiceItem {
            id: Default::default(),
            invoice_id: invoice.id,
            processor_item_id: "ii_1".to_string(),
            currency: "usd".to_string(),
            amount: Decimal::new(1225, 2),
            description: String::new(),
        };

        store
            .apply(ReconciliationChanges {
                event: event("evt_2"),
                subscription: None,
                invoice: Some(InvoiceChanges {
                    invoice: invoice.clone(),
                    items: vec![item.clone()],
                }),
            })
            .await
            .unwrap();

        let (found, items) = store.find_invoice("in_1").await.unwrap().unwrap();
        assert_eq!(found.id, invoice.id);
        assert_eq!(items, vec![item]);
        assert!(store.find_event("evt_2").await.unwrap().is_some());
    }
}
