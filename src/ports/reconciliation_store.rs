//! Reconciliation store port.
//!
//! Applies everything one processor event changes in a single transaction:
//! the event record, the subscription and the invoice with its items. Either
//! all of it is visible afterwards or none of it is.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::invoice::{Invoice, InvoiceItem};
use crate::domain::subscription::Subscription;
use crate::domain::webhook::ProcessorEvent;

/// Invoice upsert with its lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceChanges {
    /// Upserted by `processor_invoice_id`.
    pub invoice: Invoice,

    /// Upserted by `processor_item_id`.
    pub items: Vec<InvoiceItem>,
}

/// Every write caused by one processor event.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationChanges {
    /// Upserted by `event_id`.
    pub event: ProcessorEvent,

    /// Written with a version compare-and-swap.
    pub subscription: Option<Subscription>,

    pub invoice: Option<InvoiceChanges>,
}

impl ReconciliationChanges {
    /// Changes that only record the event.
    pub fn record_only(event: ProcessorEvent) -> Self {
        Self {
            event,
            subscription: None,
            invoice: None,
        }
    }
}

#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Stored record for an event id, if it was seen before.
    async fn find_event(&self, event_id: &str) -> Result<Option<ProcessorEvent>, DomainError>;

    /// Invoice and its items by processor invoice id.
    async fn find_invoice(
        &self,
        processor_invoice_id: &str,
    ) -> Result<Option<(Invoice, Vec<InvoiceItem>)>, DomainError>;

    /// Apply all changes atomically.
    ///
    /// # Errors
    ///
    /// - `ConcurrentModification` if the subscription version moved on; nothing
    ///   is written in that case
    /// - `DatabaseError` on persistence failure
    async fn apply(&self, changes: ReconciliationChanges) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn ReconciliationStore) {}
}
