//! Invoice domain events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{domain_event, EventId, InvoiceId, SubscriptionId, Timestamp};

use super::Invoice;

/// Published when a processor invoice is recorded or refreshed in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecorded {
    pub event_id: EventId,
    pub invoice_id: InvoiceId,
    pub subscription_id: SubscriptionId,
    pub processor_invoice_id: String,
    pub currency: String,
    pub total: Decimal,
    pub is_paid: bool,
    pub recorded_at: Timestamp,
}

domain_event!(
    InvoiceRecorded,
    event_type = "invoice.recorded.v1",
    schema_version = 1,
    aggregate_id = invoice_id,
    aggregate_type = "Invoice",
    occurred_at = recorded_at,
    event_id = event_id
);

impl InvoiceRecorded {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            event_id: EventId::new(),
            invoice_id: invoice.id,
            subscription_id: invoice.subscription_id,
            processor_invoice_id: invoice.processor_invoice_id.clone(),
            currency: invoice.currency.clone(),
            total: invoice.total,
            is_paid: invoice.is_paid,
            recorded_at: invoice.updated_at,
        }
    }
}
