//! Invoice ledger entries mirrored from the processor.
//!
//! Invoices and their items are created and overwritten from webhook payloads
//! only. Amounts arrive in minor units and are stored in major units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{InvoiceId, InvoiceItemId, SubscriptionId, Timestamp};
use crate::domain::webhook::{InvoiceLineSnapshot, InvoiceSnapshot};

/// Convert a processor amount in minor units (cents) to major units.
pub fn minor_units_to_decimal(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}

/// Invoice keyed by the processor's invoice id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub subscription_id: SubscriptionId,
    pub processor_invoice_id: String,
    pub processor_charge_id: String,
    pub processor_subscription_id: String,
    pub processor_customer_id: String,
    pub currency: String,
    pub amount_due: Decimal,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub period_start: Option<Timestamp>,
    pub period_end: Option<Timestamp>,
    pub receipt_number: String,
    pub is_attempted: bool,
    pub attempt_count: u32,
    pub is_paid: bool,
    pub is_closed: bool,
    pub issued_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Invoice {
    /// Empty invoice for a processor id seen for the first time.
    pub fn stub(
        subscription_id: SubscriptionId,
        processor_invoice_id: impl Into<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: InvoiceId::new(),
            subscription_id,
            processor_invoice_id: processor_invoice_id.into(),
            processor_charge_id: String::new(),
            processor_subscription_id: String::new(),
            processor_customer_id: String::new(),
            currency: String::new(),
            amount_due: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            tax: Decimal::ZERO,
            total: Decimal::ZERO,
            period_start: None,
            period_end: None,
            receipt_number: String::new(),
            is_attempted: false,
            attempt_count: 0,
            is_paid: false,
            is_closed: false,
            issued_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite every monetary, status and date field from the processor.
    ///
    /// Missing tax is zero; missing charge and receipt are empty strings.
    pub fn apply_snapshot(&mut self, snapshot: &InvoiceSnapshot, now: Timestamp) {
        self.processor_charge_id = snapshot.charge.clone().unwrap_or_default();
        self.processor_subscription_id = snapshot.subscription.clone().unwrap_or_default();
        self.processor_customer_id = snapshot.customer.clone().unwrap_or_default();
        self.currency = snapshot.currency.clone();
        self.amount_due = minor_units_to_decimal(snapshot.amount_due);
        self.subtotal = minor_units_to_decimal(snapshot.subtotal);
        self.tax = snapshot.tax.map_or(Decimal::ZERO, minor_units_to_decimal);
        self.total = minor_units_to_decimal(snapshot.total);
        self.period_start = snapshot.period_start.and_then(Timestamp::from_unix_secs);
        self.period_end = snapshot.period_end.and_then(Timestamp::from_unix_secs);
        self.receipt_number = snapshot.receipt_number.clone().unwrap_or_default();
        self.is_attempted = snapshot.attempted;
        self.attempt_count = snapshot.attempt_count;
        self.is_paid = snapshot.paid;
        self.is_closed = snapshot.closed;
        self.issued_at = snapshot.date.and_then(Timestamp::from_unix_secs);
        self.updated_at = now;
    }
}

/// Invoice line keyed by the processor's line id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: InvoiceItemId,
    pub invoice_id: InvoiceId,
    pub processor_item_id: String,
    pub currency: String,
    pub amount: Decimal,
    pub description: String,
}

impl InvoiceItem {
    pub fn from_line(invoice_id: InvoiceId, line: &InvoiceLineSnapshot) -> Self {
        let mut item = Self {
            id: InvoiceItemId::new(),
            invoice_id,
            processor_item_id: line.id.clone(),
            currency: String::new(),
            amount: Decimal::ZERO,
            description: String::new(),
        };
        item.apply_line(line);
        item
    }

    pub fn apply_line(&mut self, line: &InvoiceLineSnapshot) {
        self.currency = line.currency.clone();
        self.amount = minor_units_to_decimal(line.amount);
        self.description = line.description.clone().unwrap_or_default();
    }
}

/// Merge processor lines into existing items, matching on processor item id.
///
/// Existing items not present in `lines` are left out of the result; the store
/// keeps them untouched.
pub fn upsert_items(
    invoice_id: InvoiceId,
    existing: Vec<InvoiceItem>,
    lines: &[InvoiceLineSnapshot],
) -> Vec<InvoiceItem> {
    let mut existing = existing;
    lines
        .iter()
        .map(|line| {
            match existing
                .iter()
                .position(|item| item.processor_item_id == line.id)
            {
                Some(index) => {
                    let mut item = existing.swap_remove(index);
                    item.apply_line(line);
                    item
                }
                None => InvoiceItem::from_line(invoice_id, line),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::webhook::InvoiceLines;
    use std::str::FromStr;

    fn line(id: &str, amount: i64) -> InvoiceLineSnapshot {
        InvoiceLineSnapshot {
            id: id.to_string(),
            amount,
            currency: "usd".to_string(),
            description: None,
        }
    }

    fn snapshot() -> InvoiceSnapshot {
        InvoiceSnapshot {
            id: "in_1".to_string(),
            subscription: Some("sub_1".to_string()),
            customer: Some("cus_1".to_string()),
            currency: "usd".to_string(),
            amount_due: 1225,
            subtotal: 1100,
            tax: Some(125),
            total: 1225,
            period_start: Some(1_700_000_000),
            period_end: Some(1_702_592_000),
            receipt_number: None,
            attempted: true,
            attempt_count: 1,
            paid: true,
            closed: false,
            date: None,
            charge: None,
            lines: InvoiceLines {
                data: vec![line("il_1", 1225)],
            },
        }
    }

    #[test]
    fn minor_units_divide_by_one_hundred() {
        assert_eq!(minor_units_to_decimal(1225), Decimal::from_str("12.25").unwrap());
        assert_eq!(minor_units_to_decimal(-50), Decimal::from_str("-0.50").unwrap());
    }

    #[test]
    fn apply_snapshot_overwrites_fields() {
        let now = Timestamp::now();
        let mut invoice = Invoice::stub(SubscriptionId::new(), "in_1", now);
        invoice.apply_snapshot(&snapshot(), now);

        assert_eq!(invoice.amount_due, Decimal::from_str("12.25").unwrap());
        assert_eq!(invoice.tax, Decimal::from_str("1.25").unwrap());
        assert_eq!(invoice.processor_charge_id, "");
        assert_eq!(invoice.receipt_number, "");
        assert_eq!(invoice.issued_at, None);
        assert!(invoice.is_paid);
        assert_eq!(invoice.processor_subscription_id, "sub_1");
    }

    #[test]
    fn null_tax_is_zero() {
        let now = Timestamp::now();
        let mut snap = snapshot();
        snap.tax = None;
        let mut invoice = Invoice::stub(SubscriptionId::new(), "in_1", now);
        invoice.tax = Decimal::ONE;
        invoice.apply_snapshot(&snap, now);
        assert_eq!(invoice.tax, Decimal::ZERO);
    }

    #[test]
    fn upsert_items_reuses_matching_ids() {
        let invoice_id = InvoiceId::new();
        let existing = vec![InvoiceItem::from_line(invoice_id, &line("il_1", 100))];
        let existing_id = existing[0].id;

        let merged = upsert_items(invoice_id, existing, &[line("il_1", 250), line("il_2", 75)]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, existing_id);
        assert_eq!(merged[0].amount, Decimal::from_str("2.50").unwrap());
        assert_eq!(merged[1].processor_item_id, "il_2");
        assert_eq!(merged[1].invoice_id, invoice_id);
    }
}
