//! PostgreSQL implementation of ReconciliationStore.
//!
//! `apply` runs in one transaction: subscription compare-and-swap first, then
//! invoice, items and the event record. A version miss rolls everything back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, InvoiceId, InvoiceItemId, SubscriptionId};
use crate::domain::invoice::{Invoice, InvoiceItem};
use crate::domain::webhook::ProcessorEvent;
use crate::ports::{InvoiceChanges, ReconciliationChanges, ReconciliationStore};

use super::subscription_repository::compare_and_swap;
use super::{corrupt_column, timestamp, timestamp_opt};

pub struct PostgresReconciliationStore {
    pool: PgPool,
}

impl PostgresReconciliationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessorEventRow {
    event_id: String,
    event_type: String,
    created: DateTime<Utc>,
    data: JsonValue,
    pending_webhooks: i64,
    request_id: String,
    first_received_at: DateTime<Utc>,
    last_received_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<ProcessorEventRow> for ProcessorEvent {
    fn from(row: ProcessorEventRow) -> Self {
        ProcessorEvent {
            event_id: row.event_id,
            event_type: row.event_type,
            created: timestamp(row.created),
            data: row.data,
            pending_webhooks: row.pending_webhooks,
            request_id: row.request_id,
            first_received_at: timestamp(row.first_received_at),
            last_received_at: timestamp(row.last_received_at),
            processed_at: timestamp_opt(row.processed_at),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    subscription_id: Uuid,
    processor_invoice_id: String,
    processor_charge_id: String,
    processor_subscription_id: String,
    processor_customer_id: String,
    currency: String,
    amount_due: Decimal,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    period_start: Option<DateTime<Utc>>,
    period_end: Option<DateTime<Utc>>,
    receipt_number: String,
    is_attempted: bool,
    attempt_count: i32,
    is_paid: bool,
    is_closed: bool,
    issued_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DomainError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let attempt_count = u32::try_from(row.attempt_count)
            .map_err(|_| corrupt_column("invoices.attempt_count", row.attempt_count))?;

        Ok(Invoice {
            id: InvoiceId::from_uuid(row.id),
            subscription_id: SubscriptionId::from_uuid(row.subscription_id),
            processor_invoice_id: row.processor_invoice_id,
            processor_charge_id: row.processor_charge_id,
            processor_subscription_id: row.processor_subscription_id,
            processor_customer_id: row.processor_customer_id,
            currency: row.currency,
            amount_due: row.amount_due,
            subtotal: row.subtotal,
            tax: row.tax,
            total: row.total,
            period_start: timestamp_opt(row.period_start),
            period_end: timestamp_opt(row.period_end),
            receipt_number: row.receipt_number,
            is_attempted: row.is_attempted,
            attempt_count,
            is_paid: row.is_paid,
            is_closed: row.is_closed,
            issued_at: timestamp_opt(row.issued_at),
            created_at: timestamp(row.created_at),
            updated_at: timestamp(row.updated_at),
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceItemRow {
    id: Uuid,
    invoice_id: Uuid,
    processor_item_id: String,
    currency: String,
    amount: Decimal,
    description: String,
}

impl From<InvoiceItemRow> for InvoiceItem {
    fn from(row: InvoiceItemRow) -> Self {
        InvoiceItem {
            id: InvoiceItemId::from_uuid(row.id),
            invoice_id: InvoiceId::from_uuid(row.invoice_id),
            processor_item_id: row.processor_item_id,
            currency: row.currency,
            amount: row.amount,
            description: row.description,
        }
    }
}

/// Upsert the invoice by processor id, then its items. Returns the stored invoice id.
async fn upsert_invoice(conn: &mut PgConnection, changes: &InvoiceChanges) -> Result<Uuid, DomainError> {
    let invoice = &changes.invoice;
    let attempt_count = i32::try_from(invoice.attempt_count)
        .map_err(|_| DomainError::validation("attempt_count", "out of range"))?;

    let (invoice_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO invoices (
            id, subscription_id, processor_invoice_id, processor_charge_id,
            processor_subscription_id, processor_customer_id, currency,
            amount_due, subtotal, tax, total, period_start, period_end, receipt_number,
            is_attempted, attempt_count, is_paid, is_closed, issued_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
        ON CONFLICT (processor_invoice_id) DO UPDATE SET
            processor_charge_id = EXCLUDED.processor_charge_id,
            processor_subscription_id = EXCLUDED.processor_subscription_id,
            processor_customer_id = EXCLUDED.processor_customer_id,
            currency = EXCLUDED.currency,
            amount_due = EXCLUDED.amount_due,
            subtotal = EXCLUDED.subtotal,
            tax = EXCLUDED.tax,
            total = EXCLUDED.total,
            period_start = EXCLUDED.period_start,
            period_end = EXCLUDED.period_end,
            receipt_number = EXCLUDED.receipt_number,
            is_attempted = EXCLUDED.is_attempted,
            attempt_count = EXCLUDED.attempt_count,
            is_paid = EXCLUDED.is_paid,
            is_closed = EXCLUDED.is_closed,
            issued_at = EXCLUDED.issued_at,
            updated_at = EXCLUDED.updated_at
        RETURNING id
        "#,
    )
    .bind(invoice.id.as_uuid())
    .bind(invoice.subscription_id.as_uuid())
    .bind(&invoice.processor_invoice_id)
    .bind(&invoice.processor_charge_id)
    .bind(&invoice.processor_subscription_id)
    .bind(&invoice.processor_customer_id)
    .bind(&invoice.currency)
    .bind(invoice.amount_due)
    .bind(invoice.subtotal)
    .bind(invoice.tax)
    .bind(invoice.total)
    .bind(invoice.period_start.map(|t| *t.as_datetime()))
    .bind(invoice.period_end.map(|t| *t.as_datetime()))
    .bind(&invoice.receipt_number)
    .bind(invoice.is_attempted)
    .bind(attempt_count)
    .bind(invoice.is_paid)
    .bind(invoice.is_closed)
    .bind(invoice.issued_at.map(|t| *t.as_datetime()))
    .bind(invoice.created_at.as_datetime())
    .bind(invoice.updated_at.as_datetime())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| DomainError::database("Failed to upsert invoice", e))?;

    for item in &changes.items {
        sqlx::query(
            r#"
            INSERT INTO invoice_items (id, invoice_id, processor_item_id, currency, amount, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (processor_item_id) DO UPDATE SET
                currency = EXCLUDED.currency,
                amount = EXCLUDED.amount,
                description = EXCLUDED.description
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(invoice_id)
        .bind(&item.processor_item_id)
        .bind(&item.currency)
        .bind(item.amount)
        .bind(&item.description)
        .execute(&mut *conn)
        .await
        .map_err(|e| DomainError::database("Failed to upsert invoice item", e))?;
    }

    Ok(invoice_id)
}

async fn upsert_event(conn: &mut PgConnection, event: &ProcessorEvent) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO processor_events (
            event_id, event_type, created, data, pending_webhooks, request_id,
            first_received_at, last_received_at, processed_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (event_id) DO UPDATE SET
            event_type = EXCLUDED.event_type,
            created = EXCLUDED.created,
            data = EXCLUDED.data,
            pending_webhooks = EXCLUDED.pending_webhooks,
            request_id = EXCLUDED.request_id,
            last_received_at = EXCLUDED.last_received_at,
            processed_at = COALESCE(processor_events.processed_at, EXCLUDED.processed_at)
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.event_type)
    .bind(event.created.as_datetime())
    .bind(&event.data)
    .bind(event.pending_webhooks)
    .bind(&event.request_id)
    .bind(event.first_received_at.as_datetime())
    .bind(event.last_received_at.as_datetime())
    .bind(event.processed_at.map(|t| *t.as_datetime()))
    .execute(&mut *conn)
    .await
    .map_err(|e| DomainError::database("Failed to record processor event", e))?;

    Ok(())
}

#[async_trait]
impl ReconciliationStore for PostgresReconciliationStore {
    async fn find_event(&self, event_id: &str) -> Result<Option<ProcessorEvent>, DomainError> {
        let row: Option<ProcessorEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, created, data, pending_webhooks, request_id,
                   first_received_at, last_received_at, processed_at
            FROM processor_events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find processor event", e))?;

        Ok(row.map(ProcessorEvent::from))
    }

    async fn find_invoice(
        &self,
        processor_invoice_id: &str,
    ) -> Result<Option<(Invoice, Vec<InvoiceItem>)>, DomainError> {
        let row: Option<InvoiceRow> = sqlx::query_as(
            r#"
            SELECT id, subscription_id, processor_invoice_id, processor_charge_id,
                   processor_subscription_id, processor_customer_id, currency,
                   amount_due, subtotal, tax, total, period_start, period_end, receipt_number,
                   is_attempted, attempt_count, is_paid, is_closed, issued_at, created_at, updated_at
            FROM invoices
            WHERE processor_invoice_id = $1
            "#,
        )
        .bind(processor_invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find invoice", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let invoice = Invoice::try_from(row)?;

        let items: Vec<InvoiceItemRow> = sqlx::query_as(
            r#"
            SELECT id, invoice_id, processor_item_id, currency, amount, description
            FROM invoice_items
            WHERE invoice_id = $1
            ORDER BY processor_item_id
            "#,
        )
        .bind(invoice.id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to load invoice items", e))?;

        Ok(Some((invoice, items.into_iter().map(InvoiceItem::from).collect())))
    }

    async fn apply(&self, changes: ReconciliationChanges) -> Result<(), DomainError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DomainError::database("Failed to begin transaction", e))?;

        // 1. Subscription first: a version miss aborts before any ledger write
        if let Some(subscription) = &changes.subscription {
            compare_and_swap(&mut tx, subscription).await?;
        }

        // 2. Invoice and items
        if let Some(invoice) = &changes.invoice {
            upsert_invoice(&mut tx, invoice).await?;
        }

        // 3. Event record
        upsert_event(&mut tx, &changes.event).await?;

        tx.commit()
            .await
            .map_err(|e| DomainError::database("Failed to commit transaction", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ErrorCode;
    use serde_json::json;

    fn invoice_row() -> InvoiceRow {
        let now = Utc::now();
        InvoiceRow {
            id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            processor_invoice_id: "in_1".to_string(),
            processor_charge_id: String::new(),
            processor_subscription_id: "sub_1".to_string(),
            processor_customer_id: "cus_1".to_string(),
            currency: "usd".to_string(),
            amount_due: Decimal::new(1225, 2),
            subtotal: Decimal::new(1225, 2),
            tax: Decimal::ZERO,
            total: Decimal::new(1225, 2),
            period_start: Some(now),
            period_end: None,
            receipt_number: String::new(),
            is_attempted: true,
            attempt_count: 2,
            is_paid: false,
            is_closed: false,
            issued_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn invoice_row_converts() {
        let invoice = Invoice::try_from(invoice_row()).unwrap();
        assert_eq!(invoice.processor_invoice_id, "in_1");
        assert_eq!(invoice.attempt_count, 2);
        assert_eq!(invoice.total.to_string(), "12.25");
        assert!(invoice.issued_at.is_none());
    }

    #[test]
    fn negative_attempt_count_is_a_database_error() {
        let mut row = invoice_row();
        row.attempt_count = -1;
        assert_eq!(
            Invoice::try_from(row).unwrap_err().code,
            ErrorCode::DatabaseError
        );
    }

    #[test]
    fn event_row_keeps_processed_at() {
        let now = Utc::now();
        let event = ProcessorEvent::from(ProcessorEventRow {
            event_id: "evt_1".to_string(),
            event_type: "invoice.updated".to_string(),
            created: now,
            data: json!({"object": {"id": "in_1"}}),
            pending_webhooks: 0,
            request_id: String::new(),
            first_received_at: now,
            last_received_at: now,
            processed_at: Some(now),
        });
        assert!(event.was_processed());
        assert_eq!(event.data["object"]["id"], "in_1");
    }
}
