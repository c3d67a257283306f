//! Processor objects carried in webhook payloads.
//!
//! Field names follow the processor's JSON so `data.object` deserializes
//! directly. Amounts are in minor units and times in Unix seconds, exactly as
//! sent; conversion happens when they are applied to local records.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::SubscriptionStatus;

/// Subscription object from `customer.subscription.*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub status: String,

    #[serde(default)]
    pub cancel_at_period_end: bool,

    #[serde(default)]
    pub current_period_start: Option<i64>,

    #[serde(default)]
    pub current_period_end: Option<i64>,
}

impl SubscriptionSnapshot {
    /// Local status the processor state maps to, if any.
    ///
    /// `active` only maps when no cancellation is scheduled, so a
    /// `pending_cancel` subscription stays put until the processor un-cancels.
    pub fn target_status(&self) -> Option<SubscriptionStatus> {
        match self.status.as_str() {
            "active" if !self.cancel_at_period_end => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    pub fn period_start(&self) -> Option<Timestamp> {
        self.current_period_start.and_then(Timestamp::from_unix_secs)
    }

    pub fn period_end(&self) -> Option<Timestamp> {
        self.current_period_end.and_then(Timestamp::from_unix_secs)
    }
}

/// Invoice object from `invoice.*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: String,

    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default)]
    pub customer: Option<String>,

    #[serde(default)]
    pub currency: String,

    #[serde(default)]
    pub amount_due: i64,

    #[serde(default)]
    pub subtotal: i64,

    #[serde(default)]
    pub tax: Option<i64>,

    #[serde(default)]
    pub total: i64,

    #[serde(default)]
    pub period_start: Option<i64>,

    #[serde(default)]
    pub period_end: Option<i64>,

    #[serde(default)]
    pub receipt_number: Option<String>,

    #[serde(default)]
    pub attempted: bool,

    #[serde(default)]
    pub attempt_count: u32,

    #[serde(default)]
    pub paid: bool,

    #[serde(default)]
    pub closed: bool,

    /// Issue date. Older API versions call it `date`, newer ones `created`.
    #[serde(default, alias = "created")]
    pub date: Option<i64>,

    #[serde(default)]
    pub charge: Option<String>,

    #[serde(default)]
    pub lines: InvoiceLines,
}

/// `lines` list wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLines {
    #[serde(default)]
    pub data: Vec<InvoiceLineSnapshot>,
}

/// Single invoice line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineSnapshot {
    pub id: String,

    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub currency: String,

    #[serde(default)]
    pub description: Option<String>,
}
