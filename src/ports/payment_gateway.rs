//! Payment gateway port for the external subscription processor.
//!
//! Isolates every synchronous call to the processor behind a narrow interface.
//! Implementations do not retry; callers decide how to surface failures.
//!
//! # Design
//!
//! - **Two error classes**: declined cards carry a user-facing message,
//!   everything else is a transient `ProcessorUnavailable`
//! - **Retrieve, mutate, persist**: updates go through a retrieved
//!   `ProcessorSubscription` handle so plan and source changes share one request

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::foundation::Timestamp;
use crate::domain::subscription::ProcessorBilling;

/// Port for the external payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a customer with a payment source and a subscription to `plan_id`.
    ///
    /// # Errors
    ///
    /// - `CardDeclined` if the processor rejected the payment source
    /// - `ProcessorUnavailable` for any other failure
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError>;

    /// Retrieve a subscription as a mutable handle.
    async fn retrieve_subscription(
        &self,
        processor_subscription_id: &str,
    ) -> Result<ProcessorSubscription, GatewayError>;

    /// Persist the pending changes of a retrieved handle in one request.
    ///
    /// A handle without pending changes is a no-op.
    async fn update_subscription(
        &self,
        subscription: &ProcessorSubscription,
    ) -> Result<(), GatewayError>;

    /// Cancel a subscription, either now or at the end of the current period.
    async fn cancel_subscription(
        &self,
        processor_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), GatewayError>;
}

/// Errors returned by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The processor declined the payment source. `message` is shown to the user.
    #[error("Card declined: {message}")]
    CardDeclined { message: String },

    /// Network, authentication, rate limiting or processor-side failure.
    /// `detail` is for logs only.
    #[error("Processor unavailable: {detail}")]
    ProcessorUnavailable { detail: String },
}

impl GatewayError {
    pub fn card_declined(message: impl Into<String>) -> Self {
        GatewayError::CardDeclined {
            message: message.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        GatewayError::ProcessorUnavailable {
            detail: detail.into(),
        }
    }
}

/// Request to create a processor customer and its subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCustomerRequest {
    /// Single-use payment token from the client (`tok_...`).
    pub payment_token: String,

    /// Processor plan id of the billing interval.
    pub plan_id: String,

    /// Shown in the processor dashboard. The facility name.
    pub description: String,

    /// Trial end to carry over when a running trial converts.
    pub trial_end: Option<Timestamp>,
}

/// Processor customer with the subscription created alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCustomer {
    pub id: String,
    pub subscription: ProcessorSubscription,
}

/// Processor-side subscription handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSubscription {
    pub id: String,
    pub status: String,
    pub plan_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub cancel_at_period_end: bool,

    /// Changes to send on the next `update_subscription`.
    #[serde(default)]
    pub pending: SubscriptionChanges,
}

impl ProcessorSubscription {
    /// Point the subscription at another plan.
    pub fn set_plan(&mut self, plan_id: impl Into<String>) {
        self.pending.plan_id = Some(plan_id.into());
    }

    /// Replace the payment source.
    pub fn set_payment_source(&mut self, payment_token: impl Into<String>) {
        self.pending.payment_token = Some(payment_token.into());
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Billing fields to store locally.
    pub fn billing(&self) -> ProcessorBilling {
        ProcessorBilling {
            processor_subscription_id: self.id.clone(),
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            trial_start: self.trial_start,
            trial_end: self.trial_end,
        }
    }
}

/// Pending processor-side changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionChanges {
    pub plan_id: Option<String>,
    pub payment_token: Option<String>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.plan_id.is_none() && self.payment_token.is_none()
    }
}
