//! Mock payment gateway for tests and local development.
//!
//! Keeps processor subscriptions in memory and records every call. Supports:
//! - Pre-configured subscriptions for `retrieve_subscription`
//! - Error injection, either once or per method
//! - Call tracking for assertions

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    CreateCustomerRequest, GatewayError, PaymentGateway, ProcessorCustomer, ProcessorSubscription,
    SubscriptionChanges,
};

/// Length of the billing period the mock reports for new subscriptions.
const MOCK_PERIOD_DAYS: i64 = 30;

/// Mock payment gateway.
///
/// ```ignore
/// let gateway = MockPaymentGateway::new();
/// gateway.set_method_error("create_customer", GatewayError::card_declined("Your card was declined."));
///
/// let err = gateway.create_customer(request).await.unwrap_err();
/// assert_eq!(gateway.call_count("create_customer"), 1);
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentGateway {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Processor subscriptions by id.
    subscriptions: HashMap<String, ProcessorSubscription>,

    /// Error returned by the next call to any method, then cleared.
    next_error: Option<GatewayError>,

    /// Errors returned by every call to a method.
    method_errors: HashMap<String, GatewayError>,

    /// Change sets sent through `update_subscription`, in order.
    applied_changes: Vec<(String, SubscriptionChanges)>,

    call_log: Vec<MethodCall>,
}

/// Recorded method call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Make a subscription available to `retrieve_subscription`.
    pub fn add_subscription(&self, subscription: ProcessorSubscription) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Fail the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    /// Fail every call to `method`.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Current processor-side view of a subscription.
    pub fn subscription(&self, id: &str) -> Option<ProcessorSubscription> {
        self.state().subscriptions.get(id).cloned()
    }

    /// Change sets sent through `update_subscription`.
    pub fn applied_changes(&self) -> Vec<(String, SubscriptionChanges)> {
        self.state().applied_changes.clone()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.state();
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn short_id(prefix: &str) -> String {
        format!("{}_mock_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError> {
        self.record_call(
            "create_customer",
            vec![
                request.payment_token.clone(),
                request.plan_id.clone(),
                request.description.clone(),
                request
                    .trial_end
                    .map(|t| t.as_unix_secs().to_string())
                    .unwrap_or_default(),
            ],
        );
        self.check_error("create_customer")?;

        let now = Timestamp::now();
        let trialing = request.trial_end.map_or(false, |end| end.is_after(&now));
        let subscription = ProcessorSubscription {
            id: Self::short_id("sub"),
            status: if trialing { "trialing" } else { "active" }.to_string(),
            plan_id: Some(request.plan_id),
            current_period_start: Some(now),
            current_period_end: Some(now.add_days(MOCK_PERIOD_DAYS)),
            trial_start: request.trial_end.map(|_| now),
            trial_end: request.trial_end,
            cancel_at_period_end: false,
            pending: SubscriptionChanges::default(),
        };
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());

        Ok(ProcessorCustomer {
            id: Self::short_id("cus"),
            subscription,
        })
    }

    async fn retrieve_subscription(
        &self,
        processor_subscription_id: &str,
    ) -> Result<ProcessorSubscription, GatewayError> {
        self.record_call(
            "retrieve_subscription",
            vec![processor_subscription_id.to_string()],
        );
        self.check_error("retrieve_subscription")?;

        self.state()
            .subscriptions
            .get(processor_subscription_id)
            .cloned()
            .ok_or_else(|| {
                GatewayError::unavailable(format!(
                    "No such subscription: {}",
                    processor_subscription_id
                ))
            })
    }

    async fn update_subscription(
        &self,
        subscription: &ProcessorSubscription,
    ) -> Result<(), GatewayError> {
        self.record_call(
            "update_subscription",
            vec![
                subscription.id.clone(),
                subscription.pending.plan_id.clone().unwrap_or_default(),
                subscription.pending.payment_token.clone().unwrap_or_default(),
            ],
        );
        self.check_error("update_subscription")?;

        if !subscription.has_pending_changes() {
            return Ok(());
        }

        let mut state = self.state();
        let stored = state
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| GatewayError::unavailable(format!("No such subscription: {}", subscription.id)))?;
        if let Some(plan_id) = &subscription.pending.plan_id {
            stored.plan_id = Some(plan_id.clone());
        }
        state
            .applied_changes
            .push((subscription.id.clone(), subscription.pending.clone()));
        Ok(())
    }

    async fn cancel_subscription(
        &self,
        processor_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), GatewayError> {
        self.record_call(
            "cancel_subscription",
            vec![processor_subscription_id.to_string(), at_period_end.to_string()],
        );
        self.check_error("cancel_subscription")?;

        let mut state = self.state();
        let stored = state
            .subscriptions
            .get_mut(processor_subscription_id)
            .ok_or_else(|| {
                GatewayError::unavailable(format!(
                    "No such subscription: {}",
                    processor_subscription_id
                ))
            })?;
        if at_period_end {
            stored.cancel_at_period_end = true;
        } else {
            stored.status = "canceled".to_string();
        }
        Ok(())
    }
}
