//! Subscription handlers.
//!
//! ## Commands
//! - Starting paid subscriptions (superseding a running trial)
//! - Starting trials
//! - Changing price point or payment source, converting trials
//! - Cancelling
//! - Reconciling processor webhooks
//! - Sweeping expired trials
//!
//! ## Queries
//! - Get one subscription
//! - List current subscriptions
//! - Check module entitlement
//!
//! ## Event Handlers
//! - Activity entries for new subscriptions and trials

mod activity_recorder;
mod cancel_subscription;
mod check_entitlement;
mod create_subscription;
mod get_current_subscriptions;
mod get_subscription;
mod reconcile_webhook;
mod start_trial;
mod sweep_expired_trials;
mod update_subscription;

#[cfg(test)]
pub(crate) mod test_support;

// Event handlers
pub use activity_recorder::{SubscriptionActivityRecorder, ACTIVITY_EVENT_TYPES};

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
};
pub use reconcile_webhook::{
    ReconcileWebhookCommand, ReconcileWebhookHandler, ReconcileWebhookResult, WebhookOutcome,
};
pub use start_trial::{StartTrialCommand, StartTrialHandler, StartTrialResult};
pub use sweep_expired_trials::{SweepExpiredTrialsHandler, SweepExpiredTrialsResult};
pub use update_subscription::{
    UpdateSubscriptionCommand, UpdateSubscriptionHandler, UpdateSubscriptionResult,
};

// Queries
pub use check_entitlement::{CheckEntitlementHandler, CheckEntitlementQuery, CheckEntitlementResult};
pub use get_current_subscriptions::{
    GetCurrentSubscriptionsHandler, GetCurrentSubscriptionsQuery,
};
pub use get_subscription::{GetSubscriptionHandler, GetSubscriptionQuery};

use std::sync::Arc;

use crate::domain::billing::BillingInterval;
use crate::domain::foundation::{
    BillingIntervalId, EventEnvelope, FacilityId, SubscriptionId,
};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::{BillingCatalog, EventPublisher, GatewayError, SubscriptionRepository};

/// Load a subscription owned by `facility_id`. Other facilities' rows are
/// reported as not found.
async fn load_owned(
    repository: &Arc<dyn SubscriptionRepository>,
    facility_id: &FacilityId,
    subscription_id: SubscriptionId,
) -> Result<Subscription, SubscriptionError> {
    repository
        .find_by_id(&subscription_id)
        .await?
        .filter(|s| &s.facility_id == facility_id)
        .ok_or_else(|| SubscriptionError::not_found(subscription_id))
}

async fn load_interval(
    catalog: &Arc<dyn BillingCatalog>,
    id: &BillingIntervalId,
) -> Result<BillingInterval, SubscriptionError> {
    catalog.find_interval(id).await?.ok_or_else(|| {
        SubscriptionError::validation(
            "billing_interval",
            format!("Invalid pk \"{}\" - object does not exist.", id),
        )
    })
}

/// Blank tokens count as absent.
fn non_blank(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

fn gateway_failure(err: GatewayError, facility_id: &FacilityId) -> SubscriptionError {
    match err {
        GatewayError::CardDeclined { message } => {
            tracing::info!(facility_id = %facility_id, %message, "card declined");
            SubscriptionError::card_declined(message)
        }
        GatewayError::ProcessorUnavailable { detail } => {
            tracing::error!(facility_id = %facility_id, %detail, "payment processor request failed");
            SubscriptionError::processor_unavailable()
        }
    }
}

/// Publish events for a committed change.
///
/// The state change is already durable, so publish failures are logged
/// rather than returned.
async fn publish_committed(publisher: &Arc<dyn EventPublisher>, events: Vec<EventEnvelope>) {
    if events.is_empty() {
        return;
    }
    if let Err(e) = publisher.publish_all(events).await {
        tracing::warn!(error = %e, "failed to publish subscription events");
    }
}
