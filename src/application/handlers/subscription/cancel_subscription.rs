//! CancelSubscriptionHandler - Command handler for facility-initiated cancellation.

use std::sync::Arc;

use crate::domain::foundation::{
    EventEnvelope, EventId, FacilityId, SerializableDomainEvent, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{
    CancellationRequested, CancellationSource, Subscription, SubscriptionCanceled,
    SubscriptionError, SubscriptionStatus,
};
use crate::ports::{EventPublisher, PaymentGateway, SubscriptionRepository};

use super::{load_owned, publish_committed};

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub facility_id: FacilityId,
    pub subscription_id: SubscriptionId,
}

#[derive(Debug, Clone)]
pub struct CancelSubscriptionResult {
    pub subscription: Subscription,
    /// When access ends. `None` for trials, which end immediately.
    pub effective_at: Option<Timestamp>,
}

/// Handler for cancellation requests.
///
/// Trials are canceled locally. Billed subscriptions are canceled at the
/// processor at period end and wait in `pending_cancel` for the processor's
/// deletion webhook.
pub struct CancelSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl CancelSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            gateway,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, SubscriptionError> {
        // 1. Find the facility's subscription
        let mut subscription =
            load_owned(&self.repository, &cmd.facility_id, cmd.subscription_id).await?;
        let now = Timestamp::now();
        let previous_status = subscription.status;

        // 2. Cancel (domain logic, processor first for billed subscriptions)
        let (effective_at, event) = match previous_status {
            SubscriptionStatus::Trialing => {
                subscription.cancel_trial(now)?;
                let event = SubscriptionCanceled {
                    event_id: EventId::new(),
                    subscription_id: subscription.id,
                    facility_id: subscription.facility_id,
                    previous_status,
                    source: CancellationSource::Facility,
                    canceled_at: now,
                }
                .to_envelope()?;
                (None, event)
            }
            SubscriptionStatus::Active | SubscriptionStatus::PastDue => {
                let processor_id = subscription.processor_subscription_id.clone().ok_or_else(|| {
                    SubscriptionError::InvalidState(format!(
                        "Subscription {} has no processor subscription",
                        subscription.id
                    ))
                })?;
                self.gateway
                    .cancel_subscription(&processor_id, true)
                    .await
                    .map_err(|e| {
                        tracing::error!(
                            subscription_id = %subscription.id,
                            error = %e,
                            "processor cancellation failed"
                        );
                        SubscriptionError::cancellation_failed()
                    })?;
                subscription.request_cancellation(now)?;
                let effective_at = subscription.current_period_end;
                let event = CancellationRequested {
                    event_id: EventId::new(),
                    subscription_id: subscription.id,
                    facility_id: subscription.facility_id,
                    effective_at,
                    requested_at: now,
                }
                .to_envelope()?;
                (effective_at, event)
            }
            SubscriptionStatus::PendingCancel
            | SubscriptionStatus::Canceled
            | SubscriptionStatus::TrialExpired => return Err(SubscriptionError::AlreadyCanceled),
        };

        // 3. Persist the update
        subscription.version = self.repository.update(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            from = %previous_status,
            to = %subscription.status,
            "subscription cancellation recorded"
        );

        // 4. Publish event
        let events: Vec<EventEnvelope> = vec![event];
        publish_committed(&self.event_publisher, events).await;

        Ok(CancelSubscriptionResult {
            subscription,
            effective_at,
        })
    }
}
