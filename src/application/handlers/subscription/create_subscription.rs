//! CreateSubscriptionHandler - Command handler for paid signups.

use std::sync::Arc;

use crate::domain::foundation::{
    BillingIntervalId, EventId, FacilityId, SerializableDomainEvent, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{
    CancellationSource, Subscription, SubscriptionCanceled, SubscriptionError,
    SubscriptionStarted, SubscriptionStatus,
};
use crate::ports::{
    BillingCatalog, CreateCustomerRequest, EventPublisher, FacilityDirectory, PaymentGateway,
    SubscriptionRepository,
};

use super::{gateway_failure, load_interval, non_blank, publish_committed};

/// Command to start a paid subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub facility_id: FacilityId,
    pub billing_interval_id: BillingIntervalId,
    pub payment_token: Option<String>,
}

/// Result of a successful signup.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    pub subscription: Subscription,
    /// Trial for the same module that this subscription replaced.
    pub superseded_trial: Option<Subscription>,
}

/// Handler for paid signups.
///
/// The processor is charged first; nothing is stored if it refuses. A running
/// trial for the same module hands its remaining trial period to the processor
/// and is canceled once the processor accepted the new subscription.
pub struct CreateSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    catalog: Arc<dyn BillingCatalog>,
    facilities: Arc<dyn FacilityDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl CreateSubscriptionHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        catalog: Arc<dyn BillingCatalog>,
        facilities: Arc<dyn FacilityDirectory>,
        gateway: Arc<dyn PaymentGateway>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            catalog,
            facilities,
            gateway,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, SubscriptionError> {
        // 1. Validate input
        let interval = load_interval(&self.catalog, &cmd.billing_interval_id).await?;
        let payment_token = non_blank(cmd.payment_token)
            .ok_or_else(|| SubscriptionError::field_required("payment_token"))?;
        let module = interval.module();

        // 2. At most one current subscription per module; a trial may be superseded
        let current = self.repository.list_current(&cmd.facility_id).await?;
        let mut trial = None;
        if let Some(existing) = current.into_iter().find(|s| s.module == module) {
            if existing.status != SubscriptionStatus::Trialing {
                return Err(SubscriptionError::duplicate_module(module));
            }
            trial = Some(existing);
        }

        if module.requires_business_agreement()
            && !self.facilities.has_business_agreement(&cmd.facility_id).await?
        {
            return Err(SubscriptionError::business_agreement_required("starting"));
        }

        // 3. Charge through the processor
        let description = self
            .facilities
            .facility_name(&cmd.facility_id)
            .await?
            .unwrap_or_else(|| cmd.facility_id.to_string());
        let customer = self
            .gateway
            .create_customer(CreateCustomerRequest {
                payment_token,
                plan_id: interval.processor_plan_id.clone(),
                description,
                trial_end: trial.as_ref().and_then(|t| t.trial_end),
            })
            .await
            .map_err(|e| gateway_failure(e, &cmd.facility_id))?;

        // 4. Persist the new subscription, then retire the trial
        let now = Timestamp::now();
        let subscription = Subscription::start_paid(
            cmd.facility_id,
            &interval,
            customer.subscription.billing(),
            now,
        );
        self.repository.save(&subscription).await.map_err(|e| {
            tracing::error!(
                facility_id = %cmd.facility_id,
                processor_subscription_id = %customer.subscription.id,
                error = %e,
                "processor subscription created but not stored"
            );
            SubscriptionError::from(e)
        })?;

        let superseded_trial = match trial {
            Some(mut trial) => {
                trial.cancel_trial(now)?;
                trial.version = self.repository.update(&trial).await?;
                Some(trial)
            }
            None => None,
        };

        tracing::info!(
            subscription_id = %subscription.id,
            facility_id = %subscription.facility_id,
            module = %module,
            "subscription started"
        );

        // 5. Publish events
        let superseded_id: Option<SubscriptionId> = superseded_trial.as_ref().map(|t| t.id);
        let mut events = vec![SubscriptionStarted::from_subscription(&subscription, superseded_id)
            .to_envelope()?];
        if let Some(trial) = &superseded_trial {
            events.push(
                SubscriptionCanceled {
                    event_id: EventId::new(),
                    subscription_id: trial.id,
                    facility_id: trial.facility_id,
                    previous_status: SubscriptionStatus::Trialing,
                    source: CancellationSource::Superseded,
                    canceled_at: now,
                }
                .to_envelope()?,
            );
        }
        publish_committed(&self.event_publisher, events).await;

        Ok(CreateSubscriptionResult {
            subscription,
            superseded_trial,
        })
    }
}
