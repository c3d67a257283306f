//! UpdateSubscriptionHandler - Command handler for price point and payment
//! source changes, including trial conversion.

use std::sync::Arc;

use crate::domain::foundation::{
    BillingIntervalId, EventId, FacilityId, SerializableDomainEvent, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionUpdated};
use crate::ports::{
    BillingCatalog, CreateCustomerRequest, EventPublisher, FacilityDirectory, PaymentGateway,
    SubscriptionRepository,
};

use super::{gateway_failure, load_interval, load_owned, non_blank, publish_committed};

/// Command to change a subscription. Absent fields are left as they are.
#[derive(Debug, Clone)]
pub struct UpdateSubscriptionCommand {
    pub facility_id: FacilityId,
    pub subscription_id: SubscriptionId,
    pub billing_interval_id: Option<BillingIntervalId>,
    pub payment_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateSubscriptionResult {
    pub subscription: Subscription,
    /// True when this update moved a trial onto the processor.
    pub converted_from_trial: bool,
}

/// Handler for subscription updates.
///
/// Three paths:
/// - trial without processor subscription, token given: create the processor
///   subscription and move `trialing -> active`
/// - trial without processor subscription, no token: local price point only
/// - processor subscription: retrieve, apply plan and source, save once
pub struct UpdateSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
    catalog: Arc<dyn BillingCatalog>,
    facilities: Arc<dyn FacilityDirectory>,
    gateway: Arc<dyn PaymentGateway>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl UpdateSubscriptionHandler {
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
        cmd: UpdateSubscriptionCommand,
    ) -> Result<UpdateSubscriptionResult, SubscriptionError> {
        // 1. Load and validate
        let mut subscription =
            load_owned(&self.repository, &cmd.facility_id, cmd.subscription_id).await?;
        if !subscription.is_current() {
            return Err(SubscriptionError::AlreadyCanceled);
        }

        let new_interval = match &cmd.billing_interval_id {
            Some(id) => Some(load_interval(&self.catalog, id).await?),
            None => None,
        };
        let payment_token = non_blank(cmd.payment_token);

        if subscription.module.requires_business_agreement()
            && !self.facilities.has_business_agreement(&cmd.facility_id).await?
        {
            return Err(SubscriptionError::business_agreement_required("updating"));
        }

        let now = Timestamp::now();
        if let Some(interval) = &new_interval {
            subscription.change_billing_interval(interval, now)?;
        }

        // 2. Processor side
        let mut converted_from_trial = false;
        match (subscription.processor_subscription_id.clone(), &payment_token) {
            (None, Some(token)) => {
                let interval = match new_interval {
                    Some(interval) => interval,
                    None => load_interval(&self.catalog, &subscription.billing_interval_id).await?,
                };
                let description = self
                    .facilities
                    .facility_name(&cmd.facility_id)
                    .await?
                    .unwrap_or_else(|| cmd.facility_id.to_string());
                let customer = self
                    .gateway
                    .create_customer(CreateCustomerRequest {
                        payment_token: token.clone(),
                        plan_id: interval.processor_plan_id.clone(),
                        description,
                        trial_end: subscription.trial_end,
                    })
                    .await
                    .map_err(|e| gateway_failure(e, &cmd.facility_id))?;
                subscription.convert_trial(customer.subscription.billing(), now)?;
                converted_from_trial = true;
            }
            (None, None) => {}
            (Some(processor_id), _) => {
                let mut handle = self
                    .gateway
                    .retrieve_subscription(&processor_id)
                    .await
                    .map_err(|e| gateway_failure(e, &cmd.facility_id))?;
                if let Some(interval) = &new_interval {
                    if handle.plan_id.as_deref() != Some(interval.processor_plan_id.as_str()) {
                        handle.set_plan(interval.processor_plan_id.clone());
                    }
                }
                if let Some(token) = &payment_token {
                    handle.set_payment_source(token.clone());
                }
                if handle.has_pending_changes() {
                    self.gateway
                        .update_subscription(&handle)
                        .await
                        .map_err(|e| gateway_failure(e, &cmd.facility_id))?;
                }
            }
        }

        // 3. Persist
        subscription.version = self.repository.update(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            converted_from_trial,
            "subscription updated"
        );

        // 4. Publish event
        let event = SubscriptionUpdated {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            facility_id: subscription.facility_id,
            billing_interval_id: subscription.billing_interval_id,
            payment_source_changed: payment_token.is_some(),
            converted_from_trial,
            updated_at: now,
        }
        .to_envelope()?;
        publish_committed(&self.event_publisher, vec![event]).await;

        Ok(UpdateSubscriptionResult {
            subscription,
            converted_from_trial,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::adapters::memory::InMemorySubscriptionRepository;
    use crate::domain::billing::Module;
    use crate::domain::foundation::DomainError;
    use crate::domain::subscription::SubscriptionStatus;
    use crate::ports::GatewayError;
    use async_trait::async_trait;

    fn handler(fx: &Fixture) -> UpdateSubscriptionHandler {
        UpdateSubscriptionHandler::new(
            fx.repository(),
            fx.catalog(),
            fx.directory(),
            fx.payment_gateway(),
            fx.publisher(),
        )
    }

    fn command(
        fx: &Fixture,
        subscription_id: SubscriptionId,
        interval: Option<BillingIntervalId>,
        token: Option<&str>,
    ) -> UpdateSubscriptionCommand {
        UpdateSubscriptionCommand {
            facility_id: fx.facility_id,
            subscription_id,
            billing_interval_id: interval,
            payment_token: token.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn token_on_trial_converts_to_active() {
        let fx = Fixture::new();
        let trial = fx.trial(&fx.staff_monthly, 3).await;

        let result = handler(&fx)
            .handle(command(&fx, trial.id, None, Some("tok_visa")))
            .await
            .unwrap();

        assert!(result.converted_from_trial);
        let stored = fx.stored(trial.id).await;
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert!(stored.processor_subscription_id.is_some());
        assert_eq!(stored.trial_end, trial.trial_end);
        assert!(!fx.gateway.was_called("retrieve_subscription"));
        assert_eq!(
            fx.gateway.calls()[0].args[3],
            trial.trial_end.unwrap().as_unix_secs().to_string()
        );
    }

    #[tokio::test]
    async fn trial_without_token_changes_price_point_locally() {
        let fx = Fixture::new();
        let trial = fx.trial(&fx.staff_monthly, 3).await;

        let result = handler(&fx)
            .handle(command(&fx, trial.id, Some(fx.staff_yearly.id), None))
            .await
            .unwrap();

        assert!(!result.converted_from_trial);
        let stored = fx.stored(trial.id).await;
        assert_eq!(stored.billing_interval_id, fx.staff_yearly.id);
        assert_eq!(stored.status, SubscriptionStatus::Trialing);
        assert!(fx.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn processor_subscription_gets_plan_and_source_in_one_update() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_live").await;

        handler(&fx)
            .handle(command(&fx, sub.id, Some(fx.staff_yearly.id), Some("tok_new")))
            .await
            .unwrap();

        let changes = fx.gateway.applied_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].1.plan_id.as_deref(), Some("staff_yearly"));
        assert_eq!(changes[0].1.payment_token.as_deref(), Some("tok_new"));
        assert_eq!(fx.stored(sub.id).await.billing_interval_id, fx.staff_yearly.id);
        assert_eq!(fx.event_types(), vec!["subscription.updated.v1"]);
    }

    #[tokio::test]
    async fn same_plan_without_token_sends_nothing() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_live").await;

        handler(&fx)
            .handle(command(&fx, sub.id, Some(fx.staff_monthly.id), None))
            .await
            .unwrap();

        assert!(fx.gateway.was_called("retrieve_subscription"));
        assert!(fx.gateway.applied_changes().is_empty());
    }

    #[tokio::test]
    async fn declined_source_leaves_local_row_untouched() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_live").await;
        fx.gateway.set_method_error(
            "update_subscription",
            GatewayError::card_declined("Your card has insufficient funds."),
        );

        let err = handler(&fx)
            .handle(command(&fx, sub.id, Some(fx.staff_yearly.id), Some("tok_poor")))
            .await
            .unwrap_err();

        assert_eq!(err.field(), Some("payment_token"));
        assert_eq!(err.message(), "Your card has insufficient funds.");
        assert_eq!(fx.stored(sub.id).await, sub);
    }

    #[tokio::test]
    async fn resident_update_requires_business_agreement() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.resident_monthly, "sub_res").await;
        let fx = fx.without_agreement();

        let err = handler(&fx)
            .handle(command(&fx, sub.id, None, Some("tok_visa")))
            .await
            .unwrap_err();

        assert_eq!(
            err.message(),
            "You need to sign a business agreement before updating a resident module subscription."
        );
    }

    #[tokio::test]
    async fn interval_of_other_module_is_rejected() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_live").await;

        let err = handler(&fx)
            .handle(command(&fx, sub.id, Some(fx.trainings_monthly.id), None))
            .await
            .unwrap_err();

        assert_eq!(err.field(), Some("billing_interval"));
        assert!(fx.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn other_facility_sees_not_found() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_live").await;
        let mut cmd = command(&fx, sub.id, None, None);
        cmd.facility_id = FacilityId::new();

        let err = handler(&fx).handle(cmd).await.unwrap_err();

        assert_eq!(err, SubscriptionError::NotFound(sub.id));
    }

    /// Lets another writer commit right after every read.
    struct RacingRepository {
        inner: Arc<InMemorySubscriptionRepository>,
    }

    #[async_trait]
    impl SubscriptionRepository for RacingRepository {
        async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
            self.inner.save(subscription).await
        }

        async fn update(&self, subscription: &Subscription) -> Result<u32, DomainError> {
            self.inner.update(subscription).await
        }

        async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
            let read = self.inner.find_by_id(id).await?;
            if let Some(mut concurrent) = read.clone() {
                concurrent.request_cancellation(Timestamp::now())?;
                self.inner.update(&concurrent).await?;
            }
            Ok(read)
        }

        async fn find_by_processor_id(&self, id: &str) -> Result<Option<Subscription>, DomainError> {
            self.inner.find_by_processor_id(id).await
        }

        async fn list_current(&self, facility_id: &FacilityId) -> Result<Vec<Subscription>, DomainError> {
            self.inner.list_current(facility_id).await
        }

        async fn exists_for_module(
            &self,
            facility_id: &FacilityId,
            module: Module,
        ) -> Result<bool, DomainError> {
            self.inner.exists_for_module(facility_id, module).await
        }

        async fn expire_trials(&self, now: Timestamp) -> Result<Vec<SubscriptionId>, DomainError> {
            self.inner.expire_trials(now).await
        }
    }

    #[tokio::test]
    async fn stale_write_surfaces_conflict() {
        let fx = Fixture::new();
        let sub = fx.active(&fx.staff_monthly, "sub_live").await;
        let handler = UpdateSubscriptionHandler::new(
            Arc::new(RacingRepository {
                inner: fx.subscriptions.clone(),
            }),
            fx.catalog(),
            fx.directory(),
            fx.payment_gateway(),
            fx.publisher(),
        );

        let err = handler
            .handle(command(&fx, sub.id, Some(fx.staff_yearly.id), None))
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::ConcurrentModification(sub.id));
        let stored = fx.stored(sub.id).await;
        assert_eq!(stored.status, SubscriptionStatus::PendingCancel);
        assert_eq!(stored.billing_interval_id, fx.staff_monthly.id);
    }
}
