//! StartTrialHandler - Command handler for trial signups.

use std::sync::Arc;

use crate::domain::foundation::{BillingIntervalId, FacilityId, SerializableDomainEvent, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionError, TrialStarted};
use crate::ports::{BillingCatalog, EventPublisher, PaymentMethodStore, SubscriptionRepository};

use super::{load_interval, non_blank, publish_committed};

/// Command to start a trial.
#[derive(Debug, Clone)]
pub struct StartTrialCommand {
    pub facility_id: FacilityId,
    pub billing_interval_id: BillingIntervalId,
    pub payment_token: Option<String>,
    /// Staff trials may skip the payment method when set.
    pub no_payment: bool,
}

#[derive(Debug, Clone)]
pub struct StartTrialResult {
    pub subscription: Subscription,
    pub payment_method_captured: bool,
}

/// Handler for trial signups. Trials never touch the processor.
pub struct StartTrialHandler {
    repository: Arc<dyn SubscriptionRepository>,
    catalog: Arc<dyn BillingCatalog>,
    payment_methods: Arc<dyn PaymentMethodStore>,
    event_publisher: Arc<dyn EventPublisher>,
    trial_length_days: i64,
}

impl StartTrialHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        catalog: Arc<dyn BillingCatalog>,
        payment_methods: Arc<dyn PaymentMethodStore>,
        event_publisher: Arc<dyn EventPublisher>,
        trial_length_days: i64,
    ) -> Self {
        Self {
            repository,
            catalog,
            payment_methods,
            event_publisher,
            trial_length_days,
        }
    }

    pub async fn handle(&self, cmd: StartTrialCommand) -> Result<StartTrialResult, SubscriptionError> {
        // 1. Validate input
        let interval = load_interval(&self.catalog, &cmd.billing_interval_id).await?;
        let module = interval.module();
        let payment_token = non_blank(cmd.payment_token);

        if module.trial_requires_payment() && payment_token.is_none() && !cmd.no_payment {
            return Err(SubscriptionError::field_required("payment_token"));
        }

        // 2. One trial per module, ever
        if self
            .repository
            .exists_for_module(&cmd.facility_id, module)
            .await?
        {
            return Err(SubscriptionError::trial_ineligible());
        }

        // 3. Persist
        let now = Timestamp::now();
        let subscription =
            Subscription::start_trial(cmd.facility_id, &interval, now, self.trial_length_days);
        self.repository.save(&subscription).await?;

        let captured = match payment_token {
            Some(token) if !cmd.no_payment => {
                self.payment_methods.upsert(&cmd.facility_id, &token).await?;
                true
            }
            _ => false,
        };

        tracing::info!(
            subscription_id = %subscription.id,
            facility_id = %subscription.facility_id,
            module = %module,
            payment_method_captured = captured,
            "trial started"
        );

        // 4. Publish event
        let event = TrialStarted::from_subscription(&subscription, captured).to_envelope()?;
        publish_committed(&self.event_publisher, vec![event]).await;

        Ok(StartTrialResult {
            subscription,
            payment_method_captured: captured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::domain::subscription::SubscriptionStatus;

    fn handler(fx: &Fixture) -> StartTrialHandler {
        StartTrialHandler::new(fx.repository(), fx.catalog(), fx.methods(), fx.publisher(), 30)
    }

    fn command(
        fx: &Fixture,
        interval_id: BillingIntervalId,
        token: Option<&str>,
        no_payment: bool,
    ) -> StartTrialCommand {
        StartTrialCommand {
            facility_id: fx.facility_id,
            billing_interval_id: interval_id,
            payment_token: token.map(str::to_string),
            no_payment,
        }
    }

    #[tokio::test]
    async fn staff_trial_without_token_is_rejected_before_any_write() {
        let fx = Fixture::new();

        let err = handler(&fx)
            .handle(command(&fx, fx.staff_monthly.id, None, false))
            .await
            .unwrap_err();

        assert_eq!(err.field(), Some("payment_token"));
        assert_eq!(err.message(), "This field is required.");
        assert!(fx.subscriptions.all().is_empty());
        assert!(fx.payment_methods.find(&fx.facility_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn staff_trial_with_token_stores_payment_method() {
        let fx = Fixture::new();

        let result = handler(&fx)
            .handle(command(&fx, fx.staff_monthly.id, Some("tok_visa"), false))
            .await
            .unwrap();

        let sub = result.subscription;
        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert!(sub.processor_subscription_id.is_none());
        let (start, end) = (sub.trial_start.unwrap(), sub.trial_end.unwrap());
        assert_eq!(end, start.add_days(30));
        assert!(result.payment_method_captured);
        assert_eq!(
            fx.payment_methods.find(&fx.facility_id).await.unwrap().as_deref(),
            Some("tok_visa")
        );
        assert_eq!(fx.event_types(), vec!["subscription.trial_started.v1"]);
    }

    #[tokio::test]
    async fn no_payment_skips_token_requirement_and_storage() {
        let fx = Fixture::new();

        let result = handler(&fx)
            .handle(command(&fx, fx.staff_monthly.id, Some("tok_visa"), true))
            .await
            .unwrap();

        assert!(!result.payment_method_captured);
        assert!(fx.payment_methods.find(&fx.facility_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn non_staff_trial_needs_no_token() {
        let fx = Fixture::new();

        let result = handler(&fx)
            .handle(command(&fx, fx.trainings_monthly.id, None, false))
            .await
            .unwrap();

        assert_eq!(result.subscription.status, SubscriptionStatus::Trialing);
    }

    #[tokio::test]
    async fn facility_with_any_prior_subscription_is_ineligible() {
        let fx = Fixture::new();
        let mut old = fx.trial(&fx.trainings_monthly, 60).await;
        old.expire_trial(Timestamp::now()).unwrap();
        fx.subscriptions.update(&old).await.unwrap();

        let err = handler(&fx)
            .handle(command(&fx, fx.trainings_monthly.id, None, false))
            .await
            .unwrap_err();

        assert_eq!(
            err.message(),
            "Your facility is ineligible to start a trial subscription."
        );
        assert_eq!(fx.subscriptions.all().len(), 1);
    }
}
