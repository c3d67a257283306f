//! CheckEntitlementHandler - Query handler deciding whether a facility may use
//! a module right now.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::billing::Module;
use crate::domain::foundation::{FacilityId, SubscriptionId, Timestamp};
use crate::domain::subscription::{SubscriptionError, SubscriptionStatus};
use crate::ports::{FacilityDirectory, SubscriptionRepository};

#[derive(Debug, Clone)]
pub struct CheckEntitlementQuery {
    pub facility_id: FacilityId,
    pub module: Module,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckEntitlementResult {
    pub module: Module,
    pub entitled: bool,
    pub subscription_id: Option<SubscriptionId>,
    pub status: Option<SubscriptionStatus>,
}

/// Entitlement is evaluated at read time: `active` and `pending_cancel`
/// qualify, `trialing` only inside its window, `past_due` never. Resident
/// access also needs a signed business agreement.
pub struct CheckEntitlementHandler {
    repository: Arc<dyn SubscriptionRepository>,
    facilities: Arc<dyn FacilityDirectory>,
}

impl CheckEntitlementHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        facilities: Arc<dyn FacilityDirectory>,
    ) -> Self {
        Self {
            repository,
            facilities,
        }
    }

    pub async fn handle(
        &self,
        query: CheckEntitlementQuery,
    ) -> Result<CheckEntitlementResult, SubscriptionError> {
        let current = self
            .repository
            .list_current(&query.facility_id)
            .await?
            .into_iter()
            .find(|s| s.module == query.module);

        let Some(subscription) = current else {
            return Ok(CheckEntitlementResult {
                module: query.module,
                entitled: false,
                subscription_id: None,
                status: None,
            });
        };

        let has_agreement = if query.module.requires_business_agreement() {
            self.facilities
                .has_business_agreement(&query.facility_id)
                .await?
        } else {
            true
        };

        Ok(CheckEntitlementResult {
            module: query.module,
            entitled: subscription.grants_entitlement(Timestamp::now(), has_agreement),
            subscription_id: Some(subscription.id),
            status: Some(subscription.status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;

    fn handler(fx: &Fixture) -> CheckEntitlementHandler {
        CheckEntitlementHandler::new(fx.repository(), fx.directory())
    }

    fn query(fx: &Fixture, module: Module) -> CheckEntitlementQuery {
        CheckEntitlementQuery {
            facility_id: fx.facility_id,
            module,
        }
    }

    #[tokio::test]
    async fn no_subscription_means_no_entitlement() {
        let fx = Fixture::new();

        let result = handler(&fx).handle(query(&fx, Module::Staff)).await.unwrap();

        assert!(!result.entitled);
        assert!(result.subscription_id.is_none());
    }

    #[tokio::test]
    async fn running_trial_is_entitled_until_its_end() {
        let fx = Fixture::new();
        fx.trial(&fx.staff_monthly, 29).await;

        let result = handler(&fx).handle(query(&fx, Module::Staff)).await.unwrap();

        assert!(result.entitled);
        assert_eq!(result.status, Some(SubscriptionStatus::Trialing));
    }

    #[tokio::test]
    async fn unswept_elapsed_trial_is_not_entitled() {
        let fx = Fixture::new();
        fx.trial(&fx.staff_monthly, 31).await;

        let result = handler(&fx).handle(query(&fx, Module::Staff)).await.unwrap();

        assert!(!result.entitled);
    }

    #[tokio::test]
    async fn past_due_is_current_but_not_entitled() {
        let fx = Fixture::new();
        let mut sub = fx.active(&fx.staff_monthly, "sub_1").await;
        sub.reconcile(Some(SubscriptionStatus::PastDue), None, None, Timestamp::now());
        fx.subscriptions.update(&sub).await.unwrap();

        let result = handler(&fx).handle(query(&fx, Module::Staff)).await.unwrap();

        assert!(!result.entitled);
        assert_eq!(result.status, Some(SubscriptionStatus::PastDue));
    }

    #[tokio::test]
    async fn resident_access_needs_business_agreement() {
        let fx = Fixture::new();
        fx.active(&fx.resident_monthly, "sub_res").await;
        assert!(handler(&fx).handle(query(&fx, Module::Resident)).await.unwrap().entitled);

        let fx = fx.without_agreement();
        let result = handler(&fx).handle(query(&fx, Module::Resident)).await.unwrap();

        assert!(!result.entitled);
    }
}
