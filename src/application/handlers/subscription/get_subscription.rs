//! GetSubscriptionHandler - Query handler for one of a facility's subscriptions.

use std::sync::Arc;

use crate::domain::foundation::{FacilityId, SubscriptionId};
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

use super::load_owned;

#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    pub facility_id: FacilityId,
    pub subscription_id: SubscriptionId,
}

pub struct GetSubscriptionHandler {
    repository: Arc<dyn SubscriptionRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, query: GetSubscriptionQuery) -> Result<Subscription, SubscriptionError> {
        load_owned(&self.repository, &query.facility_id, query.subscription_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;

    #[tokio::test]
    async fn returns_own_subscription() {
        let fx = Fixture::new();
        let trial = fx.trial(&fx.staff_monthly, 1).await;

        let found = GetSubscriptionHandler::new(fx.repository())
            .handle(GetSubscriptionQuery {
                facility_id: fx.facility_id,
                subscription_id: trial.id,
            })
            .await
            .unwrap();

        assert_eq!(found, trial);
    }

    #[tokio::test]
    async fn hides_other_facilities_subscriptions() {
        let fx = Fixture::new();
        let trial = fx.trial(&fx.staff_monthly, 1).await;

        let err = GetSubscriptionHandler::new(fx.repository())
            .handle(GetSubscriptionQuery {
                facility_id: FacilityId::new(),
                subscription_id: trial.id,
            })
            .await
            .unwrap_err();

        assert_eq!(err, SubscriptionError::NotFound(trial.id));
    }
}
