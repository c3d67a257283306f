//! GetCurrentSubscriptionsHandler - Query handler for a facility's current
//! subscriptions.

use std::sync::Arc;

use crate::domain::billing::Module;
use crate::domain::foundation::FacilityId;
use crate::domain::subscription::{Subscription, SubscriptionError};
use crate::ports::SubscriptionRepository;

#[derive(Debug, Clone)]
pub struct GetCurrentSubscriptionsQuery {
    pub facility_id: FacilityId,
    /// Restrict to one module.
    pub module: Option<Module>,
}

/// Lists subscriptions that are neither canceled nor expired trials, newest
/// first. With a module filter the first entry is "the" current subscription.
pub struct GetCurrentSubscriptionsHandler {
    repository: Arc<dyn SubscriptionRepository>,
}

impl GetCurrentSubscriptionsHandler {
    pub fn new(repository: Arc<dyn SubscriptionRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(
        &self,
        query: GetCurrentSubscriptionsQuery,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let current = self.repository.list_current(&query.facility_id).await?;
        Ok(match query.module {
            Some(module) => current.into_iter().filter(|s| s.module == module).collect(),
            None => current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[tokio::test]
    async fn filters_by_module_and_skips_ended() {
        let fx = Fixture::new();
        let staff = fx.trial(&fx.staff_monthly, 1).await;
        let mut ended = fx.trial(&fx.trainings_monthly, 1).await;
        ended.cancel_trial(Timestamp::now()).unwrap();
        fx.subscriptions.update(&ended).await.unwrap();
        let handler = GetCurrentSubscriptionsHandler::new(fx.repository());

        let all = handler
            .handle(GetCurrentSubscriptionsQuery {
                facility_id: fx.facility_id,
                module: None,
            })
            .await
            .unwrap();
        let resident = handler
            .handle(GetCurrentSubscriptionsQuery {
                facility_id: fx.facility_id,
                module: Some(Module::Resident),
            })
            .await
            .unwrap();

        assert_eq!(all.iter().map(|s| s.id).collect::<Vec<_>>(), vec![staff.id]);
        assert!(resident.is_empty());
    }
}
