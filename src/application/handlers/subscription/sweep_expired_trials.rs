//! SweepExpiredTrialsHandler - Moves elapsed trials to `trial_expired`.

use std::sync::Arc;

use crate::domain::foundation::{EventId, SerializableDomainEvent, SubscriptionId, Timestamp};
use crate::domain::subscription::{SubscriptionError, TrialExpired};
use crate::ports::{EventPublisher, SubscriptionRepository};

use super::publish_committed;

#[derive(Debug, Clone, Default)]
pub struct SweepExpiredTrialsResult {
    pub expired: Vec<SubscriptionId>,
}

/// Handler for the periodic trial sweep.
///
/// The repository moves every due row in one conditional statement, so
/// running the sweep twice is harmless.
pub struct SweepExpiredTrialsHandler {
    repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl SweepExpiredTrialsHandler {
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            repository,
            event_publisher,
        }
    }

    pub async fn handle(&self, now: Timestamp) -> Result<SweepExpiredTrialsResult, SubscriptionError> {
        let expired = self.repository.expire_trials(now).await?;

        tracing::info!(count = expired.len(), "expired trial sweep finished");

        let events = expired
            .iter()
            .map(|id| {
                TrialExpired {
                    event_id: EventId::new(),
                    subscription_id: *id,
                    expired_at: now,
                }
                .to_envelope()
            })
            .collect::<Result<Vec<_>, _>>()?;
        publish_committed(&self.event_publisher, events).await;

        Ok(SweepExpiredTrialsResult { expired })
    }
}
