//! SubscriptionActivityRecorder - activity stream entries for new subscriptions.
//!
//! Listens for `subscription.started` and `subscription.trial_started` and
//! writes one structured `activity` log line per facility action.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, EventEnvelope};
use crate::domain::subscription::{SubscriptionStarted, TrialStarted};
use crate::ports::EventHandler;

const STARTED: &str = "subscription.started.v1";
const TRIAL_STARTED: &str = "subscription.trial_started.v1";

/// Event types the recorder subscribes to.
pub const ACTIVITY_EVENT_TYPES: [&str; 2] = [STARTED, TRIAL_STARTED];

/// Records "started subscription" and "started trial subscription" activity.
#[derive(Debug, Default)]
pub struct SubscriptionActivityRecorder;

impl SubscriptionActivityRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for SubscriptionActivityRecorder {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
        match event.event_type.as_str() {
            STARTED => {
                let started: SubscriptionStarted = event.payload_as().map_err(malformed)?;
                tracing::info!(
                    target: "activity",
                    facility_id = %started.facility_id,
                    subscription_id = %started.subscription_id,
                    module = %started.module,
                    verb = "started subscription",
                    "facility activity"
                );
            }
            TRIAL_STARTED => {
                let started: TrialStarted = event.payload_as().map_err(malformed)?;
                tracing::info!(
                    target: "activity",
                    facility_id = %started.facility_id,
                    subscription_id = %started.subscription_id,
                    module = %started.module,
                    verb = "started trial subscription",
                    "facility activity"
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SubscriptionActivityRecorder"
    }
}

fn malformed(err: serde_json::Error) -> DomainError {
    DomainError::new(ErrorCode::InvalidFormat, format!("Malformed activity event: {}", err))
}
