//! Subscription domain events.
//!
//! Published by the application handlers after the state change committed.
//! The notification layer subscribes to them for activity logging and email.
//!
//! - `SubscriptionStarted` - Paid subscription created
//! - `TrialStarted` - Trial subscription created
//! - `SubscriptionUpdated` - Price point or payment source changed
//! - `CancellationRequested` - Facility asked to cancel at period end
//! - `SubscriptionCanceled` - Subscription reached `canceled`
//! - `SubscriptionReactivated` - Back to `active` from `past_due` or `pending_cancel`
//! - `SubscriptionPastDue` - Processor failed to collect
//! - `TrialExpired` - Trial swept after its window elapsed

use serde::{Deserialize, Serialize};

use crate::domain::billing::Module;
use crate::domain::foundation::{
    domain_event, BillingIntervalId, EventId, FacilityId, SubscriptionId, Timestamp,
};

use super::{Subscription, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════
// SubscriptionStarted
// ════════════════════════════════════════════════════════════════════════════

/// Published when a paid subscription is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStarted {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,
    pub module: Module,
    pub billing_interval_id: BillingIntervalId,
    pub processor_subscription_id: Option<String>,

    /// Trial that this subscription replaced, if any.
    pub superseded_trial_id: Option<SubscriptionId>,

    pub started_at: Timestamp,
}

domain_event!(
    SubscriptionStarted,
    event_type = "subscription.started.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = started_at,
    event_id = event_id
);

impl SubscriptionStarted {
    pub fn from_subscription(
        subscription: &Subscription,
        superseded_trial_id: Option<SubscriptionId>,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            facility_id: subscription.facility_id,
            module: subscription.module,
            billing_interval_id: subscription.billing_interval_id,
            processor_subscription_id: subscription.processor_subscription_id.clone(),
            superseded_trial_id,
            started_at: subscription.created_at,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TrialStarted
// ════════════════════════════════════════════════════════════════════════════

/// Published when a trial subscription is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStarted {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,
    pub module: Module,
    pub billing_interval_id: BillingIntervalId,
    pub trial_end: Option<Timestamp>,

    /// Whether a payment method was stored with the trial.
    pub payment_method_captured: bool,

    pub started_at: Timestamp,
}

domain_event!(
    TrialStarted,
    event_type = "subscription.trial_started.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = started_at,
    event_id = event_id
);

impl TrialStarted {
    pub fn from_subscription(subscription: &Subscription, payment_method_captured: bool) -> Self {
        Self {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            facility_id: subscription.facility_id,
            module: subscription.module,
            billing_interval_id: subscription.billing_interval_id,
            trial_end: subscription.trial_end,
            payment_method_captured,
            started_at: subscription.created_at,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// SubscriptionUpdated
// ════════════════════════════════════════════════════════════════════════════

/// Published when a facility changes its price point or payment source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUpdated {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,
    pub billing_interval_id: BillingIntervalId,
    pub payment_source_changed: bool,

    /// True when the update created the processor subscription for a trial.
    pub converted_from_trial: bool,

    pub updated_at: Timestamp,
}

domain_event!(
    SubscriptionUpdated,
    event_type = "subscription.updated.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = updated_at,
    event_id = event_id
);

// ════════════════════════════════════════════════════════════════════════════
// CancellationRequested
// ════════════════════════════════════════════════════════════════════════════

/// Published when a paid subscription moves to `pending_cancel`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationRequested {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,

    /// End of the period the facility already paid for.
    pub effective_at: Option<Timestamp>,

    pub requested_at: Timestamp,
}

domain_event!(
    CancellationRequested,
    event_type = "subscription.cancel_requested.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = requested_at,
    event_id = event_id
);

// ════════════════════════════════════════════════════════════════════════════
// SubscriptionCanceled
// ════════════════════════════════════════════════════════════════════════════

/// Who ended the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationSource {
    /// The facility canceled a trial.
    Facility,
    /// The processor deleted the subscription.
    Processor,
    /// A paid signup replaced the trial.
    Superseded,
}

/// Published when a subscription reaches `canceled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionCanceled {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,
    pub previous_status: SubscriptionStatus,
    pub source: CancellationSource,
    pub canceled_at: Timestamp,
}

domain_event!(
    SubscriptionCanceled,
    event_type = "subscription.canceled.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = canceled_at,
    event_id = event_id
);

// ════════════════════════════════════════════════════════════════════════════
// SubscriptionReactivated
// ════════════════════════════════════════════════════════════════════════════

/// Published when the processor reports the subscription active again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionReactivated {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,
    pub previous_status: SubscriptionStatus,
    pub reactivated_at: Timestamp,
}

domain_event!(
    SubscriptionReactivated,
    event_type = "subscription.reactivated.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = reactivated_at,
    event_id = event_id
);

// ════════════════════════════════════════════════════════════════════════════
// SubscriptionPastDue
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionPastDue {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub facility_id: FacilityId,
    pub occurred_at: Timestamp,
}

domain_event!(
    SubscriptionPastDue,
    event_type = "subscription.past_due.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = occurred_at,
    event_id = event_id
);

// ════════════════════════════════════════════════════════════════════════════
// TrialExpired
// ════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialExpired {
    pub event_id: EventId,
    pub subscription_id: SubscriptionId,
    pub expired_at: Timestamp,
}

domain_event!(
    TrialExpired,
    event_type = "subscription.trial_expired.v1",
    schema_version = 1,
    aggregate_id = subscription_id,
    aggregate_type = "Subscription",
    occurred_at = expired_at,
    event_id = event_id
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{BillingInterval, IntervalUnit, Plan};
    use crate::domain::foundation::{DomainEvent, SerializableDomainEvent};
    use rust_decimal::Decimal;

    fn trial() -> Subscription {
        let plan = Plan::new("Staff", Module::Staff, None).unwrap();
        let interval =
            BillingInterval::new(plan, Decimal::from(10), IntervalUnit::Month, 1, "plan_s").unwrap();
        Subscription::start_trial(FacilityId::new(), &interval, Timestamp::now(), 30)
    }

    #[test]
    fn trial_started_copies_subscription_fields() {
        let sub = trial();
        let event = TrialStarted::from_subscription(&sub, true);

        assert_eq!(event.subscription_id, sub.id);
        assert_eq!(event.trial_end, sub.trial_end);
        assert_eq!(event.event_type(), "subscription.trial_started.v1");
        assert_eq!(event.aggregate_id(), sub.id.to_string());
    }

    #[test]
    fn subscription_started_envelope_has_payload() {
        let sub = trial();
        let event = SubscriptionStarted::from_subscription(&sub, None);
        let envelope = event.to_envelope().unwrap();

        assert_eq!(envelope.event_type, "subscription.started.v1");
        assert_eq!(envelope.aggregate_type, "Subscription");
        assert_eq!(envelope.payload["module"], "staff");
    }

    #[test]
    fn canceled_event_serializes_source_snake_case() {
        let event = SubscriptionCanceled {
            event_id: EventId::new(),
            subscription_id: SubscriptionId::new(),
            facility_id: FacilityId::new(),
            previous_status: SubscriptionStatus::PendingCancel,
            source: CancellationSource::Processor,
            canceled_at: Timestamp::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["source"], "processor");
        assert_eq!(json["previous_status"], "pending_cancel");
    }
}
