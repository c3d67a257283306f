//! Subscription status state machine.
//!
//! Defines the six subscription states and the edges between them. User
//! actions, webhook reconciliation and the trial sweep all move a subscription
//! through this machine.

use crate::domain::foundation::{StateMachine, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Time-boxed trial. No processor subscription unless converted.
    Trialing,

    /// Trial window elapsed without conversion. Terminal.
    TrialExpired,

    /// Billing normally through the processor.
    Active,

    /// Processor failed to collect the latest invoice.
    PastDue,

    /// Canceled. Terminal.
    Canceled,

    /// Cancellation requested; billable until the end of the current period.
    PendingCancel,
}

impl SubscriptionStatus {
    pub const ALL: [SubscriptionStatus; 6] = [
        SubscriptionStatus::Trialing,
        SubscriptionStatus::TrialExpired,
        SubscriptionStatus::Active,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Canceled,
        SubscriptionStatus::PendingCancel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::TrialExpired => "trial_expired",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PendingCancel => "pending_cancel",
        }
    }

    /// Returns true unless the subscription is canceled or its trial expired.
    ///
    /// `pending_cancel` stays current until the period ends and `past_due`
    /// stays current while the processor retries collection.
    pub fn is_current(&self) -> bool {
        !matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::TrialExpired
        )
    }

    /// Statuses that grant entitlement without further checks.
    ///
    /// `trialing` grants entitlement only inside the trial window, which the
    /// aggregate checks.
    pub fn is_billable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::PendingCancel
        )
    }

    /// Statuses from which a facility may cancel on its own.
    pub fn is_user_cancelable(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trialing | SubscriptionStatus::Active | SubscriptionStatus::PastDue
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown status '{}'", s))
            })
    }
}

impl StateMachine for SubscriptionStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, target),
            // From TRIALING
            (Trialing, Canceled)
                | (Trialing, TrialExpired)
                | (Trialing, Active) // Converted to paid billing
            // From ACTIVE
                | (Active, PastDue)
                | (Active, PendingCancel)
                | (Active, Canceled) // Processor-side deletion
            // From PAST_DUE
                | (PastDue, Active)
                | (PastDue, PendingCancel)
                | (PastDue, Canceled)
            // From PENDING_CANCEL
                | (PendingCancel, Canceled)
                | (PendingCancel, Active) // Un-canceled processor-side
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use SubscriptionStatus::*;
        match self {
            Trialing => vec![Canceled, TrialExpired, Active],
            Active => vec![PastDue, PendingCancel, Canceled],
            PastDue => vec![Active, PendingCancel, Canceled],
            PendingCancel => vec![Canceled, Active],
            Canceled | TrialExpired => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn trialing_can_be_canceled_directly() {
        let status = SubscriptionStatus::Trialing;
        assert_eq!(
            status.transition_to(SubscriptionStatus::Canceled),
            Ok(SubscriptionStatus::Canceled)
        );
    }

    #[test]
    fn trialing_can_convert_to_active() {
        assert!(SubscriptionStatus::Trialing.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn trialing_cannot_go_past_due() {
        let result = SubscriptionStatus::Trialing.transition_to(SubscriptionStatus::PastDue);
        assert!(result.is_err());
    }

    #[test]
    fn active_and_past_due_alternate() {
        assert!(SubscriptionStatus::Active.can_transition_to(&SubscriptionStatus::PastDue));
        assert!(SubscriptionStatus::PastDue.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn pending_cancel_can_revert_to_active() {
        assert!(SubscriptionStatus::PendingCancel.can_transition_to(&SubscriptionStatus::Active));
    }

    #[test]
    fn pending_cancel_cannot_go_past_due() {
        assert!(!SubscriptionStatus::PendingCancel.can_transition_to(&SubscriptionStatus::PastDue));
    }

    #[test]
    fn canceled_and_trial_expired_are_terminal() {
        assert!(SubscriptionStatus::Canceled.is_terminal());
        assert!(SubscriptionStatus::TrialExpired.is_terminal());
        assert!(!SubscriptionStatus::PendingCancel.is_terminal());
    }

    #[test]
    fn is_current_excludes_only_canceled_and_trial_expired() {
        let current: Vec<_> = SubscriptionStatus::ALL
            .into_iter()
            .filter(SubscriptionStatus::is_current)
            .collect();
        assert_eq!(
            current,
            vec![
                SubscriptionStatus::Trialing,
                SubscriptionStatus::Active,
                SubscriptionStatus::PastDue,
                SubscriptionStatus::PendingCancel,
            ]
        );
    }

    #[test]
    fn user_cancelable_statuses() {
        assert!(SubscriptionStatus::Trialing.is_user_cancelable());
        assert!(SubscriptionStatus::PastDue.is_user_cancelable());
        assert!(!SubscriptionStatus::PendingCancel.is_user_cancelable());
        assert!(!SubscriptionStatus::Canceled.is_user_cancelable());
    }

    #[test]
    fn parses_from_storage_string() {
        for status in SubscriptionStatus::ALL {
            assert_eq!(status.as_str().parse::<SubscriptionStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<SubscriptionStatus>().is_err());
    }

    fn any_status() -> impl Strategy<Value = SubscriptionStatus> {
        prop::sample::select(SubscriptionStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn valid_transitions_agree_with_can_transition_to(
            from in any_status(),
            to in any_status(),
        ) {
            prop_assert_eq!(
                from.can_transition_to(&to),
                from.valid_transitions().contains(&to)
            );
        }

        #[test]
        fn no_edge_leaves_a_terminal_state(from in any_status(), to in any_status()) {
            if from.is_terminal() {
                prop_assert!(from.transition_to(to).is_err());
            }
        }

        #[test]
        fn no_self_transitions(status in any_status()) {
            prop_assert!(!status.can_transition_to(&status));
        }
    }
}
