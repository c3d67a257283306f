//! Subscription aggregate entity.
//!
//! A facility holds many subscriptions over time but at most one current
//! subscription per module. Cancellation is a status, rows are never deleted.
//!
//! # Design Decisions
//!
//! - **Processor after trial**: trials carry no processor subscription until
//!   they convert, and converting is an explicit `trialing -> active` edge
//! - **Optimistic locking**: `version` is the value read from storage; the
//!   repository only writes when the stored version still matches
//! - **Entitlement at read time**: the trial window and business agreement are
//!   checked when entitlement is asked for, not cached on the row

use crate::domain::billing::{BillingInterval, Module};
use crate::domain::foundation::{
    BillingIntervalId, DomainError, ErrorCode, FacilityId, StateMachine, SubscriptionId,
    Timestamp,
};
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Billing fields reported by the processor for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorBilling {
    pub processor_subscription_id: String,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
}

/// Result of applying a processor-reported status to a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Status already matched (or the processor reported nothing to mirror).
    Unchanged,

    /// Status moved along a valid edge.
    Transitioned {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },

    /// The machine has no edge for the reported status. Periods were still refreshed.
    Rejected {
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    },
}

/// Subscription aggregate.
///
/// # Invariants
///
/// - `processor_subscription_id` is `None` only for trials (running, canceled
///   or expired) that never billed
/// - Status changes follow `SubscriptionStatus` edges
/// - `module` always matches the module of `billing_interval_id`'s plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub facility_id: FacilityId,
    pub billing_interval_id: BillingIntervalId,
    pub module: Module,
    pub status: SubscriptionStatus,
    pub processor_subscription_id: Option<String>,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,

    /// Storage version this instance was read at.
    pub version: u32,
}

impl Subscription {
    /// Create a paid subscription after the processor accepted it.
    pub fn start_paid(
        facility_id: FacilityId,
        billing_interval: &BillingInterval,
        billing: ProcessorBilling,
        now: Timestamp,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            facility_id,
            billing_interval_id: billing_interval.id,
            module: billing_interval.module(),
            status: SubscriptionStatus::Active,
            processor_subscription_id: Some(billing.processor_subscription_id),
            current_period_start: billing.current_period_start,
            current_period_end: billing.current_period_end,
            trial_start: billing.trial_start,
            trial_end: billing.trial_end,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Create a trial. No processor subscription exists yet.
    pub fn start_trial(
        facility_id: FacilityId,
        billing_interval: &BillingInterval,
        now: Timestamp,
        trial_length_days: i64,
    ) -> Self {
        Self {
            id: SubscriptionId::new(),
            facility_id,
            billing_interval_id: billing_interval.id,
            module: billing_interval.module(),
            status: SubscriptionStatus::Trialing,
            processor_subscription_id: None,
            current_period_start: None,
            current_period_end: None,
            trial_start: Some(now),
            trial_end: Some(now.add_days(trial_length_days)),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn has_processor_subscription(&self) -> bool {
        self.processor_subscription_id.is_some()
    }

    pub fn is_current(&self) -> bool {
        self.status.is_current()
    }

    /// Returns true if the trial window is still open at `now` (inclusive).
    pub fn is_in_trial_window(&self, now: Timestamp) -> bool {
        self.status == SubscriptionStatus::Trialing
            && self.trial_end.map_or(false, |end| !end.is_before(&now))
    }

    /// Whether this subscription entitles the facility to its module at `now`.
    ///
    /// `past_due` does not grant entitlement. Resident subscriptions also need
    /// a signed business agreement.
    pub fn grants_entitlement(&self, now: Timestamp, has_business_agreement: bool) -> bool {
        if self.module.requires_business_agreement() && !has_business_agreement {
            return false;
        }
        self.status.is_billable() || self.is_in_trial_window(now)
    }

    /// Whether the trial sweep should expire this subscription at `now`.
    ///
    /// `trial_end == now` counts as elapsed. A trial whose billing period is
    /// still running was converted and is left alone.
    pub fn is_expired_trial(&self, now: Timestamp) -> bool {
        if self.status != SubscriptionStatus::Trialing {
            return false;
        }
        let elapsed = self.trial_end.map_or(false, |end| !end.is_after(&now));
        let billing_running = self
            .current_period_end
            .map_or(false, |end| end.is_after(&now));
        elapsed && !billing_running
    }

    /// Attach a freshly created processor subscription to a trial.
    ///
    /// # Errors
    ///
    /// Returns error if the subscription already bills through the processor
    /// or is not trialing.
    pub fn convert_trial(&mut self, billing: ProcessorBilling, now: Timestamp) -> Result<(), DomainError> {
        if self.has_processor_subscription() {
            return Err(DomainError::new(
                ErrorCode::InvalidStateTransition,
                format!("Subscription {} already has a processor subscription", self.id),
            ));
        }
        self.transition_to(SubscriptionStatus::Active)?;
        self.processor_subscription_id = Some(billing.processor_subscription_id);
        self.current_period_start = billing.current_period_start;
        self.current_period_end = billing.current_period_end;
        if billing.trial_start.is_some() {
            self.trial_start = billing.trial_start;
        }
        if billing.trial_end.is_some() {
            self.trial_end = billing.trial_end;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Switch to another price point of the same module.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the interval belongs to another module.
    pub fn change_billing_interval(
        &mut self,
        billing_interval: &BillingInterval,
        now: Timestamp,
    ) -> Result<(), DomainError> {
        if billing_interval.module() != self.module {
            return Err(DomainError::validation(
                "billing_interval",
                format!(
                    "Billing interval belongs to the {} module, not {}",
                    billing_interval.module(),
                    self.module
                ),
            ));
        }
        self.billing_interval_id = billing_interval.id;
        self.updated_at = now;
        Ok(())
    }

    /// Cancel a trial outright. Nothing was billed, so no processor call is needed.
    ///
    /// # Errors
    ///
    /// Returns error if not trialing.
    pub fn cancel_trial(&mut self, now: Timestamp) -> Result<(), DomainError> {
        if self.status != SubscriptionStatus::Trialing {
            return Err(self.invalid_transition(SubscriptionStatus::Canceled));
        }
        self.transition_to(SubscriptionStatus::Canceled)?;
        self.updated_at = now;
        Ok(())
    }

    /// Record that the processor will cancel at the end of the period.
    ///
    /// # Errors
    ///
    /// Returns error unless active or past due.
    pub fn request_cancellation(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::PendingCancel)?;
        self.updated_at = now;
        Ok(())
    }

    /// Forced cancellation after the processor deleted the subscription.
    ///
    /// # Errors
    ///
    /// Returns error unless active, past due or pending cancel.
    pub fn cancel_by_webhook(&mut self, now: Timestamp) -> Result<(), DomainError> {
        if !matches!(
            self.status,
            SubscriptionStatus::Active
                | SubscriptionStatus::PastDue
                | SubscriptionStatus::PendingCancel
        ) {
            return Err(self.invalid_transition(SubscriptionStatus::Canceled));
        }
        self.transition_to(SubscriptionStatus::Canceled)?;
        self.updated_at = now;
        Ok(())
    }

    /// Expire a trial whose window elapsed.
    ///
    /// # Errors
    ///
    /// Returns error if not trialing.
    pub fn expire_trial(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition_to(SubscriptionStatus::TrialExpired)?;
        self.updated_at = now;
        Ok(())
    }

    /// Mirror processor state: refresh periods, then move to `target` if given.
    pub fn reconcile(
        &mut self,
        target: Option<SubscriptionStatus>,
        current_period_start: Option<Timestamp>,
        current_period_end: Option<Timestamp>,
        now: Timestamp,
    ) -> ReconcileOutcome {
        self.current_period_start = current_period_start;
        self.current_period_end = current_period_end;
        self.updated_at = now;

        let from = self.status;
        match target {
            None => ReconcileOutcome::Unchanged,
            Some(to) if to == from => ReconcileOutcome::Unchanged,
            Some(to) if from.can_transition_to(&to) => {
                self.status = to;
                ReconcileOutcome::Transitioned { from, to }
            }
            Some(to) => ReconcileOutcome::Rejected { from, to },
        }
    }

    fn transition_to(&mut self, target: SubscriptionStatus) -> Result<(), DomainError> {
        self.status = self
            .status
            .transition_to(target)
            .map_err(|_| self.invalid_transition(target))?;
        Ok(())
    }

    fn invalid_transition(&self, target: SubscriptionStatus) -> DomainError {
        DomainError::new(
            ErrorCode::InvalidStateTransition,
            format!(
                "Cannot transition subscription from {} to {}",
                self.status, target
            ),
        )
        .with_detail("subscription_id", self.id.to_string())
    }
}
