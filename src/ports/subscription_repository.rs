//! Subscription repository port.
//!
//! Persists Subscription aggregates. Every status write is a compare-and-swap
//! on the version the aggregate was read at.
//!
//! # Example
//!
//! ```ignore
//! let mut subscription = repo.find_by_id(&id).await?.ok_or(...)?;
//! subscription.request_cancellation(Timestamp::now())?;
//! subscription.version = repo.update(&subscription).await?;
//! ```

use async_trait::async_trait;

use crate::domain::billing::Module;
use crate::domain::foundation::{DomainError, FacilityId, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;

/// Repository port for Subscription persistence.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a new subscription.
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError>;

    /// Write all fields if the stored version equals `subscription.version`.
    ///
    /// Returns the new stored version.
    ///
    /// # Errors
    ///
    /// - `SubscriptionNotFound` if no row exists
    /// - `ConcurrentModification` if the stored version moved on
    async fn update(&self, subscription: &Subscription) -> Result<u32, DomainError>;

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError>;

    async fn find_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError>;

    /// Current (not canceled, not trial-expired) subscriptions of a facility,
    /// newest first.
    async fn list_current(&self, facility_id: &FacilityId) -> Result<Vec<Subscription>, DomainError>;

    /// True if the facility ever held a subscription for the module.
    async fn exists_for_module(
        &self,
        facility_id: &FacilityId,
        module: Module,
    ) -> Result<bool, DomainError>;

    /// Move every elapsed, unconverted trial to `trial_expired` in one statement.
    ///
    /// Selects `trialing` rows with `trial_end <= now`, skipping rows whose
    /// `current_period_end` is after `now`. Returns the moved ids.
    async fn expire_trials(&self, now: Timestamp) -> Result<Vec<SubscriptionId>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Compile-time check that trait is object-safe
    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn SubscriptionRepository) {}
}
