//! In-memory subscription repository.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockWriteGuard};

use crate::domain::billing::Module;
use crate::domain::foundation::{DomainError, ErrorCode, FacilityId, SubscriptionId, Timestamp};
use crate::domain::subscription::Subscription;
use crate::ports::SubscriptionRepository;

use super::poisoned;

pub(super) type SubscriptionRows = HashMap<SubscriptionId, Subscription>;

/// Subscription rows keyed by id, with the same version semantics as the
/// PostgreSQL adapter.
#[derive(Default)]
pub struct InMemorySubscriptionRepository {
    rows: RwLock<SubscriptionRows>,
}

impl InMemorySubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Repository pre-populated with rows (versions kept as given).
    pub fn with_subscriptions(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let rows = subscriptions.into_iter().map(|s| (s.id, s)).collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// Snapshot of all rows, oldest first.
    pub fn all(&self) -> Vec<Subscription> {
        let mut rows: Vec<Subscription> = match self.rows.read() {
            Ok(rows) => rows.values().cloned().collect(),
            Err(_) => Vec::new(),
        };
        rows.sort_by_key(|s| s.created_at);
        rows
    }

    pub(super) fn write_rows(&self) -> Result<RwLockWriteGuard<'_, SubscriptionRows>, DomainError> {
        self.rows.write().map_err(|_| poisoned("subscriptions"))
    }

    fn read_with<T>(&self, f: impl FnOnce(&SubscriptionRows) -> T) -> Result<T, DomainError> {
        let rows = self.rows.read().map_err(|_| poisoned("subscriptions"))?;
        Ok(f(&rows))
    }
}

fn check_version(
    rows: &SubscriptionRows,
    subscription: &Subscription,
) -> Result<(), DomainError> {
    let stored = rows.get(&subscription.id).ok_or_else(|| {
        DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
            .with_detail("subscription_id", subscription.id.to_string())
    })?;
    if stored.version != subscription.version {
        return Err(DomainError::new(
            ErrorCode::ConcurrentModification,
            format!(
                "Subscription {} is at version {}, expected {}",
                subscription.id, stored.version, subscription.version
            ),
        )
        .with_detail("subscription_id", subscription.id.to_string()));
    }
    Ok(())
}

/// Version-checked write. Returns the new version.
pub(super) fn compare_and_swap(
    rows: &mut SubscriptionRows,
    subscription: &Subscription,
) -> Result<u32, DomainError> {
    check_version(rows, subscription)?;
    let mut stored = subscription.clone();
    stored.version = subscription.version + 1;
    let version = stored.version;
    rows.insert(stored.id, stored);
    Ok(version)
}

#[async_trait]
impl SubscriptionRepository for InMemorySubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        let mut rows = self.write_rows()?;
        if rows.contains_key(&subscription.id) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                format!("Subscription {} already exists", subscription.id),
            ));
        }
        rows.insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<u32, DomainError> {
        let mut rows = self.write_rows()?;
        compare_and_swap(&mut rows, subscription)
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        self.read_with(|rows| rows.get(id).cloned())
    }

    async fn find_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        self.read_with(|rows| {
            rows.values()
                .find(|s| s.processor_subscription_id.as_deref() == Some(processor_subscription_id))
                .cloned()
        })
    }

    async fn list_current(&self, facility_id: &FacilityId) -> Result<Vec<Subscription>, DomainError> {
        let mut current = self.read_with(|rows| {
            rows.values()
                .filter(|s| &s.facility_id == facility_id && s.is_current())
                .cloned()
                .collect::<Vec<_>>()
        })?;
        current.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(current)
    }

    async fn exists_for_module(
        &self,
        facility_id: &FacilityId,
        module: Module,
    ) -> Result<bool, DomainError> {
        self.read_with(|rows| {
            rows.values()
                .any(|s| &s.facility_id == facility_id && s.module == module)
        })
    }

    async fn expire_trials(&self, now: Timestamp) -> Result<Vec<SubscriptionId>, DomainError> {
        let mut rows = self.write_rows()?;
        let mut expired = Vec::new();
        for subscription in rows.values_mut() {
            if subscription.is_expired_trial(now) && subscription.expire_trial(now).is_ok() {
                subscription.version += 1;
                expired.push(subscription.id);
            }
        }
        Ok(expired)
    }
}
