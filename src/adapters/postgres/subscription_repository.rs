//! PostgreSQL implementation of SubscriptionRepository.
//!
//! Every status write is a compare-and-swap on `version`:
//! `UPDATE ... WHERE id = $1 AND version = $2`. Zero affected rows means the
//! row is gone or someone else wrote first; a follow-up read tells which.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::billing::Module;
use crate::domain::foundation::{
    BillingIntervalId, DomainError, ErrorCode, FacilityId, SubscriptionId, Timestamp,
};
use crate::domain::subscription::{Subscription, SubscriptionStatus};
use crate::ports::SubscriptionRepository;

use super::{corrupt_column, timestamp, timestamp_opt};

const SELECT_SUBSCRIPTION: &str = r#"
    SELECT id, facility_id, billing_interval_id, module, status, processor_subscription_id,
           current_period_start, current_period_end, trial_start, trial_end,
           created_at, updated_at, version
    FROM subscriptions
"#;

pub struct PostgresSubscriptionRepository {
    pool: PgPool,
}

impl PostgresSubscriptionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a subscription.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    facility_id: Uuid,
    billing_interval_id: Uuid,
    module: String,
    status: String,
    processor_subscription_id: Option<String>,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i32,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let module: Module = row
            .module
            .parse()
            .map_err(|_| corrupt_column("subscriptions.module", &row.module))?;
        let status: SubscriptionStatus = row
            .status
            .parse()
            .map_err(|_| corrupt_column("subscriptions.status", &row.status))?;
        let version = u32::try_from(row.version)
            .map_err(|_| corrupt_column("subscriptions.version", row.version))?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            facility_id: FacilityId::from_uuid(row.facility_id),
            billing_interval_id: BillingIntervalId::from_uuid(row.billing_interval_id),
            module,
            status,
            processor_subscription_id: row.processor_subscription_id,
            current_period_start: timestamp_opt(row.current_period_start),
            current_period_end: timestamp_opt(row.current_period_end),
            trial_start: timestamp_opt(row.trial_start),
            trial_end: timestamp_opt(row.trial_end),
            created_at: timestamp(row.created_at),
            updated_at: timestamp(row.updated_at),
            version,
        })
    }
}

fn db_version(version: u32) -> Result<i32, DomainError> {
    i32::try_from(version).map_err(|_| {
        DomainError::new(ErrorCode::InternalError, format!("Version {} out of range", version))
    })
}

/// Version-checked update on one connection (pooled or inside a transaction).
///
/// Returns the new version. On a miss, reads the row back to tell a stale
/// version from a missing row.
pub(super) async fn compare_and_swap(
    conn: &mut PgConnection,
    subscription: &Subscription,
) -> Result<u32, DomainError> {
    let updated: Option<(i32,)> = sqlx::query_as(
        r#"
        UPDATE subscriptions SET
            billing_interval_id = $3,
            module = $4,
            status = $5,
            processor_subscription_id = $6,
            current_period_start = $7,
            current_period_end = $8,
            trial_start = $9,
            trial_end = $10,
            updated_at = $11,
            version = version + 1
        WHERE id = $1 AND version = $2
        RETURNING version
        "#,
    )
    .bind(subscription.id.as_uuid())
    .bind(db_version(subscription.version)?)
    .bind(subscription.billing_interval_id.as_uuid())
    .bind(subscription.module.as_str())
    .bind(subscription.status.as_str())
    .bind(&subscription.processor_subscription_id)
    .bind(subscription.current_period_start.map(|t| *t.as_datetime()))
    .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
    .bind(subscription.trial_start.map(|t| *t.as_datetime()))
    .bind(subscription.trial_end.map(|t| *t.as_datetime()))
    .bind(subscription.updated_at.as_datetime())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| DomainError::database("Failed to update subscription", e))?;

    if let Some((version,)) = updated {
        return u32::try_from(version).map_err(|_| corrupt_column("subscriptions.version", version));
    }

    let stored: Option<(i32,)> = sqlx::query_as("SELECT version FROM subscriptions WHERE id = $1")
        .bind(subscription.id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| DomainError::database("Failed to read subscription version", e))?;

    match stored {
        Some((stored_version,)) => Err(DomainError::new(
            ErrorCode::ConcurrentModification,
            format!(
                "Subscription {} is at version {}, expected {}",
                subscription.id, stored_version, subscription.version
            ),
        )
        .with_detail("subscription_id", subscription.id.to_string())),
        None => Err(
            DomainError::new(ErrorCode::SubscriptionNotFound, "Subscription not found")
                .with_detail("subscription_id", subscription.id.to_string()),
        ),
    }
}

#[async_trait]
impl SubscriptionRepository for PostgresSubscriptionRepository {
    async fn save(&self, subscription: &Subscription) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, facility_id, billing_interval_id, module, status, processor_subscription_id,
                current_period_start, current_period_end, trial_start, trial_end,
                created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(subscription.id.as_uuid())
        .bind(subscription.facility_id.as_uuid())
        .bind(subscription.billing_interval_id.as_uuid())
        .bind(subscription.module.as_str())
        .bind(subscription.status.as_str())
        .bind(&subscription.processor_subscription_id)
        .bind(subscription.current_period_start.map(|t| *t.as_datetime()))
        .bind(subscription.current_period_end.map(|t| *t.as_datetime()))
        .bind(subscription.trial_start.map(|t| *t.as_datetime()))
        .bind(subscription.trial_end.map(|t| *t.as_datetime()))
        .bind(subscription.created_at.as_datetime())
        .bind(subscription.updated_at.as_datetime())
        .bind(db_version(subscription.version)?)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to save subscription", e))?;

        Ok(())
    }

    async fn update(&self, subscription: &Subscription) -> Result<u32, DomainError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DomainError::database("Failed to acquire connection", e))?;
        compare_and_swap(&mut conn, subscription).await
    }

    async fn find_by_id(&self, id: &SubscriptionId) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_SUBSCRIPTION))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| DomainError::database("Failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn find_by_processor_id(
        &self,
        processor_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE processor_subscription_id = $1 ORDER BY created_at DESC LIMIT 1",
            SELECT_SUBSCRIPTION
        ))
        .bind(processor_subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find subscription", e))?;

        row.map(Subscription::try_from).transpose()
    }

    async fn list_current(&self, facility_id: &FacilityId) -> Result<Vec<Subscription>, DomainError> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(&format!(
            "{} WHERE facility_id = $1 AND status IN ($2, $3, $4) ORDER BY created_at DESC",
            SELECT_SUBSCRIPTION
        ))
        .bind(facility_id.as_uuid())
        .bind(SubscriptionStatus::Trialing.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .bind(SubscriptionStatus::PastDue.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to list subscriptions", e))?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn exists_for_module(
        &self,
        facility_id: &FacilityId,
        module: Module,
    ) -> Result<bool, DomainError> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE facility_id = $1 AND module = $2)",
        )
        .bind(facility_id.as_uuid())
        .bind(module.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to check subscriptions", e))?;

        Ok(exists)
    }

    async fn expire_trials(&self, now: Timestamp) -> Result<Vec<SubscriptionId>, DomainError> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = $2,
                updated_at = $1,
                version = version + 1
            WHERE status = $3
              AND trial_end IS NOT NULL
              AND trial_end <= $1
              AND (current_period_end IS NULL OR current_period_end <= $1)
            RETURNING id
            "#,
        )
        .bind(now.as_datetime())
        .bind(SubscriptionStatus::TrialExpired.as_str())
        .bind(SubscriptionStatus::Trialing.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to expire trials", e))?;

        Ok(ids
            .into_iter()
            .map(|(id,)| SubscriptionId::from_uuid(id))
            .collect())
    }
}
