//! PostgreSQL implementation of PaymentMethodStore.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, FacilityId, Timestamp};
use crate::ports::PaymentMethodStore;

pub struct PostgresPaymentMethodStore {
    pool: PgPool,
}

impl PostgresPaymentMethodStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentMethodStore for PostgresPaymentMethodStore {
    async fn upsert(&self, facility_id: &FacilityId, payment_token: &str) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO facility_payment_methods (facility_id, payment_token, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (facility_id) DO UPDATE SET
                payment_token = EXCLUDED.payment_token,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(facility_id.as_uuid())
        .bind(payment_token)
        .bind(Timestamp::now().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to store payment method", e))?;

        Ok(())
    }

    async fn find(&self, facility_id: &FacilityId) -> Result<Option<String>, DomainError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payment_token FROM facility_payment_methods WHERE facility_id = $1",
        )
        .bind(facility_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to find payment method", e))?;

        Ok(row.map(|(token,)| token))
    }
}
