//! PostgreSQL facility directory.
//!
//! Reads the `facilities` and `business_agreements` tables owned by the
//! facility service. Billing never writes them.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, FacilityId};
use crate::ports::FacilityDirectory;

pub struct PostgresFacilityDirectory {
    pool: PgPool,
}

impl PostgresFacilityDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FacilityDirectory for PostgresFacilityDirectory {
    async fn facility_name(&self, facility_id: &FacilityId) -> Result<Option<String>, DomainError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT name FROM facilities WHERE id = $1")
            .bind(facility_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DomainError::database("Failed to find facility", e))?;

        Ok(row.map(|(name,)| name))
    }

    async fn has_business_agreement(&self, facility_id: &FacilityId) -> Result<bool, DomainError> {
        let (signed,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM business_agreements WHERE facility_id = $1)",
        )
        .bind(facility_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::database("Failed to check business agreement", e))?;

        Ok(signed)
    }
}
