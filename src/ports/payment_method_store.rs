//! Stored payment method port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, FacilityId};

/// One stored payment token per facility.
#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    /// Insert or replace the facility's token.
    async fn upsert(&self, facility_id: &FacilityId, payment_token: &str) -> Result<(), DomainError>;

    async fn find(&self, facility_id: &FacilityId) -> Result<Option<String>, DomainError>;
}
