//! Facility directory port.
//!
//! Facilities and business agreements are owned by other parts of the
//! platform; billing only reads them.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, FacilityId};

#[async_trait]
pub trait FacilityDirectory: Send + Sync {
    /// Display name, used as the processor customer description.
    ///
    /// Returns `None` for unknown facilities.
    async fn facility_name(&self, facility_id: &FacilityId) -> Result<Option<String>, DomainError>;

    /// Whether the facility signed a business agreement.
    async fn has_business_agreement(&self, facility_id: &FacilityId) -> Result<bool, DomainError>;
}
