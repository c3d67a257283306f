//! Billing catalog port (read-only reference data).

use async_trait::async_trait;

use crate::domain::billing::{BillingInterval, Module};
use crate::domain::foundation::{BillingIntervalId, DomainError};

/// Read access to plans and their billing intervals.
#[async_trait]
pub trait BillingCatalog: Send + Sync {
    async fn find_interval(
        &self,
        id: &BillingIntervalId,
    ) -> Result<Option<BillingInterval>, DomainError>;

    /// Intervals ordered by amount ascending, optionally filtered by module.
    async fn list_intervals(
        &self,
        module: Option<Module>,
    ) -> Result<Vec<BillingInterval>, DomainError>;
}
