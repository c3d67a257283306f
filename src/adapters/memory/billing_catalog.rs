//! In-memory billing catalog.

use async_trait::async_trait;

use crate::domain::billing::{sort_by_amount, BillingInterval, Module};
use crate::domain::foundation::{BillingIntervalId, DomainError};
use crate::ports::BillingCatalog;

/// Fixed catalog of billing intervals.
#[derive(Default)]
pub struct InMemoryBillingCatalog {
    intervals: Vec<BillingInterval>,
}

impl InMemoryBillingCatalog {
    pub fn new(intervals: impl IntoIterator<Item = BillingInterval>) -> Self {
        let mut intervals: Vec<BillingInterval> = intervals.into_iter().collect();
        sort_by_amount(&mut intervals);
        Self { intervals }
    }
}

#[async_trait]
impl BillingCatalog for InMemoryBillingCatalog {
    async fn find_interval(
        &self,
        id: &BillingIntervalId,
    ) -> Result<Option<BillingInterval>, DomainError> {
        Ok(self.intervals.iter().find(|i| &i.id == id).cloned())
    }

    async fn list_intervals(
        &self,
        module: Option<Module>,
    ) -> Result<Vec<BillingInterval>, DomainError> {
        Ok(self
            .intervals
            .iter()
            .filter(|i| module.map_or(true, |m| i.module() == m))
            .cloned()
            .collect())
    }
}
