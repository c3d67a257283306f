//! In-memory adapters.
//!
//! Implement every persistence port over process memory for tests and local
//! development. The subscription repository and reconciliation store share
//! one row map so version checks behave as they do in PostgreSQL.

mod billing_catalog;
mod facility_directory;
mod payment_method_store;
mod reconciliation_store;
mod subscription_repository;

pub use billing_catalog::InMemoryBillingCatalog;
pub use facility_directory::InMemoryFacilityDirectory;
pub use payment_method_store::InMemoryPaymentMethodStore;
pub use reconciliation_store::InMemoryReconciliationStore;
pub use subscription_repository::InMemorySubscriptionRepository;

use crate::domain::foundation::{DomainError, ErrorCode};

fn poisoned(store: &str) -> DomainError {
    DomainError::new(ErrorCode::InternalError, format!("{} lock poisoned", store))
}
