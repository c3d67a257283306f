//! PostgreSQL adapters - Database implementations for the persistence ports.
//!
//! - `PostgresSubscriptionRepository` - subscriptions with version compare-and-swap
//! - `PostgresReconciliationStore` - transactional webhook effects
//! - `PostgresBillingCatalog` - plans and billing intervals
//! - `PostgresPaymentMethodStore` - one payment token per facility
//! - `PostgresFacilityDirectory` - read-only facility data

mod billing_catalog;
mod facility_directory;
mod payment_method_store;
mod reconciliation_store;
mod subscription_repository;

pub use billing_catalog::PostgresBillingCatalog;
pub use facility_directory::PostgresFacilityDirectory;
pub use payment_method_store::PostgresPaymentMethodStore;
pub use reconciliation_store::PostgresReconciliationStore;
pub use subscription_repository::PostgresSubscriptionRepository;

use chrono::{DateTime, Utc};
use std::fmt::Display;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};

/// A stored value the domain cannot represent.
fn corrupt_column(column: &str, value: impl Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, value),
    )
}

fn timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp::from_datetime(dt)
}

fn timestamp_opt(dt: Option<DateTime<Utc>>) -> Option<Timestamp> {
    dt.map(Timestamp::from_datetime)
}
