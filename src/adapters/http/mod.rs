//! HTTP adapters - REST API implementations.

pub mod subscription;

pub use subscription::{billing_router, BillingAppState};
