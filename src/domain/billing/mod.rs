//! Billing interval catalog.
//!
//! Static reference data: plans scoped to a product module and the recurring
//! price points (billing intervals) the processor bills against.

mod module;
mod plan;

pub use module::Module;
pub use plan::{sort_by_amount, BillingInterval, IntervalUnit, Plan};
