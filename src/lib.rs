//! ALF Billing - Subscription lifecycle and billing reconciliation.
//!
//! Facilities of an assisted living platform subscribe to feature modules
//! (resident, staff, trainings) through an external payment processor. This
//! crate owns the subscription state machine, trials, and the reconciliation
//! of processor webhooks into local subscriptions and invoices.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
