//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, events, errors)
//! - `billing` - Plans and billing intervals (price catalog)
//! - `subscription` - Subscription lifecycle state machine
//! - `invoice` - Invoice ledger mirrored from the processor
//! - `webhook` - Processor events and their payloads

pub mod billing;
pub mod foundation;
pub mod invoice;
pub mod subscription;
pub mod webhook;
