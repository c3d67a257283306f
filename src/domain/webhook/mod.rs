//! Webhook domain module.
//!
//! Processor events that reconcile local subscription and invoice state.
//!
//! # Module Structure
//!
//! - `kind` - Closed event kind enum and typed payload decoding
//! - `record` - Inbound event and its deduplication record
//! - `snapshots` - Processor subscription and invoice objects
//! - `errors` - Delivery rejection errors

mod errors;
mod kind;
mod record;
mod snapshots;

pub use errors::WebhookError;
pub use kind::{ProcessorEventKind, ProcessorEventPayload};
pub use record::{InboundEvent, ProcessorEvent};
pub use snapshots::{InvoiceLineSnapshot, InvoiceLines, InvoiceSnapshot, SubscriptionSnapshot};
