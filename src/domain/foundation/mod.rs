//! Foundation module - Shared domain primitives.
//!
//! Contains value objects, identifiers, events, and error types
//! that form the vocabulary of the billing domain.

mod errors;
mod events;
mod ids;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use events::{
    domain_event, DomainEvent, EventEnvelope, EventId, EventMetadata, SerializableDomainEvent,
};
pub use ids::{
    BillingIntervalId, FacilityId, InvoiceId, InvoiceItemId, PlanId, SubscriptionId,
};
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
