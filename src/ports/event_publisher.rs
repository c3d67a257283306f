//! EventPublisher port - Interface for publishing domain events.
//!
//! Handlers publish subscription and invoice events after their writes
//! commit. The transport (in-memory bus, outbox, broker) is an adapter concern.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Port for publishing domain events.
///
/// Delivery is at-least-once; subscribers must tolerate duplicates.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Publish several events in order.
    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError>;
}
