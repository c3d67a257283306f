//! EventSubscriber port - Interface for reacting to domain events.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::foundation::{DomainError, EventEnvelope};

/// Handler for processing domain events.
///
/// Handlers must be idempotent; the same envelope may arrive twice.
///
/// ```ignore
/// struct EntitlementCacheInvalidator { /* ... */ }
///
/// #[async_trait]
/// impl EventHandler for EntitlementCacheInvalidator {
///     async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError> {
///         let canceled: SubscriptionCanceled = event.payload_as()?;
///         // drop cached entitlement for canceled.facility_id ...
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "EntitlementCacheInvalidator"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: EventEnvelope) -> Result<(), DomainError>;

    /// Handler name for logging.
    fn name(&self) -> &'static str;
}

/// Registers handlers by event type.
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self, event_type: &str, handler: Arc<dyn EventHandler>);

    fn subscribe_all(&self, event_types: &[&str], handler: Arc<dyn EventHandler>);
}

/// Publisher and subscriber in one.
pub trait EventBus: super::EventPublisher + EventSubscriber {}

impl<T: super::EventPublisher + EventSubscriber> EventBus for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_handler_object_safe(_: &dyn EventHandler) {}

    #[allow(dead_code)]
    fn assert_subscriber_object_safe(_: &dyn EventSubscriber) {}
}
