//! Ports - Interfaces for external dependencies.
//!
//! Ports define the contracts between the billing domain and the outside
//! world. Adapters implement them.
//!
//! ## Persistence
//!
//! - `SubscriptionRepository` - Subscriptions with optimistic versioning
//! - `ReconciliationStore` - Atomic writes for one processor event
//! - `BillingCatalog` - Plans and billing intervals (read-only)
//! - `PaymentMethodStore` - Stored payment tokens
//! - `FacilityDirectory` - Facility names and business agreements
//!
//! ## Processor
//!
//! - `PaymentGateway` - Customers and subscriptions at the processor
//! - `WebhookVerifier` - Webhook signature verification and parsing
//!
//! ## Events
//!
//! - `EventPublisher`, `EventSubscriber`, `EventHandler`

mod billing_catalog;
mod event_publisher;
mod event_subscriber;
mod facility_directory;
mod payment_gateway;
mod payment_method_store;
mod reconciliation_store;
mod subscription_repository;
mod webhook_verifier;

pub use billing_catalog::BillingCatalog;
pub use event_publisher::EventPublisher;
pub use event_subscriber::{EventBus, EventHandler, EventSubscriber};
pub use facility_directory::FacilityDirectory;
pub use payment_gateway::{
    CreateCustomerRequest, GatewayError, PaymentGateway, ProcessorCustomer,
    ProcessorSubscription, SubscriptionChanges,
};
pub use payment_method_store::PaymentMethodStore;
pub use reconciliation_store::{InvoiceChanges, ReconciliationChanges, ReconciliationStore};
pub use subscription_repository::SubscriptionRepository;
pub use webhook_verifier::WebhookVerifier;
