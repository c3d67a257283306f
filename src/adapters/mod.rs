//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `events` - In-process event bus
//! - `http` - Axum REST API
//! - `memory` - In-memory persistence for tests and local runs
//! - `postgres` - PostgreSQL persistence
//! - `scheduler` - Background trial sweep
//! - `stripe` - Payment processor gateway and webhook verification

pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod scheduler;
pub mod stripe;

pub use events::InMemoryEventBus;
