//! Event bus adapters.
//!
//! - `InMemoryEventBus` - in-process delivery, dispatch-only or capturing for tests

mod in_memory;

pub use in_memory::InMemoryEventBus;
