//! Subscription domain module.
//!
//! Handles the subscription lifecycle: trials, paid billing, cancellation and
//! the statuses the processor reports back.
//!
//! # Module Structure
//!
//! - `aggregate` - Subscription aggregate entity
//! - `status` - SubscriptionStatus state machine
//! - `errors` - SubscriptionError surfaced by the handlers
//! - `events` - Domain events published after each committed change

mod aggregate;
mod errors;
mod events;
mod status;

pub use aggregate::{ProcessorBilling, ReconcileOutcome, Subscription};
pub use errors::{SubscriptionError, NON_FIELD_ERRORS};
pub use events::{
    CancellationRequested, CancellationSource, SubscriptionCanceled, SubscriptionPastDue,
    SubscriptionReactivated, SubscriptionStarted, SubscriptionUpdated, TrialExpired,
    TrialStarted,
};
pub use status::SubscriptionStatus;
