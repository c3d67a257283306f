//! Application handlers.
//!
//! Command and query handlers that orchestrate domain operations.

pub mod subscription;

pub use subscription::{
    // Commands
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
    ReconcileWebhookCommand, ReconcileWebhookHandler, ReconcileWebhookResult,
    StartTrialCommand, StartTrialHandler, StartTrialResult,
    SweepExpiredTrialsHandler, SweepExpiredTrialsResult,
    UpdateSubscriptionCommand, UpdateSubscriptionHandler, UpdateSubscriptionResult,
    WebhookOutcome,
    // Event handlers
    SubscriptionActivityRecorder, ACTIVITY_EVENT_TYPES,
    // Queries
    CheckEntitlementHandler, CheckEntitlementQuery, CheckEntitlementResult,
    GetCurrentSubscriptionsHandler, GetCurrentSubscriptionsQuery,
    GetSubscriptionHandler, GetSubscriptionQuery,
};
