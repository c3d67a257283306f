//! HTTP adapter for subscriptions and processor webhooks.

mod dto;
mod handlers;
mod routes;

pub use dto::*;
pub use handlers::{ApiError, BillingAppState, FacilityContext, WebhookApiError, FACILITY_HEADER};
pub use routes::{billing_router, subscription_routes, webhook_routes};
