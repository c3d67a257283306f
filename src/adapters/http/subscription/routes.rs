//! Axum router configuration for subscription endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, check_entitlement, create_subscription, get_current_subscription,
    get_subscription, handle_stripe_webhook, list_current_subscriptions, start_trial,
    update_subscription, BillingAppState,
};

/// Subscription routes, scoped to the facility in `X-Facility-Id`.
///
/// # Routes
/// - `POST /` - Start a paid subscription
/// - `POST /start_trial` - Start a trial
/// - `GET /current?module=` - Current subscription for one module
/// - `GET /currents` - All current subscriptions
/// - `GET /entitlement?module=` - Module entitlement
/// - `GET|PATCH|DELETE /:id` - Retrieve, update, cancel
pub fn subscription_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/", post(create_subscription))
        .route("/start_trial", post(start_trial))
        .route("/current", get(get_current_subscription))
        .route("/currents", get(list_current_subscriptions))
        .route("/entitlement", get(check_entitlement))
        .route(
            "/:id",
            get(get_subscription)
                .patch(update_subscription)
                .delete(cancel_subscription),
        )
}

/// Processor webhooks. Authenticated by signature, not by facility.
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new().route("/stripe", post(handle_stripe_webhook))
}

/// Complete billing router, meant to be nested under `/api`.
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/subscriptions", subscription_routes())
        .nest("/webhooks", webhook_routes())
}
