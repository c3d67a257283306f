//! HTTP handlers for subscription and webhook endpoints.
//!
//! These handlers connect Axum routes to the subscription command and query
//! handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Json, Path, Query, State};
use axum::http::{request::Parts, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::handlers::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CheckEntitlementHandler,
    CheckEntitlementQuery, CreateSubscriptionCommand, CreateSubscriptionHandler,
    GetCurrentSubscriptionsHandler, GetCurrentSubscriptionsQuery, GetSubscriptionHandler,
    GetSubscriptionQuery, ReconcileWebhookCommand, ReconcileWebhookHandler, StartTrialCommand,
    StartTrialHandler, UpdateSubscriptionCommand, UpdateSubscriptionHandler,
};
use crate::domain::billing::Module;
use crate::domain::foundation::{FacilityId, SubscriptionId};
use crate::domain::subscription::SubscriptionError;
use crate::domain::webhook::WebhookError;
use crate::ports::{
    BillingCatalog, EventPublisher, FacilityDirectory, PaymentGateway, PaymentMethodStore,
    ReconciliationStore, SubscriptionRepository, WebhookVerifier,
};

use super::dto::{
    optional_interval, required_interval, CancelSubscriptionResponse, CreateSubscriptionRequest,
    CurrentSubscriptionResponse, EntitlementResponse, ErrorResponse, ModuleQuery,
    StartTrialRequest, SubscriptionResponse, UpdateSubscriptionRequest,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared dependencies of the billing API. Cloned per request.
#[derive(Clone)]
pub struct BillingAppState {
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub reconciliation_store: Arc<dyn ReconciliationStore>,
    pub catalog: Arc<dyn BillingCatalog>,
    pub facilities: Arc<dyn FacilityDirectory>,
    pub payment_methods: Arc<dyn PaymentMethodStore>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub webhook_verifier: Arc<dyn WebhookVerifier>,
    pub event_publisher: Arc<dyn EventPublisher>,
    pub trial_length_days: i64,
}

impl BillingAppState {
    pub fn create_subscription_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.catalog.clone(),
            self.facilities.clone(),
            self.gateway.clone(),
            self.event_publisher.clone(),
        )
    }

    pub fn start_trial_handler(&self) -> StartTrialHandler {
        StartTrialHandler::new(
            self.subscriptions.clone(),
            self.catalog.clone(),
            self.payment_methods.clone(),
            self.event_publisher.clone(),
            self.trial_length_days,
        )
    }

    pub fn update_subscription_handler(&self) -> UpdateSubscriptionHandler {
        UpdateSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.catalog.clone(),
            self.facilities.clone(),
            self.gateway.clone(),
            self.event_publisher.clone(),
        )
    }

    pub fn cancel_subscription_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.subscriptions.clone(),
            self.gateway.clone(),
            self.event_publisher.clone(),
        )
    }

    pub fn get_subscription_handler(&self) -> GetSubscriptionHandler {
        GetSubscriptionHandler::new(self.subscriptions.clone())
    }

    pub fn current_subscriptions_handler(&self) -> GetCurrentSubscriptionsHandler {
        GetCurrentSubscriptionsHandler::new(self.subscriptions.clone())
    }

    pub fn entitlement_handler(&self) -> CheckEntitlementHandler {
        CheckEntitlementHandler::new(self.subscriptions.clone(), self.facilities.clone())
    }

    pub fn webhook_handler(&self) -> ReconcileWebhookHandler {
        ReconcileWebhookHandler::new(
            self.webhook_verifier.clone(),
            self.subscriptions.clone(),
            self.reconciliation_store.clone(),
            self.event_publisher.clone(),
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Facility Context (set by the upstream auth layer)
// ════════════════════════════════════════════════════════════════════════════════

pub const FACILITY_HEADER: &str = "X-Facility-Id";

/// The facility the request acts for.
#[derive(Debug, Clone, Copy)]
pub struct FacilityContext {
    pub facility_id: FacilityId,
}

/// Rejection for a missing or malformed facility header.
pub struct FacilityRequired;

impl IntoResponse for FacilityRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new(
            "AUTHENTICATION_REQUIRED",
            "Authentication credentials were not provided.",
        );
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for FacilityContext
where
    S: Send + Sync,
{
    type Rejection = FacilityRequired;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let facility_id = parts
            .headers
            .get(FACILITY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<FacilityId>().ok())
            .ok_or(FacilityRequired)?;

        Ok(FacilityContext { facility_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/subscriptions/:id
pub async fn get_subscription(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let query = GetSubscriptionQuery {
        facility_id: ctx.facility_id,
        subscription_id: parse_subscription_id(&id)?,
    };
    let subscription = state.get_subscription_handler().handle(query).await?;
    Ok(Json(SubscriptionResponse::from(subscription)))
}

/// GET /api/subscriptions/current?module=resident
pub async fn get_current_subscription(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Query(params): Query<ModuleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = GetCurrentSubscriptionsQuery {
        facility_id: ctx.facility_id,
        module: Some(params.module_or(Module::Resident)?),
    };
    let current = state.current_subscriptions_handler().handle(query).await?;

    Ok(Json(CurrentSubscriptionResponse {
        subscription: current.into_iter().next().map(SubscriptionResponse::from),
    }))
}

/// GET /api/subscriptions/currents
pub async fn list_current_subscriptions(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
) -> Result<impl IntoResponse, ApiError> {
    let query = GetCurrentSubscriptionsQuery {
        facility_id: ctx.facility_id,
        module: None,
    };
    let current = state.current_subscriptions_handler().handle(query).await?;
    let body: Vec<SubscriptionResponse> = current.into_iter().map(Into::into).collect();
    Ok(Json(body))
}

/// GET /api/subscriptions/entitlement?module=staff
pub async fn check_entitlement(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Query(params): Query<ModuleQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = CheckEntitlementQuery {
        facility_id: ctx.facility_id,
        module: params.module_or(Module::Resident)?,
    };
    let result = state.entitlement_handler().handle(query).await?;
    Ok(Json(EntitlementResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST/PATCH/DELETE endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/subscriptions
pub async fn create_subscription(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = CreateSubscriptionCommand {
        facility_id: ctx.facility_id,
        billing_interval_id: required_interval(req.billing_interval.as_deref())?,
        payment_token: req.payment_token,
    };
    let result = state.create_subscription_handler().handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(result.subscription)),
    ))
}

/// POST /api/subscriptions/start_trial
pub async fn start_trial(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Json(req): Json<StartTrialRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = StartTrialCommand {
        facility_id: ctx.facility_id,
        billing_interval_id: required_interval(req.billing_interval.as_deref())?,
        payment_token: req.payment_token,
        no_payment: req.no_payment,
    };
    let result = state.start_trial_handler().handle(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubscriptionResponse::from(result.subscription)),
    ))
}

/// PATCH /api/subscriptions/:id
pub async fn update_subscription(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = UpdateSubscriptionCommand {
        facility_id: ctx.facility_id,
        subscription_id: parse_subscription_id(&id)?,
        billing_interval_id: optional_interval(req.billing_interval.as_deref())?,
        payment_token: req.payment_token,
    };
    let result = state.update_subscription_handler().handle(cmd).await?;
    Ok(Json(SubscriptionResponse::from(result.subscription)))
}

/// DELETE /api/subscriptions/:id
pub async fn cancel_subscription(
    State(state): State<BillingAppState>,
    ctx: FacilityContext,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let cmd = CancelSubscriptionCommand {
        facility_id: ctx.facility_id,
        subscription_id: parse_subscription_id(&id)?,
    };
    let result = state.cancel_subscription_handler().handle(cmd).await?;
    Ok(Json(CancelSubscriptionResponse::from(result)))
}

/// Ids that do not parse cannot belong to the facility.
fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, ApiError> {
    raw.parse::<SubscriptionId>().map_err(|_| ApiError::MalformedId)
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Handler
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/webhooks/stripe
///
/// Answers `{}` once the event is stored, including redeliveries and events
/// that reference nothing known locally.
pub async fn handle_stripe_webhook(
    State(state): State<BillingAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookApiError(WebhookError::InvalidSignature))?;

    let cmd = ReconcileWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };
    let result = state.webhook_handler().handle(cmd).await?;

    tracing::debug!(
        event_id = %result.event_id,
        redelivery = result.redelivery,
        "webhook acknowledged"
    );

    Ok(Json(serde_json::json!({})))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Error type for subscription endpoints.
#[derive(Debug)]
pub enum ApiError {
    Subscription(SubscriptionError),
    /// Path id is not a valid subscription id.
    MalformedId,
}

impl From<SubscriptionError> for ApiError {
    fn from(err: SubscriptionError) -> Self {
        ApiError::Subscription(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Subscription(err) => err,
            ApiError::MalformedId => {
                let body = ErrorResponse::new("SUBSCRIPTION_NOT_FOUND", "Not found.");
                return (StatusCode::NOT_FOUND, Json(body)).into_response();
            }
        };

        let status = match &err {
            SubscriptionError::ValidationFailed { .. }
            | SubscriptionError::AlreadyCanceled
            | SubscriptionError::CardDeclined(_)
            | SubscriptionError::ProcessorUnavailable { .. } => StatusCode::BAD_REQUEST,
            SubscriptionError::NotFound(_) => StatusCode::NOT_FOUND,
            SubscriptionError::InvalidState(_) | SubscriptionError::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            SubscriptionError::Infrastructure(detail) => {
                tracing::error!(error = %detail, "subscription request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut body = ErrorResponse::new(err.code().to_string(), err.message());
        if let Some(field) = err.field() {
            body = body.with_field(field);
        }

        (status, Json(body)).into_response()
    }
}

/// Error type for the webhook endpoint.
///
/// Storage failures answer 500 so the processor redelivers; everything else
/// answers 400.
#[derive(Debug)]
pub struct WebhookApiError(pub WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        WebhookApiError(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::InvalidTimestamp => (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE"),
            WebhookError::LivemodeMismatch => (StatusCode::BAD_REQUEST, "LIVEMODE_MISMATCH"),
            WebhookError::ParseError(_) => (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD"),
            WebhookError::Database(detail) => {
                tracing::error!(error = %detail, "webhook processing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
        };

        if status == StatusCode::BAD_REQUEST {
            tracing::warn!(error = %self.0, "webhook rejected");
        }

        let body = ErrorResponse::new(code, self.0.to_string());
        (status, Json(body)).into_response()
    }
}
