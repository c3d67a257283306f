//! HTTP DTOs for subscription endpoints.
//!
//! Request bodies carry ids as strings so that malformed values surface as
//! field errors instead of body rejections.

use serde::{Deserialize, Serialize};

use crate::application::handlers::{CancelSubscriptionResult, CheckEntitlementResult};
use crate::domain::billing::Module;
use crate::domain::foundation::{BillingIntervalId, Timestamp};
use crate::domain::subscription::{Subscription, SubscriptionError, SubscriptionStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /subscriptions`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSubscriptionRequest {
    #[serde(default)]
    pub billing_interval: Option<String>,
    #[serde(default)]
    pub payment_token: Option<String>,
}

/// Body of `POST /subscriptions/start_trial`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartTrialRequest {
    #[serde(default)]
    pub billing_interval: Option<String>,
    #[serde(default)]
    pub payment_token: Option<String>,
    /// Staff trials only: start without a payment method.
    #[serde(default)]
    pub no_payment: bool,
}

/// Body of `PATCH /subscriptions/:id`. Both fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSubscriptionRequest {
    #[serde(default)]
    pub billing_interval: Option<String>,
    #[serde(default)]
    pub payment_token: Option<String>,
}

/// `?module=` filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModuleQuery {
    #[serde(default)]
    pub module: Option<String>,
}

impl ModuleQuery {
    /// Parsed module, `default` when absent.
    pub fn module_or(&self, default: Module) -> Result<Module, SubscriptionError> {
        match self.module.as_deref() {
            None | Some("") => Ok(default),
            Some(raw) => raw.parse::<Module>().map_err(|_| {
                SubscriptionError::validation("module", format!("\"{}\" is not a valid choice.", raw))
            }),
        }
    }
}

/// Parse a required billing interval id.
pub fn required_interval(raw: Option<&str>) -> Result<BillingIntervalId, SubscriptionError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => parse_interval(raw),
        None => Err(SubscriptionError::field_required("billing_interval")),
    }
}

/// Parse an optional billing interval id.
pub fn optional_interval(raw: Option<&str>) -> Result<Option<BillingIntervalId>, SubscriptionError> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_interval)
        .transpose()
}

fn parse_interval(raw: &str) -> Result<BillingIntervalId, SubscriptionError> {
    raw.parse::<BillingIntervalId>().map_err(|_| {
        SubscriptionError::validation(
            "billing_interval",
            format!("Invalid pk \"{}\" - object does not exist.", raw),
        )
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// A subscription as seen by its facility.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: String,
    pub facility_id: String,
    pub billing_interval: String,
    pub module: Module,
    pub status: SubscriptionStatus,
    pub has_processor_subscription: bool,
    pub current_period_start: Option<Timestamp>,
    pub current_period_end: Option<Timestamp>,
    pub trial_start: Option<Timestamp>,
    pub trial_end: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            has_processor_subscription: s.has_processor_subscription(),
            id: s.id.to_string(),
            facility_id: s.facility_id.to_string(),
            billing_interval: s.billing_interval_id.to_string(),
            module: s.module,
            status: s.status,
            current_period_start: s.current_period_start,
            current_period_end: s.current_period_end,
            trial_start: s.trial_start,
            trial_end: s.trial_end,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

/// Response of `DELETE /subscriptions/:id`.
#[derive(Debug, Clone, Serialize)]
pub struct CancelSubscriptionResponse {
    #[serde(flatten)]
    pub subscription: SubscriptionResponse,
    /// When access ends; null for trials.
    pub effective_at: Option<Timestamp>,
}

impl From<CancelSubscriptionResult> for CancelSubscriptionResponse {
    fn from(result: CancelSubscriptionResult) -> Self {
        Self {
            subscription: result.subscription.into(),
            effective_at: result.effective_at,
        }
    }
}

/// Response of `GET /subscriptions/current`. Serializes as `{}` when empty.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentSubscriptionResponse {
    #[serde(flatten)]
    pub subscription: Option<SubscriptionResponse>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitlementResponse {
    pub module: Module,
    pub entitled: bool,
    pub subscription_id: Option<String>,
    pub status: Option<SubscriptionStatus>,
}

impl From<CheckEntitlementResult> for EntitlementResponse {
    fn from(result: CheckEntitlementResult) -> Self {
        Self {
            module: result.module,
            entitled: result.entitled,
            subscription_id: result.subscription_id.map(|id| id.to_string()),
            status: result.status,
        }
    }
}

/// Error body: `{ code, message, field? }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_query_defaults_when_absent() {
        let query = ModuleQuery::default();
        assert_eq!(query.module_or(Module::Resident).unwrap(), Module::Resident);
    }

    #[test]
    fn module_query_rejects_unknown_module() {
        let query = ModuleQuery {
            module: Some("kitchen".to_string()),
        };
        let err = query.module_or(Module::Resident).unwrap_err();
        assert_eq!(err.field(), Some("module"));
    }

    #[test]
    fn missing_interval_is_required_field() {
        let err = required_interval(None).unwrap_err();
        assert_eq!(err, SubscriptionError::field_required("billing_interval"));
    }

    #[test]
    fn malformed_interval_is_field_error() {
        let err = optional_interval(Some("not-a-uuid")).unwrap_err();
        assert_eq!(err.field(), Some("billing_interval"));
        assert!(optional_interval(Some("  ")).unwrap().is_none());
    }

    #[test]
    fn empty_current_serializes_as_empty_object() {
        let body = CurrentSubscriptionResponse { subscription: None };
        assert_eq!(serde_json::to_string(&body).unwrap(), "{}");
    }

    #[test]
    fn error_response_omits_absent_field() {
        let body = ErrorResponse::new("SUBSCRIPTION_NOT_FOUND", "Not found.");
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("field").is_none());
    }
}
