//! Subscription-specific error types.
//!
//! Errors surfaced by the subscription lifecycle operations. Messages are the
//! exact texts shown to facility users.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | ValidationFailed | 400 |
//! | AlreadyCanceled | 400 |
//! | CardDeclined | 400 |
//! | ProcessorUnavailable | 400 |
//! | NotFound | 404 |
//! | InvalidState | 409 |
//! | ConcurrentModification | 409 |
//! | Infrastructure | 500 |

use crate::domain::billing::Module;
use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId};

/// Field name used for form-level (not field-specific) errors.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const GENERIC_PROCESSOR_MESSAGE: &str = "An error has occurred.  Please try again later.";
const CANCEL_FAILED_MESSAGE: &str =
    "An error occurred while cancelling your subscription, please try again later.";
const ALREADY_DELETED_MESSAGE: &str = "The subscription has already been deleted.";
const FIELD_REQUIRED_MESSAGE: &str = "This field is required.";
const TRIAL_INELIGIBLE_MESSAGE: &str = "Your facility is ineligible to start a trial subscription.";

/// Subscription-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Input rejected. `field` is `non_field_errors` for form-level messages.
    ValidationFailed { field: String, message: String },

    /// Subscription does not exist or belongs to another facility.
    NotFound(SubscriptionId),

    /// The state machine has no edge for the requested operation.
    InvalidState(String),

    /// Cancel requested on a subscription that is already canceled or ending.
    AlreadyCanceled,

    /// The processor declined the payment source.
    CardDeclined(String),

    /// The processor could not be reached or failed. Carries the user-facing text.
    ProcessorUnavailable { message: String },

    /// Another writer changed the subscription since it was read.
    ConcurrentModification(SubscriptionId),

    /// Persistence or other infrastructure failure.
    Infrastructure(String),
}

impl SubscriptionError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Form-level validation error.
    pub fn form(message: impl Into<String>) -> Self {
        Self::validation(NON_FIELD_ERRORS, message)
    }

    pub fn field_required(field: impl Into<String>) -> Self {
        Self::validation(field, FIELD_REQUIRED_MESSAGE)
    }

    pub fn duplicate_module(module: Module) -> Self {
        Self::form(format!("You already have a {} module subscription.", module))
    }

    pub fn trial_ineligible() -> Self {
        Self::form(TRIAL_INELIGIBLE_MESSAGE)
    }

    /// `action` is the verb phrase, e.g. "starting" or "updating".
    pub fn business_agreement_required(action: &str) -> Self {
        Self::form(format!(
            "You need to sign a business agreement before {} a resident module subscription.",
            action
        ))
    }

    pub fn not_found(id: SubscriptionId) -> Self {
        SubscriptionError::NotFound(id)
    }

    pub fn card_declined(message: impl Into<String>) -> Self {
        SubscriptionError::CardDeclined(message.into())
    }

    pub fn processor_unavailable() -> Self {
        SubscriptionError::ProcessorUnavailable {
            message: GENERIC_PROCESSOR_MESSAGE.to_string(),
        }
    }

    pub fn cancellation_failed() -> Self {
        SubscriptionError::ProcessorUnavailable {
            message: CANCEL_FAILED_MESSAGE.to_string(),
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::InvalidState(_) => ErrorCode::InvalidStateTransition,
            SubscriptionError::AlreadyCanceled => ErrorCode::SubscriptionAlreadyCanceled,
            SubscriptionError::CardDeclined(_) => ErrorCode::CardDeclined,
            SubscriptionError::ProcessorUnavailable { .. } => ErrorCode::ProcessorUnavailable,
            SubscriptionError::ConcurrentModification(_) => ErrorCode::ConcurrentModification,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns the user-facing message.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::ValidationFailed { message, .. } => message.clone(),
            SubscriptionError::NotFound(_) => "Not found.".to_string(),
            SubscriptionError::InvalidState(msg) => msg.clone(),
            SubscriptionError::AlreadyCanceled => ALREADY_DELETED_MESSAGE.to_string(),
            SubscriptionError::CardDeclined(msg) => msg.clone(),
            SubscriptionError::ProcessorUnavailable { message } => message.clone(),
            SubscriptionError::ConcurrentModification(_) => {
                "The subscription was changed by another request. Please try again.".to_string()
            }
            SubscriptionError::Infrastructure(_) => GENERIC_PROCESSOR_MESSAGE.to_string(),
        }
    }

    /// Input field the error belongs to, if it is a form error.
    pub fn field(&self) -> Option<&str> {
        match self {
            SubscriptionError::ValidationFailed { field, .. } => Some(field),
            SubscriptionError::CardDeclined(_) => Some("payment_token"),
            SubscriptionError::AlreadyCanceled
            | SubscriptionError::ProcessorUnavailable { .. } => Some(NON_FIELD_ERRORS),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubscriptionError::Infrastructure(detail) => write!(f, "Infrastructure error: {}", detail),
            SubscriptionError::NotFound(id) => write!(f, "Subscription not found: {}", id),
            SubscriptionError::ConcurrentModification(id) => {
                write!(f, "Concurrent modification of subscription {}", id)
            }
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for SubscriptionError {}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        let subscription_id = err
            .details
            .get("subscription_id")
            .and_then(|id| id.parse::<SubscriptionId>().ok());

        match (err.code, subscription_id) {
            (ErrorCode::ValidationFailed | ErrorCode::EmptyField | ErrorCode::InvalidFormat, _) => {
                let field = err.field().unwrap_or(NON_FIELD_ERRORS).to_string();
                SubscriptionError::ValidationFailed {
                    field,
                    message: err.message,
                }
            }
            (ErrorCode::InvalidStateTransition, _) => SubscriptionError::InvalidState(err.message),
            (ErrorCode::SubscriptionAlreadyCanceled, _) => SubscriptionError::AlreadyCanceled,
            (ErrorCode::SubscriptionNotFound, Some(id)) => SubscriptionError::NotFound(id),
            (ErrorCode::ConcurrentModification, Some(id)) => {
                SubscriptionError::ConcurrentModification(id)
            }
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        let domain = DomainError::new(err.code(), err.message());
        match err.field() {
            Some(field) => domain.with_detail("field", field),
            None => domain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_module_message_names_the_module() {
        let err = SubscriptionError::duplicate_module(Module::Staff);
        assert_eq!(err.message(), "You already have a staff module subscription.");
        assert_eq!(err.field(), Some(NON_FIELD_ERRORS));
    }

    #[test]
    fn business_agreement_message_uses_action() {
        let err = SubscriptionError::business_agreement_required("updating");
        assert_eq!(
            err.message(),
            "You need to sign a business agreement before updating a resident module subscription."
        );
    }

    #[test]
    fn card_declined_is_a_payment_token_field_error() {
        let err = SubscriptionError::card_declined("Your card was declined.");
        assert_eq!(err.field(), Some("payment_token"));
        assert_eq!(err.message(), "Your card was declined.");
        assert_eq!(err.code(), ErrorCode::CardDeclined);
    }

    #[test]
    fn processor_unavailable_uses_generic_message() {
        let err = SubscriptionError::processor_unavailable();
        assert_eq!(err.message(), "An error has occurred.  Please try again later.");
    }

    #[test]
    fn already_canceled_message() {
        assert_eq!(
            SubscriptionError::AlreadyCanceled.message(),
            "The subscription has already been deleted."
        );
    }

    #[test]
    fn infrastructure_hides_detail_from_message() {
        let err = SubscriptionError::infrastructure("pool timed out");
        assert!(!err.message().contains("pool"));
        assert!(err.to_string().contains("pool"));
    }

    #[test]
    fn from_domain_validation_keeps_field() {
        let err: SubscriptionError = DomainError::validation("billing_interval", "bad").into();
        assert_eq!(err, SubscriptionError::validation("billing_interval", "bad"));
    }

    #[test]
    fn from_domain_conflict_recovers_subscription_id() {
        let id = SubscriptionId::new();
        let domain = DomainError::new(ErrorCode::ConcurrentModification, "stale")
            .with_detail("subscription_id", id.to_string());
        assert_eq!(
            SubscriptionError::from(domain),
            SubscriptionError::ConcurrentModification(id)
        );
    }

    #[test]
    fn from_domain_database_error_is_infrastructure() {
        let err: SubscriptionError = DomainError::database("insert", "boom").into();
        assert!(matches!(err, SubscriptionError::Infrastructure(_)));
    }

    #[test]
    fn into_domain_error_carries_field() {
        let domain: DomainError = SubscriptionError::field_required("payment_token").into();
        assert_eq!(domain.code, ErrorCode::ValidationFailed);
        assert_eq!(domain.field(), Some("payment_token"));
        assert_eq!(domain.message, "This field is required.");
    }
}
