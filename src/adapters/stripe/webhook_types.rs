//! Stripe wire types.
//!
//! Stripe objects as they arrive in webhook deliveries and API responses,
//! plus the `Stripe-Signature` header. Only the fields billing reads are
//! modelled; everything else is ignored by serde.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::Timestamp;
use crate::ports::{ProcessorSubscription, SubscriptionChanges};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

/// Error parsing the Stripe-Signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    MissingHeader,
    MissingTimestamp,
    MissingV1Signature,
    InvalidTimestamp,
    /// Signature is not valid hex.
    InvalidSignatureFormat,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::InvalidSignatureFormat => write!(f, "Invalid signature format (not valid hex)"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
///
/// Stripe sends one `v1` entry per active signing secret, so several may be
/// present during secret rotation.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    v1_signatures.push(
                        hex::decode(value.trim())
                            .map_err(|_| SignatureParseError::InvalidSignatureFormat)?,
                    );
                }
                // v0 and unknown schemes are not trusted
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }
        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

/// Stripe event as delivered to the webhook endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// `evt_...`
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub created: i64,

    /// Kept whole; `data.object` is decoded by the reconciler.
    pub data: JsonValue,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub pending_webhooks: i64,

    /// A request id string on older API versions, an object on newer ones.
    #[serde(default)]
    pub request: Option<JsonValue>,
}

impl StripeWebhookEvent {
    /// Id of the API request that triggered the event, or empty.
    pub fn request_id(&self) -> String {
        match &self.request {
            Some(JsonValue::String(id)) => id.clone(),
            Some(JsonValue::Object(fields)) => fields
                .get("id")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// API Objects
// ════════════════════════════════════════════════════════════════════════════════

/// Customer returned by `POST /v1/customers`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCustomer {
    /// `cus_...`
    pub id: String,

    #[serde(default)]
    pub subscriptions: StripeList<StripeSubscription>,
}

/// Stripe list wrapper.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePlan {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeSubscription {
    /// `sub_...`
    pub id: String,

    pub status: String,

    #[serde(default)]
    pub plan: Option<StripePlan>,

    #[serde(default)]
    pub current_period_start: Option<i64>,

    #[serde(default)]
    pub current_period_end: Option<i64>,

    #[serde(default)]
    pub trial_start: Option<i64>,

    #[serde(default)]
    pub trial_end: Option<i64>,

    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl From<StripeSubscription> for ProcessorSubscription {
    fn from(sub: StripeSubscription) -> Self {
        Self {
            id: sub.id,
            status: sub.status,
            plan_id: sub.plan.map(|p| p.id),
            current_period_start: sub.current_period_start.and_then(Timestamp::from_unix_secs),
            current_period_end: sub.current_period_end.and_then(Timestamp::from_unix_secs),
            trial_start: sub.trial_start.and_then(Timestamp::from_unix_secs),
            trial_end: sub.trial_end.and_then(Timestamp::from_unix_secs),
            cancel_at_period_end: sub.cancel_at_period_end,
            pending: SubscriptionChanges::default(),
        }
    }
}

/// Error body returned by the Stripe API on non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeApiError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeApiError {
    /// `card_error`, `invalid_request_error`, `api_error`, ...
    #[serde(rename = "type")]
    pub error_type: String,

    #[serde(default)]
    pub code: Option<String>,

    #[serde(default)]
    pub message: Option<String>,
}

impl StripeApiError {
    pub fn is_card_error(&self) -> bool {
        self.error_type == "card_error"
    }
}
