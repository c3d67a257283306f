//! Stripe payment processor adapter.
//!
//! - `StripeGateway`: customers and subscriptions over the REST API
//! - `StripeWebhookVerifier`: `Stripe-Signature` verification for inbound events
//! - `MockPaymentGateway`: in-memory gateway for tests and local development
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`

mod mock_payment_gateway;
mod stripe_gateway;
mod webhook_types;
mod webhook_verifier;

pub use mock_payment_gateway::{MethodCall, MockPaymentGateway};
pub use stripe_gateway::{StripeGateway, StripeGatewayConfig};
pub use webhook_types::{
    SignatureHeader, SignatureParseError, StripeCustomer, StripeErrorResponse, StripeSubscription,
    StripeWebhookEvent,
};
pub use webhook_verifier::StripeWebhookVerifier;
