//! Payment processor configuration (Stripe)

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::adapters::stripe::{StripeGatewayConfig, StripeWebhookVerifier};

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Secret API key (`sk_test_...` / `sk_live_...`)
    pub stripe_api_key: SecretString,

    /// Webhook endpoint signing secret (`whsec_...`)
    pub stripe_webhook_secret: SecretString,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Reject test-mode webhook events
    #[serde(default)]
    pub require_livemode: bool,
}

impl PaymentConfig {
    pub fn is_live_mode(&self) -> bool {
        self.stripe_api_key.expose_secret().starts_with("sk_live_")
    }

    pub fn gateway_config(&self) -> StripeGatewayConfig {
        StripeGatewayConfig::new(self.stripe_api_key.expose_secret().clone())
            .with_base_url(self.api_base_url.clone())
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn webhook_verifier(&self) -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(self.stripe_webhook_secret.expose_secret().clone())
            .with_require_livemode(self.require_livemode)
    }

    /// `is_production` gates live keys: a live key on a non-production
    /// deployment is refused.
    pub fn validate(&self, is_production: bool) -> Result<(), ValidationError> {
        let api_key = self.stripe_api_key.expose_secret();
        let webhook_secret = self.stripe_webhook_secret.expose_secret();

        if api_key.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_API_KEY"));
        }
        if webhook_secret.is_empty() {
            return Err(ValidationError::MissingRequired("PAYMENT__STRIPE_WEBHOOK_SECRET"));
        }
        if !api_key.starts_with("sk_") {
            return Err(ValidationError::InvalidStripeKey);
        }
        if !webhook_secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }
        if self.is_live_mode() && !is_production {
            return Err(ValidationError::LiveKeyOutsideProduction);
        }
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}
