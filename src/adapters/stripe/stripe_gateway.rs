//! Stripe implementation of the `PaymentGateway` port.
//!
//! Talks to the Stripe REST API with form-encoded requests. Calls are not
//! retried here; the handlers map failures onto user-facing errors.
//!
//! # Error mapping
//!
//! | Stripe response                 | `GatewayError`          |
//! |---------------------------------|-------------------------|
//! | `card_error`                    | `CardDeclined{message}` |
//! | any other error body or status  | `ProcessorUnavailable`  |
//! | connection failure or timeout   | `ProcessorUnavailable`  |

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::ports::{
    CreateCustomerRequest, GatewayError, PaymentGateway, ProcessorCustomer, ProcessorSubscription,
};

use super::webhook_types::{StripeCustomer, StripeErrorResponse, StripeSubscription};

const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Fallback shown when Stripe declines a card without a message.
const DEFAULT_DECLINE_MESSAGE: &str = "Your card was declined.";

/// Stripe API configuration, injected at construction.
#[derive(Clone)]
pub struct StripeGatewayConfig {
    /// Secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Base URL for the Stripe API.
    api_base_url: String,

    request_timeout: Duration,
}

impl StripeGatewayConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Override the base URL (for stripe-mock or a local fake).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for StripeGatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGatewayConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base_url", &self.api_base_url)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Stripe payment gateway.
pub struct StripeGateway {
    config: StripeGatewayConfig,
    http_client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeGatewayConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::unavailable(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Send a request and decode a successful body as `T`.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "Stripe request failed");
                GatewayError::unavailable(format!("{} request failed: {}", operation, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(map_error_response(operation, status.as_u16(), &error_text));
        }

        response.json::<T>().await.map_err(|e| {
            tracing::error!(operation, error = %e, "Stripe response could not be decoded");
            GatewayError::unavailable(format!("{} response invalid: {}", operation, e))
        })
    }
}

/// Map a non-2xx Stripe response.
fn map_error_response(operation: &'static str, status: u16, body: &str) -> GatewayError {
    match serde_json::from_str::<StripeErrorResponse>(body) {
        Ok(parsed) if parsed.error.is_card_error() => {
            tracing::info!(
                operation,
                decline_code = parsed.error.code.as_deref().unwrap_or(""),
                "Stripe declined card"
            );
            GatewayError::card_declined(
                parsed
                    .error
                    .message
                    .unwrap_or_else(|| DEFAULT_DECLINE_MESSAGE.to_string()),
            )
        }
        _ => {
            tracing::error!(operation, status, error = %body, "Stripe API error");
            GatewayError::unavailable(format!("Stripe API error ({}): {}", status, body))
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError> {
        let mut params = vec![
            ("source", request.payment_token),
            ("plan", request.plan_id),
            ("description", request.description),
        ];
        if let Some(trial_end) = request.trial_end {
            params.push(("trial_end", trial_end.as_unix_secs().to_string()));
        }

        let customer: StripeCustomer = self
            .send(
                "create_customer",
                self.http_client.post(self.url("/v1/customers")).form(&params),
            )
            .await?;

        let customer_id = customer.id;
        let subscription = customer
            .subscriptions
            .data
            .into_iter()
            .next()
            .ok_or_else(|| {
                tracing::error!(customer_id = %customer_id, "Stripe customer created without subscription");
                GatewayError::unavailable("customer created without subscription")
            })?;

        Ok(ProcessorCustomer {
            id: customer_id,
            subscription: subscription.into(),
        })
    }

    async fn retrieve_subscription(
        &self,
        processor_subscription_id: &str,
    ) -> Result<ProcessorSubscription, GatewayError> {
        let subscription: StripeSubscription = self
            .send(
                "retrieve_subscription",
                self.http_client.get(self.url(&format!(
                    "/v1/subscriptions/{}",
                    processor_subscription_id
                ))),
            )
            .await?;

        Ok(subscription.into())
    }

    async fn update_subscription(
        &self,
        subscription: &ProcessorSubscription,
    ) -> Result<(), GatewayError> {
        if !subscription.has_pending_changes() {
            return Ok(());
        }

        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(plan_id) = subscription.pending.plan_id.as_deref() {
            params.push(("plan", plan_id));
        }
        if let Some(token) = subscription.pending.payment_token.as_deref() {
            params.push(("source", token));
        }

        let _: StripeSubscription = self
            .send(
                "update_subscription",
                self.http_client
                    .post(self.url(&format!("/v1/subscriptions/{}", subscription.id)))
                    .form(&params),
            )
            .await?;

        Ok(())
    }

    async fn cancel_subscription(
        &self,
        processor_subscription_id: &str,
        at_period_end: bool,
    ) -> Result<(), GatewayError> {
        let url = self.url(&format!("/v1/subscriptions/{}", processor_subscription_id));
        let request = if at_period_end {
            self.http_client
                .post(url)
                .form(&[("cancel_at_period_end", "true")])
        } else {
            self.http_client.delete(url)
        };

        let _: StripeSubscription = self.send("cancel_subscription", request).await?;

        tracing::info!(
            subscription_id = processor_subscription_id,
            at_period_end,
            "Stripe subscription canceled"
        );
        Ok(())
    }
}
