//! Application configuration module
//!
//! Type-safe configuration loaded from environment variables with the `config`
//! and `dotenvy` crates. Variables use the `ALF_BILLING` prefix and `__`
//! between nested keys.
//!
//! # Example
//!
//! ```no_run
//! use alf_billing::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod billing;
mod database;
mod error;
mod payment;
mod server;

pub use billing::BillingConfig;
pub use database::DatabaseConfig;
pub use error::{ConfigError, ValidationError};
pub use payment::PaymentConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub payment: PaymentConfig,

    #[serde(default)]
    pub billing: BillingConfig,
}

impl AppConfig {
    /// Load configuration from the environment.
    ///
    /// 1. Loads `.env` if present (development)
    /// 2. Reads `ALF_BILLING__*` variables, `__` separating nested keys
    /// 3. Deserializes into the typed sections
    ///
    /// - `ALF_BILLING__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `ALF_BILLING__BILLING__TRIAL_LENGTH_DAYS=14` -> `billing.trial_length_days = 14`
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("ALF_BILLING")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.database.validate()?;
        self.payment.validate(self.is_production())?;
        self.billing.validate()?;
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
