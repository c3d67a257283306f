//! Billing policy configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Longest trial the billing policy allows.
pub const MAX_TRIAL_LENGTH_DAYS: i64 = 365;

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    /// Length of a free trial
    #[serde(default = "default_trial_length_days")]
    pub trial_length_days: i64,

    /// Time between expired trial sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl BillingConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_TRIAL_LENGTH_DAYS).contains(&self.trial_length_days) {
            return Err(ValidationError::InvalidTrialLength);
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidSweepInterval);
        }
        Ok(())
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            trial_length_days: default_trial_length_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_trial_length_days() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_thirty_day_trials_swept_daily() {
        let config = BillingConfig::default();
        assert_eq!(config.trial_length_days, 30);
        assert_eq!(config.sweep_interval(), Duration::from_secs(86_400));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let config = BillingConfig {
            trial_length_days: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidTrialLength));

        let config = BillingConfig {
            trial_length_days: i64::MAX,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidTrialLength));

        let config = BillingConfig {
            trial_length_days: MAX_TRIAL_LENGTH_DAYS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = BillingConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidSweepInterval));
    }
}
