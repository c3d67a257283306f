//! TrialSweepRunner - periodic expiry of elapsed trials.
//!
//! Runs `SweepExpiredTrialsHandler` on a fixed interval. The first sweep runs
//! immediately on start so a restarted server catches up at once.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 24h | Time between sweeps |
//!
//! ## Graceful Shutdown
//!
//! The runner listens on a watch channel and returns after the sweep in
//! progress, if any, has finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::application::handlers::SweepExpiredTrialsHandler;
use crate::domain::foundation::Timestamp;

#[derive(Debug, Clone)]
pub struct TrialSweepRunnerConfig {
    pub interval: Duration,
}

impl Default for TrialSweepRunnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl TrialSweepRunnerConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Background service that expires elapsed trials.
pub struct TrialSweepRunner {
    handler: Arc<SweepExpiredTrialsHandler>,
    config: TrialSweepRunnerConfig,
}

impl TrialSweepRunner {
    pub fn new(handler: Arc<SweepExpiredTrialsHandler>, config: TrialSweepRunnerConfig) -> Self {
        Self { handler, config }
    }

    /// Run until the shutdown signal turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = self.config.interval.as_secs(), "trial sweep runner started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("trial sweep runner stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    /// One sweep. Failures are logged; the next tick tries again.
    pub async fn sweep_once(&self) -> usize {
        match self.handler.handle(Timestamp::now()).await {
            Ok(result) => result.expired.len(),
            Err(e) => {
                tracing::error!(error = %e, "expired trial sweep failed");
                0
            }
        }
    }
}
