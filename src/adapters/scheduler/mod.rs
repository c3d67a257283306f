//! Background jobs.

mod trial_sweep_runner;

pub use trial_sweep_runner::{TrialSweepRunner, TrialSweepRunnerConfig};
