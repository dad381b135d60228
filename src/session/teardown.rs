//! Ordered, isolated resource release
//!
//! Every step runs regardless of earlier failures; failures are collected and
//! returned together at the end.

use tracing::{error, info, warn};

use crate::error::{BridgeError, Result, TeardownFailure};

/// Collector for teardown step outcomes
#[derive(Debug, Default)]
pub struct Teardown {
    failures: Vec<TeardownFailure>,
    steps: usize,
}

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one step
    pub fn record<T>(&mut self, step: &'static str, result: Result<T>) {
        self.steps += 1;
        match result {
            Ok(_) => info!("{}: done", step),
            Err(e) => {
                warn!("{}: failed: {}", step, e);
                self.failures.push(TeardownFailure { step, message: e.to_string() });
            }
        }
    }

    /// Names of the steps that failed so far
    pub fn failed_steps(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.step).collect()
    }

    /// Aggregate result of all recorded steps
    pub fn finish(self) -> Result<()> {
        if self.failures.is_empty() {
            info!("Teardown complete ({} steps)", self.steps);
            return Ok(());
        }

        error!("Teardown finished with {} of {} steps failed", self.failures.len(), self.steps);
        Err(BridgeError::Teardown(self.failures))
    }
}
