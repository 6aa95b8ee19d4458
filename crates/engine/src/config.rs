//! Engine configuration

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for both scheduling delays
pub const MAX_DELAY_MS: u64 = 60_000;

/// Upper bound for the waiter poll interval
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

/// Refresh engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between the first wake-up and the start of a run (default: 0)
    pub initial_delay_ms: u64,
    /// Delay before re-running when work arrived mid-run (default: 100)
    pub reschedule_delay_ms: u64,
    /// How often waiters re-check their repository (default: 50)
    pub wait_poll_interval_ms: u64,
    /// Run reports kept for `reports()`; oldest dropped when full (default: 64)
    pub report_capacity: usize,
    /// Capacity of the notification channel, 0 for unbounded (default: 0).
    /// Notifications that do not fit are merged into the accumulator directly.
    pub intake_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 0,
            reschedule_delay_ms: 100,
            wait_poll_interval_ms: 50,
            report_capacity: 64,
            intake_capacity: 0,
        }
    }
}

impl EngineConfig {
    /// Check every value lies in its accepted range
    pub fn validate(&self) -> Result<()> {
        if self.initial_delay_ms > MAX_DELAY_MS {
            bail!(
                "initial_delay_ms must be at most {} (got {})",
                MAX_DELAY_MS,
                self.initial_delay_ms
            );
        }
        if self.reschedule_delay_ms > MAX_DELAY_MS {
            bail!(
                "reschedule_delay_ms must be at most {} (got {})",
                MAX_DELAY_MS,
                self.reschedule_delay_ms
            );
        }
        if self.wait_poll_interval_ms == 0 || self.wait_poll_interval_ms > MAX_POLL_INTERVAL_MS {
            bail!(
                "wait_poll_interval_ms must be between 1 and {} (got {})",
                MAX_POLL_INTERVAL_MS,
                self.wait_poll_interval_ms
            );
        }
        if self.report_capacity == 0 {
            bail!("report_capacity must be at least 1");
        }
        Ok(())
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_millis(self.reschedule_delay_ms)
    }

    pub fn wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.wait_poll_interval_ms)
    }
}
