use std::time::Duration;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

use crate::constants::timeouts as timeout_constants;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TimeoutsConfig {
    /// Wall-clock budget (in seconds) for a single execution before it is
    /// forcibly terminated. `0` disables the timer.
    #[serde(default = "TimeoutsConfig::default_execution_timeout_seconds")]
    pub execution_timeout_seconds: u64,
    /// Grace period (in milliseconds) between SIGTERM and SIGKILL when a
    /// process group has to be stopped.
    #[serde(default = "TimeoutsConfig::default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            execution_timeout_seconds: Self::default_execution_timeout_seconds(),
            kill_grace_ms: Self::default_kill_grace_ms(),
        }
    }
}

impl TimeoutsConfig {
    const fn default_execution_timeout_seconds() -> u64 {
        timeout_constants::DEFAULT_EXECUTION_TIMEOUT_SECONDS
    }

    const fn default_kill_grace_ms() -> u64 {
        timeout_constants::DEFAULT_KILL_GRACE_MS
    }

    /// Execution budget as a duration, `None` when disabled.
    pub fn execution_timeout(&self) -> Option<Duration> {
        if self.execution_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.execution_timeout_seconds))
        }
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.kill_grace_ms >= timeout_constants::MIN_KILL_GRACE_MS,
            "timeouts.kill_grace_ms must be at least {}ms",
            timeout_constants::MIN_KILL_GRACE_MS
        );
        Ok(())
    }
}
