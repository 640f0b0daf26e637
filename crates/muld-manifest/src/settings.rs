use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, ManifestResult};

/// Retry behaviour for transient transport failures.
///
/// Only network and timeout failures are retried. `max_attempts` counts the
/// first try, so `1` disables retries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            jitter: false,
        }
    }

    /// Fixed-shape policy without jitter, handy for tests.
    pub fn fixed(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: initial_delay.as_millis() as u64,
            max_delay_ms: initial_delay.as_millis() as u64 * 8,
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based), before jitter.
    ///
    /// `initial * multiplier^(retry - 1)`, capped at `max_delay_ms`.
    pub fn base_delay(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exp = i32::try_from(retry - 1).unwrap_or(i32::MAX);
        let millis = (self.initial_delay_ms as f64 * self.multiplier.powi(exp))
            .min(self.max_delay_ms as f64)
            .max(0.0);
        Duration::from_millis(millis.round() as u64)
    }

    fn validate(&self) -> ManifestResult<()> {
        if self.max_attempts == 0 {
            return Err(ManifestError::InvalidSettings(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ManifestError::InvalidSettings(
                "retry.multiplier must be a finite number >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

/// Run-wide settings from the `[settings]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Where sync records are persisted. Relative to the manifest.
    pub state_dir: PathBuf,
    /// Default parent directory of local mirrors. Relative to the manifest.
    pub mirror_root: PathBuf,
    /// Repositories processed at the same time.
    pub concurrency: usize,
    /// Upper bound for one transport command.
    pub command_timeout_secs: u64,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".muld/state"),
            mirror_root: PathBuf::from(".muld/mirrors"),
            concurrency: 4,
            command_timeout_secs: 600,
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub(crate) fn validate(&self) -> ManifestResult<()> {
        if self.concurrency == 0 {
            return Err(ManifestError::InvalidSettings(
                "concurrency must be at least 1".into(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ManifestError::InvalidSettings(
                "command_timeout_secs must be at least 1".into(),
            ));
        }
        self.retry.validate()
    }
}
