//! Polling a pull request's check runs with exponential backoff.
//!
//! The delay before poll `n + 1` is `initial_delay * backoff_multiplier^n`,
//! capped at `max_delay`. Polling stops as soon as the checks pass or fail.

use std::time::Duration;

use super::{CheckStatus, PlatformError, PlatformResult, RemotePlatform};
use crate::types::PrNumber;

/// Configuration for check-run polling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Number of status queries before giving up (at least one is always made).
    pub max_attempts: u32,

    /// Delay after the first pending result.
    pub initial_delay: Duration,

    /// Cap for exponential growth.
    pub max_delay: Duration,

    pub backoff_multiplier: f64,
}

impl PollConfig {
    /// 30 polls, 5s growing to 60s: roughly 25 minutes in total.
    pub const DEFAULT: Self = Self {
        max_attempts: 30,
        initial_delay: Duration::from_secs(5),
        max_delay: Duration::from_secs(60),
        backoff_multiplier: 2.0,
    };

    /// Delay after the given (0-indexed) pending result.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped_secs)
    }

    /// Every delay polling may sleep for.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts.saturating_sub(1)).map(|attempt| self.delay_for_attempt(attempt))
    }

    /// Upper bound on time spent sleeping.
    pub fn total_max_wait(&self) -> Duration {
        self.delays().sum()
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Polls until the checks on `number` pass.
///
/// Fails with [`PlatformError::ChecksFailed`] as soon as they fail, and with
/// [`PlatformError::ChecksTimedOut`] once `max_attempts` polls all came back
/// pending.
pub async fn wait_for_checks<P: RemotePlatform>(
    platform: &P,
    number: PrNumber,
    config: &PollConfig,
) -> PlatformResult<()> {
    let attempts = config.max_attempts.max(1);
    for attempt in 0..attempts {
        match platform.check_status(number).await? {
            CheckStatus::Passing => {
                tracing::info!(pr = %number, attempt, "checks passed");
                return Ok(());
            }
            CheckStatus::Failing => {
                tracing::warn!(pr = %number, attempt, "checks failed");
                return Err(PlatformError::ChecksFailed(number));
            }
            CheckStatus::Pending if attempt + 1 < attempts => {
                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(pr = %number, attempt, ?delay, "checks pending");
                tokio::time::sleep(delay).await;
            }
            CheckStatus::Pending => {}
        }
    }
    Err(PlatformError::ChecksTimedOut { number, attempts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakePlatform;

    fn instant(max_attempts: u32) -> PollConfig {
        PollConfig {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 2.0,
        }
    }

    // ─── Backoff ──────────────────────────────────────────────────────────────

    #[test]
    fn delays_grow_then_cap() {
        let config = PollConfig {
            max_attempts: 6,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        };
        let delays: Vec<u64> = config.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10]);
        assert_eq!(config.total_max_wait(), Duration::from_secs(25));
    }

    #[test]
    fn single_attempt_never_sleeps() {
        assert_eq!(instant(1).delays().count(), 0);
        assert_eq!(instant(0).delays().count(), 0);
    }

    // ─── Polling ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn returns_once_checks_pass() {
        let platform = FakePlatform::new();
        platform.script_checks([CheckStatus::Pending, CheckStatus::Pending, CheckStatus::Passing]);
        wait_for_checks(&platform, PrNumber(1), &instant(5))
            .await
            .unwrap();
        assert_eq!(platform.check_polls(), 3);
    }

    #[tokio::test]
    async fn stops_on_failure() {
        let platform = FakePlatform::new();
        platform.script_checks([CheckStatus::Pending, CheckStatus::Failing, CheckStatus::Passing]);
        let err = wait_for_checks(&platform, PrNumber(1), &instant(5))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::ChecksFailed(PrNumber(1))));
        assert_eq!(platform.check_polls(), 2);
    }

    #[tokio::test]
    async fn times_out_when_always_pending() {
        let platform = FakePlatform::new();
        platform.script_checks([CheckStatus::Pending; 10]);
        let err = wait_for_checks(&platform, PrNumber(7), &instant(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlatformError::ChecksTimedOut {
                number: PrNumber(7),
                attempts: 3
            }
        ));
        assert_eq!(platform.check_polls(), 3);
    }
}
