//! Bounded retry with exponential backoff around a single backend attempt.
//!
//! Authentication, permission and invalid-argument failures are terminal: they
//! will fail the same way on every attempt, so they are returned immediately.

use regex::Regex;
use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::warn;

use crate::ports::{Clock, PortError, PortResult};

static TERMINAL_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(api[ _-]?key|permission|invalid[ _-]?argument|unauthenticated|unauthorized|forbidden)",
    )
    .expect("terminal error pattern is valid")
});

/// Tunable parameters for the retry strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Multiplied by `2^attempt` after each failed attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given 1-based failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// True when retrying `error` cannot help.
pub fn is_terminal(error: &PortError) -> bool {
    match error {
        PortError::Unauthorized => true,
        other => TERMINAL_ERROR.is_match(&other.to_string()),
    }
}

/// Runs `operation` until it succeeds, fails terminally, or runs out of attempts.
pub async fn with_backoff<T, F, Fut>(
    clock: &dyn Clock,
    policy: &RetryPolicy,
    mut operation: F,
) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if is_terminal(&e) => {
                warn!(attempt, error = %e, "Terminal backend error, not retrying");
                return Err(e);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(attempt, error = %e, "Retries exhausted");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Attempt {attempt} failed, backing off",
                );
                clock.sleep(delay).await;
            }
        }
    }
}
