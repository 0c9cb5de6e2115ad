//! Sliding-window limiter shared by every dispatch of a gateway instance.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

use crate::ports::Clock;

/// Tunables for the dispatch rate limit.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 15,
            window: Duration::from_secs(60),
        }
    }
}

/// Caps dispatches to `max_requests` per rolling `window`, across all features
/// and credentials.
///
/// The lock is released while waiting, so concurrent callers that wake together
/// can briefly overshoot the cap.
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    timestamps: Mutex<VecDeque<DateTime<Utc>>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Waits until a slot is free, then claims it. Returns the recorded timestamp.
    pub async fn acquire(&self) -> DateTime<Utc> {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = self.clock.now();
                self.prune(&mut timestamps, now);

                if timestamps.len() < self.config.max_requests {
                    timestamps.push_back(now);
                    return now;
                }

                let oldest = timestamps.front().copied().unwrap_or(now);
                let elapsed = (now - oldest).to_std().unwrap_or_default();
                self.config.window.saturating_sub(elapsed)
            };

            info!(
                wait_ms = wait.as_millis() as u64,
                "Rate limit reached, waiting for a free slot"
            );
            self.clock.sleep(wait).await;
        }
    }

    /// Number of dispatches inside the current window.
    pub async fn in_flight_window(&self) -> usize {
        let mut timestamps = self.timestamps.lock().await;
        self.prune(&mut timestamps, self.clock.now());
        timestamps.len()
    }

    fn prune(&self, timestamps: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
        while let Some(oldest) = timestamps.front() {
            let age = (now - *oldest).to_std().unwrap_or_default();
            if age >= self.config.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn twenty_dispatches_never_exceed_fifteen_per_window() {
        let clock = clock();
        let limiter = RateLimiter::new(RateLimitConfig::default(), clock.clone());

        let mut recorded = Vec::new();
        for _ in 0..20 {
            recorded.push(limiter.acquire().await);
            clock.advance(Duration::from_millis(100));
        }

        let window = chrono::Duration::seconds(60);
        for start in &recorded {
            let in_window = recorded
                .iter()
                .filter(|t| **t >= *start && **t < *start + window)
                .count();
            assert!(in_window <= 15, "{} dispatches in one window", in_window);
        }
        assert_eq!(clock.sleeps().len(), 1);
    }

    #[tokio::test]
    async fn waits_until_oldest_timestamp_leaves_window() {
        let clock = clock();
        let config = RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(60),
        };
        let limiter = RateLimiter::new(config, clock.clone());

        limiter.acquire().await;
        clock.advance(Duration::from_secs(10));
        limiter.acquire().await;
        clock.advance(Duration::from_secs(5));
        limiter.acquire().await;

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(45)]);
        assert_eq!(limiter.in_flight_window().await, 2);
    }

    #[tokio::test]
    async fn no_wait_below_cap() {
        let clock = clock();
        let limiter = RateLimiter::new(RateLimitConfig::default(), clock.clone());

        for _ in 0..15 {
            limiter.acquire().await;
        }

        assert!(clock.sleeps().is_empty());
        assert_eq!(limiter.in_flight_window().await, 15);
    }
}
