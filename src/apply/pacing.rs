//! Pacing of consecutive writes against the destination store.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

use std::sync::Arc;

use crate::config::ApplyConfig;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Called between two writes that the destination may throttle
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait WritePacer: Send + Sync {
    async fn pace(&self);
}

/// Sleep for a fixed duration
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

#[async_trait]
impl WritePacer for FixedDelay {
    async fn pace(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Wait for a `governor` quota cell
#[derive(Debug)]
pub struct GovernorPacer {
    limiter: DefaultDirectRateLimiter,
}

impl GovernorPacer {
    pub fn new(quota: Quota) -> Self {
        Self {
            limiter: RateLimiter::direct(quota),
        }
    }

    pub fn per_second(writes: NonZeroU32) -> Self {
        Self::new(Quota::per_second(writes))
    }
}

#[async_trait]
impl WritePacer for GovernorPacer {
    async fn pace(&self) {
        self.limiter.until_ready().await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

#[async_trait]
impl WritePacer for NoDelay {
    async fn pace(&self) {}
}

/// Pacer for placeholder writes: an evenly spaced rate when one is
/// configured, else the fixed delay (none when it is zero)
pub fn backfill_pacer(config: &ApplyConfig) -> Arc<dyn WritePacer> {
    match config.backfill_rate_per_second.and_then(NonZeroU32::new) {
        Some(rate) => Arc::new(GovernorPacer::new(
            Quota::per_second(rate).allow_burst(NonZeroU32::MIN),
        )),
        None if config.backfill_delay_ms == 0 => Arc::new(NoDelay),
        None => Arc::new(FixedDelay::from_millis(config.backfill_delay_ms)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_sleeps() {
        let start = Instant::now();
        FixedDelay::from_millis(1000).pace().await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_governor_pacer_allows_first_write_immediately() {
        let pacer = GovernorPacer::per_second(NonZeroU32::MIN);
        let start = std::time::Instant::now();
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_configured_rate_throttles_writes() {
        let config = ApplyConfig {
            backfill_delay_ms: 60_000,
            backfill_rate_per_second: Some(10),
            ..ApplyConfig::default()
        };
        let pacer = backfill_pacer(&config);

        let start = std::time::Instant::now();
        for _ in 0..3 {
            pacer.pace().await;
        }
        let elapsed = start.elapsed();
        // Two waits of ~100ms each, far below the fixed delay
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_delay_without_rate_does_not_wait() {
        let config = ApplyConfig {
            backfill_delay_ms: 0,
            backfill_rate_per_second: Some(0),
            ..ApplyConfig::default()
        };
        let start = std::time::Instant::now();
        backfill_pacer(&config).pace().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
