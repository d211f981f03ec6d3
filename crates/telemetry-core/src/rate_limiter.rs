//! Emission throttling for the relay worker.
//!
//! The limiter does not sleep itself. It tells the worker how long to wait after a
//! processed frame so the wait can be interrupted by shutdown.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default target frequency when none is configured.
pub const DEFAULT_TARGET_FREQUENCY_HZ: u32 = 60;

/// Throttling inputs, fixed for the lifetime of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    pub target_frequency_hz: u32,
    /// Sleep only for the remainder of the frame budget instead of a fixed interval.
    pub auto_calculate: bool,
    pub fixed_interval_ms: u64,
    pub throttle_disabled: bool,
}

impl RateLimiterConfig {
    /// Auto mode at `target_frequency_hz`, with the fixed interval derived from it.
    pub fn new(target_frequency_hz: u32) -> Self {
        Self {
            target_frequency_hz,
            auto_calculate: true,
            fixed_interval_ms: interval_ms(target_frequency_hz),
            throttle_disabled: false,
        }
    }

    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.auto_calculate = false;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.throttle_disabled = true;
        self
    }

    pub fn mode(&self) -> ThrottleMode {
        if self.throttle_disabled {
            ThrottleMode::Disabled
        } else if self.auto_calculate {
            ThrottleMode::Auto
        } else {
            ThrottleMode::Fixed
        }
    }

    /// Frame budget at the target frequency.
    pub fn target_interval(&self) -> Duration {
        Duration::from_millis(interval_ms(self.target_frequency_hz))
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_FREQUENCY_HZ)
    }
}

fn interval_ms(hz: u32) -> u64 {
    1000 / u64::from(hz.max(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThrottleMode {
    Disabled,
    Auto,
    Fixed,
}

/// Computes throttling delays and tracks how much time was spent throttled.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    target_interval: Duration,
    fixed_interval: Duration,
    processed_count: u64,
    throttled_count: u64,
    throttled_time: Duration,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            target_interval: config.target_interval(),
            fixed_interval: Duration::from_millis(config.fixed_interval_ms),
            config,
            processed_count: 0,
            throttled_count: 0,
            throttled_time: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    pub fn mode(&self) -> ThrottleMode {
        self.config.mode()
    }

    /// Delay to apply after a frame, given the time elapsed since the previous tick.
    ///
    /// Auto mode returns the remainder of the frame budget; fixed mode always
    /// returns the fixed interval. `None` means no sleep.
    pub fn delay_after_frame(&mut self, elapsed: Duration) -> Option<Duration> {
        self.processed_count = self.processed_count.saturating_add(1);
        let delay = match self.mode() {
            ThrottleMode::Disabled => None,
            ThrottleMode::Auto => self
                .target_interval
                .checked_sub(elapsed)
                .filter(|remaining| !remaining.is_zero()),
            ThrottleMode::Fixed => Some(self.fixed_interval).filter(|d| !d.is_zero()),
        };
        if delay.is_some() {
            self.throttled_count = self.throttled_count.saturating_add(1);
        }
        delay
    }

    /// Record the time actually spent throttling.
    pub fn record_throttle(&mut self, slept: Duration) {
        self.throttled_time = self.throttled_time.saturating_add(slept);
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    pub fn throttled_count(&self) -> u64 {
        self.throttled_count
    }

    pub fn stats(&self) -> RateLimiterStats {
        RateLimiterStats::from(self)
    }

    /// Reset collected statistics.
    pub fn reset_stats(&mut self) {
        self.processed_count = 0;
        self.throttled_count = 0;
        self.throttled_time = Duration::ZERO;
    }
}

/// Rate limiter statistics for monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RateLimiterStats {
    pub target_frequency_hz: u32,
    pub processed_count: u64,
    pub throttled_count: u64,
    pub throttled_time: Duration,
}

impl From<&RateLimiter> for RateLimiterStats {
    fn from(limiter: &RateLimiter) -> Self {
        Self {
            target_frequency_hz: limiter.config.target_frequency_hz,
            processed_count: limiter.processed_count,
            throttled_count: limiter.throttled_count,
            throttled_time: limiter.throttled_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_derives_fixed_interval() {
        let config = RateLimiterConfig::new(20);
        assert_eq!(config.fixed_interval_ms, 50);
        assert_eq!(config.mode(), ThrottleMode::Auto);
        assert_eq!(config.fixed().mode(), ThrottleMode::Fixed);
        assert_eq!(config.fixed().disabled().mode(), ThrottleMode::Disabled);
    }

    #[test]
    fn test_auto_mode_sleeps_remainder() {
        let mut limiter = RateLimiter::new(RateLimiterConfig::new(20));
        assert_eq!(
            limiter.delay_after_frame(Duration::from_millis(10)),
            Some(Duration::from_millis(40))
        );
        assert_eq!(limiter.delay_after_frame(Duration::from_millis(50)), None);
        assert_eq!(limiter.delay_after_frame(Duration::from_millis(80)), None);
        assert_eq!(limiter.processed_count(), 3);
        assert_eq!(limiter.throttled_count(), 1);
    }

    #[test]
    fn test_fixed_mode_ignores_elapsed() {
        let mut limiter = RateLimiter::new(RateLimiterConfig::new(20).fixed());
        assert_eq!(
            limiter.delay_after_frame(Duration::from_millis(500)),
            Some(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_disabled_never_sleeps() {
        let mut limiter = RateLimiter::new(RateLimiterConfig::new(20).disabled());
        assert_eq!(limiter.delay_after_frame(Duration::ZERO), None);
        assert_eq!(limiter.throttled_count(), 0);
    }

    #[test]
    fn test_stats_and_reset() {
        let mut limiter = RateLimiter::new(RateLimiterConfig::new(100));
        let _ = limiter.delay_after_frame(Duration::ZERO);
        limiter.record_throttle(Duration::from_millis(10));

        let stats = limiter.stats();
        assert_eq!(stats.target_frequency_hz, 100);
        assert_eq!(stats.processed_count, 1);
        assert_eq!(stats.throttled_time, Duration::from_millis(10));

        limiter.reset_stats();
        assert_eq!(limiter.stats().processed_count, 0);
    }

    #[test]
    fn test_zero_frequency_does_not_divide_by_zero() {
        let config = RateLimiterConfig::new(0);
        assert_eq!(config.target_interval(), Duration::from_millis(1000));
    }
}
