// SPDX-FileCopyrightText: 2026 AI Shell Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff with additive jitter.

use std::time::Duration;

use aishell_config::model::RateLimitConfig;

/// Backoff parameters derived from `[rate_limit]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
    pub jitter: Duration,
    /// Added on top of whichever of backoff or hint is larger.
    pub safety_margin: Duration,
    /// Waits beyond this are refused rather than slept through.
    pub max_wait: Duration,
}

impl From<&RateLimitConfig> for BackoffConfig {
    fn from(cfg: &RateLimitConfig) -> Self {
        Self {
            base: Duration::from_millis(cfg.base_backoff_ms),
            max: Duration::from_millis(cfg.max_backoff_ms),
            jitter: Duration::from_millis(cfg.jitter_ms),
            safety_margin: Duration::from_millis(cfg.safety_margin_ms),
            max_wait: Duration::from_millis(cfg.max_wait_ms),
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

/// Delay before retry number `attempt` (0-based): `base * 2^attempt`,
/// capped at `max`, plus up to `jitter` of random delay.
pub fn backoff_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    let exp = config
        .base
        .saturating_mul(2u32.saturating_pow(attempt.min(16)))
        .min(config.max);
    let jitter_ms = config.jitter.as_millis() as u64;
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::random::<u64>() % (jitter_ms + 1)
    };
    exp + Duration::from_millis(jitter)
}

/// Final wait for a failure: the larger of backoff and hint, plus margin.
pub fn combine_with_hint(backoff: Duration, hint: Option<Duration>, config: &BackoffConfig) -> Duration {
    backoff.max(hint.unwrap_or_default()) + config.safety_margin
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BackoffConfig {
        BackoffConfig {
            base: Duration::from_millis(500),
            max: Duration::from_secs(4),
            jitter: Duration::from_millis(100),
            safety_margin: Duration::from_millis(250),
            max_wait: Duration::from_secs(20),
        }
    }

    #[test]
    fn grows_exponentially_within_jitter() {
        for (attempt, expected) in [(0u32, 500u64), (1, 1_000), (2, 2_000), (3, 4_000)] {
            let d = backoff_delay(attempt, &cfg()).as_millis() as u64;
            assert!((expected..=expected + 100).contains(&d), "attempt {attempt}: {d}");
        }
    }

    #[test]
    fn capped_at_max() {
        let d = backoff_delay(30, &cfg());
        assert!(d <= Duration::from_millis(4_100));
    }

    #[test]
    fn hint_wins_when_larger() {
        let wait = combine_with_hint(
            Duration::from_millis(500),
            Some(Duration::from_millis(1_500)),
            &cfg(),
        );
        assert_eq!(wait, Duration::from_millis(1_750));
        let wait = combine_with_hint(Duration::from_millis(3_000), Some(Duration::from_millis(10)), &cfg());
        assert_eq!(wait, Duration::from_millis(3_250));
    }
}
