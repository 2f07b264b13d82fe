//! Bounded retry with exponential backoff for optimistic-concurrency loops.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How many times to re-read and re-write a contended pool, and how long to
/// wait in between.
///
/// Delay before attempt `n` (0-indexed, `n >= 1`) is
/// `initial_backoff * multiplier^(n-1)`, capped at `max_backoff`. With
/// `jitter` on, the delay is drawn from `[delay/2, delay]` so replicas that
/// collided once do not collide again in lockstep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Upper bound on any single delay.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Randomise delays (equal jitter).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            multiplier: 2.0,
            max_backoff: Duration::from_millis(500),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
            ..Self::default()
        }
    }

    /// Set the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Check the policy is usable.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".into());
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            ));
        }
        if self.max_backoff < self.initial_backoff {
            return Err("max_backoff must not be smaller than initial_backoff".into());
        }
        Ok(())
    }

    /// Attempt budget, treating 0 as 1.
    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Un-jittered delay before `attempt` (0-indexed). Zero for the first.
    ///
    /// A multiplier that [`validate`](Self::validate) would reject is treated
    /// as 1, so an unchecked policy degrades to constant backoff.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let multiplier = if self.multiplier.is_finite() && self.multiplier >= 1.0 {
            self.multiplier
        } else {
            1.0
        };
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = (self.initial_backoff.as_secs_f64() * multiplier.powi(exponent))
            .min(self.max_backoff.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_backoff)
    }

    /// Delay to wait before `attempt`, jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.jitter {
            return base;
        }
        let millis = base.as_millis() as u64;
        let half = millis / 2;
        let spread = if half > 0 { fastrand::u64(0..=half) } else { 0 };
        Duration::from_millis(millis - half + spread)
    }
}
