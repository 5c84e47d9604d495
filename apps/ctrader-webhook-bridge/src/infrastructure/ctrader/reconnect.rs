//! Reconnection Policy
//!
//! Exponential backoff for re-establishing the broker session:
//! `delay(n) = min(initial * multiplier^n, max)` for the n-th consecutive
//! failure, counting from zero. Jitter is optional and off by default.
//! Retries never stop; only a fatal authentication error ends them, and
//! that decision belongs to the session manager.

use std::time::Duration;

use rand::Rng;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Growth factor per consecutive failure.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%). Zero disables it.
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl ReconnectConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        jitter_factor: f64,
    ) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter_factor,
        }
    }

    /// Create configuration from `SessionSettings`.
    #[must_use]
    pub const fn from_session_settings(settings: &crate::SessionSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: 2.0,
            jitter_factor: settings.reconnect_jitter,
        }
    }

    /// Backoff delay for the `attempt`-th consecutive failure, without jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let scaled = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        let max_millis = self.max_delay.as_millis();
        let millis = if scaled.is_finite() && scaled >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let scaled = scaled.round() as u128;
            scaled.min(max_millis)
        } else {
            max_millis
        };

        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }
}

/// Stateful reconnection policy.
///
/// # Example
///
/// ```rust
/// use ctrader_webhook_bridge::infrastructure::ctrader::reconnect::{
///     ReconnectConfig, ReconnectPolicy,
/// };
/// use std::time::Duration;
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// assert_eq!(policy.next_delay(), Duration::from_secs(1));
/// assert_eq!(policy.next_delay(), Duration::from_secs(2));
///
/// // Session became ready again
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_secs(1));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempt_count: u32,
}

impl ReconnectPolicy {
    /// Create a new reconnection policy.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// Delay before the next attempt, advancing the failure count.
    #[must_use]
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.config.delay_for_attempt(self.attempt_count);
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.apply_jitter(delay)
    }

    /// Reset after the session became ready.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Consecutive failures seen since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Policy configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconnectConfig {
        &self.config
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * self.config.jitter_factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}
