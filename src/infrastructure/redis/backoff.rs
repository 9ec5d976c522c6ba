//! Reconnect delays for the pub/sub link

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added or removed at random (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            jitter: 0.1,
        }
    }
}

/// Doubling delay capped at `max_delay`, derived from the attempt number.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        let base_ms = self.config.base_delay.as_millis() as f64;
        let max_ms = self.config.max_delay.as_millis() as f64;
        let delay_ms = (base_ms * 2f64.powi(exponent as i32)).min(max_ms);

        let jittered = if self.config.jitter > 0.0 {
            let spread = delay_ms * self.config.jitter;
            delay_ms + rand::rng().random_range(-spread..=spread)
        } else {
            delay_ms
        };

        Duration::from_millis(jittered.clamp(1.0, max_ms) as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}
