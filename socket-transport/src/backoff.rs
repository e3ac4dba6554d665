//! Exponential reconnection backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::TransportConfig;

const MAX_EXPONENT: u32 = 32;

/// Delay generator for reconnection attempts.
///
/// The n-th delay is `min * factor^n`, moved up or down by a random share
/// of itself (at most `jitter`), and capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    jitter: f64,
    attempts: u32,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, factor: f64, jitter: f64) -> Self {
        Self {
            min,
            max,
            factor,
            jitter: jitter.clamp(0.0, 1.0),
            attempts: 0,
        }
    }

    /// Backoff matching a transport config (factor 2).
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(
            config.reconnection_delay,
            config.reconnection_delay_max,
            2.0,
            config.randomization_factor,
        )
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn duration(&mut self) -> Duration {
        // Past this the delay is capped anyway; keeps the product finite
        let exponent = self.attempts.min(MAX_EXPONENT) as i32;
        let mut ms = self.min.as_millis() as f64 * self.factor.powi(exponent);
        self.attempts = self.attempts.saturating_add(1);

        if self.jitter > 0.0 {
            let mut rng = rand::rng();
            let roll: f64 = rng.random();
            let deviation = (roll * self.jitter * ms).floor();
            if rng.random_bool(0.5) {
                ms -= deviation;
            } else {
                ms += deviation;
            }
        }

        let max_ms = self.max.as_millis() as f64;
        Duration::from_millis(ms.clamp(0.0, max_ms) as u64)
    }

    /// Number of delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
