use std::time::Duration;

use rand::Rng;

/// Retry policy for one logical retry loop.
#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub attempts: u32,
    /// First delay, in seconds.
    pub base: f64,
    /// Multiplier applied per attempt.
    pub factor: f64,
    /// Ceiling on the exponential part, in seconds.
    pub max_delay: f64,
    /// Uniform jitter added on top, in milliseconds.
    pub jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: 0.3,
            factor: 2.0,
            max_delay: 2.0,
            jitter_ms: 150,
        }
    }
}

/// Stateful delay sequence. One instance per call sequence; not shared.
pub struct ExponentialBackoff {
    cfg: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(cfg: BackoffConfig) -> Self {
        Self { cfg, attempt: 0 }
    }

    /// Delay before the next retry: min(base · factor^n, max) + jitter.
    pub fn next_delay(&mut self) -> Duration {
        let exp = self.cfg.base * self.cfg.factor.powi(self.attempt as i32);
        let capped = exp.min(self.cfg.max_delay);
        let jitter = if self.cfg.jitter_ms > 0 {
            rand::rng().random_range(0.0..self.cfg.jitter_ms as f64 / 1000.0)
        } else {
            0.0
        };
        self.attempt += 1;
        Duration::from_secs_f64(capped + jitter)
    }
}
