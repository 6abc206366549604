//! Capped exponential backoff shared by stream reconnects and snapshot retries

use rand::Rng;
use std::time::Duration;

/// Doubling stops after this many attempts; the cap usually binds first.
const MAX_EXPONENT: u32 = 6;
/// Spreads reconnects of streams that failed together
const DEFAULT_JITTER: f64 = 0.1;

/// Exponential backoff: `min(max_delay, base * 2^attempt)` plus or minus
/// `jitter` of that delay
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max_delay: Duration,
    jitter: f64,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            jitter: DEFAULT_JITTER,
            attempt: 0,
        }
    }

    pub fn from_millis(base_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))
    }

    /// Jitter as a fraction of the delay, clamped to `0.0..=1.0`
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to wait before the next attempt; advances the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let factor = 2u32.pow(self.attempt.min(MAX_EXPONENT));
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.base.saturating_mul(factor).min(self.max_delay);

        let range = delay.as_secs_f64() * self.jitter;
        if range <= 0.0 {
            return delay;
        }
        let offset = rand::thread_rng().gen_range(-range..=range);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
