//! Reconnect pacing.
//!
//! Delays grow geometrically per failed attempt up to a cap; a jitter
//! factor drawn from an injectable [`JitterSource`] then spreads
//! concurrent clients apart. Tests pin the schedule with [`NoJitter`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Produces jitter samples in `[-1.0, 1.0]`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Default source: a splitmix64 sequence over an atomic counter, seeded
/// once per instance.
pub struct RandomJitter {
    state: AtomicU64,
}

impl Default for RandomJitter {
    fn default() -> Self {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E37_79B9_7F4A_7C15);
        Self {
            state: AtomicU64::new(seed),
        }
    }
}

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        let n = self.state.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed);
        let mut z = n;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        // Top 53 bits -> [0, 1), mapped onto [-1, 1).
        ((z >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    }
}

/// Zero jitter, for tests that assert exact delays.
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn sample(&self) -> f64 {
        0.0
    }
}

/// Shape of the reconnect schedule.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied per failed attempt.
    pub multiplier: f64,
    /// Fraction of the delay the jitter may add or remove.
    pub jitter_ratio: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            multiplier: 2.0,
            jitter_ratio: 0.25,
        }
    }
}

impl ReconnectConfig {
    /// Default schedule under a different cap.
    pub fn with_max_delay(max_delay: Duration) -> Self {
        Self {
            max_delay,
            ..Self::default()
        }
    }

    /// Unjittered delay for `attempt` (1-based): the initial delay grown
    /// by `multiplier` per prior attempt, capped at `max_delay`.
    fn base_delay(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay;
        for _ in 1..attempt.min(32) {
            delay = delay.mul_f64(self.multiplier.max(1.0));
            if delay >= self.max_delay {
                return self.max_delay;
            }
        }
        delay.min(self.max_delay)
    }
}

/// The reconnect pacing policy: schedule shape plus jitter source.
pub struct Backoff {
    config: ReconnectConfig,
    jitter: Box<dyn JitterSource>,
}

impl Backoff {
    pub fn new(config: ReconnectConfig) -> Self {
        Self::with_jitter(config, Box::new(RandomJitter::default()))
    }

    pub fn with_jitter(config: ReconnectConfig, jitter: Box<dyn JitterSource>) -> Self {
        Self { config, jitter }
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay(attempt);
        let ratio = self.config.jitter_ratio.clamp(0.0, 1.0);
        let swing = base.mul_f64(ratio);
        let sample = self.jitter.sample().clamp(-1.0, 1.0);
        if sample >= 0.0 {
            base + swing.mul_f64(sample)
        } else {
            base.saturating_sub(swing.mul_f64(-sample))
        }
    }
}
