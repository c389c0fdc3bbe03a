//! Pacing between target visits
//!
//! A policy maps the index of the next item to a range of delays; the
//! coordinator draws a uniform duration from that range and sleeps before
//! opening the tab. Randomized ranges with a periodic long pause keep the
//! visit cadence from being a fixed interval.

use crate::config::RateLimitConfig;
use rand::Rng;
use std::time::Duration;

/// Inclusive range of delays to draw from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    /// Creates a range, swapping the bounds if they are given reversed
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn zero() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }

    /// Draws a duration uniformly from the range (bounds included)
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let min = self.min.as_millis() as u64;
        let max = self.max.as_millis() as u64;
        Duration::from_millis(rng.random_range(min..=max))
    }

    /// Draws a duration with the thread-local generator
    pub fn sample_now(&self) -> Duration {
        self.sample(&mut rand::rng())
    }
}

/// Maps an item index to the delay awaited before processing it
///
/// Implementations must be pure: the same index always yields the same range.
pub trait RateLimitPolicy: Send + Sync {
    fn delay(&self, index: usize) -> DelayRange;
}

impl<F> RateLimitPolicy for F
where
    F: Fn(usize) -> DelayRange + Send + Sync,
{
    fn delay(&self, index: usize) -> DelayRange {
        self(index)
    }
}

/// Short jitter for most items, a long cooldown every `cooldown_every` items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstCooldownPolicy {
    cooldown_every: usize,
    short: DelayRange,
    cooldown: DelayRange,
}

impl BurstCooldownPolicy {
    pub fn new(cooldown_every: usize, short: DelayRange, cooldown: DelayRange) -> Self {
        Self {
            cooldown_every,
            short,
            cooldown,
        }
    }

    /// Returns true if the item at `index` waits for the cooldown
    ///
    /// The first item never does; `cooldown_every == 0` disables cooldowns.
    pub fn is_cooldown(&self, index: usize) -> bool {
        self.cooldown_every > 0 && index > 0 && index % self.cooldown_every == 0
    }
}

impl From<&RateLimitConfig> for BurstCooldownPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self::new(
            config.cooldown_every as usize,
            DelayRange::from_millis(config.short_delay_min_ms, config.short_delay_max_ms),
            DelayRange::from_millis(config.cooldown_min_ms, config.cooldown_max_ms),
        )
    }
}

impl Default for BurstCooldownPolicy {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl RateLimitPolicy for BurstCooldownPolicy {
    fn delay(&self, index: usize) -> DelayRange {
        if self.is_cooldown(index) {
            self.cooldown
        } else {
            self.short
        }
    }
}

/// The same range for every item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelayPolicy(pub DelayRange);

impl FixedDelayPolicy {
    pub fn none() -> Self {
        Self(DelayRange::zero())
    }
}

impl RateLimitPolicy for FixedDelayPolicy {
    fn delay(&self, _index: usize) -> DelayRange {
        self.0
    }
}
