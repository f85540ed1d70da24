//! Exponential backoff state.
//!
//! One `Backoff` tracks a single failure episode: the delay starts at `base`,
//! grows by `multiplier` every time it is consumed, never exceeds `max`, and
//! goes back to `base` on [`Backoff::reset`].

use std::time::Duration;

/// Growing delay for one failure episode.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    /// Create a backoff starting at `base`, capped at `max`.
    ///
    /// A multiplier below 1.0 is treated as 1.0 so the delay never shrinks
    /// inside an episode.
    #[must_use]
    pub fn new(base: Duration, max: Duration, multiplier: f64) -> Self {
        let max = max.max(base);
        let multiplier = if multiplier.is_finite() {
            multiplier.max(1.0)
        } else {
            1.0
        };
        Self {
            base,
            max,
            multiplier,
            current: base,
        }
    }

    /// The delay the next call to [`Backoff::next_delay`] will return.
    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// The starting delay.
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// The delay ceiling.
    #[must_use]
    pub fn max(&self) -> Duration {
        self.max
    }

    /// Return the current delay and grow it for next time.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));
        delay
    }

    /// End the episode: the next delay is `base` again.
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    /// The first `count` delays of a fresh episode, without touching `self`.
    #[must_use]
    pub fn schedule(&self, count: usize) -> Vec<Duration> {
        let mut episode = self.clone();
        episode.reset();
        (0..count).map(|_| episode.next_delay()).collect()
    }
}
