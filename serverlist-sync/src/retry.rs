//! Retry budget and jittered backoff between failed rounds.

use std::time::Duration;

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, SeedableRng};

/// Pause between a write and the read that verifies it.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(3);

/// Upper bound of the random wait after a failed round.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(3 * 60);

/// How long to keep trying and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_rounds: Option<u32>,
    /// Wall-clock budget measured from the start of the first round.
    pub deadline: Option<Duration>,
    pub max_backoff: Duration,
    pub settle: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_rounds: None,
            deadline: None,
            max_backoff: DEFAULT_MAX_BACKOFF,
            settle: DEFAULT_SETTLE,
        }
    }
}

impl RetryPolicy {
    /// Whether `rounds` failed rounds exhaust the round budget.
    pub fn rounds_exhausted(&self, rounds: u32) -> bool {
        self.max_rounds.is_some_and(|max| rounds >= max)
    }

    /// Whether `elapsed` has used up the wall-clock budget.
    pub fn deadline_passed(&self, elapsed: Duration) -> bool {
        self.deadline.is_some_and(|deadline| elapsed >= deadline)
    }

    /// Time left before the deadline; `None` without one.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_sub(elapsed))
    }
}

/// Source of randomized retry delays, uniform over `[0, max]`.
///
/// Each `Backoff` owns its generator so the jitter stream is not shared with
/// any other consumer of randomness.
#[derive(Debug, Clone)]
pub struct Backoff {
    rng: StdRng,
    max: Duration,
}

impl Backoff {
    /// Seeded from the operating system's entropy source.
    pub fn new(max: Duration) -> Self {
        let rng = StdRng::from_rng(OsRng).unwrap_or_else(|_| StdRng::from_entropy());
        Self { rng, max }
    }

    /// Deterministic sequence, for tests and simulations.
    pub fn seeded(max: Duration, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            max,
        }
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    pub fn next_delay(&mut self) -> Duration {
        self.rng.gen_range(Duration::ZERO..=self.max)
    }
}
