use std::time::{Duration, Instant};

/// A wall-clock bound after which a caller stops waiting for a result.
///
/// Decoders check it between their expensive phases; the worker pool uses
/// [`Deadline::remaining`] as its wait timeout. Nothing is preempted, so a
/// deadline is a best-effort upper bound.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::after(Duration::from_millis(ms))
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.budget
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.elapsed())
    }
}
