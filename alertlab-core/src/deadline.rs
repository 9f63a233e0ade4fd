//! Cooperative per-trial time budget.
//!
//! The simulator polls the deadline between alerts and every
//! [`CANDLE_POLL_INTERVAL`] candles, so a pathological instrument cannot stall
//! a worker indefinitely.

use std::time::{Duration, Instant};

use crate::error::SimError;

/// How many candles the exit loop processes between deadline polls.
pub const CANDLE_POLL_INTERVAL: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
    budget: Duration,
}

impl Deadline {
    /// No time limit.
    pub fn unbounded() -> Self {
        Self {
            at: None,
            budget: Duration::ZERO,
        }
    }

    /// Expires `budget` from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Some(Instant::now() + budget),
            budget,
        }
    }

    /// `Some(ms)` builds a bounded deadline, `None` an unbounded one.
    pub fn from_millis(budget_ms: Option<u64>) -> Self {
        match budget_ms {
            Some(ms) => Self::after(Duration::from_millis(ms)),
            None => Self::unbounded(),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), SimError> {
        if self.is_expired() {
            return Err(SimError::DeadlineExceeded {
                budget_ms: self.budget.as_millis() as u64,
            });
        }
        Ok(())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::unbounded()
    }
}
