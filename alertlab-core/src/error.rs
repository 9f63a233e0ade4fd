//! Simulation errors.
//!
//! Missing data and skipped trades are outcomes, not errors. Only conditions
//! that make a whole run meaningless end up here.

use thiserror::Error;

use crate::domain::PositionError;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("trial exceeded its time budget of {budget_ms} ms")]
    DeadlineExceeded { budget_ms: u64 },
    #[error("alerts are not in trigger-time order at index {index}")]
    AlertsOutOfOrder { index: usize },
    #[error("candles for {instrument} are not strictly ordered by timestamp")]
    CandlesOutOfOrder { instrument: String },
    #[error("position bookkeeping failed: {0}")]
    Position(#[from] PositionError),
}
