//! Position — the mutable state of one trade between entry and exit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stop phase of an open position. Only ever advances `One → Two`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    One,
    Two,
}

/// Why a position closed. Exactly one reason is recorded per trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLossPhase1,
    StopLossPhase2,
    TimeExit,
    EndOfData,
}

impl ExitReason {
    pub fn stop_loss(phase: Phase) -> Self {
        match phase {
            Phase::One => ExitReason::StopLossPhase1,
            Phase::Two => ExitReason::StopLossPhase2,
        }
    }

    pub fn is_stop_loss(self) -> bool {
        matches!(self, ExitReason::StopLossPhase1 | ExitReason::StopLossPhase2)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StopLossPhase1 => "stop_loss_phase1",
            ExitReason::StopLossPhase2 => "stop_loss_phase2",
            ExitReason::TimeExit => "time_exit",
            ExitReason::EndOfData => "end_of_data",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A partial exit taken at a ladder rung.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartialFill {
    /// Fill level as a multiple of entry.
    pub mult: f64,
    /// Fraction of the original size sold.
    pub fraction: f64,
    pub timestamp_ms: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("position on {instrument} is already closed")]
    AlreadyClosed { instrument: String },
    #[error("partial fill of {requested} exceeds remaining fraction {remaining}")]
    Overfill { requested: f64, remaining: f64 },
    #[error("position on {instrument} is still open")]
    StillOpen { instrument: String },
}

/// An open (or just-closed) position.
///
/// Exit fields stay `None` until [`Position::close`] succeeds, which it does
/// exactly once. The peak multiple never decreases and the phase never
/// regresses; both are only reachable through the methods below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    instrument: String,
    entry_price: f64,
    entry_ms: i64,
    phase: Phase,
    peak_mult: f64,
    remaining_fraction: f64,
    fills: Vec<PartialFill>,
    exit_price: Option<f64>,
    exit_ms: Option<i64>,
    exit_reason: Option<ExitReason>,
}

impl Position {
    pub fn open(instrument: impl Into<String>, entry_price: f64, entry_ms: i64) -> Self {
        Self {
            instrument: instrument.into(),
            entry_price,
            entry_ms,
            phase: Phase::One,
            peak_mult: 1.0,
            remaining_fraction: 1.0,
            fills: Vec::new(),
            exit_price: None,
            exit_ms: None,
            exit_reason: None,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn entry_ms(&self) -> i64 {
        self.entry_ms
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn peak_mult(&self) -> f64 {
        self.peak_mult
    }

    pub fn remaining_fraction(&self) -> f64 {
        self.remaining_fraction
    }

    pub fn fills(&self) -> &[PartialFill] {
        &self.fills
    }

    pub fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    pub fn exit_ms(&self) -> Option<i64> {
        self.exit_ms
    }

    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit_reason
    }

    pub fn is_closed(&self) -> bool {
        self.exit_reason.is_some()
    }

    /// Raise the running peak. Lower observations are ignored.
    pub fn observe_peak(&mut self, mult: f64) {
        if !self.is_closed() && mult > self.peak_mult {
            self.peak_mult = mult;
        }
    }

    /// Move to phase two. Returns true only on the transition itself.
    pub fn advance_to_phase2(&mut self) -> bool {
        if self.is_closed() || self.phase == Phase::Two {
            return false;
        }
        self.phase = Phase::Two;
        true
    }

    /// Sell `fraction` of the original size at `mult × entry`.
    pub fn record_partial(&mut self, fill: PartialFill) -> Result<(), PositionError> {
        if self.is_closed() {
            return Err(PositionError::AlreadyClosed {
                instrument: self.instrument.clone(),
            });
        }
        if fill.fraction > self.remaining_fraction + 1e-12 {
            return Err(PositionError::Overfill {
                requested: fill.fraction,
                remaining: self.remaining_fraction,
            });
        }
        self.remaining_fraction = (self.remaining_fraction - fill.fraction).max(0.0);
        self.fills.push(fill);
        Ok(())
    }

    /// Close the remaining size at `mult × entry`.
    ///
    /// The recorded exit price is the size-weighted blend of any partial
    /// fills and the final fill.
    pub fn close(&mut self, mult: f64, timestamp_ms: i64, reason: ExitReason) -> Result<(), PositionError> {
        if self.is_closed() {
            return Err(PositionError::AlreadyClosed {
                instrument: self.instrument.clone(),
            });
        }
        let blended = self.fills.iter().map(|f| f.fraction * f.mult).sum::<f64>()
            + self.remaining_fraction * mult;
        self.remaining_fraction = 0.0;
        self.exit_price = Some(blended * self.entry_price);
        self.exit_ms = Some(timestamp_ms);
        self.exit_reason = Some(reason);
        Ok(())
    }

    /// `(exit_price, exit_ms, reason)` of a closed position.
    pub fn closed_fields(&self) -> Result<(f64, i64, ExitReason), PositionError> {
        match (self.exit_price, self.exit_ms, self.exit_reason) {
            (Some(price), Some(ms), Some(reason)) => Ok((price, ms, reason)),
            _ => Err(PositionError::StillOpen {
                instrument: self.instrument.clone(),
            }),
        }
    }

    /// Exit price as a multiple of entry, once closed.
    pub fn exit_mult(&self) -> Option<f64> {
        self.exit_price.map(|p| p / self.entry_price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_exactly_once() {
        let mut pos = Position::open("ABC", 2.0, 0);
        assert!(!pos.is_closed());
        pos.close(1.5, 10, ExitReason::TakeProfit).unwrap();
        assert_eq!(pos.exit_price(), Some(3.0));
        let again = pos.close(0.5, 20, ExitReason::StopLossPhase1);
        assert!(matches!(again, Err(PositionError::AlreadyClosed { .. })));
        assert_eq!(pos.exit_reason(), Some(ExitReason::TakeProfit));
    }

    #[test]
    fn peak_never_decreases() {
        let mut pos = Position::open("ABC", 1.0, 0);
        pos.observe_peak(2.0);
        pos.observe_peak(1.5);
        assert_eq!(pos.peak_mult(), 2.0);
    }

    #[test]
    fn phase_advances_once() {
        let mut pos = Position::open("ABC", 1.0, 0);
        assert!(pos.advance_to_phase2());
        assert!(!pos.advance_to_phase2());
        assert_eq!(pos.phase(), Phase::Two);
    }

    #[test]
    fn partial_fills_blend_into_exit_price() {
        let mut pos = Position::open("ABC", 1.0, 0);
        pos.record_partial(PartialFill { mult: 2.0, fraction: 0.5, timestamp_ms: 1 }).unwrap();
        pos.close(1.0, 2, ExitReason::StopLossPhase2).unwrap();
        assert!((pos.exit_mult().unwrap() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn overfill_rejected() {
        let mut pos = Position::open("ABC", 1.0, 0);
        pos.record_partial(PartialFill { mult: 2.0, fraction: 0.7, timestamp_ms: 1 }).unwrap();
        let err = pos.record_partial(PartialFill { mult: 3.0, fraction: 0.5, timestamp_ms: 2 });
        assert!(matches!(err, Err(PositionError::Overfill { .. })));
    }
}
