//! Exit rules — the two-phase stop state machine and its stop modes.
//!
//! All levels are expressed as multiples of the entry price. A stop of `0.5`
//! in phase one means "exit if price halves"; a take-profit of `3.0` means
//! "exit at three times entry".

pub mod machine;
pub mod ratchet;

pub use machine::{run_exit, StepOutcome, TradeMachine};
pub use ratchet::StopRatchet;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Which level wins when one candle spans both the stop and the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarOrder {
    /// Assume the low came first (conservative).
    #[default]
    StopFirst,
    /// Assume the high came first.
    TargetFirst,
}

/// One staged partial exit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LadderRung {
    /// Trigger level as a multiple of entry.
    pub mult: f64,
    /// Fraction of the original size sold at this rung.
    pub fraction: f64,
}

/// Inputs a stop policy sees after each completed candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopContext {
    /// Stop multiple configured for the current phase.
    pub phase_stop: f64,
    /// Price (as a multiple of entry) at which the current phase began.
    pub anchor: f64,
    pub peak_mult: f64,
}

/// Capability interface for stop modes: propose the stop level in force for
/// the next candle.
pub trait StopPolicy {
    fn step(&self, ctx: &StopContext) -> f64;

    /// Whether proposals may only raise the stop.
    fn ratchets(&self) -> bool;
}

/// The closed set of stop modes, selected by configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopMode {
    /// Stop fixed at `phase_stop × anchor` for the whole phase.
    #[default]
    Static,
    /// Stop trails the peak at `phase_stop × peak` and never moves down.
    Trailing,
    /// Static stops plus staged partial exits.
    Ladder { rungs: Vec<LadderRung> },
}

impl StopMode {
    pub fn rungs(&self) -> &[LadderRung] {
        match self {
            StopMode::Ladder { rungs } => rungs,
            _ => &[],
        }
    }
}

impl StopPolicy for StopMode {
    fn step(&self, ctx: &StopContext) -> f64 {
        match self {
            StopMode::Static | StopMode::Ladder { .. } => ctx.phase_stop * ctx.anchor,
            StopMode::Trailing => ctx.phase_stop * ctx.peak_mult,
        }
    }

    fn ratchets(&self) -> bool {
        matches!(self, StopMode::Trailing)
    }
}

/// Exit configuration for one parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitParams {
    /// Take-profit multiple. `None` lets winners run until another exit fires.
    pub tp_mult: Option<f64>,
    /// Phase-one stop multiple, strictly inside (0, 1).
    pub sl_mult: f64,
    /// Peak multiple that moves the position into phase two.
    pub phase2_trigger_mult: f64,
    /// Phase-two stop multiple, applied to the phase anchor or the peak.
    pub phase2_stop_mult: f64,
    /// Maximum hold time from entry.
    pub max_hold_ms: Option<i64>,
    pub stop_mode: StopMode,
    pub intrabar: IntrabarOrder,
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            tp_mult: Some(3.0),
            sl_mult: 0.5,
            phase2_trigger_mult: 2.0,
            phase2_stop_mult: 0.7,
            max_hold_ms: Some(48 * 3_600_000),
            stop_mode: StopMode::Static,
            intrabar: IntrabarOrder::StopFirst,
        }
    }
}

impl ExitParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sl_mult > 0.0 && self.sl_mult < 1.0) {
            return Err(ConfigError::out_of_range("exit.sl_mult", self.sl_mult, "(0, 1)"));
        }
        if let Some(tp) = self.tp_mult {
            if !(tp > 1.0 && tp.is_finite()) {
                return Err(ConfigError::out_of_range("exit.tp_mult", tp, "(1, inf)"));
            }
        }
        if !(self.phase2_trigger_mult > 1.0 && self.phase2_trigger_mult.is_finite()) {
            return Err(ConfigError::out_of_range(
                "exit.phase2_trigger_mult",
                self.phase2_trigger_mult,
                "(1, inf)",
            ));
        }
        if !(self.phase2_stop_mult > 0.0 && self.phase2_stop_mult < 1.0) {
            return Err(ConfigError::out_of_range(
                "exit.phase2_stop_mult",
                self.phase2_stop_mult,
                "(0, 1)",
            ));
        }
        if let Some(hold) = self.max_hold_ms {
            if hold <= 0 {
                return Err(ConfigError::out_of_range("exit.max_hold_ms", hold as f64, "(0, inf)"));
            }
        }
        self.validate_rungs()
    }

    fn validate_rungs(&self) -> Result<(), ConfigError> {
        let rungs = self.stop_mode.rungs();
        let mut previous = 1.0;
        let mut total = 0.0;
        for rung in rungs {
            if !(rung.mult > previous && rung.mult.is_finite()) {
                return Err(ConfigError::InvalidLadder(format!(
                    "rung multiples must be ascending and above 1.0, got {}",
                    rung.mult
                )));
            }
            if !(rung.fraction > 0.0 && rung.fraction <= 1.0) {
                return Err(ConfigError::InvalidLadder(format!(
                    "rung fraction {} outside (0, 1]",
                    rung.fraction
                )));
            }
            if let Some(tp) = self.tp_mult {
                if rung.mult >= tp {
                    return Err(ConfigError::InvalidLadder(format!(
                        "rung {} is at or above the take-profit {tp}",
                        rung.mult
                    )));
                }
            }
            previous = rung.mult;
            total += rung.fraction;
        }
        if total > 1.0 + 1e-9 {
            return Err(ConfigError::InvalidLadder(format!(
                "rung fractions sum to {total}, more than the whole position"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(ExitParams::default().validate().is_ok());
    }

    #[test]
    fn stop_above_entry_rejected() {
        let params = ExitParams {
            sl_mult: 1.2,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn ladder_must_ascend_and_fit() {
        let params = ExitParams {
            tp_mult: None,
            stop_mode: StopMode::Ladder {
                rungs: vec![
                    LadderRung { mult: 3.0, fraction: 0.5 },
                    LadderRung { mult: 2.0, fraction: 0.5 },
                ],
            },
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::InvalidLadder(_))));

        let overfull = ExitParams {
            tp_mult: None,
            stop_mode: StopMode::Ladder {
                rungs: vec![
                    LadderRung { mult: 2.0, fraction: 0.6 },
                    LadderRung { mult: 3.0, fraction: 0.6 },
                ],
            },
            ..Default::default()
        };
        assert!(matches!(overfull.validate(), Err(ConfigError::InvalidLadder(_))));
    }

    #[test]
    fn trailing_follows_peak_static_follows_anchor() {
        let ctx = StopContext {
            phase_stop: 0.5,
            anchor: 1.0,
            peak_mult: 1.8,
        };
        assert!((StopMode::Trailing.step(&ctx) - 0.9).abs() < 1e-12);
        assert!((StopMode::Static.step(&ctx) - 0.5).abs() < 1e-12);
        assert!(StopMode::Trailing.ratchets());
        assert!(!StopMode::Static.ratchets());
    }
}
