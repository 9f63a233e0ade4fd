//! Stress lane — synthetic execution degradation of a fold's test result.
//!
//! Two adverse effects are layered on top of the fold's test R:
//! - wider slippage: every trade pays `(slippage_multiplier − 1)` times its
//!   average round-trip cost again
//! - stop gaps: each stop-loss exit, profitable phase-2 stops included, gaps
//!   through its level with probability `gap_probability` and fills a further
//!   `(gap_multiplier − 1)` stop-widths lower
//!
//! The expected value of both is subtracted, so the result is deterministic.
//! Stressed R never exceeds the base test R.

use alertlab_core::ConfigError;
use serde::{Deserialize, Serialize};

use crate::walk_forward::FoldResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Multiplier on round-trip costs (1.0 = no extra slippage).
    pub slippage_multiplier: f64,
    /// Probability that a stop-loss exit gaps through its level.
    pub gap_probability: f64,
    /// Stop-width multiplier on a gapped stop (1.0 = no extra loss).
    pub gap_multiplier: f64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            slippage_multiplier: 2.0,
            gap_probability: 0.25,
            gap_multiplier: 1.5,
        }
    }
}

impl StressConfig {
    /// No degradation at all.
    pub fn neutral() -> Self {
        Self {
            slippage_multiplier: 1.0,
            gap_probability: 0.0,
            gap_multiplier: 1.0,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.slippage_multiplier >= 1.0 && self.slippage_multiplier.is_finite()) {
            return Err(ConfigError::out_of_range(
                "stress.slippage_multiplier",
                self.slippage_multiplier,
                "[1, inf)",
            ));
        }
        if !(0.0..=1.0).contains(&self.gap_probability) {
            return Err(ConfigError::out_of_range(
                "stress.gap_probability",
                self.gap_probability,
                "[0, 1]",
            ));
        }
        if !(self.gap_multiplier >= 1.0 && self.gap_multiplier.is_finite()) {
            return Err(ConfigError::out_of_range(
                "stress.gap_multiplier",
                self.gap_multiplier,
                "[1, inf)",
            ));
        }
        Ok(())
    }
}

/// Stressed test R for one fold.
pub fn stress_fold(fold: &FoldResult, config: &StressConfig) -> f64 {
    if fold.trade_count == 0 {
        return finite_or_zero(fold.test_r);
    }
    let extra_cost = fold.trade_count as f64 * non_negative(fold.avg_cost_r) * (config.slippage_multiplier - 1.0).max(0.0);
    let gap_loss = fold.stop_loss_exits as f64
        * config.gap_probability.clamp(0.0, 1.0)
        * non_negative(fold.avg_stop_risk_r)
        * (config.gap_multiplier - 1.0).max(0.0);
    finite_or_zero(fold.test_r) - extra_cost - gap_loss
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(test_r: f64, trades: usize, stops: usize, avg_stop_risk_r: f64, avg_cost_r: f64) -> FoldResult {
        FoldResult {
            name: "f".into(),
            train_r: 0.0,
            train_r_scaled: 0.0,
            test_r,
            avg_trade_r: 0.0,
            win_rate: 0.0,
            trade_count: trades,
            losing_trades: 0,
            avg_loss_r: 0.0,
            stop_loss_exits: stops,
            avg_stop_risk_r,
            median_dd_before_2x: 0.0,
            p75_dd_before_2x: 0.0,
            avg_cost_r,
            train_trades: 0,
            skipped: 0,
            missing: 0,
        }
    }

    #[test]
    fn degradation_scales_with_trades_and_stops() {
        let config = StressConfig {
            slippage_multiplier: 2.0,
            gap_probability: 0.5,
            gap_multiplier: 2.0,
        };
        // 10 × 0.02 × 1 = 0.2 extra cost; 4 × 0.5 × 1.0 × 1 = 2.0 gap loss
        let stressed = stress_fold(&fold(5.0, 10, 4, 1.0, 0.02), &config);
        assert!((stressed - 2.8).abs() < 1e-12);
    }

    #[test]
    fn profitable_stop_exits_still_gap() {
        // Every trade won, but all of them left through a trailing stop.
        let f = fold(15.8, 20, 20, 1.0, 0.0);
        let config = StressConfig {
            slippage_multiplier: 1.0,
            gap_probability: 1.0,
            gap_multiplier: 3.0,
        };
        // 20 × 1.0 × 1.0 × 2 = 40
        assert!((stress_fold(&f, &config) - (15.8 - 40.0)).abs() < 1e-9);
    }

    #[test]
    fn losses_without_stop_exits_do_not_gap() {
        let mut f = fold(-3.0, 6, 0, 0.0, 0.0);
        f.losing_trades = 6;
        f.avg_loss_r = 0.5;
        let config = StressConfig {
            slippage_multiplier: 1.0,
            gap_probability: 1.0,
            gap_multiplier: 2.0,
        };
        assert_eq!(stress_fold(&f, &config), -3.0);
    }

    #[test]
    fn zero_trade_fold_is_untouched() {
        let stressed = stress_fold(&fold(0.0, 0, 0, f64::NAN, f64::NAN), &StressConfig::default());
        assert_eq!(stressed, 0.0);
    }

    #[test]
    fn neutral_config_is_identity() {
        let f = fold(3.5, 8, 3, 0.9, 0.05);
        assert_eq!(stress_fold(&f, &StressConfig::neutral()), 3.5);
    }

    #[test]
    fn validate_rejects_improving_multipliers() {
        let config = StressConfig {
            slippage_multiplier: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = StressConfig {
            gap_probability: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(StressConfig::default().validate().is_ok());
    }
}
