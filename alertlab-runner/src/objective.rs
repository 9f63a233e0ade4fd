//! Robust objective — reduces walk-forward folds to one defensible score.
//!
//! The score starts from the median stressed test R, is pulled down by the
//! train/test gap (weighted by λ) and by a drawdown penalty curve, and is only
//! trusted when every gate passes. Failed gates are collected by name rather
//! than short-circuiting, so a report always shows every reason.

use std::fmt;

use alertlab_core::stats::{mean, median};
use alertlab_core::ConfigError;
use serde::{Deserialize, Serialize};

use crate::stress::{stress_fold, StressConfig};
use crate::walk_forward::FoldResult;

/// Bound on `median_ratio` so near-zero train R cannot blow it up.
pub const RATIO_CLAMP: f64 = 10.0;

// ─── Drawdown penalty ────────────────────────────────────────────────

/// Piecewise drawdown penalty curve over fractional drawdown-before-2x.
///
/// ```text
/// dd ≤ gentle              0
/// gentle < dd ≤ midpoint   gentle_scale × u²                 u = (dd − gentle)/(midpoint − gentle)
/// midpoint < dd ≤ brutal   gentle_scale + steep_scale × v²   v = (dd − midpoint)/(brutal − midpoint)
/// brutal < dd ≤ nuclear    brutal_penalty
/// dd > nuclear             max_penalty
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DdPenaltyConfig {
    pub gentle_threshold: f64,
    pub midpoint: f64,
    pub brutal_threshold: f64,
    pub nuclear_threshold: f64,
    pub gentle_scale: f64,
    pub steep_scale: f64,
    pub brutal_penalty: f64,
    pub max_penalty: f64,
}

impl Default for DdPenaltyConfig {
    fn default() -> Self {
        Self {
            gentle_threshold: 0.30,
            midpoint: 0.45,
            brutal_threshold: 0.60,
            nuclear_threshold: 0.70,
            gentle_scale: 0.5,
            steep_scale: 2.5,
            brutal_penalty: 5.0,
            max_penalty: 100.0,
        }
    }
}

impl DdPenaltyConfig {
    /// Thresholds must be strictly ordered and the pinned penalties must sit
    /// at or above the end of the curve before them, which keeps the curve
    /// monotone.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            self.gentle_threshold,
            self.midpoint,
            self.brutal_threshold,
            self.nuclear_threshold,
        ];
        if thresholds.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ConfigError::Invalid("dd_penalty: thresholds must be finite and non-negative".into()));
        }
        if !(self.gentle_threshold < self.midpoint
            && self.midpoint < self.brutal_threshold
            && self.brutal_threshold <= self.nuclear_threshold)
        {
            return Err(ConfigError::Invalid(format!(
                "dd_penalty: need gentle < midpoint < brutal <= nuclear, got {} / {} / {} / {}",
                self.gentle_threshold, self.midpoint, self.brutal_threshold, self.nuclear_threshold
            )));
        }
        if self.gentle_scale < 0.0 || self.steep_scale < 0.0 {
            return Err(ConfigError::Invalid("dd_penalty: scales must be non-negative".into()));
        }
        if self.brutal_penalty < self.gentle_scale + self.steep_scale {
            return Err(ConfigError::out_of_range(
                "dd_penalty.brutal_penalty",
                self.brutal_penalty,
                "[gentle_scale + steep_scale, inf)",
            ));
        }
        if !(self.max_penalty >= self.brutal_penalty && self.max_penalty.is_finite()) {
            return Err(ConfigError::out_of_range(
                "dd_penalty.max_penalty",
                self.max_penalty,
                "[brutal_penalty, inf)",
            ));
        }
        Ok(())
    }
}

/// Penalty for a fractional drawdown. NaN maps to the maximum.
pub fn compute_dd_penalty(dd: f64, config: &DdPenaltyConfig) -> f64 {
    if dd.is_nan() || dd > config.nuclear_threshold {
        return config.max_penalty;
    }
    if dd <= config.gentle_threshold {
        0.0
    } else if dd <= config.midpoint {
        let u = (dd - config.gentle_threshold) / (config.midpoint - config.gentle_threshold);
        config.gentle_scale * u * u
    } else if dd <= config.brutal_threshold {
        let v = (dd - config.midpoint) / (config.brutal_threshold - config.midpoint);
        config.gentle_scale + config.steep_scale * v * v
    } else {
        config.brutal_penalty
    }
}

/// The drawdown the robust penalty is charged on: the worse of the median
/// and p75 drawdown-before-2x, each taken as the median across folds.
pub fn robust_drawdown(folds: &[FoldResult]) -> f64 {
    let medians: Vec<f64> = folds.iter().map(|f| f.median_dd_before_2x).collect();
    let p75s: Vec<f64> = folds.iter().map(|f| f.p75_dd_before_2x).collect();
    median(&medians).max(median(&p75s))
}

// ─── Gates ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Floor on median test R.
    pub min_test_r: f64,
    /// Floor on the clamped median test/train ratio.
    pub min_ratio: f64,
    /// Minimum fraction of folds with positive test R.
    pub min_folds_positive: f64,
    /// Minimum executed trades summed over all test windows.
    pub min_trades: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_test_r: 0.0,
            min_ratio: 0.3,
            min_folds_positive: 0.6,
            min_trades: 0,
        }
    }
}

impl GateConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_folds_positive) {
            return Err(ConfigError::out_of_range(
                "gates.min_folds_positive",
                self.min_folds_positive,
                "[0, 1]",
            ));
        }
        if !self.min_test_r.is_finite() || !self.min_ratio.is_finite() {
            return Err(ConfigError::Invalid("gates: thresholds must be finite".into()));
        }
        Ok(())
    }
}

/// A gate that did not pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateFailure {
    NoFolds,
    TestRFloor { median_test_r: f64, threshold: f64 },
    TrainTestRatio { ratio: f64, threshold: f64 },
    FoldSurvival { positive_fraction: f64, threshold: f64 },
    MinTrades { trades: usize, threshold: usize },
}

impl GateFailure {
    pub fn name(&self) -> &'static str {
        match self {
            GateFailure::NoFolds => "no_folds",
            GateFailure::TestRFloor { .. } => "min_test_r",
            GateFailure::TrainTestRatio { .. } => "min_ratio",
            GateFailure::FoldSurvival { .. } => "fold_survival",
            GateFailure::MinTrades { .. } => "min_trades",
        }
    }
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::NoFolds => write!(f, "no_folds: nothing to evaluate"),
            GateFailure::TestRFloor { median_test_r, threshold } => {
                write!(f, "min_test_r: median test R {median_test_r:.3} < {threshold:.3}")
            }
            GateFailure::TrainTestRatio { ratio, threshold } => {
                write!(f, "min_ratio: test/train ratio {ratio:.3} < {threshold:.3}")
            }
            GateFailure::FoldSurvival {
                positive_fraction,
                threshold,
            } => write!(
                f,
                "fold_survival: {:.0}% of folds positive < {:.0}%",
                positive_fraction * 100.0,
                threshold * 100.0
            ),
            GateFailure::MinTrades { trades, threshold } => {
                write!(f, "min_trades: {trades} test trades < {threshold}")
            }
        }
    }
}

// ─── Objective ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveConfig {
    /// Weight on the train/test gap.
    pub lambda: f64,
    pub dd_penalty: DdPenaltyConfig,
    pub stress: StressConfig,
    pub gates: GateConfig,
}

impl Default for ObjectiveConfig {
    fn default() -> Self {
        Self {
            lambda: 0.15,
            dd_penalty: DdPenaltyConfig::default(),
            stress: StressConfig::default(),
            gates: GateConfig::default(),
        }
    }
}

impl ObjectiveConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(ConfigError::out_of_range("objective.lambda", self.lambda, "[0, inf)"));
        }
        self.dd_penalty.validate()?;
        self.stress.validate()?;
        self.gates.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobustResult {
    pub fold_count: usize,
    pub median_test_r: f64,
    pub mean_test_r: f64,
    /// Median of `train_r_scaled`, so folds with longer train windows
    /// do not inflate the train side of the ratio and the gap.
    pub median_train_r: f64,
    /// `median_test_r / median_train_r`, clamped to ±[`RATIO_CLAMP`].
    pub median_ratio: f64,
    pub pessimistic_r: f64,
    /// Drawdown the penalty was charged on.
    pub robust_dd: f64,
    pub dd_penalty: f64,
    pub stressed_median_test_r: f64,
    pub stress_score: f64,
    /// Ranking score. Equal to `stress_score`.
    pub score: f64,
    pub positive_fold_fraction: f64,
    pub total_test_trades: usize,
    pub passes_gates: bool,
    pub failed_gates: Vec<GateFailure>,
}

impl RobustResult {
    pub fn failed_gate_names(&self) -> Vec<&'static str> {
        self.failed_gates.iter().map(GateFailure::name).collect()
    }

    fn no_folds() -> Self {
        Self {
            fold_count: 0,
            median_test_r: 0.0,
            mean_test_r: 0.0,
            median_train_r: 0.0,
            median_ratio: 0.0,
            pessimistic_r: 0.0,
            robust_dd: 0.0,
            dd_penalty: 0.0,
            stressed_median_test_r: 0.0,
            stress_score: 0.0,
            score: 0.0,
            positive_fold_fraction: 0.0,
            total_test_trades: 0,
            passes_gates: false,
            failed_gates: vec![GateFailure::NoFolds],
        }
    }
}

/// Clamped ratio that stays finite when train R is at or near zero.
pub fn clamped_ratio(test: f64, train: f64) -> f64 {
    if !test.is_finite() || !train.is_finite() {
        return 0.0;
    }
    if train.abs() < 1e-9 {
        return if test > 0.0 {
            RATIO_CLAMP
        } else if test < 0.0 {
            -RATIO_CLAMP
        } else {
            0.0
        };
    }
    (test / train).clamp(-RATIO_CLAMP, RATIO_CLAMP)
}

/// Score a set of folds. Zero folds fails the `no_folds` gate.
pub fn evaluate_objective(folds: &[FoldResult], config: &ObjectiveConfig) -> RobustResult {
    if folds.is_empty() {
        return RobustResult::no_folds();
    }

    let test_rs: Vec<f64> = folds.iter().map(|f| f.test_r).collect();
    let train_rs: Vec<f64> = folds.iter().map(|f| f.train_r_scaled).collect();
    let stressed: Vec<f64> = folds.iter().map(|f| stress_fold(f, &config.stress)).collect();

    let median_test_r = median(&test_rs);
    let median_train_r = median(&train_rs);
    let stressed_median_test_r = median(&stressed);
    let lambda = config.lambda;

    let robust_dd = robust_drawdown(folds);
    let dd_penalty = compute_dd_penalty(robust_dd, &config.dd_penalty);
    let stress_score = stressed_median_test_r - lambda * (median_train_r - stressed_median_test_r).abs() - dd_penalty;

    let positive = folds.iter().filter(|f| f.test_r > 0.0).count();
    let positive_fold_fraction = positive as f64 / folds.len() as f64;
    let total_test_trades = folds.iter().map(|f| f.trade_count).sum();
    let median_ratio = clamped_ratio(median_test_r, median_train_r);

    let gates = &config.gates;
    let mut failed_gates = Vec::new();
    if median_test_r < gates.min_test_r {
        failed_gates.push(GateFailure::TestRFloor {
            median_test_r,
            threshold: gates.min_test_r,
        });
    }
    if median_ratio < gates.min_ratio {
        failed_gates.push(GateFailure::TrainTestRatio {
            ratio: median_ratio,
            threshold: gates.min_ratio,
        });
    }
    if positive_fold_fraction < gates.min_folds_positive {
        failed_gates.push(GateFailure::FoldSurvival {
            positive_fraction: positive_fold_fraction,
            threshold: gates.min_folds_positive,
        });
    }
    if total_test_trades < gates.min_trades {
        failed_gates.push(GateFailure::MinTrades {
            trades: total_test_trades,
            threshold: gates.min_trades,
        });
    }

    RobustResult {
        fold_count: folds.len(),
        median_test_r,
        mean_test_r: mean(&test_rs),
        median_train_r,
        median_ratio,
        pessimistic_r: median_test_r - lambda * (median_train_r - median_test_r).abs(),
        robust_dd,
        dd_penalty,
        stressed_median_test_r,
        stress_score,
        score: stress_score,
        positive_fold_fraction,
        total_test_trades,
        passes_gates: failed_gates.is_empty(),
        failed_gates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(train_r: f64, test_r: f64) -> FoldResult {
        FoldResult {
            name: "f".into(),
            train_r,
            train_r_scaled: train_r,
            test_r,
            avg_trade_r: 0.0,
            win_rate: 0.0,
            trade_count: 10,
            losing_trades: 0,
            avg_loss_r: 0.0,
            stop_loss_exits: 0,
            avg_stop_risk_r: 0.0,
            median_dd_before_2x: 0.1,
            p75_dd_before_2x: 0.2,
            avg_cost_r: 0.0,
            train_trades: 10,
            skipped: 0,
            missing: 0,
        }
    }

    #[test]
    fn penalty_zero_below_gentle_and_pinned_above() {
        let c = DdPenaltyConfig::default();
        assert_eq!(compute_dd_penalty(0.0, &c), 0.0);
        assert_eq!(compute_dd_penalty(0.30, &c), 0.0);
        assert!(compute_dd_penalty(0.35, &c) > 0.0);
        assert!((compute_dd_penalty(0.45, &c) - 0.5).abs() < 1e-12);
        assert!((compute_dd_penalty(0.60, &c) - 3.0).abs() < 1e-12);
        assert_eq!(compute_dd_penalty(0.65, &c), 5.0);
        assert_eq!(compute_dd_penalty(0.71, &c), 100.0);
        assert_eq!(compute_dd_penalty(f64::NAN, &c), 100.0);
    }

    #[test]
    fn penalty_steeper_above_midpoint() {
        let c = DdPenaltyConfig::default();
        let low_step = compute_dd_penalty(0.40, &c) - compute_dd_penalty(0.35, &c);
        let high_step = compute_dd_penalty(0.55, &c) - compute_dd_penalty(0.50, &c);
        assert!(high_step > low_step);
    }

    #[test]
    fn penalty_config_ordering_enforced() {
        let c = DdPenaltyConfig {
            gentle_threshold: 0.6,
            brutal_threshold: 0.3,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        let c = DdPenaltyConfig {
            brutal_penalty: 1.0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        assert!(DdPenaltyConfig::default().validate().is_ok());
    }

    #[test]
    fn median_ignores_single_outlier() {
        let folds: Vec<FoldResult> = [10.0, 12.0, 11.0, -50.0].iter().map(|t| fold(10.0, *t)).collect();
        let result = evaluate_objective(&folds, &ObjectiveConfig::default());
        assert!((result.median_test_r - 10.5).abs() < 1e-12);
        assert!((result.mean_test_r + 4.25).abs() < 1e-12);
    }

    #[test]
    fn pessimistic_r_charges_the_gap() {
        let folds = vec![fold(20.0, 10.0)];
        let result = evaluate_objective(&folds, &ObjectiveConfig::default());
        assert!((result.pessimistic_r - 8.5).abs() < 1e-12);
        assert!((result.median_ratio - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fold_survival_gate_names_its_reason() {
        let folds = vec![fold(5.0, 4.0), fold(5.0, -1.0), fold(5.0, -2.0), fold(5.0, -0.5)];
        let config = ObjectiveConfig {
            gates: GateConfig {
                min_test_r: f64::MIN,
                min_ratio: -RATIO_CLAMP,
                min_folds_positive: 0.60,
                min_trades: 0,
            },
            ..Default::default()
        };
        let result = evaluate_objective(&folds, &config);
        assert!(!result.passes_gates);
        assert_eq!(result.failed_gate_names(), vec!["fold_survival"]);
        assert!((result.positive_fold_fraction - 0.25).abs() < 1e-12);
    }

    #[test]
    fn zero_folds_fail_without_panicking() {
        let result = evaluate_objective(&[], &ObjectiveConfig::default());
        assert!(!result.passes_gates);
        assert_eq!(result.failed_gates, vec![GateFailure::NoFolds]);
        assert!(result.score.is_finite());
    }

    #[test]
    fn ratio_is_clamped_near_zero_train() {
        assert_eq!(clamped_ratio(5.0, 0.0), RATIO_CLAMP);
        assert_eq!(clamped_ratio(-5.0, 1e-12), -RATIO_CLAMP);
        assert_eq!(clamped_ratio(0.0, 0.0), 0.0);
        assert_eq!(clamped_ratio(100.0, 1.0), RATIO_CLAMP);
    }

    #[test]
    fn every_failed_gate_is_listed() {
        let folds = vec![fold(5.0, -1.0), fold(5.0, -2.0)];
        let config = ObjectiveConfig {
            gates: GateConfig {
                min_trades: 100,
                ..Default::default()
            },
            ..Default::default()
        };
        let names = evaluate_objective(&folds, &config).failed_gate_names();
        assert_eq!(names, vec!["min_test_r", "min_ratio", "fold_survival", "min_trades"]);
    }

    #[test]
    fn drawdown_penalty_flows_into_score() {
        let mut risky = fold(1.0, 1.0);
        risky.p75_dd_before_2x = 0.65;
        let calm = fold(1.0, 1.0);
        let config = ObjectiveConfig {
            stress: StressConfig::neutral(),
            ..Default::default()
        };
        let risky_result = evaluate_objective(&[risky], &config);
        let calm_result = evaluate_objective(&[calm], &config);
        assert_eq!(risky_result.dd_penalty, 5.0);
        assert!((calm_result.score - risky_result.score - 5.0).abs() < 1e-12);
    }
}
