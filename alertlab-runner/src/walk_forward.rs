//! Walk-forward validation — train/test fold splitting and per-fold evaluation.
//!
//! Folds are defined over the time-ordered alert list. Each fold runs two
//! independent capital-aware simulations (train and test), each starting from
//! fresh capital, and reduces them to a [`FoldResult`] in R units. Train R is
//! also reported rescaled to the test window's alert count, so an expanding
//! train window compares like for like with a fixed-size test window.
//!
//! Three fold layouts:
//! - **anchored**: expanding train window, fixed-size test windows
//! - **split**: one train/test split at a fraction of the alerts
//! - **explicit**: named folds with RFC 3339 time boundaries

use std::ops::Range;

use alertlab_core::stats::{mean, percentile};
use alertlab_core::{
    simulate_portfolio, Alert, CandleSource, CapitalConfig, ConfigError, Deadline, PortfolioResult, SimError,
    StrategyParams,
};
use chrono::DateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─── Configuration ───────────────────────────────────────────────────

/// A named fold with explicit time boundaries. Starts are inclusive, ends exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplicitFold {
    pub name: String,
    pub train_start: String,
    pub train_end: String,
    pub test_start: String,
    pub test_end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WalkForwardConfig {
    Anchored {
        n_folds: usize,
        min_train_alerts: usize,
        min_test_alerts: usize,
    },
    Split {
        train_fraction: f64,
    },
    Explicit {
        folds: Vec<ExplicitFold>,
    },
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        WalkForwardConfig::Anchored {
            n_folds: 4,
            min_train_alerts: 50,
            min_test_alerts: 20,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            WalkForwardConfig::Anchored {
                n_folds,
                min_train_alerts,
                min_test_alerts,
            } => {
                if *n_folds == 0 || *min_train_alerts == 0 || *min_test_alerts == 0 {
                    return Err(ConfigError::Invalid(
                        "walk_forward: n_folds, min_train_alerts and min_test_alerts must be positive".into(),
                    ));
                }
            }
            WalkForwardConfig::Split { train_fraction } => {
                if !(*train_fraction > 0.0 && *train_fraction < 1.0) {
                    return Err(ConfigError::out_of_range(
                        "walk_forward.train_fraction",
                        *train_fraction,
                        "(0, 1)",
                    ));
                }
            }
            WalkForwardConfig::Explicit { folds } => {
                if folds.is_empty() {
                    return Err(ConfigError::Invalid("walk_forward: no explicit folds".into()));
                }
                for fold in folds {
                    let [train_start, train_end, test_start, test_end] = fold_bounds(fold)
                        .map_err(|e| ConfigError::Invalid(format!("walk_forward: {e}")))?;
                    if train_start >= train_end || test_start >= test_end {
                        return Err(ConfigError::Invalid(format!(
                            "walk_forward: fold '{}' has an empty window",
                            fold.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

/// Alert index ranges of one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    pub name: String,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Summary of one fold in R units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    pub name: String,
    /// Sum of per-trade R over the train window.
    pub train_r: f64,
    /// `train_r × test alerts / train alerts`: train R on the test window's basis.
    pub train_r_scaled: f64,
    /// Sum of per-trade R over the test window.
    pub test_r: f64,
    pub avg_trade_r: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    pub losing_trades: usize,
    /// Mean size of a losing trade, as a positive R value.
    pub avg_loss_r: f64,
    /// Test trades whose final exit was a stop (either phase), win or lose.
    pub stop_loss_exits: usize,
    /// Mean stop risk of those exits in R (see `CompletedTrade::stop_risk_r`).
    pub avg_stop_risk_r: f64,
    pub median_dd_before_2x: f64,
    pub p75_dd_before_2x: f64,
    /// Mean round-trip cost per trade in R.
    pub avg_cost_r: f64,
    pub train_trades: usize,
    pub skipped: usize,
    pub missing: usize,
}

impl FoldResult {
    /// Reduce a fold's train and test runs. Test-window statistics describe the fold.
    pub fn from_runs(name: impl Into<String>, train: &PortfolioResult, test: &PortfolioResult) -> Self {
        let trades = &test.completed_trades;
        let rs: Vec<f64> = trades.iter().map(|t| t.r_multiple).collect();
        let losses: Vec<f64> = rs.iter().filter(|r| **r < 0.0).map(|r| -r).collect();
        let wins = rs.iter().filter(|r| **r > 0.0).count();
        let dds: Vec<f64> = trades.iter().map(|t| t.trade.metrics.dd_before_2x).collect();
        let costs: Vec<f64> = trades.iter().map(|t| t.cost_r).collect();
        let stop_risks: Vec<f64> = trades
            .iter()
            .filter(|t| t.trade.exit_reason.is_stop_loss())
            .map(|t| t.stop_risk_r)
            .collect();
        let n = trades.len();
        let train_r = train.total_r();
        let train_alerts = alert_count(train);
        let train_r_scaled = if train_alerts == 0 {
            0.0
        } else {
            train_r * alert_count(test) as f64 / train_alerts as f64
        };

        Self {
            name: name.into(),
            train_r,
            train_r_scaled,
            test_r: test.total_r(),
            avg_trade_r: mean(&rs),
            win_rate: if n == 0 { 0.0 } else { wins as f64 / n as f64 },
            trade_count: n,
            losing_trades: losses.len(),
            avg_loss_r: mean(&losses),
            stop_loss_exits: stop_risks.len(),
            avg_stop_risk_r: mean(&stop_risks),
            median_dd_before_2x: percentile(&dds, 50.0),
            p75_dd_before_2x: percentile(&dds, 75.0),
            avg_cost_r: mean(&costs),
            train_trades: train.trades_executed,
            skipped: test.skipped.len(),
            missing: test.missing,
        }
    }
}

/// Alerts a run was given: executed, skipped or missing.
fn alert_count(run: &PortfolioResult) -> usize {
    run.trades_executed + run.skipped.len() + run.missing
}

#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("insufficient data: {alerts} alerts < minimum {required}")]
    InsufficientData { alerts: usize, required: usize },
    #[error("fold creation failed: cannot fit {n_folds} folds in {alerts} alerts")]
    FoldCreationFailed { n_folds: usize, alerts: usize },
    #[error("invalid fold boundary '{value}': {reason}")]
    InvalidBoundary { value: String, reason: String },
    #[error("simulation failed on fold '{fold}': {source}")]
    Simulation {
        fold: String,
        #[source]
        source: SimError,
    },
}

// ─── Fold creation ───────────────────────────────────────────────────

/// Build fold specifications over time-ordered `alerts`.
///
/// Anchored layout, with `test = (alerts − min_train) / n_folds`:
/// - Fold 0: train = [0 .. min_train], test = next `test` alerts
/// - Fold 1: train = [0 .. min_train + test], test = next `test` alerts
/// - etc.
pub fn create_folds(alerts: &[Alert], config: &WalkForwardConfig) -> Result<Vec<FoldSpec>, WalkForwardError> {
    let total = alerts.len();
    match config {
        WalkForwardConfig::Anchored {
            n_folds,
            min_train_alerts,
            min_test_alerts,
        } => {
            let n = (*n_folds).max(1);
            let required = min_train_alerts + n * min_test_alerts;
            if total < required {
                return Err(WalkForwardError::InsufficientData {
                    alerts: total,
                    required,
                });
            }
            let test_size = (total - min_train_alerts) / n;
            if test_size < *min_test_alerts || test_size == 0 {
                return Err(WalkForwardError::FoldCreationFailed { n_folds: n, alerts: total });
            }
            Ok((0..n)
                .map(|i| {
                    let train_end = min_train_alerts + i * test_size;
                    FoldSpec {
                        name: format!("fold_{i}"),
                        train: 0..train_end,
                        test: train_end..train_end + test_size,
                    }
                })
                .collect())
        }
        WalkForwardConfig::Split { train_fraction } => {
            let train_end = (total as f64 * train_fraction).round() as usize;
            if train_end == 0 || train_end >= total {
                return Err(WalkForwardError::InsufficientData {
                    alerts: total,
                    required: 2,
                });
            }
            Ok(vec![FoldSpec {
                name: "split".into(),
                train: 0..train_end,
                test: train_end..total,
            }])
        }
        WalkForwardConfig::Explicit { folds } => folds
            .iter()
            .map(|fold| {
                let [train_start, train_end, test_start, test_end] = fold_bounds(fold)?;
                Ok(FoldSpec {
                    name: fold.name.clone(),
                    train: time_range(alerts, train_start, train_end),
                    test: time_range(alerts, test_start, test_end),
                })
            })
            .collect(),
    }
}

fn fold_bounds(fold: &ExplicitFold) -> Result<[i64; 4], WalkForwardError> {
    Ok([
        parse_rfc3339_ms(&fold.train_start)?,
        parse_rfc3339_ms(&fold.train_end)?,
        parse_rfc3339_ms(&fold.test_start)?,
        parse_rfc3339_ms(&fold.test_end)?,
    ])
}

/// Milliseconds since the Unix epoch for an RFC 3339 timestamp.
pub fn parse_rfc3339_ms(value: &str) -> Result<i64, WalkForwardError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|e| WalkForwardError::InvalidBoundary {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Indices of alerts with `start <= trigger_ms < end`.
fn time_range(alerts: &[Alert], start: i64, end: i64) -> Range<usize> {
    let lo = alerts.partition_point(|a| a.trigger_ms < start);
    let hi = alerts.partition_point(|a| a.trigger_ms < end).max(lo);
    lo..hi
}

// ─── Walk-forward orchestration ──────────────────────────────────────

/// Evaluate one fold: two independent portfolio runs with fresh capital.
pub fn evaluate_fold<S: CandleSource + ?Sized>(
    alerts: &[Alert],
    candles: &S,
    strategy: &StrategyParams,
    capital: &CapitalConfig,
    fold: &FoldSpec,
    deadline: &Deadline,
) -> Result<FoldResult, WalkForwardError> {
    let wrap = |source| WalkForwardError::Simulation {
        fold: fold.name.clone(),
        source,
    };
    let train = simulate_portfolio(&alerts[fold.train.clone()], candles, strategy, capital, deadline).map_err(wrap)?;
    let test = simulate_portfolio(&alerts[fold.test.clone()], candles, strategy, capital, deadline).map_err(wrap)?;
    let result = FoldResult::from_runs(fold.name.clone(), &train, &test);
    debug!(
        fold = %result.name,
        train_r = result.train_r,
        test_r = result.test_r,
        trades = result.trade_count,
        "fold evaluated"
    );
    Ok(result)
}

/// Split, then evaluate every fold in parallel. Fold order is preserved.
pub fn run_walk_forward<S: CandleSource + Sync + ?Sized>(
    alerts: &[Alert],
    candles: &S,
    strategy: &StrategyParams,
    capital: &CapitalConfig,
    config: &WalkForwardConfig,
    deadline: &Deadline,
) -> Result<Vec<FoldResult>, WalkForwardError> {
    let folds = create_folds(alerts, config)?;
    folds
        .par_iter()
        .map(|fold| evaluate_fold(alerts, candles, strategy, capital, fold, deadline))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alerts(n: usize) -> Vec<Alert> {
        (0..n).map(|i| Alert::new("TOK", i as i64 * 1_000, "x")).collect()
    }

    #[test]
    fn anchored_folds_expand_and_are_contiguous() {
        let config = WalkForwardConfig::Anchored {
            n_folds: 4,
            min_train_alerts: 20,
            min_test_alerts: 5,
        };
        let folds = create_folds(&alerts(100), &config).unwrap();
        assert_eq!(folds.len(), 4);
        assert_eq!(folds[0].train, 0..20);
        assert_eq!(folds[0].test, 20..40);
        for i in 1..folds.len() {
            assert!(folds[i].train.end > folds[i - 1].train.end);
            assert_eq!(folds[i].test.start, folds[i - 1].test.end);
            assert_eq!(folds[i].train.start, 0);
        }
        assert!(folds[3].test.end <= 100);
    }

    #[test]
    fn anchored_rejects_insufficient_alerts() {
        let config = WalkForwardConfig::Anchored {
            n_folds: 4,
            min_train_alerts: 20,
            min_test_alerts: 10,
        };
        let err = create_folds(&alerts(50), &config).unwrap_err();
        assert!(matches!(err, WalkForwardError::InsufficientData { required: 60, .. }));
    }

    #[test]
    fn split_at_fraction() {
        let config = WalkForwardConfig::Split { train_fraction: 0.7 };
        let folds = create_folds(&alerts(10), &config).unwrap();
        assert_eq!(folds.len(), 1);
        assert_eq!(folds[0].train, 0..7);
        assert_eq!(folds[0].test, 7..10);
    }

    #[test]
    fn explicit_folds_select_by_time() {
        let base = parse_rfc3339_ms("2024-01-01T00:00:00Z").unwrap();
        let hour = 3_600_000;
        let alerts: Vec<Alert> = (0..48).map(|h| Alert::new("TOK", base + h * hour, "x")).collect();
        let config = WalkForwardConfig::Explicit {
            folds: vec![ExplicitFold {
                name: "jan1".into(),
                train_start: "2024-01-01T00:00:00Z".into(),
                train_end: "2024-01-01T12:00:00Z".into(),
                test_start: "2024-01-01T12:00:00+00:00".into(),
                test_end: "2024-01-02T00:00:00Z".into(),
            }],
        };
        assert!(config.validate().is_ok());
        let folds = create_folds(&alerts, &config).unwrap();
        assert_eq!(folds[0].train, 0..12);
        assert_eq!(folds[0].test, 12..24);
    }

    #[test]
    fn bad_boundary_is_rejected() {
        assert!(matches!(
            parse_rfc3339_ms("yesterday"),
            Err(WalkForwardError::InvalidBoundary { .. })
        ));
        let config = WalkForwardConfig::Explicit {
            folds: vec![ExplicitFold {
                name: "bad".into(),
                train_start: "2024-01-02T00:00:00Z".into(),
                train_end: "2024-01-01T00:00:00Z".into(),
                test_start: "2024-01-02T00:00:00Z".into(),
                test_end: "2024-01-03T00:00:00Z".into(),
            }],
        };
        assert!(config.validate().is_err());
    }
}
