//! Outcome aggregation — cohorts, expectancy, and distribution statistics.
//!
//! Cohorts are disjoint and cover every trade:
//! - **winners**: reached 3×
//! - **losers**: reached 2× but not 3×
//! - **never-2x**: never reached 2×
//!
//! The names follow the trading desk's convention: a "loser" here still
//! doubled at some point, it just never got to 3×.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ExitReason, TradeRecord};
use crate::stats::{mean, median, Percentiles};

/// Count and exit-multiple statistics of one cohort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortStats {
    pub count: usize,
    pub mean_exit_mult: f64,
    pub median_exit_mult: f64,
}

impl CohortStats {
    fn from_exit_mults(mults: &[f64]) -> Self {
        Self {
            count: mults.len(),
            mean_exit_mult: mean(mults),
            median_exit_mult: median(mults),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    pub trade_count: usize,
    pub winners: CohortStats,
    pub losers: CohortStats,
    pub never_2x: CohortStats,
    /// `(mean exit_mult − 1) × 100` over all trades.
    pub ev_from_entry_pct: f64,
    /// Same over trades that reached 2×. `None` when none did.
    pub ev_given_2x_pct: Option<f64>,
    pub p_reach_2x: f64,
    /// `None` when no trade reached 2×.
    pub p_3x_given_2x: Option<f64>,
    pub max_drawdown: Percentiles,
    pub giveback: Percentiles,
    pub dd_before_2x: Percentiles,
    pub exit_reasons: BTreeMap<ExitReason, usize>,
}

/// Summarize closed trades. An empty slice yields an all-zero summary.
pub fn summarize(trades: &[TradeRecord]) -> OutcomeSummary {
    let mut winners = Vec::new();
    let mut losers = Vec::new();
    let mut never_2x = Vec::new();
    let mut exit_reasons = BTreeMap::new();

    for trade in trades {
        let m = &trade.metrics;
        match (m.hit_2x, m.hit_3x) {
            (_, true) => winners.push(m.exit_mult),
            (true, false) => losers.push(m.exit_mult),
            (false, false) => never_2x.push(m.exit_mult),
        }
        *exit_reasons.entry(trade.exit_reason).or_insert(0) += 1;
    }

    let all: Vec<f64> = trades.iter().map(|t| t.metrics.exit_mult).collect();
    let reached: Vec<f64> = winners.iter().chain(losers.iter()).copied().collect();
    let n = trades.len();

    let ev_from_entry_pct = if n == 0 { 0.0 } else { (mean(&all) - 1.0) * 100.0 };
    let ev_given_2x_pct = (!reached.is_empty()).then(|| (mean(&reached) - 1.0) * 100.0);
    let p_reach_2x = if n == 0 { 0.0 } else { reached.len() as f64 / n as f64 };
    let p_3x_given_2x = (!reached.is_empty()).then(|| winners.len() as f64 / reached.len() as f64);

    let collect = |f: fn(&TradeRecord) -> f64| -> Vec<f64> { trades.iter().map(f).collect() };

    OutcomeSummary {
        trade_count: n,
        winners: CohortStats::from_exit_mults(&winners),
        losers: CohortStats::from_exit_mults(&losers),
        never_2x: CohortStats::from_exit_mults(&never_2x),
        ev_from_entry_pct,
        ev_given_2x_pct,
        p_reach_2x,
        p_3x_given_2x,
        max_drawdown: Percentiles::from_values(&collect(|t| t.metrics.max_drawdown_pct)),
        giveback: Percentiles::from_values(&collect(|t| t.metrics.giveback_pct)),
        dd_before_2x: Percentiles::from_values(&collect(|t| t.metrics.dd_before_2x)),
        exit_reasons,
    }
}
