//! Isolated evaluation — every alert simulated on its own, without capital.
//!
//! Alerts are independent here, so the batch runs on the rayon pool. Each
//! alert gets its own deadline; a timed-out alert is reported as failed and
//! the rest of the batch carries on.

use std::time::Duration;

use alertlab_core::{
    simulate_trade, summarize, Alert, CandleSource, Deadline, OutcomeSummary, StrategyParams, TradeOutcome,
    TradeRecord,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// An alert whose simulation returned an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAlert {
    pub instrument: String,
    pub alert_ms: i64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolatedBatch {
    /// Closed trades in alert order.
    pub trades: Vec<TradeRecord>,
    pub no_entry: usize,
    pub missing: usize,
    pub failed: Vec<FailedAlert>,
    pub summary: OutcomeSummary,
}

impl IsolatedBatch {
    pub fn executed(&self) -> usize {
        self.trades.len()
    }
}

/// Simulate each alert independently under `params`.
pub fn evaluate_isolated<S: CandleSource + Sync + ?Sized>(
    alerts: &[Alert],
    candles: &S,
    params: &StrategyParams,
    per_alert_budget: Option<Duration>,
) -> IsolatedBatch {
    let outcomes: Vec<_> = alerts
        .par_iter()
        .map(|alert| {
            let deadline = per_alert_budget.map_or_else(Deadline::unbounded, Deadline::after);
            simulate_trade(alert, candles.candles(&alert.instrument), params, &deadline)
        })
        .collect();

    let mut trades = Vec::new();
    let mut no_entry = 0;
    let mut missing = 0;
    let mut failed = Vec::new();
    for (alert, outcome) in alerts.iter().zip(outcomes) {
        match outcome {
            Ok(TradeOutcome::Closed(trade)) => trades.push(*trade),
            Ok(TradeOutcome::NoEntry(_)) => no_entry += 1,
            Ok(TradeOutcome::Missing) => missing += 1,
            Err(e) => {
                warn!(instrument = %alert.instrument, alert_ms = alert.trigger_ms, error = %e, "alert simulation failed");
                failed.push(FailedAlert {
                    instrument: alert.instrument.clone(),
                    alert_ms: alert.trigger_ms,
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        executed = trades.len(),
        no_entry,
        missing,
        failed = failed.len(),
        "isolated evaluation complete"
    );

    let summary = summarize(&trades);
    IsolatedBatch {
        trades,
        no_entry,
        missing,
        failed,
        summary,
    }
}
