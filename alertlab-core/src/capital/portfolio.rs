//! Sequential capital-aware simulation over time-ordered alerts.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StrategyParams;
use crate::deadline::Deadline;
use crate::domain::{is_strictly_ordered, Alert, CandleSource, TradeRecord};
use crate::entry::NoEntryReason;
use crate::error::SimError;
use crate::simulate::{simulate_trade, TradeOutcome};

use super::{position_size, CapitalConfig, CapitalState, EquityPoint, OpenSlot};

/// An executed trade with its capital bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTrade {
    pub trade: TradeRecord,
    pub size: f64,
    /// Entry plus exit costs.
    pub fees: f64,
    /// `size × (exit_mult − 1) − fees`.
    pub net_pnl: f64,
    /// `net_pnl / max_risk_per_trade`.
    pub r_multiple: f64,
    /// `fees / max_risk_per_trade`.
    pub cost_r: f64,
    /// Initial stop distance on the size still held at the final exit, in R.
    /// One stop-width of slippage on a stop exit costs this much.
    pub stop_risk_r: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    BelowMinSize,
    CapacityFull,
    NoEntry(NoEntryReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAlert {
    pub instrument: String,
    pub alert_ms: i64,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResult {
    pub completed_trades: Vec<CompletedTrade>,
    pub skipped: Vec<SkippedAlert>,
    pub missing: usize,
    pub initial_capital: f64,
    pub final_capital: f64,
    /// `(final − initial) / initial`.
    pub total_return: f64,
    pub trades_executed: usize,
    /// Peak-to-trough fraction of the realized equity curve.
    pub max_drawdown: f64,
    pub equity_curve: Vec<EquityPoint>,
}

impl PortfolioResult {
    pub fn total_r(&self) -> f64 {
        self.completed_trades.iter().map(|t| t.r_multiple).sum()
    }
}

/// Run every alert through one capital pool, strictly in trigger-time order.
///
/// Before each entry, positions that exited at or before the entry time return
/// their capital. A trade is skipped when the concurrency cap is full or its
/// size falls below `min_executable_size`; skipped trades consume nothing.
pub fn simulate_portfolio<S: CandleSource + ?Sized>(
    alerts: &[Alert],
    candles: &S,
    strategy: &StrategyParams,
    capital: &CapitalConfig,
    deadline: &Deadline,
) -> Result<PortfolioResult, SimError> {
    let mut state = CapitalState::new(capital.initial_capital);
    let mut completed = Vec::new();
    let mut skipped = Vec::new();
    let mut missing = 0usize;
    let mut verified: HashSet<&str> = HashSet::new();

    for (index, alert) in alerts.iter().enumerate() {
        if index > 0 && alert.trigger_ms < alerts[index - 1].trigger_ms {
            return Err(SimError::AlertsOutOfOrder { index });
        }
        deadline.check()?;

        let series = candles.candles(&alert.instrument);
        if let Some(series) = series {
            if verified.insert(alert.instrument.as_str()) && !is_strictly_ordered(series) {
                return Err(SimError::CandlesOutOfOrder {
                    instrument: alert.instrument.clone(),
                });
            }
        }

        let trade = match simulate_trade(alert, series, strategy, deadline)? {
            TradeOutcome::Closed(trade) => *trade,
            TradeOutcome::Missing => {
                missing += 1;
                continue;
            }
            TradeOutcome::NoEntry(reason) => {
                skipped.push(skip(alert, SkipReason::NoEntry(reason)));
                continue;
            }
        };

        state.release_until(trade.entry_ms);

        if state.open_count() >= capital.max_concurrent_positions {
            debug!(instrument = %alert.instrument, open = state.open_count(), "capacity full, skipping");
            skipped.push(skip(alert, SkipReason::CapacityFull));
            continue;
        }

        let size = position_size(
            capital.max_risk_per_trade,
            strategy.exit.sl_mult,
            capital.max_allocation_pct,
            state.free_cash(),
        );
        if size < capital.min_executable_size || size <= 0.0 {
            debug!(instrument = %alert.instrument, size, "size below minimum, skipping");
            skipped.push(skip(alert, SkipReason::BelowMinSize));
            continue;
        }

        let fees = capital.costs.round_trip(size);
        let held = (1.0 - trade.partial_fills.iter().map(|f| f.fraction).sum::<f64>()).max(0.0);
        let stop_risk_r = size * held * (1.0 - strategy.exit.sl_mult) / capital.max_risk_per_trade;
        let proceeds = size * trade.exit_mult() - fees;
        let net_pnl = proceeds - size;
        state.open(OpenSlot {
            instrument: alert.instrument.clone(),
            exit_ms: trade.exit_ms,
            size,
            proceeds,
        });
        completed.push(CompletedTrade {
            trade,
            size,
            fees,
            net_pnl,
            r_multiple: net_pnl / capital.max_risk_per_trade,
            cost_r: fees / capital.max_risk_per_trade,
            stop_risk_r,
        });
    }

    state.release_all();
    debug_assert!(state.conservation_error() < 1e-6 * capital.initial_capital.max(1.0));

    let final_capital = state.free_cash();
    Ok(PortfolioResult {
        trades_executed: completed.len(),
        completed_trades: completed,
        skipped,
        missing,
        initial_capital: capital.initial_capital,
        final_capital,
        total_return: (final_capital - capital.initial_capital) / capital.initial_capital,
        max_drawdown: state.max_drawdown(),
        equity_curve: state.equity_curve().to_vec(),
    })
}

fn skip(alert: &Alert, reason: SkipReason) -> SkippedAlert {
    SkippedAlert {
        instrument: alert.instrument.clone(),
        alert_ms: alert.trigger_ms,
        reason,
    }
}
