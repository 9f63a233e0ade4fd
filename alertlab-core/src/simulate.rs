//! Single-trade simulation: entry resolution followed by the exit machine.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StrategyParams;
use crate::deadline::Deadline;
use crate::domain::{Alert, Candle, TradeRecord};
use crate::entry::{EntryOutcome, EntryResolver, NoEntryReason};
use crate::error::SimError;
use crate::exit::run_exit;

/// What became of one alert under one parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TradeOutcome {
    Closed(Box<TradeRecord>),
    /// Candles exist after the alert but the entry rule never fired.
    NoEntry(NoEntryReason),
    /// No usable price data for the alert.
    Missing,
}

impl TradeOutcome {
    pub fn trade(&self) -> Option<&TradeRecord> {
        match self {
            TradeOutcome::Closed(trade) => Some(trade.as_ref()),
            _ => None,
        }
    }
}

/// Simulate one alert in isolation.
///
/// `candles` is `None` when the instrument has no data at all.
pub fn simulate_trade(
    alert: &Alert,
    candles: Option<&[Candle]>,
    params: &StrategyParams,
    deadline: &Deadline,
) -> Result<TradeOutcome, SimError> {
    let Some(candles) = candles.filter(|c| !c.is_empty()) else {
        debug!(instrument = %alert.instrument, "no candles for instrument");
        return Ok(TradeOutcome::Missing);
    };

    let entry = match params.entry.resolve(alert, candles) {
        EntryOutcome::Entered(entry) => entry,
        EntryOutcome::NoEntry(NoEntryReason::NoCandlesAfterAlert) => {
            debug!(instrument = %alert.instrument, trigger_ms = alert.trigger_ms, "no candles after alert");
            return Ok(TradeOutcome::Missing);
        }
        EntryOutcome::NoEntry(reason) => return Ok(TradeOutcome::NoEntry(reason)),
    };

    let trade = run_exit(alert, &entry, candles, &params.exit, deadline)?;
    Ok(TradeOutcome::Closed(Box::new(trade)))
}
