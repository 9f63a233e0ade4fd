//! Per-trade exit state machine: `Phase1 → Phase2 → Closed`.
//!
//! Evaluation rules for each candle after the entry candle:
//! 1. Stop and take-profit levels in force at the candle open apply to the
//!    whole candle. When both are reachable the run's [`IntrabarOrder`] decides.
//! 2. Ladder rungs fill at their exact level when the high reaches them,
//!    unless the stop wins the candle under `StopFirst`.
//! 3. A candle at or past the hold limit that did not stop out or take profit
//!    closes the trade at its close.
//! 4. A candle that leaves the trade open updates the peak, the drawdown
//!    trackers and the phase, then the stop policy proposes the next stop.

use crate::deadline::{Deadline, CANDLE_POLL_INTERVAL};
use crate::domain::{Alert, Candle, ExitReason, PartialFill, Phase, Position, TradeMetrics, TradeRecord};
use crate::entry::Entry;
use crate::error::SimError;

use super::{ExitParams, IntrabarOrder, StopContext, StopPolicy, StopRatchet};

/// Multiple at which `dd_before_2x` stops accumulating.
const TWO_X: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Open,
    Closed,
}

/// How the current candle resolved against the stop and target levels.
enum Resolution {
    Stop(f64),
    Target(f64),
    None,
}

/// Drives one position from entry to exit over a candle sequence.
///
/// The position is tracked at unit size; capital sizing happens later and
/// scales the resulting exit multiple.
#[derive(Debug)]
pub struct TradeMachine<'p> {
    params: &'p ExitParams,
    position: Position,
    stop: StopRatchet,
    next_rung: usize,
    min_low_mult: f64,
    dd_before_2x: f64,
    time_to_2x_ms: Option<i64>,
    last_close_mult: f64,
    last_ms: i64,
}

impl<'p> TradeMachine<'p> {
    /// `entry_close` is the close of the entry candle, used for an end-of-data
    /// exit when nothing follows the entry.
    pub fn new(instrument: &str, entry: &Entry, entry_close: f64, params: &'p ExitParams) -> Self {
        let initial = params.stop_mode.step(&StopContext {
            phase_stop: params.sl_mult,
            anchor: 1.0,
            peak_mult: 1.0,
        });
        let stop = if params.stop_mode.ratchets() {
            StopRatchet::ratcheting(initial)
        } else {
            StopRatchet::fixed(initial)
        };
        Self {
            params,
            position: Position::open(instrument, entry.price, entry.timestamp_ms),
            stop,
            next_rung: 0,
            min_low_mult: 1.0,
            dd_before_2x: 0.0,
            time_to_2x_ms: None,
            last_close_mult: entry_close / entry.price,
            last_ms: entry.timestamp_ms,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn step(&mut self, candle: &Candle) -> Result<StepOutcome, SimError> {
        if self.position.is_closed() {
            return Ok(StepOutcome::Closed);
        }
        let entry = self.position.entry_price();
        let open = candle.open / entry;
        let high = candle.high / entry;
        let low = candle.low / entry;
        let close = candle.close / entry;
        let ts = candle.timestamp_ms;

        let stop = self.stop.level();
        let stop_hit = low <= stop;
        let stop_wins = stop_hit && self.params.intrabar == IntrabarOrder::StopFirst;

        let best_fill = if stop_wins { None } else { self.fill_rungs(high, ts)? };
        if self.position.is_closed() {
            self.observe(best_fill.unwrap_or(high), open, ts);
            return Ok(StepOutcome::Closed);
        }

        let target_hit = self.params.tp_mult.is_some_and(|tp| high >= tp);
        let resolution = match (stop_hit, target_hit, self.params.intrabar) {
            (true, true, IntrabarOrder::TargetFirst) | (false, true, _) => {
                Resolution::Target(self.params.tp_mult.unwrap_or(high))
            }
            (true, _, _) => Resolution::Stop(stop),
            (false, false, _) => Resolution::None,
        };

        match resolution {
            Resolution::Target(level) => {
                self.observe(level, open, ts);
                self.position.close(level, ts, ExitReason::TakeProfit)?;
                return Ok(StepOutcome::Closed);
            }
            Resolution::Stop(level) => {
                self.observe(best_fill.map_or(open, |f| f.max(open)), level, ts);
                let reason = ExitReason::stop_loss(self.position.phase());
                self.position.close(level, ts, reason)?;
                return Ok(StepOutcome::Closed);
            }
            Resolution::None => {}
        }

        self.observe(high, low, ts);
        self.last_close_mult = close;
        self.last_ms = ts;

        if self.hold_expired(ts) {
            self.position.close(close, ts, ExitReason::TimeExit)?;
            return Ok(StepOutcome::Closed);
        }

        self.update_stop();
        Ok(StepOutcome::Open)
    }

    /// Close at the last seen close because no candles remain.
    pub fn finish(&mut self) -> Result<(), SimError> {
        if !self.position.is_closed() {
            self.position
                .close(self.last_close_mult, self.last_ms, ExitReason::EndOfData)?;
        }
        Ok(())
    }

    /// Finish if still open and turn the position into a trade record.
    pub fn into_record(mut self, alert: &Alert, entry: &Entry) -> Result<TradeRecord, SimError> {
        self.finish()?;
        let (exit_price, exit_ms, exit_reason) = self.position.closed_fields()?;
        let exit_mult = exit_price / entry.price;
        let metrics = TradeMetrics::new(
            self.position.peak_mult(),
            exit_mult,
            self.min_low_mult,
            self.dd_before_2x,
            self.time_to_2x_ms,
            exit_ms - entry.timestamp_ms,
        );
        Ok(TradeRecord {
            instrument: alert.instrument.clone(),
            source: alert.source.clone(),
            alert_ms: alert.trigger_ms,
            entry_price: entry.price,
            entry_ms: entry.timestamp_ms,
            time_to_entry_ms: entry.time_to_entry_ms,
            exit_price,
            exit_ms,
            exit_reason,
            phase_at_exit: self.position.phase(),
            partial_fills: self.position.fills().to_vec(),
            metrics,
        })
    }

    /// Take every untouched rung the high reaches. Returns the highest fill.
    /// A rung that exhausts the position closes it with `TakeProfit`.
    fn fill_rungs(&mut self, high: f64, ts: i64) -> Result<Option<f64>, SimError> {
        let rungs = self.params.stop_mode.rungs();
        let mut best = None;
        while let Some(rung) = rungs.get(self.next_rung) {
            if high < rung.mult {
                break;
            }
            self.next_rung += 1;
            best = Some(rung.mult);
            if rung.fraction >= self.position.remaining_fraction() - 1e-9 {
                self.position.observe_peak(rung.mult);
                self.position.close(rung.mult, ts, ExitReason::TakeProfit)?;
                break;
            }
            self.position.record_partial(PartialFill {
                mult: rung.mult,
                fraction: rung.fraction,
                timestamp_ms: ts,
            })?;
        }
        Ok(best)
    }

    fn observe(&mut self, peak_mult: f64, low_mult: f64, ts: i64) {
        self.position.observe_peak(peak_mult);
        self.min_low_mult = self.min_low_mult.min(low_mult);
        if self.time_to_2x_ms.is_none() {
            self.dd_before_2x = self.dd_before_2x.max(1.0 - low_mult);
            if self.position.peak_mult() >= TWO_X {
                self.time_to_2x_ms = Some(ts - self.position.entry_ms());
            }
        }
    }

    fn hold_expired(&self, ts: i64) -> bool {
        self.params
            .max_hold_ms
            .is_some_and(|hold| ts >= self.position.entry_ms().saturating_add(hold))
    }

    fn update_stop(&mut self) {
        let peak = self.position.peak_mult();
        if self.position.phase() == Phase::One && peak >= self.params.phase2_trigger_mult {
            self.position.advance_to_phase2();
        }
        let ctx = match self.position.phase() {
            Phase::One => StopContext {
                phase_stop: self.params.sl_mult,
                anchor: 1.0,
                peak_mult: peak,
            },
            Phase::Two => StopContext {
                phase_stop: self.params.phase2_stop_mult,
                anchor: self.params.phase2_trigger_mult,
                peak_mult: peak,
            },
        };
        self.stop.apply(self.params.stop_mode.step(&ctx));
    }
}

/// Run the state machine from `entry` to exit over `candles`.
///
/// `candles` is the same slice the entry was resolved against; evaluation
/// starts at the candle after `entry.candle_index`.
pub fn run_exit(
    alert: &Alert,
    entry: &Entry,
    candles: &[Candle],
    params: &ExitParams,
    deadline: &Deadline,
) -> Result<TradeRecord, SimError> {
    let entry_close = candles
        .get(entry.candle_index)
        .map_or(entry.price, |c| c.close);
    let mut machine = TradeMachine::new(&alert.instrument, entry, entry_close, params);

    let start = entry.candle_index + 1;
    for (offset, candle) in candles.iter().skip(start).enumerate() {
        if offset > 0 && offset % CANDLE_POLL_INTERVAL == 0 {
            deadline.check()?;
        }
        if machine.step(candle)? == StepOutcome::Closed {
            break;
        }
    }
    machine.into_record(alert, entry)
}
