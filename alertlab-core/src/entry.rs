//! Entry resolution — when and at what price an alert becomes a position.
//!
//! Entries never look backward: the earliest candle an alert can use is the
//! first one whose timestamp is at or after the trigger time.

use serde::{Deserialize, Serialize};

use crate::domain::{first_at_or_after, Alert, Candle};

/// A resolved entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub price: f64,
    pub timestamp_ms: i64,
    /// Index of the entry candle in the candle slice passed to the resolver.
    pub candle_index: usize,
    pub time_to_entry_ms: i64,
}

/// Why an alert produced no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoEntryReason {
    /// No candle exists at or after the trigger time.
    NoCandlesAfterAlert,
    /// Price never retraced to the dip level inside the wait window.
    DipNotReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EntryOutcome {
    Entered(Entry),
    NoEntry(NoEntryReason),
}

/// Capability interface for entry rules.
pub trait EntryResolver {
    fn resolve(&self, alert: &Alert, candles: &[Candle]) -> EntryOutcome;
}

/// The closed set of entry rules, selected by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EntryRule {
    /// Enter at the close of the first candle at or after the alert.
    #[default]
    Immediate,
    /// Enter only if price dips `dip_pct` below the reference within `max_wait_ms`.
    DelayedDip { dip_pct: f64, max_wait_ms: i64 },
}

impl EntryResolver for EntryRule {
    fn resolve(&self, alert: &Alert, candles: &[Candle]) -> EntryOutcome {
        let Some(first) = first_at_or_after(candles, alert.trigger_ms) else {
            return EntryOutcome::NoEntry(NoEntryReason::NoCandlesAfterAlert);
        };

        match *self {
            EntryRule::Immediate => {
                let candle = &candles[first];
                EntryOutcome::Entered(Entry {
                    price: candle.close,
                    timestamp_ms: candle.timestamp_ms,
                    candle_index: first,
                    time_to_entry_ms: candle.timestamp_ms - alert.trigger_ms,
                })
            }
            EntryRule::DelayedDip { dip_pct, max_wait_ms } => {
                resolve_dip(alert, candles, first, dip_pct, max_wait_ms)
            }
        }
    }
}

fn resolve_dip(
    alert: &Alert,
    candles: &[Candle],
    first: usize,
    dip_pct: f64,
    max_wait_ms: i64,
) -> EntryOutcome {
    // A quoted alert price is known at trigger time, so the first candle may
    // already fill. A candle-derived reference is only known at that candle's
    // close, so the search starts one candle later.
    let (reference, search_from) = match alert.alert_price {
        Some(price) if price > 0.0 => (price, first),
        _ => (candles[first].close, first + 1),
    };
    let target = reference * (1.0 - dip_pct);
    let window_end = alert.trigger_ms.saturating_add(max_wait_ms);

    for (offset, candle) in candles[search_from..].iter().enumerate() {
        if candle.timestamp_ms > window_end {
            break;
        }
        if candle.low <= target {
            // A gap below the dip level fills at the open.
            let price = target.min(candle.open);
            return EntryOutcome::Entered(Entry {
                price,
                timestamp_ms: candle.timestamp_ms,
                candle_index: search_from + offset,
                time_to_entry_ms: candle.timestamp_ms - alert.trigger_ms,
            });
        }
    }

    EntryOutcome::NoEntry(NoEntryReason::DipNotReached)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: i64 = 60_000;

    fn candle(ts: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp_ms: ts,
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    fn series() -> Vec<Candle> {
        vec![
            candle(0, 1.0, 1.1, 0.9, 1.0),
            candle(MIN, 1.0, 1.2, 0.95, 1.1),
            candle(2 * MIN, 1.1, 1.15, 0.8, 0.85),
            candle(3 * MIN, 0.85, 1.0, 0.84, 0.95),
        ]
    }

    #[test]
    fn immediate_on_boundary_uses_that_candle() {
        let alert = Alert::new("ABC", MIN, "caller");
        let outcome = EntryRule::Immediate.resolve(&alert, &series());
        let EntryOutcome::Entered(entry) = outcome else {
            panic!("expected entry");
        };
        assert_eq!(entry.candle_index, 1);
        assert_eq!(entry.price, 1.1);
        assert_eq!(entry.time_to_entry_ms, 0);
    }

    #[test]
    fn immediate_between_boundaries_waits_for_next_candle() {
        let alert = Alert::new("ABC", MIN + 1, "caller");
        let outcome = EntryRule::Immediate.resolve(&alert, &series());
        let EntryOutcome::Entered(entry) = outcome else {
            panic!("expected entry");
        };
        assert_eq!(entry.candle_index, 2);
        assert_eq!(entry.price, 0.85);
        assert_eq!(entry.timestamp_ms, 2 * MIN);
    }

    #[test]
    fn no_candles_after_alert_is_no_entry() {
        let alert = Alert::new("ABC", 10 * MIN, "caller");
        assert_eq!(
            EntryRule::Immediate.resolve(&alert, &series()),
            EntryOutcome::NoEntry(NoEntryReason::NoCandlesAfterAlert)
        );
        assert_eq!(
            EntryRule::Immediate.resolve(&alert, &[]),
            EntryOutcome::NoEntry(NoEntryReason::NoCandlesAfterAlert)
        );
    }

    #[test]
    fn dip_fills_at_target_after_reference_candle() {
        // Reference = close of candle 0 = 1.0; 15% dip → 0.85; candle 2 low 0.8.
        let alert = Alert::new("ABC", 0, "caller");
        let rule = EntryRule::DelayedDip {
            dip_pct: 0.15,
            max_wait_ms: 5 * MIN,
        };
        let EntryOutcome::Entered(entry) = rule.resolve(&alert, &series()) else {
            panic!("expected entry");
        };
        assert_eq!(entry.candle_index, 2);
        assert!((entry.price - 0.85).abs() < 1e-12);
        assert_eq!(entry.time_to_entry_ms, 2 * MIN);
    }

    #[test]
    fn dip_outside_window_is_missed() {
        let alert = Alert::new("ABC", 0, "caller");
        let rule = EntryRule::DelayedDip {
            dip_pct: 0.15,
            max_wait_ms: MIN,
        };
        assert_eq!(
            rule.resolve(&alert, &series()),
            EntryOutcome::NoEntry(NoEntryReason::DipNotReached)
        );
    }

    #[test]
    fn dip_uses_quoted_alert_price() {
        // Quoted 1.2 → 10% dip → 1.08; candle 0 low 0.9 opens at 1.0 below target.
        let alert = Alert::new("ABC", 0, "caller").with_price(1.2);
        let rule = EntryRule::DelayedDip {
            dip_pct: 0.10,
            max_wait_ms: MIN,
        };
        let EntryOutcome::Entered(entry) = rule.resolve(&alert, &series()) else {
            panic!("expected entry");
        };
        assert_eq!(entry.candle_index, 0);
        assert!((entry.price - 1.0).abs() < 1e-12);
    }
}
