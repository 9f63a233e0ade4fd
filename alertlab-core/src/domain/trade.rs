//! TradeRecord — a closed trade plus its derived metrics.

use serde::{Deserialize, Serialize};

use super::position::{ExitReason, PartialFill, Phase};

/// Multiples tracked by the hit flags.
pub const HIT_THRESHOLDS: [f64; 5] = [2.0, 3.0, 4.0, 5.0, 10.0];

/// Metrics derived once when a trade closes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeMetrics {
    pub entry_mult: f64,
    pub peak_mult: f64,
    pub exit_mult: f64,
    /// Share of the peak surrendered by exit, in percent. Never negative.
    pub giveback_pct: f64,
    pub hit_2x: bool,
    pub hit_3x: bool,
    pub hit_4x: bool,
    pub hit_5x: bool,
    pub hit_10x: bool,
    /// Deepest low seen while held, as a fraction of entry (0.25 = 25% under water).
    pub max_drawdown_pct: f64,
    /// Deepest drawdown from entry before the first 2x (or until exit if never).
    pub dd_before_2x: f64,
    pub time_to_2x_ms: Option<i64>,
    pub hold_ms: i64,
}

impl TradeMetrics {
    pub fn new(
        peak_mult: f64,
        exit_mult: f64,
        min_low_mult: f64,
        dd_before_2x: f64,
        time_to_2x_ms: Option<i64>,
        hold_ms: i64,
    ) -> Self {
        let peak_mult = peak_mult.max(1.0);
        Self {
            entry_mult: 1.0,
            peak_mult,
            exit_mult,
            giveback_pct: giveback_pct(peak_mult, exit_mult),
            hit_2x: peak_mult >= HIT_THRESHOLDS[0],
            hit_3x: peak_mult >= HIT_THRESHOLDS[1],
            hit_4x: peak_mult >= HIT_THRESHOLDS[2],
            hit_5x: peak_mult >= HIT_THRESHOLDS[3],
            hit_10x: peak_mult >= HIT_THRESHOLDS[4],
            max_drawdown_pct: (1.0 - min_low_mult).max(0.0),
            dd_before_2x: dd_before_2x.max(0.0),
            time_to_2x_ms,
            hold_ms,
        }
    }
}

/// `(peak − exit) / peak × 100`, floored at zero.
pub fn giveback_pct(peak_mult: f64, exit_mult: f64) -> f64 {
    if peak_mult <= 0.0 || !peak_mult.is_finite() {
        return 0.0;
    }
    ((peak_mult - exit_mult) / peak_mult * 100.0).max(0.0)
}

/// A complete alert-to-exit trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    // ── Identification ──
    pub instrument: String,
    pub source: String,
    pub alert_ms: i64,

    // ── Entry ──
    pub entry_price: f64,
    pub entry_ms: i64,
    pub time_to_entry_ms: i64,

    // ── Exit ──
    pub exit_price: f64,
    pub exit_ms: i64,
    pub exit_reason: ExitReason,
    pub phase_at_exit: Phase,
    pub partial_fills: Vec<PartialFill>,

    pub metrics: TradeMetrics,
}

impl TradeRecord {
    pub fn exit_mult(&self) -> f64 {
        self.metrics.exit_mult
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn giveback_from_peak() {
        assert!((giveback_pct(4.0, 3.2) - 20.0).abs() < 1e-9);
        assert_eq!(giveback_pct(2.0, 2.0), 0.0);
        assert_eq!(giveback_pct(2.0, 2.5), 0.0);
    }

    #[test]
    fn hit_flags_follow_peak() {
        let m = TradeMetrics::new(3.4, 0.5, 0.9, 0.1, Some(1_000), 5_000);
        assert!(m.hit_2x && m.hit_3x);
        assert!(!m.hit_4x && !m.hit_5x && !m.hit_10x);
        assert!((m.max_drawdown_pct - 0.1).abs() < 1e-12);
    }

    #[test]
    fn peak_floors_at_entry() {
        let m = TradeMetrics::new(0.8, 0.7, 0.6, 0.4, None, 10);
        assert_eq!(m.peak_mult, 1.0);
        assert!((m.giveback_pct - 30.0).abs() < 1e-9);
    }
}
