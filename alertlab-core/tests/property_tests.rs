//! Property tests for simulator invariants.
//!
//! Uses proptest to verify:
//! 1. Trade metrics — peak never below entry, giveback never negative, pinned exits
//! 2. Capital conservation — final capital equals initial plus net pnl
//! 3. Concurrency cap — open positions never exceed the configured maximum
//! 4. Sizing — size never exceeds any of its three caps
//! 5. Ratchet monotonicity — ratcheting stops only rise
//! 6. Median robustness — the median is the middle of the sorted values

use std::collections::HashMap;

use alertlab_core::capital::position_size;
use alertlab_core::exit::StopRatchet;
use alertlab_core::stats::{mean, median};
use alertlab_core::{
    simulate_portfolio, simulate_trade, Alert, CapitalConfig, Candle, CostModel, Deadline, ExitParams,
    ExitReason, IntrabarOrder, StopMode, StrategyParams, TradeOutcome,
};
use proptest::prelude::*;

const MIN: i64 = 60_000;

// ── Strategies (proptest) ────────────────────────────────────────────

/// A random walk of sane candles, one per minute starting at `start`.
fn arb_candles(start: i64) -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-0.3..0.4_f64, 0.0..0.3_f64, 0.0..0.3_f64), 1..60).prop_map(move |steps| {
        let mut price = 1.0_f64;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (ret, up, down))| {
                let open = price;
                let close = (price * (1.0 + ret)).max(0.01);
                let high = open.max(close) * (1.0 + up);
                let low = (open.min(close) * (1.0 - down)).max(0.001);
                price = close;
                Candle {
                    timestamp_ms: start + i as i64 * MIN,
                    open,
                    high,
                    low,
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    })
}

fn arb_stop_mode() -> impl Strategy<Value = StopMode> {
    prop_oneof![Just(StopMode::Static), Just(StopMode::Trailing)]
}

fn arb_exit() -> impl Strategy<Value = ExitParams> {
    (
        prop::option::of(1.5..6.0_f64),
        0.2..0.9_f64,
        1.5..3.0_f64,
        0.3..0.9_f64,
        prop::option::of(5..120_i64),
        arb_stop_mode(),
        prop_oneof![Just(IntrabarOrder::StopFirst), Just(IntrabarOrder::TargetFirst)],
    )
        .prop_map(|(tp, sl, trigger, p2, hold_min, stop_mode, intrabar)| ExitParams {
            tp_mult: tp,
            sl_mult: sl,
            phase2_trigger_mult: trigger,
            phase2_stop_mult: p2,
            max_hold_ms: hold_min.map(|m| m * MIN),
            stop_mode,
            intrabar,
        })
}

// ── 1. Trade metrics ─────────────────────────────────────────────────

proptest! {
    #[test]
    fn trade_metrics_are_well_formed(candles in arb_candles(0), exit in arb_exit()) {
        let params = StrategyParams { exit: exit.clone(), ..Default::default() };
        let alert = Alert::new("TOK", 0, "caller");
        let outcome = simulate_trade(&alert, Some(candles.as_slice()), &params, &Deadline::unbounded()).unwrap();
        let TradeOutcome::Closed(trade) = outcome else {
            return Err(TestCaseError::fail("immediate entry with candles must trade"));
        };
        let m = &trade.metrics;
        prop_assert!(m.peak_mult >= 1.0);
        prop_assert!(m.giveback_pct >= 0.0);
        prop_assert!(m.max_drawdown_pct >= 0.0);
        prop_assert!(m.dd_before_2x <= m.max_drawdown_pct + 1e-12);
        prop_assert!(trade.exit_ms >= trade.entry_ms);
        prop_assert_eq!(m.hit_2x, m.peak_mult >= 2.0);
        if trade.exit_reason == ExitReason::TakeProfit {
            let tp = exit.tp_mult.unwrap();
            prop_assert!((m.exit_mult - tp).abs() < 1e-9);
            prop_assert!(m.giveback_pct.abs() < 1e-9);
        }
        if let (Some(hold), ExitReason::TimeExit) = (exit.max_hold_ms, trade.exit_reason) {
            prop_assert!(trade.exit_ms - trade.entry_ms >= hold);
        }
    }
}

// ── 2 & 3. Capital conservation and concurrency ──────────────────────

proptest! {
    #[test]
    fn capital_is_conserved(
        series in prop::collection::vec(arb_candles(0), 1..6),
        offsets in prop::collection::vec(0..30_i64, 1..12),
        max_concurrent in 1..4_usize,
        fee_bps in 0.0..50.0_f64,
    ) {
        let mut candles = HashMap::new();
        for (i, s) in series.iter().enumerate() {
            candles.insert(format!("T{i}"), s.clone());
        }
        let mut sorted = offsets.clone();
        sorted.sort_unstable();
        let alerts: Vec<Alert> = sorted
            .iter()
            .enumerate()
            .map(|(i, off)| Alert::new(format!("T{}", i % (series.len() + 1)), off * MIN, "c"))
            .collect();
        let capital = CapitalConfig {
            initial_capital: 1_000.0,
            max_risk_per_trade: 50.0,
            max_allocation_pct: 0.5,
            max_concurrent_positions: max_concurrent,
            min_executable_size: 1.0,
            costs: CostModel::new(fee_bps, 0.0),
        };
        let result = simulate_portfolio(
            &alerts,
            &candles,
            &StrategyParams::default(),
            &capital,
            &Deadline::unbounded(),
        )
        .unwrap();

        let net: f64 = result.completed_trades.iter().map(|t| t.net_pnl).sum();
        prop_assert!((result.final_capital - (1_000.0 + net)).abs() < 1e-6);
        prop_assert_eq!(
            result.trades_executed + result.skipped.len() + result.missing,
            alerts.len()
        );

        for trade in &result.completed_trades {
            let entry = trade.trade.entry_ms;
            let concurrent = result
                .completed_trades
                .iter()
                .filter(|t| t.trade.entry_ms <= entry && t.trade.exit_ms > entry)
                .count();
            prop_assert!(concurrent <= max_concurrent);
        }
    }
}

// ── 4. Sizing ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn size_respects_every_cap(
        risk in 1.0..1_000.0_f64,
        sl in 0.05..0.95_f64,
        alloc in 0.01..1.0_f64,
        cash in 0.0..100_000.0_f64,
    ) {
        let size = position_size(risk, sl, alloc, cash);
        prop_assert!(size >= 0.0);
        prop_assert!(size <= risk / (1.0 - sl) + 1e-9);
        prop_assert!(size <= alloc * cash + 1e-9);
        prop_assert!(size <= cash + 1e-9);
    }
}

// ── 5. Ratchet monotonicity ──────────────────────────────────────────

proptest! {
    #[test]
    fn ratcheting_stop_never_loosens(proposals in prop::collection::vec(0.0..5.0_f64, 1..50)) {
        let mut stop = StopRatchet::ratcheting(0.5);
        let mut previous = stop.level();
        for p in proposals {
            let level = stop.apply(p);
            prop_assert!(level >= previous);
            previous = level;
        }
    }
}

// ── 6. Median robustness ─────────────────────────────────────────────

proptest! {
    #[test]
    fn median_is_middle_of_sorted(values in prop::collection::vec(-100.0..100.0_f64, 1..40)) {
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        let expected = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };
        prop_assert!((median(&values) - expected).abs() < 1e-9);
    }

    #[test]
    fn one_outlier_moves_mean_not_median(values in prop::collection::vec(0.0..10.0_f64, 5..20)) {
        let base_median = median(&values);
        let mut shocked = values.clone();
        shocked.push(-1e6);
        shocked.push(1e6);
        prop_assert!((median(&shocked) - base_median).abs() <= 10.0);
        let mut with_low = values.clone();
        with_low.push(-1e6);
        prop_assert!(mean(&with_low) < mean(&values));
    }
}
