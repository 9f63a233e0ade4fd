//! Capital state for one simulation run.

use serde::{Deserialize, Serialize};

/// A committed position waiting for its exit time.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSlot {
    pub instrument: String,
    pub exit_ms: i64,
    pub size: f64,
    /// Cash returned at exit: `size × exit_mult − fees`.
    pub proceeds: f64,
}

impl OpenSlot {
    pub fn pnl(&self) -> f64 {
        self.proceeds - self.size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp_ms: i64,
    /// Free cash plus open positions at cost.
    pub equity: f64,
}

/// Free cash, open positions and realized pnl of one run.
///
/// Invariant: `free_cash + Σ open sizes − Σ realized pnl == initial_capital`.
#[derive(Debug, Clone)]
pub struct CapitalState {
    initial_capital: f64,
    free_cash: f64,
    /// Sorted by exit time; ties keep insertion order.
    open: Vec<OpenSlot>,
    realized: Vec<f64>,
    equity_curve: Vec<EquityPoint>,
}

impl CapitalState {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            free_cash: initial_capital,
            open: Vec::new(),
            realized: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn free_cash(&self) -> f64 {
        self.free_cash
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn open_exposure(&self) -> f64 {
        self.open.iter().map(|s| s.size).sum()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized.iter().sum()
    }

    /// Free cash plus open positions at cost.
    pub fn equity(&self) -> f64 {
        self.free_cash + self.open_exposure()
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Commit `slot.size` from free cash.
    pub fn open(&mut self, slot: OpenSlot) {
        self.free_cash -= slot.size;
        let at = self.open.partition_point(|s| s.exit_ms <= slot.exit_ms);
        self.open.insert(at, slot);
    }

    /// Return capital from every position that exited at or before `timestamp_ms`.
    pub fn release_until(&mut self, timestamp_ms: i64) -> usize {
        let n = self.open.partition_point(|s| s.exit_ms <= timestamp_ms);
        let released: Vec<OpenSlot> = self.open.drain(..n).collect();
        for slot in &released {
            self.settle(slot);
        }
        n
    }

    /// Return capital from all remaining positions.
    pub fn release_all(&mut self) -> usize {
        let released: Vec<OpenSlot> = std::mem::take(&mut self.open);
        for slot in &released {
            self.settle(slot);
        }
        released.len()
    }

    fn settle(&mut self, slot: &OpenSlot) {
        self.free_cash += slot.proceeds;
        self.realized.push(slot.pnl());
        let equity = self.equity();
        self.equity_curve.push(EquityPoint {
            timestamp_ms: slot.exit_ms,
            equity,
        });
    }

    /// How far the books are from the conservation invariant.
    pub fn conservation_error(&self) -> f64 {
        (self.free_cash + self.open_exposure() - self.realized_pnl() - self.initial_capital).abs()
    }

    /// Largest peak-to-trough decline of the equity curve as a fraction of the peak.
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = self.initial_capital;
        let mut worst = 0.0_f64;
        for point in &self.equity_curve {
            peak = peak.max(point.equity);
            if peak > 0.0 {
                worst = worst.max((peak - point.equity) / peak);
            }
        }
        worst
    }
}
