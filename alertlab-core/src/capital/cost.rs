//! Cost model — taker fee and slippage, both in basis points per side.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Execution friction charged on each side of a trade.
///
/// Costs are applied to the position's notional size rather than to the fill
/// price, so exit levels stay pinned to the exact stop/target multiples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    pub taker_fee_bps: f64,
    pub slippage_bps: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            taker_fee_bps: 25.0,
            slippage_bps: 0.0,
        }
    }
}

impl CostModel {
    pub fn new(taker_fee_bps: f64, slippage_bps: f64) -> Self {
        Self {
            taker_fee_bps,
            slippage_bps,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Fraction of notional charged per side.
    pub fn per_side_fraction(&self) -> f64 {
        (self.taker_fee_bps + self.slippage_bps) / 10_000.0
    }

    /// Cost of one side on `size` capital units.
    pub fn side_cost(&self, size: f64) -> f64 {
        self.per_side_fraction() * size
    }

    /// Entry plus exit cost.
    pub fn round_trip(&self, size: f64) -> f64 {
        2.0 * self.side_cost(size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("capital.costs.taker_fee_bps", self.taker_fee_bps),
            ("capital.costs.slippage_bps", self.slippage_bps),
        ] {
            if !(value >= 0.0 && value < 10_000.0) {
                return Err(ConfigError::out_of_range(field, value, "[0, 10000)"));
            }
        }
        Ok(())
    }
}
