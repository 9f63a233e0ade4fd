//! Capital-aware simulation: many trades through one evolving capital pool.

pub mod cost;
pub mod portfolio;
pub mod sizing;
pub mod state;

pub use cost::CostModel;
pub use portfolio::{simulate_portfolio, CompletedTrade, PortfolioResult, SkipReason, SkippedAlert};
pub use sizing::position_size;
pub use state::{CapitalState, EquityPoint, OpenSlot};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalConfig {
    pub initial_capital: f64,
    /// Loss, in capital units, a full stop-out may cost. Also the R unit.
    pub max_risk_per_trade: f64,
    /// Cap on one position as a fraction of free cash.
    pub max_allocation_pct: f64,
    pub max_concurrent_positions: usize,
    pub min_executable_size: f64,
    pub costs: CostModel,
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            max_risk_per_trade: 200.0,
            max_allocation_pct: 0.04,
            max_concurrent_positions: 10,
            min_executable_size: 10.0,
            costs: CostModel::default(),
        }
    }
}

impl CapitalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(ConfigError::out_of_range(
                "capital.initial_capital",
                self.initial_capital,
                "(0, inf)",
            ));
        }
        if !(self.max_risk_per_trade > 0.0 && self.max_risk_per_trade.is_finite()) {
            return Err(ConfigError::out_of_range(
                "capital.max_risk_per_trade",
                self.max_risk_per_trade,
                "(0, inf)",
            ));
        }
        if !(self.max_allocation_pct > 0.0 && self.max_allocation_pct <= 1.0) {
            return Err(ConfigError::out_of_range(
                "capital.max_allocation_pct",
                self.max_allocation_pct,
                "(0, 1]",
            ));
        }
        if self.max_concurrent_positions == 0 {
            return Err(ConfigError::Invalid(
                "capital.max_concurrent_positions must be at least 1".into(),
            ));
        }
        if !(self.min_executable_size >= 0.0 && self.min_executable_size.is_finite()) {
            return Err(ConfigError::out_of_range(
                "capital.min_executable_size",
                self.min_executable_size,
                "[0, inf)",
            ));
        }
        if self.min_executable_size > self.initial_capital {
            warn!(
                min_executable_size = self.min_executable_size,
                initial_capital = self.initial_capital,
                "minimum executable size exceeds initial capital; no trade can execute"
            );
        }
        self.costs.validate()
    }
}
