//! Strategy configuration and the shared configuration error type.
//!
//! Every configuration struct validates itself before a simulation starts;
//! nothing downstream re-checks ranges.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::EntryRule;
use crate::exit::ExitParams;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} = {value} is outside {range}")]
    OutOfRange {
        field: String,
        value: f64,
        range: &'static str,
    },
    #[error("invalid ladder: {0}")]
    InvalidLadder(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn out_of_range(field: impl Into<String>, value: f64, range: &'static str) -> Self {
        ConfigError::OutOfRange {
            field: field.into(),
            value,
            range,
        }
    }
}

/// A complete parameter set: how to enter and how to exit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub entry: EntryRule,
    pub exit: ExitParams,
}

impl StrategyParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let EntryRule::DelayedDip { dip_pct, max_wait_ms } = self.entry {
            if !(dip_pct > 0.0 && dip_pct < 1.0) {
                return Err(ConfigError::out_of_range("entry.dip_pct", dip_pct, "(0, 1)"));
            }
            if max_wait_ms <= 0 {
                return Err(ConfigError::out_of_range(
                    "entry.max_wait_ms",
                    max_wait_ms as f64,
                    "(0, inf)",
                ));
            }
        }
        self.exit.validate()
    }
}
