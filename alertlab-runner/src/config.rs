//! Serializable run configuration, read from TOML.
//!
//! ```toml
//! [strategy.entry]
//! mode = "immediate"
//!
//! [strategy.exit]
//! tp_mult = 3.0
//! sl_mult = 0.5
//!
//! [capital]
//! initial_capital = 10000.0
//!
//! [walk_forward]
//! mode = "anchored"
//! n_folds = 4
//! min_train_alerts = 50
//! min_test_alerts = 20
//!
//! [objective.gates]
//! min_folds_positive = 0.6
//!
//! [search]
//! top_n = 20
//! ```
//!
//! Every section is optional and falls back to its defaults.

use std::fs;
use std::path::Path;

use alertlab_core::{CapitalConfig, ConfigError, StrategyParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::objective::ObjectiveConfig;
use crate::search::SearchConfig;
use crate::walk_forward::WalkForwardConfig;

/// Content-addressable identifier of a run configuration.
pub type RunId = String;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub strategy: StrategyParams,
    pub capital: CapitalConfig,
    pub walk_forward: WalkForwardConfig,
    pub objective: ObjectiveConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Error)]
pub enum RunConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

impl RunConfig {
    /// Parse and validate.
    pub fn from_toml(text: &str) -> Result<Self, RunConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, RunConfigError> {
        let text = fs::read_to_string(path).map_err(|source| RunConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String, RunConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Fails fast on any inconsistent section, before a simulation runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy.validate()?;
        self.capital.validate()?;
        self.walk_forward.validate()?;
        self.objective.validate()?;
        self.search.validate_against(&self.strategy)
    }

    /// Deterministic hash of the whole configuration.
    ///
    /// Two runs with identical configs share a `RunId`.
    pub fn run_id(&self) -> Result<RunId, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(blake3::hash(&json).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use alertlab_core::{EntryRule, StopMode};

    use super::*;
    use crate::search::{ParamName, SearchMode};

    #[test]
    fn empty_document_is_default() {
        let config = RunConfig::from_toml("").unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn full_document_parses() {
        let text = r#"
[strategy.entry]
mode = "delayed_dip"
dip_pct = 0.2
max_wait_ms = 3600000

[strategy.exit]
tp_mult = 4.0
sl_mult = 0.4
intrabar = "target_first"

[strategy.exit.stop_mode]
mode = "trailing"

[capital]
initial_capital = 5000.0
max_concurrent_positions = 3

[capital.costs]
taker_fee_bps = 30.0
slippage_bps = 10.0

[walk_forward]
mode = "split"
train_fraction = 0.7

[objective]
lambda = 0.2

[objective.gates]
min_folds_positive = 0.5
min_trades = 10

[search]
seed = 9
n_islands = 2

[search.mode]
mode = "random"
n_samples = 50

[[search.axes]]
name = "dip_pct"
min = 0.1
max = 0.3
steps = 3
"#;
        let config = RunConfig::from_toml(text).unwrap();
        assert!(matches!(config.strategy.entry, EntryRule::DelayedDip { .. }));
        assert_eq!(config.strategy.exit.tp_mult, Some(4.0));
        assert_eq!(config.strategy.exit.stop_mode, StopMode::Trailing);
        assert_eq!(config.capital.max_concurrent_positions, 3);
        assert_eq!(config.capital.costs.slippage_bps, 10.0);
        assert_eq!(config.walk_forward, WalkForwardConfig::Split { train_fraction: 0.7 });
        assert_eq!(config.objective.lambda, 0.2);
        assert_eq!(config.objective.gates.min_trades, 10);
        assert_eq!(config.search.mode, SearchMode::Random { n_samples: 50 });
        assert_eq!(config.search.axes[0].name, ParamName::DipPct);
    }

    #[test]
    fn invalid_section_fails_fast() {
        let text = "[objective.dd_penalty]\ngentle_threshold = 0.8\n";
        let err = RunConfig::from_toml(text).unwrap_err();
        assert!(matches!(err, RunConfigError::Invalid(_)));
    }

    #[test]
    fn run_id_tracks_content() {
        let a = RunConfig::default();
        let mut b = RunConfig::default();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        b.capital.initial_capital = 20_000.0;
        assert_ne!(a.run_id().unwrap(), b.run_id().unwrap());
        assert_eq!(a.run_id().unwrap().len(), 64);
    }

    #[test]
    fn renders_back_to_toml() {
        let config = RunConfig::default();
        let text = config.to_toml().unwrap();
        let back: RunConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
