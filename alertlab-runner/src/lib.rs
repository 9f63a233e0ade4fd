//! AlertLab Runner — orchestration on top of `alertlab-core`.
//!
//! This crate provides:
//! - CSV loading of candles and alerts
//! - Isolated (capital-free) batch evaluation
//! - Walk-forward fold construction and evaluation
//! - Robust objective: drawdown penalty, stress lane, gates
//! - Grid/random parameter search and parameter-island clustering
//! - CSV/JSON result sink and TOML run configuration

pub mod batch;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod islands;
pub mod objective;
pub mod search;
pub mod stress;
pub mod walk_forward;

pub use batch::{evaluate_isolated, FailedAlert, IsolatedBatch};
pub use config::{RunConfig, RunConfigError, RunId};
pub use data_loader::{load_alerts, load_candles, read_alerts, read_candles, CandleStore, LoadError, LoadReport};
pub use export::{save_portfolio, save_search, ExportError};
pub use islands::{cluster_islands, ParameterIsland};
pub use objective::{
    compute_dd_penalty, evaluate_objective, DdPenaltyConfig, GateConfig, GateFailure, ObjectiveConfig, RobustResult,
};
pub use search::{
    run_search, ParamAxis, ParamName, ParamPoint, ParameterCandidate, SearchConfig, SearchError, SearchMode,
    SearchResult, TrialFailure,
};
pub use stress::{stress_fold, StressConfig};
pub use walk_forward::{
    create_folds, evaluate_fold, run_walk_forward, ExplicitFold, FoldResult, FoldSpec, WalkForwardConfig,
    WalkForwardError,
};
