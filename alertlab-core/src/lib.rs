//! AlertLab Core — alert replay, the exit state machine, and capital-aware simulation.
//!
//! This crate contains the simulation engine:
//! - Domain types (candles, alerts, positions, trade records)
//! - Entry resolution (immediate and delayed-dip)
//! - Two-phase stop state machine with static, trailing and ladder stops
//! - Capital-aware sequential simulator with sizing, concurrency caps and costs
//! - Outcome aggregation into cohorts and percentile statistics
//! - Parameter-set fingerprints and a deterministic RNG hierarchy
//!
//! All timestamps are milliseconds since the Unix epoch (UTC). All price
//! levels inside the state machine are multiples of the entry price.

pub mod aggregate;
pub mod capital;
pub mod config;
pub mod deadline;
pub mod domain;
pub mod entry;
pub mod error;
pub mod exit;
pub mod fingerprint;
pub mod rng;
pub mod simulate;
pub mod stats;

pub use aggregate::{summarize, CohortStats, OutcomeSummary};
pub use capital::{simulate_portfolio, CapitalConfig, CompletedTrade, CostModel, PortfolioResult, SkipReason};
pub use config::{ConfigError, StrategyParams};
pub use deadline::Deadline;
pub use domain::{Alert, Candle, CandleSource, ExitReason, Phase, TradeRecord};
pub use entry::{EntryResolver, EntryRule};
pub use error::SimError;
pub use exit::{ExitParams, IntrabarOrder, LadderRung, StopMode, StopPolicy};
pub use fingerprint::Fingerprint;
pub use simulate::{simulate_trade, TradeOutcome};
