//! Parameter search — grid or seeded random exploration of strategy parameters.
//!
//! Every point is applied to a base [`StrategyParams`], validated, fingerprinted
//! and scored by walk-forward evaluation plus the robust objective. Trials run
//! on the rayon pool; each owns its capital state and its own deadline. A trial
//! that times out or errors is recorded and the batch carries on.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use alertlab_core::rng::RngHierarchy;
use alertlab_core::{
    Alert, CandleSource, CapitalConfig, ConfigError, Deadline, EntryRule, Fingerprint, StrategyParams,
};
use itertools::Itertools;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::objective::{evaluate_objective, ObjectiveConfig, RobustResult};
use crate::walk_forward::{create_folds, evaluate_fold, FoldResult, WalkForwardConfig, WalkForwardError};

const HOUR_MS: f64 = 3_600_000.0;

// ─── Parameter space ─────────────────────────────────────────────────

/// A searchable strategy parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamName {
    TakeProfitMult,
    StopLossMult,
    MaxHoldHours,
    Phase2TriggerMult,
    Phase2StopMult,
    DipPct,
}

impl ParamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::TakeProfitMult => "take_profit_mult",
            ParamName::StopLossMult => "stop_loss_mult",
            ParamName::MaxHoldHours => "max_hold_hours",
            ParamName::Phase2TriggerMult => "phase2_trigger_mult",
            ParamName::Phase2StopMult => "phase2_stop_mult",
            ParamName::DipPct => "dip_pct",
        }
    }

    /// Write `value` into the matching field of `params`.
    ///
    /// `DipPct` only has a home under a delayed-dip entry; on an immediate
    /// entry it is ignored (the space is checked against the base up front).
    pub fn apply(&self, params: &mut StrategyParams, value: f64) {
        match self {
            ParamName::TakeProfitMult => params.exit.tp_mult = Some(value),
            ParamName::StopLossMult => params.exit.sl_mult = value,
            ParamName::MaxHoldHours => params.exit.max_hold_ms = Some((value * HOUR_MS).round() as i64),
            ParamName::Phase2TriggerMult => params.exit.phase2_trigger_mult = value,
            ParamName::Phase2StopMult => params.exit.phase2_stop_mult = value,
            ParamName::DipPct => {
                if let EntryRule::DelayedDip { dip_pct, .. } = &mut params.entry {
                    *dip_pct = value;
                }
            }
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One axis of the search: `steps` evenly spaced values over `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamAxis {
    pub name: ParamName,
    pub min: f64,
    pub max: f64,
    #[serde(default = "default_steps")]
    pub steps: usize,
}

fn default_steps() -> usize {
    5
}

impl ParamAxis {
    pub fn new(name: ParamName, min: f64, max: f64, steps: usize) -> Self {
        Self { name, min, max, steps }
    }

    /// Grid values, endpoints included. A single step yields `min`.
    pub fn grid_values(&self) -> Vec<f64> {
        if self.steps <= 1 {
            return vec![self.min];
        }
        let step = (self.max - self.min) / (self.steps - 1) as f64;
        (0..self.steps).map(|i| self.min + step * i as f64).collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::Invalid(format!(
                "search axis {}: need finite min <= max, got [{}, {}]",
                self.name, self.min, self.max
            )));
        }
        if self.steps == 0 {
            return Err(ConfigError::Invalid(format!("search axis {}: steps must be positive", self.name)));
        }
        Ok(())
    }
}

/// Named parameter values of one search point, in axis-name order.
pub type ParamPoint = BTreeMap<ParamName, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SearchMode {
    Grid,
    Random { n_samples: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub mode: SearchMode,
    pub axes: Vec<ParamAxis>,
    /// Master seed for random sampling.
    pub seed: u64,
    /// Gate-passing candidates handed to island clustering.
    pub top_n: usize,
    pub n_islands: usize,
    /// Per-trial wall-clock budget. `None` means unbounded.
    pub trial_timeout_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Grid,
            axes: vec![
                ParamAxis::new(ParamName::TakeProfitMult, 2.0, 5.0, 4),
                ParamAxis::new(ParamName::StopLossMult, 0.3, 0.7, 5),
            ],
            seed: 42,
            top_n: 20,
            n_islands: 3,
            trial_timeout_ms: Some(60_000),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.axes.is_empty() {
            return Err(ConfigError::Invalid("search: at least one axis is required".into()));
        }
        let mut seen = HashSet::new();
        for axis in &self.axes {
            axis.validate()?;
            if !seen.insert(axis.name) {
                return Err(ConfigError::Invalid(format!("search: axis {} listed twice", axis.name)));
            }
        }
        if let SearchMode::Random { n_samples: 0 } = self.mode {
            return Err(ConfigError::Invalid("search: n_samples must be positive".into()));
        }
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("search: top_n must be positive".into()));
        }
        if !(2..=4).contains(&self.n_islands) {
            return Err(ConfigError::out_of_range("search.n_islands", self.n_islands as f64, "[2, 4]"));
        }
        Ok(())
    }

    /// Checks that every axis has a field to land in under `base`.
    pub fn validate_against(&self, base: &StrategyParams) -> Result<(), ConfigError> {
        self.validate()?;
        let dip_axis = self.axes.iter().any(|a| a.name == ParamName::DipPct);
        if dip_axis && !matches!(base.entry, EntryRule::DelayedDip { .. }) {
            return Err(ConfigError::Invalid(
                "search: dip_pct axis requires a delayed_dip entry rule".into(),
            ));
        }
        Ok(())
    }

    /// Enumerate the points to evaluate, in a deterministic order.
    pub fn points(&self) -> Vec<ParamPoint> {
        let names: Vec<ParamName> = self.axes.iter().map(|a| a.name).collect();
        let rows: Vec<Vec<f64>> = match &self.mode {
            SearchMode::Grid => self
                .axes
                .iter()
                .map(ParamAxis::grid_values)
                .multi_cartesian_product()
                .collect(),
            SearchMode::Random { n_samples } => {
                let hierarchy = RngHierarchy::new(self.seed);
                (0..*n_samples as u64)
                    .map(|i| {
                        let mut rng = hierarchy.rng_for("search", i);
                        self.axes.iter().map(|a| rng.gen_range(a.min..=a.max)).collect()
                    })
                    .collect()
            }
        };
        rows.into_iter()
            .map(|row| names.iter().copied().zip(row).collect())
            .collect()
    }
}

// ─── Results ─────────────────────────────────────────────────────────

/// A scored parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterCandidate {
    pub point: ParamPoint,
    pub params: StrategyParams,
    pub fingerprint: Fingerprint,
    pub folds: Vec<FoldResult>,
    pub result: RobustResult,
}

impl ParameterCandidate {
    pub fn score(&self) -> f64 {
        self.result.score
    }
}

/// A trial that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialFailure {
    pub point: ParamPoint,
    pub fingerprint: Fingerprint,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Gate-passing candidates first, then by descending score.
    pub candidates: Vec<ParameterCandidate>,
    pub failures: Vec<TrialFailure>,
    /// Points rejected by strategy validation, never simulated.
    pub invalid: usize,
    /// Points that repeated an already evaluated parameter set.
    pub duplicates: usize,
    pub fold_count: usize,
}

impl SearchResult {
    pub fn passing(&self) -> impl Iterator<Item = &ParameterCandidate> {
        self.candidates.iter().filter(|c| c.result.passes_gates)
    }

    pub fn best(&self) -> Option<&ParameterCandidate> {
        self.passing().next()
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("walk-forward setup failed: {0}")]
    WalkForward(#[from] WalkForwardError),
}

// ─── Search orchestration ────────────────────────────────────────────

enum Trial {
    Scored(Box<ParameterCandidate>),
    Failed(TrialFailure),
}

/// Run the search. Folds are built once and shared by every trial.
pub fn run_search<S: CandleSource + Sync + ?Sized>(
    alerts: &[Alert],
    candles: &S,
    base: &StrategyParams,
    capital: &CapitalConfig,
    walk_forward: &WalkForwardConfig,
    objective: &ObjectiveConfig,
    search: &SearchConfig,
) -> Result<SearchResult, SearchError> {
    search.validate_against(base)?;
    capital.validate()?;
    walk_forward.validate()?;
    objective.validate()?;

    let folds = create_folds(alerts, walk_forward)?;

    let mut seen = HashSet::new();
    let mut duplicates = 0;
    let mut invalid = 0;
    let mut prepared = Vec::new();
    for point in search.points() {
        let mut params = base.clone();
        for (name, value) in &point {
            name.apply(&mut params, *value);
        }
        if let Err(e) = params.validate() {
            debug!(error = %e, "skipping invalid point");
            invalid += 1;
            continue;
        }
        let fingerprint = match params.fingerprint() {
            Ok(fp) => fp,
            Err(e) => {
                warn!(error = %e, "could not fingerprint point");
                invalid += 1;
                continue;
            }
        };
        if !seen.insert(fingerprint) {
            duplicates += 1;
            continue;
        }
        prepared.push((point, params, fingerprint));
    }

    info!(
        trials = prepared.len(),
        invalid,
        duplicates,
        folds = folds.len(),
        "starting parameter search"
    );

    let trials: Vec<Trial> = prepared
        .into_par_iter()
        .map(|(point, params, fingerprint)| {
            let deadline = Deadline::from_millis(search.trial_timeout_ms);
            let scored: Result<Vec<FoldResult>, WalkForwardError> = folds
                .iter()
                .map(|fold| evaluate_fold(alerts, candles, &params, capital, fold, &deadline))
                .collect();
            match scored {
                Ok(fold_results) => {
                    let result = evaluate_objective(&fold_results, objective);
                    debug!(
                        fingerprint = %fingerprint.short(),
                        score = result.score,
                        passes = result.passes_gates,
                        "trial scored"
                    );
                    Trial::Scored(Box::new(ParameterCandidate {
                        point,
                        params,
                        fingerprint,
                        folds: fold_results,
                        result,
                    }))
                }
                Err(e) => {
                    warn!(fingerprint = %fingerprint.short(), error = %e, "trial failed");
                    Trial::Failed(TrialFailure {
                        point,
                        fingerprint,
                        reason: e.to_string(),
                    })
                }
            }
        })
        .collect();

    let mut candidates = Vec::new();
    let mut failures = Vec::new();
    for trial in trials {
        match trial {
            Trial::Scored(candidate) => candidates.push(*candidate),
            Trial::Failed(failure) => failures.push(failure),
        }
    }
    rank_candidates(&mut candidates);

    info!(
        scored = candidates.len(),
        passing = candidates.iter().filter(|c| c.result.passes_gates).count(),
        failed = failures.len(),
        invalid,
        best_score = candidates.first().map(|c| c.score()),
        "parameter search complete"
    );

    Ok(SearchResult {
        candidates,
        failures,
        invalid,
        duplicates,
        fold_count: folds.len(),
    })
}

/// Gate-passing first, then descending score; fingerprint breaks ties.
pub fn rank_candidates(candidates: &mut [ParameterCandidate]) {
    candidates.sort_by(|a, b| {
        b.result
            .passes_gates
            .cmp(&a.result.passes_gates)
            .then_with(|| b.score().total_cmp(&a.score()))
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
}
