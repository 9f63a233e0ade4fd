//! AlertLab CLI — replay alerts against candles and search for robust parameters.
//!
//! Commands:
//! - `simulate` — one capital-aware run over all alerts
//! - `isolate` — every alert simulated on its own, with outcome statistics
//! - `optimize` — walk-forward parameter search with island clustering
//! - `config` — print the default run configuration as TOML

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alertlab_core::{simulate_portfolio, Alert, Deadline, OutcomeSummary, PortfolioResult};
use alertlab_runner::export::export_trades_csv;
use alertlab_runner::{
    cluster_islands, evaluate_isolated, load_alerts, load_candles, run_search, save_portfolio, save_search,
    CandleStore, ParameterIsland, RunConfig, SearchResult,
};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "alertlab", about = "AlertLab CLI — alert-replay trade simulator and robust parameter search")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every alert through one capital pool.
    Simulate {
        #[command(flatten)]
        inputs: Inputs,

        /// Write trades.csv, equity.csv and summary.json here.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Simulate each alert independently and print outcome statistics.
    Isolate {
        #[command(flatten)]
        inputs: Inputs,

        /// Per-alert time budget in milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Write the trade tape as CSV to this file.
        #[arg(long)]
        trades_csv: Option<PathBuf>,
    },
    /// Walk-forward parameter search, scored by the robust objective.
    Optimize {
        #[command(flatten)]
        inputs: Inputs,

        /// Candidates to print.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Output directory for candidates, failures and islands.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Print the default run configuration.
    Config,
}

#[derive(clap::Args)]
struct Inputs {
    /// Candle CSV: instrument,timestamp_ms,open,high,low,close,volume
    #[arg(long)]
    candles: PathBuf,

    /// Alert CSV: instrument,trigger_ms,source,alert_price,market_cap
    #[arg(long)]
    alerts: PathBuf,

    /// TOML run configuration. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { inputs, output_dir } => run_simulate(&inputs, output_dir.as_deref()),
        Commands::Isolate {
            inputs,
            timeout_ms,
            trades_csv,
        } => run_isolate(&inputs, timeout_ms, trades_csv.as_deref()),
        Commands::Optimize {
            inputs,
            top,
            output_dir,
        } => run_optimize(&inputs, top, &output_dir),
        Commands::Config => {
            print!("{}", RunConfig::default().to_toml()?);
            Ok(())
        }
    }
}

struct Loaded {
    config: RunConfig,
    alerts: Vec<Alert>,
    candles: CandleStore,
}

fn load(inputs: &Inputs) -> Result<Loaded> {
    let config = match &inputs.config {
        Some(path) => RunConfig::from_file(path).with_context(|| format!("loading config {}", path.display()))?,
        None => RunConfig::default(),
    };
    let (candles, _) = load_candles(&inputs.candles)
        .with_context(|| format!("loading candles from {}", inputs.candles.display()))?;
    let alerts =
        load_alerts(&inputs.alerts).with_context(|| format!("loading alerts from {}", inputs.alerts.display()))?;
    if alerts.is_empty() {
        bail!("no alerts in {}", inputs.alerts.display());
    }
    if candles.is_empty() {
        bail!("no usable candles in {}", inputs.candles.display());
    }
    info!(run_id = %config.run_id()?, alerts = alerts.len(), instruments = candles.len(), "inputs loaded");
    Ok(Loaded {
        config,
        alerts,
        candles,
    })
}

fn run_simulate(inputs: &Inputs, output_dir: Option<&Path>) -> Result<()> {
    let Loaded {
        config,
        alerts,
        candles,
    } = load(inputs)?;
    let result = simulate_portfolio(
        &alerts,
        &candles,
        &config.strategy,
        &config.capital,
        &Deadline::unbounded(),
    )?;
    print_portfolio(&result);

    if let Some(dir) = output_dir {
        save_portfolio(&result, dir)?;
        println!("Artifacts saved to: {}", dir.display());
    }
    Ok(())
}

fn run_isolate(inputs: &Inputs, timeout_ms: Option<u64>, trades_csv: Option<&Path>) -> Result<()> {
    let Loaded {
        config,
        alerts,
        candles,
    } = load(inputs)?;
    let batch = evaluate_isolated(&alerts, &candles, &config.strategy, timeout_ms.map(Duration::from_millis));

    println!(
        "Alerts: {}  executed: {}  no entry: {}  missing: {}  failed: {}",
        alerts.len(),
        batch.executed(),
        batch.no_entry,
        batch.missing,
        batch.failed.len()
    );
    print_outcomes(&batch.summary);

    if let Some(path) = trades_csv {
        fs::write(path, export_trades_csv(&batch.trades)?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Trades written to: {}", path.display());
    }
    Ok(())
}

fn run_optimize(inputs: &Inputs, top: usize, output_dir: &Path) -> Result<()> {
    let Loaded {
        config,
        alerts,
        candles,
    } = load(inputs)?;
    let result = run_search(
        &alerts,
        &candles,
        &config.strategy,
        &config.capital,
        &config.walk_forward,
        &config.objective,
        &config.search,
    )?;
    let islands = cluster_islands(&result.candidates, config.search.top_n, config.search.n_islands);

    print_search(&result, top);
    print_islands(&islands);

    save_search(&result, &islands, output_dir)?;
    println!("Artifacts saved to: {}", output_dir.display());
    Ok(())
}

fn print_portfolio(result: &PortfolioResult) {
    println!("=== Portfolio ===");
    println!("Initial capital:  {:.2}", result.initial_capital);
    println!("Final capital:    {:.2}", result.final_capital);
    println!("Total return:     {:.2}%", result.total_return * 100.0);
    println!("Max drawdown:     {:.2}%", result.max_drawdown * 100.0);
    println!("Total R:          {:.2}", result.total_r());
    println!(
        "Trades: {}  skipped: {}  missing: {}",
        result.trades_executed,
        result.skipped.len(),
        result.missing
    );
}

fn print_outcomes(summary: &OutcomeSummary) {
    println!("=== Outcomes ({} trades) ===", summary.trade_count);
    println!("EV from entry:    {:.2}%", summary.ev_from_entry_pct);
    match summary.ev_given_2x_pct {
        Some(ev) => println!("EV given 2x:      {ev:.2}%"),
        None => println!("EV given 2x:      n/a"),
    }
    println!("P(reach 2x):      {:.3}", summary.p_reach_2x);
    if let Some(p) = summary.p_3x_given_2x {
        println!("P(3x | 2x):       {p:.3}");
    }
    for (label, cohort) in [
        ("winners", &summary.winners),
        ("losers", &summary.losers),
        ("never 2x", &summary.never_2x),
    ] {
        println!(
            "  {label:<9} n={:<5} mean={:.3}x median={:.3}x",
            cohort.count, cohort.mean_exit_mult, cohort.median_exit_mult
        );
    }
    println!(
        "Giveback p50/p90: {:.1}% / {:.1}%",
        summary.giveback.p50, summary.giveback.p90
    );
    for (reason, count) in &summary.exit_reasons {
        println!("  {:<18} {count}", reason.as_str());
    }
}

fn print_search(result: &SearchResult, top: usize) {
    println!(
        "=== Search: {} scored, {} passing, {} failed, {} invalid, {} folds ===",
        result.candidates.len(),
        result.passing().count(),
        result.failures.len(),
        result.invalid,
        result.fold_count
    );
    for (rank, c) in result.candidates.iter().take(top).enumerate() {
        let point: Vec<String> = c.point.iter().map(|(name, v)| format!("{name}={v:.3}")).collect();
        let gates = if c.result.passes_gates {
            "pass".to_string()
        } else {
            c.result.failed_gate_names().join(",")
        };
        println!(
            "{:>3}. {}  score={:.3}  median_test_r={:.2}  ratio={:.2}  [{}]  {}",
            rank + 1,
            c.fingerprint.short(),
            c.score(),
            c.result.median_test_r,
            c.result.median_ratio,
            gates,
            point.join(" ")
        );
    }
}

fn print_islands(islands: &[ParameterIsland]) {
    if islands.is_empty() {
        println!("No parameter islands (no gate-passing candidates).");
        return;
    }
    println!("=== Parameter islands ===");
    for island in islands {
        let centroid: Vec<String> = island
            .centroid
            .iter()
            .map(|(name, v)| format!("{name}={v:.3}±{:.3}", island.spread.get(name).copied().unwrap_or(0.0)))
            .collect();
        println!(
            "#{} members={} mean={:.3} median={:.3} best={:.3}  {}",
            island.id,
            island.member_count,
            island.mean_score,
            island.median_score,
            island.best_score,
            centroid.join(" ")
        );
    }
}
