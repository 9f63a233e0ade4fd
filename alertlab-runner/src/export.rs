//! Result sink — CSV and JSON artifacts for trades, folds, candidates and islands.
//!
//! Formats:
//! - **CSV**: isolated trade tape, portfolio trade tape with capital columns,
//!   equity curve
//! - **JSON Lines**: one fold result or candidate per line
//! - **JSON**: island summaries
//!
//! The `export_*` functions render to a `String`; `save_*` functions write a
//! bundle of files into an output directory.

use std::fs;
use std::path::{Path, PathBuf};

use alertlab_core::{CompletedTrade, PortfolioResult, TradeRecord};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::islands::ParameterIsland;
use crate::search::SearchResult;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

// ─── CSV export ─────────────────────────────────────────────────────

const TRADE_COLUMNS: [&str; 24] = [
    "instrument",
    "source",
    "alert_ms",
    "entry_ms",
    "entry_price",
    "time_to_entry_ms",
    "exit_ms",
    "exit_price",
    "exit_reason",
    "phase_at_exit",
    "partial_fills",
    "entry_mult",
    "peak_mult",
    "exit_mult",
    "giveback_pct",
    "hit_2x",
    "hit_3x",
    "hit_4x",
    "hit_5x",
    "hit_10x",
    "max_drawdown_pct",
    "dd_before_2x",
    "time_to_2x_ms",
    "hold_ms",
];

fn trade_fields(t: &TradeRecord) -> Vec<String> {
    let m = &t.metrics;
    vec![
        t.instrument.clone(),
        t.source.clone(),
        t.alert_ms.to_string(),
        t.entry_ms.to_string(),
        format!("{:.8}", t.entry_price),
        t.time_to_entry_ms.to_string(),
        t.exit_ms.to_string(),
        format!("{:.8}", t.exit_price),
        t.exit_reason.to_string(),
        format!("{:?}", t.phase_at_exit),
        t.partial_fills.len().to_string(),
        format!("{:.6}", m.entry_mult),
        format!("{:.6}", m.peak_mult),
        format!("{:.6}", m.exit_mult),
        format!("{:.4}", m.giveback_pct),
        m.hit_2x.to_string(),
        m.hit_3x.to_string(),
        m.hit_4x.to_string(),
        m.hit_5x.to_string(),
        m.hit_10x.to_string(),
        format!("{:.6}", m.max_drawdown_pct),
        format!("{:.6}", m.dd_before_2x),
        m.time_to_2x_ms.map(|v| v.to_string()).unwrap_or_default(),
        m.hold_ms.to_string(),
    ]
}

/// Trade tape with every derived metric.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(TRADE_COLUMNS)?;
    for t in trades {
        wtr.write_record(trade_fields(t))?;
    }
    finish(wtr)
}

/// Portfolio trade tape: the trade columns plus sizing, fees and R.
pub fn export_portfolio_trades_csv(trades: &[CompletedTrade]) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let header: Vec<&str> = TRADE_COLUMNS
        .iter()
        .copied()
        .chain(["size", "fees", "net_pnl", "r_multiple", "cost_r"])
        .collect();
    wtr.write_record(&header)?;
    for c in trades {
        let mut row = trade_fields(&c.trade);
        row.extend([
            format!("{:.4}", c.size),
            format!("{:.4}", c.fees),
            format!("{:.4}", c.net_pnl),
            format!("{:.4}", c.r_multiple),
            format!("{:.4}", c.cost_r),
        ]);
        wtr.write_record(&row)?;
    }
    finish(wtr)
}

/// Equity after each settlement.
pub fn export_equity_csv(result: &PortfolioResult) -> Result<String, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["timestamp_ms", "equity"])?;
    for point in &result.equity_curve {
        wtr.write_record([point.timestamp_ms.to_string(), format!("{:.2}", point.equity)])?;
    }
    finish(wtr)
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String, ExportError> {
    let data = wtr.into_inner().map_err(|e| ExportError::Csv(e.into_error().into()))?;
    Ok(String::from_utf8(data)?)
}

// ─── JSON export ────────────────────────────────────────────────────

/// One JSON document per line.
pub fn export_jsonl<T: Serialize>(items: &[T]) -> Result<String, ExportError> {
    let mut out = String::new();
    for item in items {
        out.push_str(&serde_json::to_string(item)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn export_islands_json(islands: &[ParameterIsland]) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(islands)?)
}

// ─── Artifact bundles ───────────────────────────────────────────────

/// Write the artifacts of a portfolio run into `dir`:
/// - `trades.csv` — trade tape with capital columns
/// - `equity.csv` — equity curve
/// - `summary.json` — the full result
pub fn save_portfolio(result: &PortfolioResult, dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    create_dir(dir)?;
    let files = vec![
        write(dir, "trades.csv", &export_portfolio_trades_csv(&result.completed_trades)?)?,
        write(dir, "equity.csv", &export_equity_csv(result)?)?,
        write(dir, "summary.json", &serde_json::to_string_pretty(result)?)?,
    ];
    info!(dir = %dir.display(), files = files.len(), "saved portfolio artifacts");
    Ok(files)
}

/// Write the artifacts of a search into `dir`:
/// - `candidates.jsonl` — every scored candidate, ranked
/// - `failures.jsonl` — trials that could not be scored
/// - `best_folds.jsonl` — fold results of the best passing candidate (if any)
/// - `islands.json` — island summaries
pub fn save_search(result: &SearchResult, islands: &[ParameterIsland], dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    create_dir(dir)?;
    let mut files = vec![
        write(dir, "candidates.jsonl", &export_jsonl(&result.candidates)?)?,
        write(dir, "failures.jsonl", &export_jsonl(&result.failures)?)?,
        write(dir, "islands.json", &export_islands_json(islands)?)?,
    ];
    if let Some(best) = result.best() {
        files.push(write(dir, "best_folds.jsonl", &export_jsonl(&best.folds)?)?);
    }
    info!(dir = %dir.display(), files = files.len(), "saved search artifacts");
    Ok(files)
}

fn create_dir(dir: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.display().to_string(),
        source,
    })
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, ExportError> {
    let path = dir.join(name);
    fs::write(&path, contents).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use alertlab_core::domain::{ExitReason, Phase, TradeMetrics};

    use super::*;

    fn trade() -> TradeRecord {
        TradeRecord {
            instrument: "TOK".into(),
            source: "caller".into(),
            alert_ms: 0,
            entry_price: 1.0,
            entry_ms: 60_000,
            time_to_entry_ms: 60_000,
            exit_price: 3.0,
            exit_ms: 120_000,
            exit_reason: ExitReason::TakeProfit,
            phase_at_exit: Phase::Two,
            partial_fills: Vec::new(),
            metrics: TradeMetrics::new(3.0, 3.0, 0.9, 0.1, Some(30_000), 60_000),
        }
    }

    #[test]
    fn trades_csv_has_header_and_rows() {
        let csv = export_trades_csv(&[trade(), trade()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("instrument,source,alert_ms"));
        assert!(lines[1].contains("take_profit"));
        assert_eq!(lines[1].split(',').count(), TRADE_COLUMNS.len());
    }

    #[test]
    fn trades_csv_carries_entry_mult_and_hit_flags() {
        let csv = export_trades_csv(&[trade()]).unwrap();
        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let header = rdr.headers().unwrap().clone();
        let row = rdr.records().next().unwrap().unwrap();
        let field = |name: &str| {
            let idx = header.iter().position(|h| h == name).unwrap();
            row[idx].to_string()
        };
        assert_eq!(field("entry_mult"), "1.000000");
        assert_eq!(field("hit_2x"), "true");
        assert_eq!(field("hit_3x"), "true");
        assert_eq!(field("hit_4x"), "false");
        assert_eq!(field("hit_5x"), "false");
        assert_eq!(field("hit_10x"), "false");
    }

    #[test]
    fn jsonl_is_one_document_per_line() {
        let out = export_jsonl(&[1, 2, 3]).unwrap();
        assert_eq!(out, "1\n2\n3\n");
    }
}
