//! CSV source adapters for candles and alerts.
//!
//! The loader owns the data-hygiene duties the simulator never performs:
//! - candle rows failing the OHLC sanity check are dropped
//! - candles are sorted per instrument and duplicate timestamps removed
//! - alerts are sorted (stably) by trigger time
//!
//! Everything dropped is counted in the returned report.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use alertlab_core::{Alert, Candle, CandleSource};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV at line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

impl LoadError {
    fn csv(source: csv::Error) -> Self {
        let line = source.position().map_or(0, |p| p.line());
        LoadError::Csv { line, source }
    }
}

/// Candle series per instrument, sorted and deduplicated.
#[derive(Debug, Clone, Default)]
pub struct CandleStore {
    series: BTreeMap<String, Vec<Candle>>,
}

impl CandleStore {
    /// Build a store from raw per-instrument candles, sorting and deduplicating each series.
    pub fn from_series(series: BTreeMap<String, Vec<Candle>>) -> (Self, LoadReport) {
        let mut report = LoadReport::default();
        let mut clean = BTreeMap::new();
        for (instrument, mut candles) in series {
            let before = candles.len();
            candles.retain(Candle::is_sane);
            report.rows_invalid += before - candles.len();

            candles.sort_by_key(|c| c.timestamp_ms);
            let sorted_len = candles.len();
            candles.dedup_by_key(|c| c.timestamp_ms);
            report.rows_duplicate += sorted_len - candles.len();

            report.rows_kept += candles.len();
            if !candles.is_empty() {
                clean.insert(instrument, candles);
            }
        }
        report.instruments = clean.len();
        (Self { series: clean }, report)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl CandleSource for CandleStore {
    fn candles(&self, instrument: &str) -> Option<&[Candle]> {
        self.series.get(instrument).map(Vec::as_slice)
    }
}

/// Row counts from a load, so dropped data is never silent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub instruments: usize,
    pub rows_kept: usize,
    pub rows_invalid: usize,
    pub rows_duplicate: usize,
}

#[derive(Debug, Deserialize)]
struct CandleRow {
    instrument: String,
    timestamp_ms: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AlertRow {
    instrument: String,
    trigger_ms: i64,
    #[serde(default)]
    source: String,
    #[serde(default)]
    alert_price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
}

/// Read candles from CSV with header
/// `instrument,timestamp_ms,open,high,low,close,volume`.
pub fn read_candles<R: Read>(reader: R) -> Result<(CandleStore, LoadReport), LoadError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut series: BTreeMap<String, Vec<Candle>> = BTreeMap::new();
    for row in csv.deserialize::<CandleRow>() {
        let row = row.map_err(LoadError::csv)?;
        series.entry(row.instrument).or_default().push(Candle {
            timestamp_ms: row.timestamp_ms,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.unwrap_or(0.0),
        });
    }
    Ok(CandleStore::from_series(series))
}

/// Read alerts from CSV with header
/// `instrument,trigger_ms,source,alert_price,market_cap`; the last two may be empty.
pub fn read_alerts<R: Read>(reader: R) -> Result<Vec<Alert>, LoadError> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut alerts = Vec::new();
    for row in csv.deserialize::<AlertRow>() {
        let row = row.map_err(LoadError::csv)?;
        alerts.push(Alert {
            instrument: row.instrument,
            trigger_ms: row.trigger_ms,
            source: row.source,
            alert_price: row.alert_price,
            market_cap: row.market_cap,
        });
    }
    alerts.sort_by_key(|a| a.trigger_ms);
    Ok(alerts)
}

pub fn load_candles(path: &Path) -> Result<(CandleStore, LoadReport), LoadError> {
    let file = open(path)?;
    let (store, report) = read_candles(file)?;
    info!(
        path = %path.display(),
        instruments = report.instruments,
        candles = report.rows_kept,
        invalid = report.rows_invalid,
        duplicate = report.rows_duplicate,
        "loaded candles"
    );
    Ok((store, report))
}

pub fn load_alerts(path: &Path) -> Result<Vec<Alert>, LoadError> {
    let alerts = read_alerts(open(path)?)?;
    debug!(path = %path.display(), alerts = alerts.len(), "loaded alerts");
    Ok(alerts)
}

fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })
}
