//! Bar loading for the runner.
//!
//! Each subscription names its source:
//! 1. `csv` → read `timestamp,open,high,low,close,volume` rows
//! 2. `synthetic` → deterministic random walk from a seed
//!
//! Loaded series are checked for sane OHLC values and strictly ascending
//! timestamps before they reach the engine.

use crate::config::{DataSourceConfig, RunConfig, SubscriptionConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use replaylab_core::domain::{Bar, Timeframe};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: {reason}")]
    InvalidBar {
        path: PathBuf,
        row: usize,
        reason: String,
    },

    #[error("{path} has no bars")]
    Empty { path: PathBuf },
}

/// CSV row layout. `timestamp_ms` is accepted as a header alias.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(alias = "timestamp_ms")]
    timestamp: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Read a CSV bar file.
pub fn load_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_csv(file, path)
}

/// Read CSV bars from any reader; `path` labels errors.
pub fn read_csv<R: std::io::Read>(reader: R, path: &Path) -> Result<Vec<Bar>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars: Vec<Bar> = Vec::new();

    for (i, row) in rdr.deserialize::<CsvRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let bar = Bar::new(row.timestamp, row.open, row.high, row.low, row.close, row.volume);
        let invalid = |reason: String| LoadError::InvalidBar {
            path: path.to_path_buf(),
            row: i + 1,
            reason,
        };
        if !bar.is_sane() {
            return Err(invalid(format!(
                "inconsistent OHLC (o={} h={} l={} c={})",
                bar.open, bar.high, bar.low, bar.close
            )));
        }
        if let Some(prev) = bars.last() {
            if bar.timestamp_ms <= prev.timestamp_ms {
                return Err(invalid(format!(
                    "timestamp {} is not after {}",
                    bar.timestamp_ms, prev.timestamp_ms
                )));
            }
        }
        bars.push(bar);
    }

    if bars.is_empty() {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }
    tracing::debug!(path = %path.display(), bars = bars.len(), "loaded CSV bars");
    Ok(bars)
}

/// Write bars in the format [`load_csv`] reads.
pub fn write_csv(path: &Path, bars: &[Bar]) -> Result<(), LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    for bar in bars {
        wtr.serialize(CsvRow {
            timestamp: bar.timestamp_ms,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Deterministic random-walk bars spaced one `timeframe` apart.
pub fn generate_synthetic_bars(
    seed: u64,
    count: usize,
    start_ms: i64,
    timeframe: Timeframe,
    start_price: f64,
) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let step = timeframe.duration_ms();
    let mut price = start_price;

    (0..count)
        .map(|i| {
            let ret: f64 = rng.gen_range(-0.01..0.01);
            let open = price;
            let close = (price * (1.0 + ret)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.005));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.005));
            let volume = rng.gen_range(100.0..10_000.0_f64).round();
            price = close;
            Bar::new(start_ms + i as i64 * step, open, high, low, close, volume)
        })
        .collect()
}

/// Load the bars for one subscription.
pub fn load_subscription(sub: &SubscriptionConfig) -> Result<Vec<Bar>, LoadError> {
    match &sub.source {
        DataSourceConfig::Csv { path } => load_csv(path),
        DataSourceConfig::Synthetic {
            seed,
            bars,
            start_ms,
            start_price,
        } => Ok(generate_synthetic_bars(
            *seed,
            *bars,
            *start_ms,
            sub.timeframe,
            *start_price,
        )),
    }
}

/// Load one series per subscription, in declaration order.
pub fn load_series(config: &RunConfig) -> Result<Vec<Vec<Bar>>, LoadError> {
    config.subscriptions.iter().map(load_subscription).collect()
}
