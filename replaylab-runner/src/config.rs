//! Serializable run configuration.
//!
//! A run is fully described by a TOML file: engine options, export mode,
//! instruments, the strategy selection, and one data source per
//! subscription. Two identical configurations hash to the same [`RunId`].

use replaylab_core::debug::MAX_COMMAND_BYTES;
use replaylab_core::domain::{DataSubscription, Instrument, Timeframe};
use replaylab_core::engine::EngineConfig;
use replaylab_core::events::ExportMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serializable configuration for a single run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub engine: EngineOptions,

    #[serde(default)]
    pub export_mode: ExportMode,

    /// Where the JSONL event log is written, if anywhere.
    #[serde(default)]
    pub event_log: Option<PathBuf>,

    #[serde(default)]
    pub instruments: Vec<Instrument>,

    pub strategy: StrategyConfig,

    /// Declaration order is delivery order for equal timestamps.
    pub subscriptions: Vec<SubscriptionConfig>,
}

fn default_name() -> String {
    "run".to_string()
}

/// Engine knobs exposed in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineOptions {
    pub initial_cash: f64,
    pub commission_per_trade: f64,
    pub slippage_ticks: f64,
    pub detailed_execution: bool,
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            commission_per_trade: 0.0,
            slippage_ticks: 0.0,
            detailed_execution: false,
            start_ms: None,
            end_ms: None,
        }
    }
}

/// One subscription and where its bars come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionConfig {
    pub asset: String,
    pub timeframe: Timeframe,
    #[serde(default = "default_exportable")]
    pub exportable: bool,
    pub source: DataSourceConfig,
}

fn default_exportable() -> bool {
    true
}

impl SubscriptionConfig {
    pub fn subscription(&self) -> DataSubscription {
        DataSubscription {
            asset: self.asset.clone(),
            timeframe: self.timeframe,
            exportable: self.exportable,
        }
    }
}

/// Bar source for one subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSourceConfig {
    /// `timestamp,open,high,low,close,volume` rows, timestamps in epoch ms.
    Csv { path: PathBuf },

    /// Seeded random walk; identical seeds yield identical bars.
    Synthetic {
        seed: u64,
        bars: usize,
        #[serde(default)]
        start_ms: i64,
        #[serde(default = "default_start_price")]
        start_price: f64,
    },
}

fn default_start_price() -> f64 {
    100.0
}

/// Built-in strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Buy once on the first bar and hold.
    BuyAndHold { quantity: f64 },

    /// Long when the fast SMA crosses above the slow SMA, flat on the
    /// reverse cross.
    SmaCrossover {
        fast: usize,
        slow: usize,
        quantity: f64,
        /// Protective stop as a fraction below the signal close.
        #[serde(default)]
        stop_loss_pct: Option<f64>,
        #[serde(default)]
        take_profits: Vec<TakeProfitTarget>,
    },
}

impl StrategyConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyConfig::BuyAndHold { .. } => "buy_and_hold",
            StrategyConfig::SmaCrossover { .. } => "sma_crossover",
        }
    }
}

/// Take-profit level as a fraction above the signal close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TakeProfitTarget {
    pub pct: f64,
    /// Fraction of the remaining position closed at this level.
    pub fraction: f64,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file. Relative CSV paths resolve against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for sub in &mut self.subscriptions {
            if let DataSourceConfig::Csv { path } = &mut sub.source {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
        if let Some(log) = self.event_log.as_mut().filter(|p| p.is_relative()) {
            *log = base.join(&*log);
        }
    }

    /// Computes a deterministic hash ID for this configuration.
    ///
    /// Two runs with identical configs have the same RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn subscriptions(&self) -> Vec<DataSubscription> {
        self.subscriptions.iter().map(SubscriptionConfig::subscription).collect()
    }

    /// Engine configuration for this run. The first subscription's asset is
    /// the primary asset.
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig {
            initial_cash: self.engine.initial_cash,
            asset: self.subscriptions.first().map(|s| s.asset.clone()),
            start_ms: self.engine.start_ms,
            end_ms: self.engine.end_ms,
            commission_per_trade: self.engine.commission_per_trade,
            slippage_ticks: self.engine.slippage_ticks,
            detailed_execution: self.engine.detailed_execution,
            ..EngineConfig::default()
        };
        for instrument in &self.instruments {
            config = config.with_instrument(instrument.clone());
        }
        config
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.subscriptions.is_empty() {
            return invalid("at least one subscription is required".into());
        }
        // Cash, commission, slippage, window, and instrument checks.
        self.engine_config().validate().map_err(ConfigError::Invalid)?;

        for sub in &self.subscriptions {
            if sub.asset.trim().is_empty() {
                return invalid("subscription asset must not be empty".into());
            }
            if let DataSourceConfig::Synthetic {
                bars, start_price, ..
            } = sub.source
            {
                if bars == 0 {
                    return invalid(format!("synthetic source for {} has zero bars", sub.asset));
                }
                if !start_price.is_finite() || start_price <= 0.0 {
                    return invalid(format!(
                        "synthetic start_price for {} must be positive, got {start_price}",
                        sub.asset
                    ));
                }
            }
        }

        match &self.strategy {
            StrategyConfig::BuyAndHold { quantity } => check_quantity(*quantity),
            StrategyConfig::SmaCrossover {
                fast,
                slow,
                quantity,
                stop_loss_pct,
                take_profits,
            } => {
                if *fast == 0 || fast >= slow {
                    return invalid(format!(
                        "sma_crossover needs 0 < fast < slow, got fast={fast} slow={slow}"
                    ));
                }
                check_quantity(*quantity)?;
                if let Some(pct) = stop_loss_pct {
                    if !(*pct > 0.0 && *pct < 1.0) {
                        return invalid(format!("stop_loss_pct must be in (0, 1), got {pct}"));
                    }
                }
                for tp in take_profits {
                    if !(tp.pct > 0.0) || !(tp.fraction > 0.0 && tp.fraction <= 1.0) {
                        return invalid(format!(
                            "take profit needs pct > 0 and fraction in (0, 1], got {tp:?}"
                        ));
                    }
                }
                Ok(())
            }
        }
    }
}

fn check_quantity(quantity: f64) -> Result<(), ConfigError> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "strategy quantity must be positive, got {quantity}"
        )))
    }
}

/// Settings for the WebSocket debug server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Client frames larger than this are answered with an error, unparsed.
    pub max_command_bytes: usize,
    /// Live event buffer per session; events beyond it are dropped.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
            max_command_bytes: MAX_COMMAND_BYTES,
            channel_capacity: 4_096,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_command_bytes == 0 {
            return Err(ConfigError::Invalid("max_command_bytes must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid("channel_capacity must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
name = "spy-cross"
export_mode = "live"

[engine]
initial_cash = 50000.0
commission_per_trade = 1.0
slippage_ticks = 1.0

[strategy]
type = "sma_crossover"
fast = 5
slow = 20
quantity = 10.0
stop_loss_pct = 0.02
take_profits = [{ pct = 0.03, fraction = 0.5 }, { pct = 0.06, fraction = 1.0 }]

[[instruments]]
asset = "SPY"
tick_size = 0.01

[[subscriptions]]
asset = "SPY"
timeframe = "1m"
source = { type = "synthetic", seed = 7, bars = 500 }

[[subscriptions]]
asset = "SPY"
timeframe = "5m"
exportable = false
source = { type = "csv", path = "spy_5m.csv" }
"#;

    fn sample() -> RunConfig {
        RunConfig::from_toml_str(SAMPLE).unwrap()
    }

    #[test]
    fn parses_full_config() {
        let config = sample();
        assert_eq!(config.name, "spy-cross");
        assert_eq!(config.export_mode, ExportMode::Live);
        assert_eq!(config.engine.initial_cash, 50_000.0);
        assert_eq!(config.subscriptions.len(), 2);
        assert!(!config.subscriptions[1].exportable);
        assert_eq!(
            config.subscriptions[0].source,
            DataSourceConfig::Synthetic {
                seed: 7,
                bars: 500,
                start_ms: 0,
                start_price: 100.0
            }
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn engine_config_carries_options_and_instruments() {
        let engine = sample().engine_config();
        assert_eq!(engine.asset.as_deref(), Some("SPY"));
        assert_eq!(engine.commission_per_trade, 1.0);
        assert_eq!(engine.instrument("SPY").tick_size, 0.01);
        assert_eq!(engine.instrument("QQQ").as_ref(), &Instrument::with_defaults("QQQ"));
    }

    #[test]
    fn test_run_id_deterministic() {
        let config = sample();
        let id1 = config.run_id().unwrap();
        let id2 = config.run_id().unwrap();
        assert_eq!(id1, id2, "RunId should be deterministic");
        assert_eq!(id1.len(), 64);
    }

    #[test]
    fn test_run_id_changes_with_params() {
        let config1 = sample();
        let mut config2 = sample();
        config2.engine.slippage_ticks = 2.0;
        assert_ne!(config1.run_id().unwrap(), config2.run_id().unwrap());
    }

    #[test]
    fn rejects_inverted_sma_periods() {
        let mut config = sample();
        config.strategy = StrategyConfig::SmaCrossover {
            fast: 20,
            slow: 5,
            quantity: 1.0,
            stop_loss_pct: None,
            take_profits: Vec::new(),
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_empty_subscriptions_and_bad_cash() {
        let mut config = sample();
        config.subscriptions.clear();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.engine.initial_cash = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_strategy_type() {
        let text = SAMPLE.replace("sma_crossover", "martingale");
        assert!(matches!(RunConfig::from_toml_str(&text), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(
            config.subscriptions[1].source,
            DataSourceConfig::Csv {
                path: dir.path().join("spy_5m.csv")
            }
        );
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = RunConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn server_config_defaults() {
        let server = ServerConfig::default();
        assert_eq!(server.addr(), "127.0.0.1:8787");
        assert_eq!(server.max_command_bytes, MAX_COMMAND_BYTES);
        assert!(server.validate().is_ok());
    }
}
