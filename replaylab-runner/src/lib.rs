//! ReplayLab Runner: run orchestration and the debug server.
//!
//! This crate builds on `replaylab-core` to provide:
//! - TOML run configuration with content-addressed run ids
//! - Bar loading from CSV files or seeded synthetic series
//! - Built-in strategies selectable from configuration
//! - Single and parallel batch runs with an optional JSONL event log
//! - Debug sessions and the WebSocket debug server

pub mod config;
pub mod data_loader;
pub mod runner;
pub mod server;
pub mod session;
pub mod strategies;

pub use config::{
    ConfigError, DataSourceConfig, EngineOptions, RunConfig, RunId, ServerConfig, StrategyConfig,
    SubscriptionConfig, TakeProfitTarget,
};
pub use data_loader::{generate_synthetic_bars, load_csv, load_series, write_csv, LoadError};
pub use runner::{run_batch, run_from_config, run_with_series, RunSummary, RunnerError};
pub use server::{router, serve, ServerState};
pub use session::{DebugSession, SessionId, SessionRegistry};
pub use strategies::{build_strategy, BuyAndHold, SmaCrossover};
