//! Run orchestration: wires config, data, strategy, event bus, and engine.
//!
//! Entry points:
//! - `run_from_config()`: loads data, then runs. Used by the CLI.
//! - `run_with_series()`: takes pre-loaded bars, an optional probe, and a
//!   caller-built bus. Used by debug sessions.
//! - `run_batch()`: independent configs in parallel on the rayon pool.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use replaylab_core::debug::DebugProbe;
use replaylab_core::domain::Bar;
use replaylab_core::engine::{run, CancelToken, RunResult};
use replaylab_core::events::{EventBus, IndexSink, JsonlFileSink, SinkError};
use replaylab_core::EngineError;

use crate::config::{ConfigError, RunConfig, RunId};
use crate::data_loader::{load_series, LoadError};
use crate::strategies::build_strategy;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("event log error: {0}")]
    EventLog(#[from] SinkError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl RunnerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunnerError::Engine(e) if e.is_cancelled())
    }
}

/// What a finished run reports to the CLI and to debug clients.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub name: String,
    pub strategy: String,
    pub total_bars: usize,
    pub fills: usize,
    pub rejected_orders: usize,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub return_pct: f64,
    /// Events sequenced by the bus (the last sequence number).
    pub events: u64,
    /// Per-type event counts.
    pub event_counts: BTreeMap<String, usize>,
    pub event_log: Option<PathBuf>,
    pub duration_ms: u64,
    #[serde(skip)]
    pub result: RunResult,
}

/// Load data and run one config.
pub fn run_from_config(config: &RunConfig, cancel: &CancelToken) -> Result<RunSummary, RunnerError> {
    config.validate()?;
    let series = load_series(config)?;
    run_with_series(config, &series, cancel, None, EventBus::new(config.export_mode))
}

/// Run one config over pre-loaded series.
///
/// `bus` may already carry sinks (e.g. a live channel); an index sink and,
/// when configured, the JSONL event log are attached here.
pub fn run_with_series(
    config: &RunConfig,
    series: &[Vec<Bar>],
    cancel: &CancelToken,
    probe: Option<&DebugProbe>,
    mut bus: EventBus,
) -> Result<RunSummary, RunnerError> {
    let run_id = config.run_id()?;
    let index = IndexSink::new();
    bus.add_sink(Box::new(index.clone()));
    if let Some(path) = &config.event_log {
        bus.add_sink(Box::new(JsonlFileSink::create(path)?));
    }

    let mut strategy = build_strategy(config);
    tracing::info!(
        run_id = %&run_id[..12],
        name = %config.name,
        strategy = config.strategy.name(),
        mode = ?config.export_mode,
        "starting run"
    );
    let result = run(
        series,
        strategy.as_mut(),
        &config.engine_config(),
        cancel,
        probe,
        Some(&mut bus),
    )?;

    let initial_cash = config.engine.initial_cash;
    let final_equity = result.final_equity();
    Ok(RunSummary {
        run_id,
        name: config.name.clone(),
        strategy: config.strategy.name().to_string(),
        total_bars: result.total_bars,
        fills: result.fills.len(),
        rejected_orders: result.rejected_orders,
        initial_cash,
        final_equity,
        return_pct: (final_equity / initial_cash - 1.0) * 100.0,
        events: bus.last_sequence(),
        event_counts: index.counts(),
        event_log: config.event_log.clone(),
        duration_ms: result.duration.as_millis() as u64,
        result,
    })
}

/// Run independent configs in parallel. Results keep input order.
pub fn run_batch(configs: &[RunConfig], cancel: &CancelToken) -> Vec<Result<RunSummary, RunnerError>> {
    tracing::info!(runs = configs.len(), "starting batch");
    configs
        .par_iter()
        .map(|config| {
            let outcome = run_from_config(config, cancel);
            if let Err(err) = &outcome {
                if err.is_cancelled() {
                    tracing::info!(name = %config.name, "run cancelled");
                } else {
                    tracing::warn!(name = %config.name, error = %err, "run failed");
                }
            }
            outcome
        })
        .collect()
}
