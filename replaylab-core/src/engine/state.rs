//! Engine configuration, mutable state, and run result types.

use super::exits::ExitTracker;
use super::order_queue::OrderQueue;
use crate::domain::{Fill, Instrument, Portfolio};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_cash: f64,
    /// Primary asset, informational.
    pub asset: Option<String>,
    /// Bars before this timestamp are skipped.
    pub start_ms: Option<i64>,
    /// Bars after this timestamp are skipped.
    pub end_ms: Option<i64>,
    /// Flat commission charged on every fill.
    pub commission_per_trade: f64,
    /// Ticks of adverse slippage on market and stop fills.
    pub slippage_ticks: f64,
    /// Reserved for sub-bar execution; currently has no effect.
    pub detailed_execution: bool,
    /// Per-asset metadata. Assets not listed use [`Instrument::with_defaults`].
    pub instruments: HashMap<String, Instrument>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_cash: 100_000.0,
            asset: None,
            start_ms: None,
            end_ms: None,
            commission_per_trade: 0.0,
            slippage_ticks: 0.0,
            detailed_execution: false,
            instruments: HashMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            initial_cash,
            ..Self::default()
        }
    }

    pub fn with_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.insert(instrument.asset.clone(), instrument);
        self
    }

    pub fn instrument(&self, asset: &str) -> Cow<'_, Instrument> {
        match self.instruments.get(asset) {
            Some(inst) => Cow::Borrowed(inst),
            None => Cow::Owned(Instrument::with_defaults(asset)),
        }
    }

    /// Reject values that make a run meaningless.
    pub fn validate(&self) -> Result<(), String> {
        if !self.initial_cash.is_finite() || self.initial_cash <= 0.0 {
            return Err(format!("initial cash must be positive, got {}", self.initial_cash));
        }
        if !self.commission_per_trade.is_finite() || self.commission_per_trade < 0.0 {
            return Err(format!(
                "commission per trade must be non-negative, got {}",
                self.commission_per_trade
            ));
        }
        if !self.slippage_ticks.is_finite() || self.slippage_ticks < 0.0 {
            return Err(format!("slippage ticks must be non-negative, got {}", self.slippage_ticks));
        }
        if let (Some(start), Some(end)) = (self.start_ms, self.end_ms) {
            if start > end {
                return Err(format!("start {start} is after end {end}"));
            }
        }
        for (asset, inst) in &self.instruments {
            if inst.tick_size <= 0.0 || inst.multiplier <= 0.0 {
                return Err(format!("instrument {asset}: tick size and multiplier must be positive"));
            }
        }
        Ok(())
    }
}

/// Mutable state that evolves bar-by-bar during the engine loop.
pub struct EngineState {
    pub portfolio: Portfolio,
    pub queue: OrderQueue,
    pub exits: ExitTracker,
    pub fills: Vec<Fill>,
    /// Fills committed during the bar currently being processed.
    pub bar_fills: Vec<Fill>,
    pub equity_curve: Vec<EquityPoint>,
    pub last_prices: HashMap<String, f64>,
    pub total_bars: usize,
    pub rejected_orders: usize,
}

impl EngineState {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            portfolio: Portfolio::new(initial_cash),
            queue: OrderQueue::new(),
            exits: ExitTracker::new(),
            fills: Vec::new(),
            bar_fills: Vec::new(),
            equity_curve: Vec::new(),
            last_prices: HashMap::new(),
            total_bars: 0,
            rejected_orders: 0,
        }
    }

    pub fn equity(&self) -> f64 {
        self.portfolio.equity(&self.last_prices)
    }
}

/// Equity after all bars of one timestamp were processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp_ms: i64,
    pub equity: f64,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub final_portfolio: Portfolio,
    pub fills: Vec<Fill>,
    /// One point per distinct timestamp.
    pub equity_curve: Vec<EquityPoint>,
    pub total_bars: usize,
    pub rejected_orders: usize,
    pub last_prices: HashMap<String, f64>,
    /// Wall-clock time spent in the run, including time parked by a probe.
    pub duration: Duration,
}

impl RunResult {
    pub fn final_equity(&self) -> f64 {
        self.final_portfolio.equity(&self.last_prices)
    }
}
