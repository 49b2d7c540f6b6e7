//! Shared helpers for engine integration tests.
#![allow(dead_code)]

use replaylab_core::domain::{Bar, DataSubscription, Fill, Order, Timeframe};
use replaylab_core::engine::{self, CancelToken, EngineConfig, OrderContext, RunResult};
use replaylab_core::events::{EventBus, ExportMode, MemorySink};
use replaylab_core::{EngineError, HookResult, Strategy};
use serde_json::Value;

pub const MINUTE: i64 = 60_000;

pub type BarHook =
    Box<dyn FnMut(&Bar, &DataSubscription, &mut OrderContext<'_>) -> HookResult + Send>;

/// A strategy whose hooks are closures supplied by the test.
pub struct Scripted {
    pub subscriptions: Vec<DataSubscription>,
    start: Option<BarHook>,
    complete: Option<BarHook>,
    /// `(timestamp, subscription asset, timeframe)` in delivery order.
    pub delivered: Vec<(i64, String, Timeframe)>,
    pub trades: Vec<(Fill, Order)>,
}

impl Scripted {
    pub fn new(subscriptions: Vec<DataSubscription>) -> Self {
        Self {
            subscriptions,
            start: None,
            complete: None,
            delivered: Vec::new(),
            trades: Vec::new(),
        }
    }

    pub fn single(asset: &str) -> Self {
        Self::new(vec![DataSubscription::new(asset, Timeframe::M1)])
    }

    pub fn on_start(
        mut self,
        hook: impl FnMut(&Bar, &DataSubscription, &mut OrderContext<'_>) -> HookResult + Send + 'static,
    ) -> Self {
        self.start = Some(Box::new(hook));
        self
    }

    pub fn on_complete(
        mut self,
        hook: impl FnMut(&Bar, &DataSubscription, &mut OrderContext<'_>) -> HookResult + Send + 'static,
    ) -> Self {
        self.complete = Some(Box::new(hook));
        self
    }
}

impl Strategy for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn subscriptions(&self) -> &[DataSubscription] {
        &self.subscriptions
    }

    fn on_bar_start(
        &mut self,
        bar: &Bar,
        subscription: &DataSubscription,
        ctx: &mut OrderContext<'_>,
    ) -> HookResult {
        match self.start.as_mut() {
            Some(hook) => hook(bar, subscription, ctx),
            None => Ok(()),
        }
    }

    fn on_bar_complete(
        &mut self,
        bar: &Bar,
        subscription: &DataSubscription,
        ctx: &mut OrderContext<'_>,
    ) -> HookResult {
        self.delivered
            .push((bar.timestamp_ms, subscription.asset.clone(), subscription.timeframe));
        match self.complete.as_mut() {
            Some(hook) => hook(bar, subscription, ctx),
            None => Ok(()),
        }
    }

    fn on_trade(&mut self, fill: &Fill, order: &Order) -> HookResult {
        self.trades.push((fill.clone(), order.clone()));
        Ok(())
    }
}

/// Bars one minute apart starting at `start_ms`, from `(open, high, low, close)`.
pub fn bars_from(start_ms: i64, step_ms: i64, ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    ohlc.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Bar::new(start_ms + i as i64 * step_ms, o, h, l, c, 100.0))
        .collect()
}

pub fn minute_bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    bars_from(0, MINUTE, ohlc)
}

pub fn flat_bars(n: usize, price: f64) -> Vec<Bar> {
    minute_bars(&vec![(price, price, price, price); n])
}

/// Run with a Backtest-mode bus and a memory sink; no probe.
pub fn run_recorded(
    series: &[Vec<Bar>],
    strategy: &mut dyn Strategy,
    config: &EngineConfig,
) -> (Result<RunResult, EngineError>, MemorySink) {
    run_recorded_in(series, strategy, config, ExportMode::Backtest)
}

pub fn run_recorded_in(
    series: &[Vec<Bar>],
    strategy: &mut dyn Strategy,
    config: &EngineConfig,
    mode: ExportMode,
) -> (Result<RunResult, EngineError>, MemorySink) {
    let sink = MemorySink::new();
    let mut bus = EventBus::new(mode).with_sink(sink.clone());
    let result = engine::run(series, strategy, config, &CancelToken::new(), None, Some(&mut bus));
    (result, sink)
}

/// Envelopes with the given `_t` tag.
pub fn events_of(sink: &MemorySink, tag: &str) -> Vec<Value> {
    sink.json().into_iter().filter(|e| e["_t"] == tag).collect()
}

pub fn tags(sink: &MemorySink) -> Vec<String> {
    sink.events().iter().map(|e| e.type_tag.to_string()).collect()
}
