//! The engine loop.
//!
//! Per delivered bar:
//! 1. `on_bar_start` with the open-only view, then id assignment
//! 2. pending-order matching for the bar's asset
//! 3. protective-exit evaluation for the bar's asset
//! 4. `bar` event, `on_bar_complete`, then id assignment
//! 5. last-price update and the probe's bar hook
//!
//! After all bars sharing a timestamp: one equity-curve point.

use super::cancel::CancelToken;
use super::context::{HookEmission, OrderContext};
use super::exits::ExitOrder;
use super::matching::{match_order, MatchResult, PriceModel};
use super::risk::check_fill;
use super::scheduler::{first_unsorted, Scheduler};
use super::state::{EngineConfig, EngineState, EquityPoint, RunResult};
use crate::debug::{DebugProbe, DebugSnapshot};
use crate::domain::{Bar, DataSubscription, Fill, FillReason, Order, OrderStatus};
use crate::error::EngineError;
use crate::events::{
    sources, BarEvent, EngineEvent, ErrorEvent, EventBus, OrderFilled, OrderPlaced, OrderRejected,
    PositionUpdate, RiskEvent, RunEnded, RunStarted, RunStatus, WarningEvent,
};
use crate::strategy::{Strategy, StrategyError};
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
enum Hook {
    Init,
    BarStart,
    BarComplete,
    Trade,
}

impl Hook {
    fn name(self) -> &'static str {
        match self {
            Hook::Init => "on_init",
            Hook::BarStart => "on_bar_start",
            Hook::BarComplete => "on_bar_complete",
            Hook::Trade => "on_trade",
        }
    }
}

/// Publishes to the bus (if any) and reports each sequenced event to the
/// probe (if any).
struct Publisher<'a> {
    bus: Option<&'a mut EventBus>,
    probe: Option<&'a DebugProbe>,
}

impl Publisher<'_> {
    fn emit<E: EngineEvent>(&mut self, timestamp_ms: i64, source: &str, event: &E) {
        let Some(bus) = self.bus.as_deref_mut() else {
            return;
        };
        if let Some(sequence) = bus.emit(timestamp_ms, source, event) {
            if let Some(probe) = self.probe {
                probe.on_event_emitted(E::TYPE_TAG, sequence);
            }
        }
    }

    fn last_sequence(&self) -> u64 {
        self.bus.as_ref().map_or(0, |bus| bus.last_sequence())
    }

    fn flush(&mut self) {
        if let Some(bus) = self.bus.as_deref_mut() {
            bus.flush();
        }
    }
}

struct Engine<'a, 's> {
    config: &'a EngineConfig,
    subscriptions: &'a [DataSubscription],
    strategy: &'s mut dyn Strategy,
    probe: Option<&'a DebugProbe>,
    out: Publisher<'a>,
    state: EngineState,
    emissions: Vec<HookEmission>,
    last_timestamp_ms: i64,
}

/// Run `strategy` over one bar series per subscription.
///
/// `series[i]` feeds `strategy.subscriptions()[i]` and must be time-ascending.
/// The probe, when given, may park the calling thread; run this on a thread
/// that is allowed to block.
pub fn run(
    series: &[Vec<Bar>],
    strategy: &mut dyn Strategy,
    config: &EngineConfig,
    cancel: &CancelToken,
    probe: Option<&DebugProbe>,
    bus: Option<&mut EventBus>,
) -> Result<RunResult, EngineError> {
    let subscriptions = strategy.subscriptions().to_vec();
    if series.len() != subscriptions.len() {
        return Err(EngineError::Config(format!(
            "strategy '{}' declares {} subscriptions but {} bar series were supplied",
            strategy.name(),
            subscriptions.len(),
            series.len()
        )));
    }
    config.validate().map_err(EngineError::Config)?;
    for (bars, sub) in series.iter().zip(&subscriptions) {
        if let Some(at) = first_unsorted(bars) {
            return Err(EngineError::Config(format!(
                "series for {} {} is not time-ascending at bar {at}",
                sub.asset, sub.timeframe
            )));
        }
    }

    let started = Instant::now();
    let first_timestamp_ms = series
        .iter()
        .filter_map(|bars| bars.first())
        .map(|b| b.timestamp_ms)
        .min()
        .unwrap_or(0)
        .max(config.start_ms.unwrap_or(i64::MIN));
    tracing::info!(
        strategy = strategy.name(),
        subscriptions = subscriptions.len(),
        bars = series.iter().map(Vec::len).sum::<usize>(),
        asset = config.asset.as_deref().unwrap_or("-"),
        "run started"
    );

    let mut engine = Engine {
        config,
        subscriptions: &subscriptions,
        strategy,
        probe,
        out: Publisher { bus, probe },
        state: EngineState::new(config.initial_cash),
        emissions: Vec::new(),
        last_timestamp_ms: first_timestamp_ms,
    };
    let outcome = engine.drive(series, cancel);
    engine.finish(outcome, started)
}

impl<'a, 's> Engine<'a, 's> {
    fn drive(&mut self, series: &[Vec<Bar>], cancel: &CancelToken) -> Result<(), EngineError> {
        self.out.emit(
            self.last_timestamp_ms,
            sources::ENGINE,
            &RunStarted {
                subscriptions: self.subscriptions.to_vec(),
                initial_cash: self.config.initial_cash,
            },
        );
        if let Some(probe) = self.probe {
            probe.on_run_start();
        }
        if let Err(err) = self.strategy.on_init() {
            return Err(self.strategy_failure(Hook::Init, self.last_timestamp_ms, err));
        }

        let mut scheduler = Scheduler::new(series, self.config.start_ms, self.config.end_ms);
        while let Some(group) = scheduler.next_group() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            for &(index, bar) in &group.bars {
                self.process_bar(index, bar)?;
            }
            let equity = self.state.equity();
            self.state.equity_curve.push(EquityPoint {
                timestamp_ms: group.timestamp_ms,
                equity,
            });
        }
        Ok(())
    }

    fn process_bar(&mut self, index: usize, bar: &Bar) -> Result<(), EngineError> {
        let subscriptions = self.subscriptions;
        let sub = &subscriptions[index];
        let ts = bar.timestamp_ms;
        self.last_timestamp_ms = ts;
        self.state.bar_fills.clear();

        self.call_bar_hook(Hook::BarStart, &bar.open_view(), index, sub)?;
        self.process_submissions(ts);

        self.match_pending(sub, bar)?;
        self.evaluate_exits(sub, bar)?;

        self.out.emit(
            ts,
            sources::ENGINE,
            &BarEvent {
                subscription_index: index,
                asset: sub.asset.clone(),
                timeframe: sub.timeframe,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                exportable: sub.exportable,
            },
        );

        self.call_bar_hook(Hook::BarComplete, bar, index, sub)?;
        self.process_submissions(ts);

        match self.state.last_prices.get_mut(&sub.asset) {
            Some(price) => *price = bar.close,
            None => {
                self.state.last_prices.insert(sub.asset.clone(), bar.close);
            }
        }
        self.state.total_bars += 1;

        if let Some(probe) = self.probe {
            probe.on_bar_processed(DebugSnapshot {
                sequence_number: self.out.last_sequence(),
                timestamp_ms: ts,
                subscription_index: index,
                is_exportable_subscription: sub.exportable,
                fills_this_bar: self.state.bar_fills.len(),
                portfolio_equity: self.state.equity(),
            });
        }
        Ok(())
    }

    fn call_bar_hook(
        &mut self,
        hook: Hook,
        bar: &Bar,
        index: usize,
        sub: &DataSubscription,
    ) -> Result<(), EngineError> {
        let result = {
            let mut ctx = OrderContext {
                queue: &mut self.state.queue,
                portfolio: &self.state.portfolio,
                bar_fills: &self.state.bar_fills,
                emissions: &mut self.emissions,
                asset: &sub.asset,
                subscription_index: index,
                exportable: sub.exportable,
                timestamp_ms: bar.timestamp_ms,
            };
            match hook {
                Hook::BarStart => self.strategy.on_bar_start(bar, sub, &mut ctx),
                _ => self.strategy.on_bar_complete(bar, sub, &mut ctx),
            }
        };
        self.publish_emissions(bar.timestamp_ms);
        result.map_err(|err| self.strategy_failure(hook, bar.timestamp_ms, err))
    }

    fn publish_emissions(&mut self, ts: i64) {
        let mut emissions = std::mem::take(&mut self.emissions);
        for emission in emissions.drain(..) {
            match emission {
                HookEmission::Signal(event) => self.out.emit(ts, sources::STRATEGY, &event),
                HookEmission::Indicator(event) => self.out.emit(ts, sources::STRATEGY, &event),
                HookEmission::Cancelled(event) => {
                    tracing::debug!(order_id = %event.order_id, "order cancelled");
                    self.out.emit(ts, sources::STRATEGY, &event);
                }
            }
        }
        self.emissions = emissions;
        self.state.queue.prune();
    }

    /// Number newly queued orders, publish them, and reject those whose
    /// quantity the instrument does not allow.
    fn process_submissions(&mut self, ts: i64) {
        let config = self.config;
        for id in self.state.queue.assign_ids(ts) {
            let Some(order) = self.state.queue.get(id).cloned() else {
                continue;
            };
            self.out.emit(ts, sources::ENGINE, &OrderPlaced { order: order.clone() });
            if let Err(err) = config.instrument(&order.asset).validate_quantity(order.quantity) {
                tracing::debug!(order_id = %id, error = %err, "quantity validation failed");
                self.reject(&order, ts, err.reason(), order.quantity, 0.0);
            }
        }
        self.state.queue.prune();
    }

    fn match_pending(&mut self, sub: &DataSubscription, bar: &Bar) -> Result<(), EngineError> {
        let config = self.config;
        let ts = bar.timestamp_ms;
        let instrument = config.instrument(&sub.asset);
        let model = PriceModel {
            tick_size: instrument.tick_size,
            slippage_ticks: config.slippage_ticks,
        };

        for id in self.state.queue.active_ids_for(&sub.asset) {
            let Some(order) = self.state.queue.get(id).filter(|o| o.is_active()).cloned() else {
                continue;
            };
            match match_order(&order, bar, model) {
                MatchResult::NoMatch => {}
                MatchResult::Triggered => {
                    if let Some(live) = self.state.queue.get_mut(id) {
                        if live.status == OrderStatus::Pending {
                            tracing::debug!(order_id = %id, "stop-limit triggered");
                            live.status = OrderStatus::Triggered;
                        }
                    }
                }
                MatchResult::Fill { price } => {
                    let commission = config.commission_per_trade;
                    let check = check_fill(
                        order.side,
                        order.quantity,
                        price,
                        commission,
                        &instrument,
                        &self.state.portfolio,
                    );
                    if !check.approved {
                        self.reject(&order, ts, check.reason, check.required, check.available);
                        continue;
                    }
                    self.out.emit(
                        ts,
                        sources::RISK,
                        &RiskEvent {
                            order_id: id,
                            asset: order.asset.clone(),
                            approved: true,
                            reason: "approved".into(),
                            required: check.required,
                            available: check.available,
                        },
                    );

                    let mut filled = order;
                    filled.status = OrderStatus::Filled;
                    if let Some(live) = self.state.queue.get_mut(id) {
                        live.status = OrderStatus::Filled;
                    }
                    let fill = Fill {
                        order_id: id,
                        asset: filled.asset.clone(),
                        timestamp_ms: ts,
                        price,
                        quantity: filled.quantity,
                        side: filled.side,
                        commission,
                        reason: FillReason::Order,
                    };
                    self.commit_fill(&filled, fill, instrument.multiplier, sources::ENGINE)?;
                }
            }
        }
        self.state.queue.prune();
        Ok(())
    }

    fn evaluate_exits(&mut self, sub: &DataSubscription, bar: &Bar) -> Result<(), EngineError> {
        if self.state.exits.is_empty() {
            return Ok(());
        }
        let config = self.config;
        let multiplier = config.instrument(&sub.asset).multiplier;
        let position = self.state.portfolio.quantity(&sub.asset);
        let exits = self.state.exits.evaluate(&sub.asset, bar, position);

        for ExitOrder {
            entry,
            side,
            quantity,
            price,
            reason,
        } in exits
        {
            let fill = Fill {
                order_id: entry.id,
                asset: entry.asset.clone(),
                timestamp_ms: bar.timestamp_ms,
                price,
                quantity,
                side,
                commission: config.commission_per_trade,
                reason,
            };
            self.commit_fill(&entry, fill, multiplier, sources::EXITS)?;
        }
        Ok(())
    }

    /// Apply a fill to the portfolio, publish it, arm protective exits for
    /// entries, and notify the strategy.
    fn commit_fill(
        &mut self,
        order: &Order,
        fill: Fill,
        multiplier: f64,
        source: &str,
    ) -> Result<(), EngineError> {
        let ts = fill.timestamp_ms;
        self.state.portfolio.apply_fill(&fill, multiplier);
        tracing::debug!(
            order_id = %fill.order_id,
            asset = %fill.asset,
            side = %fill.side,
            price = fill.price,
            quantity = fill.quantity,
            "fill committed"
        );

        self.out.emit(ts, source, &OrderFilled { fill: fill.clone() });
        let position = self.state.portfolio.positions.get(&fill.asset);
        self.out.emit(
            ts,
            sources::ENGINE,
            &PositionUpdate {
                asset: fill.asset.clone(),
                quantity: position.map_or(0.0, |p| p.quantity),
                avg_entry_price: position.map_or(0.0, |p| p.avg_entry_price),
                realized_pnl: position.map_or(0.0, |p| p.realized_pnl),
                cash: self.state.portfolio.cash,
            },
        );

        if fill.reason == FillReason::Order {
            self.state.exits.release(&fill.asset, fill.side, fill.quantity);
            self.state.exits.register(order, fill.quantity, ts);
        }
        self.state.fills.push(fill.clone());
        self.state.bar_fills.push(fill.clone());

        if let Err(err) = self.strategy.on_trade(&fill, order) {
            return Err(self.strategy_failure(Hook::Trade, ts, err));
        }
        Ok(())
    }

    fn reject(&mut self, order: &Order, ts: i64, reason: &str, required: f64, available: f64) {
        if let Some(live) = self.state.queue.get_mut(order.id) {
            live.status = OrderStatus::Rejected {
                reason: reason.to_string(),
            };
        }
        self.state.rejected_orders += 1;
        tracing::warn!(order_id = %order.id, asset = %order.asset, reason, "order rejected");

        self.out.emit(
            ts,
            sources::RISK,
            &RiskEvent {
                order_id: order.id,
                asset: order.asset.clone(),
                approved: false,
                reason: reason.to_string(),
                required,
                available,
            },
        );
        self.out.emit(
            ts,
            sources::ENGINE,
            &OrderRejected {
                order_id: order.id,
                asset: order.asset.clone(),
                reason: reason.to_string(),
            },
        );
        self.out.emit(
            ts,
            sources::RISK,
            &WarningEvent {
                message: format!(
                    "Order {} ({} {} {} {}) rejected: {}",
                    order.id,
                    order.side,
                    order.quantity,
                    order.asset,
                    order.order_type.name(),
                    reason
                ),
            },
        );
    }

    fn strategy_failure(&mut self, hook: Hook, ts: i64, err: StrategyError) -> EngineError {
        self.out.emit(
            ts,
            sources::STRATEGY,
            &ErrorEvent {
                message: err.message.clone(),
                context: format!("{} in {} at {}", self.strategy.name(), hook.name(), ts),
            },
        );
        EngineError::Strategy {
            hook: hook.name(),
            timestamp_ms: ts,
            message: err.message,
        }
    }

    fn finish(mut self, outcome: Result<(), EngineError>, started: Instant) -> Result<RunResult, EngineError> {
        let status = match &outcome {
            Ok(()) => RunStatus::Completed,
            Err(err) if err.is_cancelled() => RunStatus::Cancelled,
            Err(_) => RunStatus::Failed,
        };
        let final_equity = self.state.equity();
        self.out.emit(
            self.last_timestamp_ms,
            sources::ENGINE,
            &RunEnded {
                status,
                total_bars: self.state.total_bars,
                fills: self.state.fills.len(),
                final_equity,
            },
        );
        if let Some(probe) = self.probe {
            probe.on_run_end();
        }
        self.out.flush();

        let duration = started.elapsed();
        match outcome {
            Ok(()) => {
                tracing::info!(
                    bars = self.state.total_bars,
                    fills = self.state.fills.len(),
                    rejected = self.state.rejected_orders,
                    final_equity,
                    elapsed_ms = duration.as_millis() as u64,
                    "run completed"
                );
                let state = self.state;
                Ok(RunResult {
                    final_portfolio: state.portfolio,
                    fills: state.fills,
                    equity_curve: state.equity_curve,
                    total_bars: state.total_bars,
                    rejected_orders: state.rejected_orders,
                    last_prices: state.last_prices,
                    duration,
                })
            }
            Err(err) if err.is_cancelled() => {
                tracing::info!(bars = self.state.total_bars, "run cancelled");
                Err(err)
            }
            Err(err) => {
                tracing::error!(error = %err, "run failed");
                Err(err)
            }
        }
    }
}
