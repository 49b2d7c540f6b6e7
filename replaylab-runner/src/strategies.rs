//! Built-in strategies selectable from a run config.
//!
//! Both trade the first subscription only. Further subscriptions are
//! context feeds: their bars are delivered but not acted on.

use crate::config::{RunConfig, StrategyConfig, TakeProfitTarget};
use replaylab_core::domain::{Bar, DataSubscription, Order, OrderSide};
use replaylab_core::engine::OrderContext;
use replaylab_core::events::SignalDirection;
use replaylab_core::{HookResult, Strategy};
use std::collections::VecDeque;

/// Build the strategy a config selects, bound to the config's subscriptions.
pub fn build_strategy(config: &RunConfig) -> Box<dyn Strategy> {
    let subscriptions = config.subscriptions();
    match &config.strategy {
        StrategyConfig::BuyAndHold { quantity } => Box::new(BuyAndHold::new(subscriptions, *quantity)),
        StrategyConfig::SmaCrossover {
            fast,
            slow,
            quantity,
            stop_loss_pct,
            take_profits,
        } => Box::new(
            SmaCrossover::new(subscriptions, *fast, *slow, *quantity)
                .with_stop_loss(*stop_loss_pct)
                .with_take_profits(take_profits.clone()),
        ),
    }
}

/// Buys a fixed quantity at the close of the first traded bar and holds.
pub struct BuyAndHold {
    subscriptions: Vec<DataSubscription>,
    quantity: f64,
    entered: bool,
}

impl BuyAndHold {
    pub fn new(subscriptions: Vec<DataSubscription>, quantity: f64) -> Self {
        Self {
            subscriptions,
            quantity,
            entered: false,
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn subscriptions(&self) -> &[DataSubscription] {
        &self.subscriptions
    }

    fn on_bar_complete(
        &mut self,
        _bar: &Bar,
        subscription: &DataSubscription,
        ctx: &mut OrderContext<'_>,
    ) -> HookResult {
        if self.entered || Some(subscription) != self.subscriptions.first() {
            return Ok(());
        }
        self.entered = true;
        ctx.signal("entry", SignalDirection::Long, 1.0);
        ctx.submit(Order::market(subscription.asset.clone(), OrderSide::Buy, self.quantity));
        Ok(())
    }
}

/// Simple moving average over the last `period` closes.
#[derive(Debug, Clone)]
struct RollingMean {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
}

impl RollingMean {
    fn new(period: usize) -> Self {
        Self {
            period,
            window: VecDeque::with_capacity(period + 1),
            sum: 0.0,
        }
    }

    fn push(&mut self, value: f64) -> Option<f64> {
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }
        (self.window.len() == self.period).then(|| self.sum / self.period as f64)
    }
}

/// Long on a fast-over-slow SMA cross, flat on the reverse cross.
///
/// Entries carry an optional protective stop and take-profit ladder priced
/// off the signal bar's close. Publishes both averages as indicator events
/// once the slow window is full.
pub struct SmaCrossover {
    subscriptions: Vec<DataSubscription>,
    quantity: f64,
    stop_loss_pct: Option<f64>,
    take_profits: Vec<TakeProfitTarget>,
    fast: RollingMean,
    slow: RollingMean,
    /// Sign of `fast - slow` on the previous ready bar.
    prev_spread: Option<f64>,
}

impl SmaCrossover {
    pub fn new(subscriptions: Vec<DataSubscription>, fast: usize, slow: usize, quantity: f64) -> Self {
        Self {
            subscriptions,
            quantity,
            stop_loss_pct: None,
            take_profits: Vec::new(),
            fast: RollingMean::new(fast),
            slow: RollingMean::new(slow),
            prev_spread: None,
        }
    }

    pub fn with_stop_loss(mut self, pct: Option<f64>) -> Self {
        self.stop_loss_pct = pct;
        self
    }

    pub fn with_take_profits(mut self, targets: Vec<TakeProfitTarget>) -> Self {
        self.take_profits = targets;
        self
    }

    fn entry_order(&self, asset: &str, close: f64) -> Order {
        let mut order = Order::market(asset, OrderSide::Buy, self.quantity);
        if let Some(pct) = self.stop_loss_pct {
            order = order.with_stop_loss(close * (1.0 - pct));
        }
        for tp in &self.take_profits {
            order = order.with_take_profit(close * (1.0 + tp.pct), tp.fraction);
        }
        order
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn subscriptions(&self) -> &[DataSubscription] {
        &self.subscriptions
    }

    fn on_bar_complete(
        &mut self,
        bar: &Bar,
        subscription: &DataSubscription,
        ctx: &mut OrderContext<'_>,
    ) -> HookResult {
        if Some(subscription) != self.subscriptions.first() {
            return Ok(());
        }
        let fast = self.fast.push(bar.close);
        let slow = self.slow.push(bar.close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Ok(());
        };
        ctx.indicator([("sma_fast", fast), ("sma_slow", slow)]);

        let spread = fast - slow;
        let prev = self.prev_spread.replace(spread);
        let Some(prev) = prev else {
            return Ok(());
        };

        let asset = subscription.asset.as_str();
        let held = ctx.position(asset);
        let has_pending = ctx.pending_orders().iter().any(|o| o.asset == asset);
        if prev <= 0.0 && spread > 0.0 && held <= 0.0 && !has_pending {
            ctx.signal("sma_cross", SignalDirection::Long, spread / slow);
            ctx.submit(self.entry_order(asset, bar.close));
        } else if prev >= 0.0 && spread < 0.0 && held > 0.0 {
            ctx.signal("sma_cross", SignalDirection::Flat, spread / slow);
            ctx.submit(Order::market(asset, OrderSide::Sell, held));
        }
        Ok(())
    }
}
