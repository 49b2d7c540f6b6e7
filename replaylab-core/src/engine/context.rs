use super::order_queue::OrderQueue;
use crate::domain::{Fill, Order, OrderId, Portfolio};
use crate::events::{IndicatorEvent, OrderCancelled, SignalDirection, SignalEvent};
use std::collections::BTreeMap;

/// Events a strategy produced during a hook, published by the engine once the
/// hook returns.
#[derive(Debug, Clone)]
pub(crate) enum HookEmission {
    Signal(SignalEvent),
    Indicator(IndicatorEvent),
    Cancelled(OrderCancelled),
}

/// The strategy's handle on the engine during one hook call.
pub struct OrderContext<'a> {
    pub(crate) queue: &'a mut OrderQueue,
    pub(crate) portfolio: &'a Portfolio,
    pub(crate) bar_fills: &'a [Fill],
    pub(crate) emissions: &'a mut Vec<HookEmission>,
    pub(crate) asset: &'a str,
    pub(crate) subscription_index: usize,
    pub(crate) exportable: bool,
    pub(crate) timestamp_ms: i64,
}

impl OrderContext<'_> {
    /// Queue an order. Returns the id it receives when the hook returns.
    pub fn submit(&mut self, order: Order) -> OrderId {
        self.queue.enqueue(order)
    }

    /// Cancel an active order submitted in an earlier hook phase.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        match self.queue.cancel(id) {
            Some(order) => {
                self.emissions.push(HookEmission::Cancelled(OrderCancelled {
                    order_id: order.id,
                    asset: order.asset.clone(),
                }));
                true
            }
            None => false,
        }
    }

    pub fn pending_orders(&self) -> Vec<&Order> {
        self.queue.pending().collect()
    }

    /// Fills committed so far during the current bar.
    pub fn fills(&self) -> &[Fill] {
        self.bar_fills
    }

    pub fn position(&self, asset: &str) -> f64 {
        self.portfolio.quantity(asset)
    }

    pub fn cash(&self) -> f64 {
        self.portfolio.cash
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn signal(&mut self, name: impl Into<String>, direction: SignalDirection, strength: f64) {
        self.emissions.push(HookEmission::Signal(SignalEvent {
            asset: self.asset.to_string(),
            subscription_index: self.subscription_index,
            name: name.into(),
            direction,
            strength,
        }));
    }

    pub fn indicator<K: Into<String>>(&mut self, values: impl IntoIterator<Item = (K, f64)>) {
        let values: BTreeMap<String, f64> = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self.emissions.push(HookEmission::Indicator(IndicatorEvent {
            asset: self.asset.to_string(),
            subscription_index: self.subscription_index,
            values,
            exportable: self.exportable,
        }));
    }
}
