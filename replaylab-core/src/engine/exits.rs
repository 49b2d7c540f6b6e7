//! Protective exits: stop-loss and take-profit levels attached to filled
//! entry orders.

use crate::domain::position::FLAT_EPSILON;
use crate::domain::{Bar, FillReason, Order, OrderSide};

/// Tracks one filled entry until its protective exits are done.
#[derive(Debug, Clone)]
pub struct ActiveProtectiveExit {
    pub entry: Order,
    /// Quantity of the entry still protected.
    pub remaining: f64,
    /// Index of the next unconsumed take-profit level.
    pub next_level: usize,
    /// Timestamp of the bar the entry filled on; that bar is never evaluated.
    pub armed_at_ms: i64,
}

/// An exit the tracker decided on. Committed by the engine without a risk check.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitOrder {
    /// The entry order being protected; its id is carried on the exit fill.
    pub entry: Order,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
    pub reason: FillReason,
}

impl ActiveProtectiveExit {
    fn stop_reachable(&self, bar: &Bar) -> Option<f64> {
        let stop = self.entry.stop_loss?;
        let reached = match self.entry.side {
            OrderSide::Buy => bar.low <= stop,
            OrderSide::Sell => bar.high >= stop,
        };
        reached.then_some(stop)
    }

    fn first_reachable_level(&self, bar: &Bar) -> Option<usize> {
        let levels = self.entry.take_profits.get(self.next_level..)?;
        levels
            .iter()
            .position(|tp| match self.entry.side {
                OrderSide::Buy => bar.high >= tp.price,
                OrderSide::Sell => bar.low <= tp.price,
            })
            .map(|offset| self.next_level + offset)
    }

    fn is_done(&self) -> bool {
        self.remaining <= FLAT_EPSILON
            || (!self.entry.take_profits.is_empty()
                && self.next_level >= self.entry.take_profits.len())
    }
}

#[derive(Debug, Default)]
pub struct ExitTracker {
    active: Vec<ActiveProtectiveExit>,
}

impl ExitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tracker for a filled entry that carries protective exits.
    pub fn register(&mut self, entry: &Order, filled_quantity: f64, timestamp_ms: i64) {
        if !entry.has_protective_exits() {
            return;
        }
        tracing::debug!(order_id = %entry.id, asset = %entry.asset, "protective exit armed");
        self.active.push(ActiveProtectiveExit {
            entry: entry.clone(),
            remaining: filled_quantity,
            next_level: 0,
            armed_at_ms: timestamp_ms,
        });
    }

    /// Account for a regular order fill on `asset` that trades against
    /// protected entries. The closed quantity comes off the oldest opposite
    /// side trackers first; trackers left with nothing are dropped, so a later
    /// re-entry is not covered by levels that belonged to the closed one.
    pub fn release(&mut self, asset: &str, side: OrderSide, mut quantity: f64) {
        for tracker in self
            .active
            .iter_mut()
            .filter(|t| t.entry.asset == asset && t.entry.side != side)
        {
            if quantity <= FLAT_EPSILON {
                break;
            }
            let closed = tracker.remaining.min(quantity);
            tracker.remaining -= closed;
            quantity -= closed;
        }
        self.active.retain(|t| !t.is_done());
    }

    pub fn active(&self) -> &[ActiveProtectiveExit] {
        &self.active
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Evaluate every tracker for `asset` against `bar`.
    ///
    /// `position` is the signed quantity currently held; exits never close
    /// more than the position in the entry's direction. A stop-loss that is
    /// reachable together with a take-profit wins and closes everything left.
    /// At most one take-profit level is consumed per tracker per bar.
    pub fn evaluate(&mut self, asset: &str, bar: &Bar, mut position: f64) -> Vec<ExitOrder> {
        let mut exits = Vec::new();
        for tracker in self
            .active
            .iter_mut()
            .filter(|t| t.entry.asset == asset && t.armed_at_ms < bar.timestamp_ms)
        {
            let held = (position * tracker.entry.side.sign()).max(0.0);
            tracker.remaining = tracker.remaining.min(held);
            if tracker.remaining <= FLAT_EPSILON {
                tracker.remaining = 0.0;
                continue;
            }

            let (quantity, price, reason) = if let Some(stop) = tracker.stop_reachable(bar) {
                (tracker.remaining, stop, FillReason::StopLoss)
            } else if let Some(level) = tracker.first_reachable_level(bar) {
                let tp = tracker.entry.take_profits[level];
                tracker.next_level = level + 1;
                (
                    tracker.remaining * tp.fraction.clamp(0.0, 1.0),
                    tp.price,
                    FillReason::TakeProfit { level },
                )
            } else {
                continue;
            };

            if quantity > FLAT_EPSILON {
                tracker.remaining -= quantity;
                position -= tracker.entry.side.sign() * quantity;
                exits.push(ExitOrder {
                    entry: tracker.entry.clone(),
                    side: tracker.entry.side.opposite(),
                    quantity,
                    price,
                    reason,
                });
            }
        }
        self.active.retain(|t| !t.is_done());
        exits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderId;

    fn long_entry() -> Order {
        let mut order = Order::market("X", OrderSide::Buy, 10.0)
            .with_stop_loss(95.0)
            .with_take_profit(105.0, 0.5)
            .with_take_profit(110.0, 1.0);
        order.id = OrderId(7);
        order
    }

    #[test]
    fn stop_loss_wins_when_both_reachable() {
        let mut tracker = ExitTracker::new();
        tracker.register(&long_entry(), 10.0, 0);
        let wide = Bar::new(60, 100.0, 106.0, 94.0, 100.0, 0.0);

        let exits = tracker.evaluate("X", &wide, 10.0);
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].reason, FillReason::StopLoss);
        assert_eq!(exits[0].price, 95.0);
        assert_eq!(exits[0].quantity, 10.0);
        assert_eq!(exits[0].side, OrderSide::Sell);
        assert_eq!(exits[0].entry.id, OrderId(7));
        assert!(tracker.is_empty());
    }

    #[test]
    fn take_profits_close_fractions_of_remaining() {
        let mut tracker = ExitTracker::new();
        tracker.register(&long_entry(), 10.0, 0);

        let first = tracker.evaluate("X", &Bar::new(60, 100.0, 106.0, 99.0, 104.0, 0.0), 10.0);
        assert_eq!(first[0].reason, FillReason::TakeProfit { level: 0 });
        assert_eq!(first[0].quantity, 5.0);
        assert_eq!(tracker.active()[0].remaining, 5.0);

        let second = tracker.evaluate("X", &Bar::new(120, 104.0, 111.0, 103.0, 110.0, 0.0), 5.0);
        assert_eq!(second[0].reason, FillReason::TakeProfit { level: 1 });
        assert_eq!(second[0].quantity, 5.0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn entry_bar_is_not_evaluated() {
        let mut tracker = ExitTracker::new();
        tracker.register(&long_entry(), 10.0, 60);
        let exits = tracker.evaluate("X", &Bar::new(60, 100.0, 120.0, 80.0, 100.0, 0.0), 10.0);
        assert!(exits.is_empty());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn closed_position_retires_tracker() {
        let mut tracker = ExitTracker::new();
        tracker.register(&long_entry(), 10.0, 0);
        let exits = tracker.evaluate("X", &Bar::new(60, 100.0, 120.0, 80.0, 100.0, 0.0), 0.0);
        assert!(exits.is_empty());
        assert!(tracker.is_empty());
    }

    #[test]
    fn short_entry_exits_by_buying() {
        let mut entry = Order::market("X", OrderSide::Sell, 4.0).with_stop_loss(105.0);
        entry.id = OrderId(2);
        let mut tracker = ExitTracker::new();
        tracker.register(&entry, 4.0, 0);
        let exits = tracker.evaluate("X", &Bar::new(60, 100.0, 106.0, 99.0, 100.0, 0.0), -4.0);
        assert_eq!(exits[0].side, OrderSide::Buy);
        assert_eq!(exits[0].price, 105.0);
        assert!(tracker.is_empty());
    }

    #[test]
    fn closing_fill_releases_oldest_trackers_first() {
        let mut tracker = ExitTracker::new();
        tracker.register(&long_entry(), 10.0, 0);
        let mut second = long_entry();
        second.id = OrderId(8);
        tracker.register(&second, 4.0, 60);

        // Same-side fills and other assets leave trackers alone.
        tracker.release("X", OrderSide::Buy, 5.0);
        tracker.release("Y", OrderSide::Sell, 5.0);
        assert_eq!(tracker.active()[0].remaining, 10.0);

        tracker.release("X", OrderSide::Sell, 12.0);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.active()[0].entry.id, OrderId(8));
        assert_eq!(tracker.active()[0].remaining, 2.0);
    }

    #[test]
    fn released_tracker_does_not_cover_reentry() {
        let mut tracker = ExitTracker::new();
        tracker.register(&long_entry(), 10.0, 0);
        tracker.release("X", OrderSide::Sell, 10.0);
        assert!(tracker.is_empty());

        // A fresh unprotected long of the same size sees no stop.
        let low = Bar::new(120, 100.0, 100.0, 80.0, 90.0, 0.0);
        assert!(tracker.evaluate("X", &low, 10.0).is_empty());
    }
}
