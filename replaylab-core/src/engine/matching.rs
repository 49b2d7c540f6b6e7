//! Order matching: does a bar fill an order, and at what price?
//!
//! Market and stop fills carry slippage (buys pay up, sells receive less).
//! Limit fills are exact.

use crate::domain::{Bar, Order, OrderSide, OrderStatus, OrderType};

/// Outcome of matching one order against one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchResult {
    /// Nothing happened; the order stays as it was.
    NoMatch,
    /// A stop-limit crossed its stop but the limit was not reachable.
    /// The order rests as Triggered across subsequent bars.
    Triggered,
    /// The order fills at this price.
    Fill { price: f64 },
}

/// Per-instrument pricing inputs.
#[derive(Debug, Clone, Copy)]
pub struct PriceModel {
    pub tick_size: f64,
    pub slippage_ticks: f64,
}

impl PriceModel {
    fn slip(&self, side: OrderSide, price: f64) -> f64 {
        price + side.sign() * self.slippage_ticks * self.tick_size
    }
}

pub fn match_order(order: &Order, bar: &Bar, model: PriceModel) -> MatchResult {
    match order.order_type {
        OrderType::Market => MatchResult::Fill {
            price: model.slip(order.side, bar.open),
        },
        OrderType::Limit { limit_price } => limit_fill(order.side, limit_price, bar),
        OrderType::Stop { stop_price } => match stop_crossing(order.side, stop_price, bar) {
            Some(trigger) => MatchResult::Fill {
                price: model.slip(order.side, trigger),
            },
            None => MatchResult::NoMatch,
        },
        OrderType::StopLimit {
            stop_price,
            limit_price,
        } => {
            let triggered = order.status == OrderStatus::Triggered
                || stop_crossing(order.side, stop_price, bar).is_some();
            if !triggered {
                return MatchResult::NoMatch;
            }
            match limit_fill(order.side, limit_price, bar) {
                MatchResult::NoMatch => MatchResult::Triggered,
                fill => fill,
            }
        }
    }
}

/// Buy limit fills at the limit once the low reaches it; sell limit once the
/// high reaches it.
fn limit_fill(side: OrderSide, limit: f64, bar: &Bar) -> MatchResult {
    let reachable = match side {
        OrderSide::Buy => limit >= bar.low,
        OrderSide::Sell => limit <= bar.high,
    };
    if reachable {
        MatchResult::Fill { price: limit }
    } else {
        MatchResult::NoMatch
    }
}

/// Price at which a stop is crossed, if it is.
///
/// A gap through the stop at the open triggers at the open; otherwise the
/// intrabar extreme reaching the stop triggers at the stop.
fn stop_crossing(side: OrderSide, stop: f64, bar: &Bar) -> Option<f64> {
    match side {
        OrderSide::Buy if bar.open >= stop => Some(bar.open),
        OrderSide::Buy if bar.high >= stop => Some(stop),
        OrderSide::Sell if bar.open <= stop => Some(bar.open),
        OrderSide::Sell if bar.low <= stop => Some(stop),
        _ => None,
    }
}
