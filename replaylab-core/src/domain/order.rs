//! Order types and the order lifecycle states.

use super::ids::OrderId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.write_str("buy"),
            OrderSide::Sell => f.write_str("sell"),
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderType {
    /// Fill at the bar open, adjusted by slippage.
    Market,
    /// Fill at the limit price once the bar range reaches it.
    Limit { limit_price: f64 },
    /// Triggers when price crosses the stop, then fills as market.
    Stop { stop_price: f64 },
    /// Triggers at the stop, then rests as a limit order until reachable.
    StopLimit { stop_price: f64, limit_price: f64 },
}

impl OrderType {
    pub fn name(&self) -> &'static str {
        match self {
            OrderType::Market => "market",
            OrderType::Limit { .. } => "limit",
            OrderType::Stop { .. } => "stop",
            OrderType::StopLimit { .. } => "stop_limit",
        }
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderType::Limit { limit_price } | OrderType::StopLimit { limit_price, .. } => {
                Some(*limit_price)
            }
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<f64> {
        match self {
            OrderType::Stop { stop_price } | OrderType::StopLimit { stop_price, .. } => {
                Some(*stop_price)
            }
            _ => None,
        }
    }
}

/// Order lifecycle states.
///
/// Pending → Triggered → Filled | Rejected | Cancelled. Only stop and
/// stop-limit orders pass through Triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Triggered,
    Filled,
    Rejected { reason: String },
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected { .. } | OrderStatus::Cancelled
        )
    }
}

/// One take-profit level: close `fraction` of the remaining quantity at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitLevel {
    pub price: f64,
    pub fraction: f64,
}

/// A strategy order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub asset: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Protective stop attached to the position this order opens.
    pub stop_loss: Option<f64>,
    /// Ordered take-profit levels attached to the position this order opens.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub take_profits: Vec<TakeProfitLevel>,
    pub status: OrderStatus,
    /// Timestamp of the bar during which the order was submitted.
    pub submitted_at_ms: Option<i64>,
}

impl Order {
    pub fn new(asset: impl Into<String>, side: OrderSide, order_type: OrderType, quantity: f64) -> Self {
        Self {
            id: OrderId::UNASSIGNED,
            asset: asset.into(),
            side,
            order_type,
            quantity,
            stop_loss: None,
            take_profits: Vec::new(),
            status: OrderStatus::Pending,
            submitted_at_ms: None,
        }
    }

    pub fn market(asset: impl Into<String>, side: OrderSide, quantity: f64) -> Self {
        Self::new(asset, side, OrderType::Market, quantity)
    }

    pub fn limit(asset: impl Into<String>, side: OrderSide, quantity: f64, limit_price: f64) -> Self {
        Self::new(asset, side, OrderType::Limit { limit_price }, quantity)
    }

    pub fn stop(asset: impl Into<String>, side: OrderSide, quantity: f64, stop_price: f64) -> Self {
        Self::new(asset, side, OrderType::Stop { stop_price }, quantity)
    }

    pub fn stop_limit(
        asset: impl Into<String>,
        side: OrderSide,
        quantity: f64,
        stop_price: f64,
        limit_price: f64,
    ) -> Self {
        Self::new(
            asset,
            side,
            OrderType::StopLimit {
                stop_price,
                limit_price,
            },
            quantity,
        )
    }

    pub fn with_stop_loss(mut self, price: f64) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: f64, fraction: f64) -> Self {
        self.take_profits.push(TakeProfitLevel { price, fraction });
        self
    }

    /// Still in the queue: Pending or Triggered.
    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Triggered)
    }

    pub fn has_protective_exits(&self) -> bool {
        self.stop_loss.is_some() || !self.take_profits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_starts_unassigned_and_pending() {
        let order = Order::market("SPY", OrderSide::Buy, 10.0);
        assert_eq!(order.id, OrderId::UNASSIGNED);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(order.submitted_at_ms.is_none());
    }

    #[test]
    fn order_is_active() {
        let mut order = Order::stop("SPY", OrderSide::Buy, 100.0, 105.0);
        assert!(order.is_active());

        order.status = OrderStatus::Triggered;
        assert!(order.is_active());

        order.status = OrderStatus::Filled;
        assert!(!order.is_active());

        order.status = OrderStatus::Rejected {
            reason: "Insufficient cash".into(),
        };
        assert!(!order.is_active());
        assert!(order.status.is_terminal());
    }

    #[test]
    fn builders_attach_protective_exits() {
        let order = Order::limit("ES", OrderSide::Buy, 2.0, 4_500.0)
            .with_stop_loss(4_480.0)
            .with_take_profit(4_520.0, 0.5)
            .with_take_profit(4_540.0, 1.0);
        assert!(order.has_protective_exits());
        assert_eq!(order.take_profits.len(), 2);
        assert_eq!(order.order_type.limit_price(), Some(4_500.0));
        assert_eq!(order.order_type.stop_price(), None);
    }

    #[test]
    fn side_helpers() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
    }
}
