use crate::domain::ids::OrderId;
use crate::domain::order::OrderSide;
use serde::{Deserialize, Serialize};

/// Why a fill happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FillReason {
    /// The order itself matched against a bar.
    Order,
    /// A protective stop-loss attached to the entry order closed the position.
    StopLoss,
    /// A take-profit level attached to the entry order closed part of the position.
    TakeProfit { level: usize },
}

/// Fill record. Append-only; the authoritative trade history.
///
/// Exit fills produced by protective exits carry the id of the entry order
/// they protect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub asset: String,
    pub timestamp_ms: i64,
    pub price: f64,
    pub quantity: f64,
    pub side: OrderSide,
    pub commission: f64,
    pub reason: FillReason,
}

impl Fill {
    /// Gross traded value before commission.
    pub fn notional(&self, multiplier: f64) -> f64 {
        self.price * self.quantity * multiplier
    }
}
