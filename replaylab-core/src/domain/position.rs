use serde::{Deserialize, Serialize};

/// Net position in one asset. Positive quantity is long, negative is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub asset: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    /// Contract multiplier of the instrument, fixed when the position opens.
    pub multiplier: f64,
    pub realized_pnl: f64,
}

/// Quantities below this are treated as flat.
pub const FLAT_EPSILON: f64 = 1e-9;

impl Position {
    pub fn flat(asset: impl Into<String>, multiplier: f64) -> Self {
        Self {
            asset: asset.into(),
            quantity: 0.0,
            avg_entry_price: 0.0,
            multiplier,
            realized_pnl: 0.0,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > FLAT_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.quantity < -FLAT_EPSILON
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.abs() <= FLAT_EPSILON
    }

    pub fn market_value(&self, current_price: f64) -> f64 {
        self.quantity * current_price * self.multiplier
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        self.quantity * (current_price - self.avg_entry_price) * self.multiplier
    }

    /// Apply a signed quantity change at `price`.
    ///
    /// Adding in the same direction re-weights the average entry. Reducing keeps
    /// the average and realizes PnL on the closed part. Crossing through zero
    /// realizes the closed part and opens the remainder at `price`.
    pub fn apply(&mut self, signed_qty: f64, price: f64) {
        let same_direction = self.is_flat() || self.quantity.signum() == signed_qty.signum();
        if same_direction {
            let total = self.quantity + signed_qty;
            self.avg_entry_price = if total.abs() > FLAT_EPSILON {
                (self.avg_entry_price * self.quantity + price * signed_qty) / total
            } else {
                0.0
            };
            self.quantity = total;
            return;
        }

        let closing = signed_qty.abs().min(self.quantity.abs());
        self.realized_pnl +=
            closing * (price - self.avg_entry_price) * self.quantity.signum() * self.multiplier;
        let remaining = self.quantity + signed_qty;
        if remaining.abs() <= FLAT_EPSILON {
            self.quantity = 0.0;
            self.avg_entry_price = 0.0;
        } else if remaining.signum() != self.quantity.signum() {
            self.quantity = remaining;
            self.avg_entry_price = price;
        } else {
            self.quantity = remaining;
        }
    }
}
