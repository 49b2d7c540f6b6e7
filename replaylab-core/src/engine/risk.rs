//! Cash and margin admission checks, run after the fill price is known and
//! before the fill is committed.

use crate::domain::{Instrument, OrderSide, Portfolio};

pub const INSUFFICIENT_CASH: &str = "Insufficient cash";
pub const INSUFFICIENT_MARGIN: &str = "Insufficient margin";

#[derive(Debug, Clone, PartialEq)]
pub struct RiskCheck {
    pub approved: bool,
    pub reason: &'static str,
    pub required: f64,
    pub available: f64,
}

/// Buys need the full notional plus commission in cash. Sells need margin
/// only for the part that opens or extends a short.
pub fn check_fill(
    side: OrderSide,
    quantity: f64,
    price: f64,
    commission: f64,
    instrument: &Instrument,
    portfolio: &Portfolio,
) -> RiskCheck {
    let available = portfolio.cash;
    match side {
        OrderSide::Buy => {
            let required = price * quantity * instrument.multiplier + commission;
            RiskCheck {
                approved: available >= required,
                reason: if available >= required { "" } else { INSUFFICIENT_CASH },
                required,
                available,
            }
        }
        OrderSide::Sell => {
            let held_long = portfolio.quantity(&instrument.asset).max(0.0);
            let short_quantity = (quantity - held_long).max(0.0);
            let required =
                short_quantity * price * instrument.multiplier * instrument.short_margin_rate;
            RiskCheck {
                approved: available >= required,
                reason: if available >= required { "" } else { INSUFFICIENT_MARGIN },
                required,
                available,
            }
        }
    }
}
