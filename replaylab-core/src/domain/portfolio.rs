//! Portfolio: cash plus all open positions.

use super::fill::Fill;
use super::order::OrderSide;
use super::position::Position;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate portfolio state.
///
/// Mutated only by [`Portfolio::apply_fill`]. The equity accounting identity
/// must hold at every bar: `equity == cash + sum(position market values)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_cash: f64,
    pub positions: HashMap<String, Position>,
    pub total_commission: f64,
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash,
            initial_cash,
            positions: HashMap::new(),
            total_commission: 0.0,
        }
    }

    /// Apply one fill: move cash by the signed notional minus commission and
    /// update the asset's position.
    pub fn apply_fill(&mut self, fill: &Fill, multiplier: f64) {
        let notional = fill.notional(multiplier);
        match fill.side {
            OrderSide::Buy => self.cash -= notional + fill.commission,
            OrderSide::Sell => self.cash += notional - fill.commission,
        }
        self.total_commission += fill.commission;

        let position = self
            .positions
            .entry(fill.asset.clone())
            .or_insert_with(|| Position::flat(fill.asset.clone(), multiplier));
        position.apply(fill.side.sign() * fill.quantity, fill.price);
    }

    /// Signed quantity held in `asset` (0 when flat or unknown).
    pub fn quantity(&self, asset: &str) -> f64 {
        self.positions.get(asset).map(|p| p.quantity).unwrap_or(0.0)
    }

    /// Total equity = cash + sum of all position market values.
    ///
    /// Positions without a known last price are marked at their average entry.
    pub fn equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .iter()
            .map(|(asset, pos)| {
                let price = prices.get(asset).copied().unwrap_or(pos.avg_entry_price);
                pos.market_value(price)
            })
            .sum();
        self.cash + position_value
    }

    /// Whether an asset has an open position.
    pub fn has_position(&self, asset: &str) -> bool {
        self.positions.get(asset).is_some_and(|p| !p.is_flat())
    }

    /// Get a position by asset (if exists and not flat).
    pub fn get_position(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset).filter(|p| !p.is_flat())
    }
}
