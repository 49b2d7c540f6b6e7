//! The strategy interface the engine drives.

use crate::domain::{Bar, DataSubscription, Fill, Order};
use crate::engine::OrderContext;
use thiserror::Error;

/// A failure raised from inside a strategy hook. Aborts the run.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct StrategyError {
    pub message: String,
}

impl StrategyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type HookResult = Result<(), StrategyError>;

/// A trading strategy.
///
/// `subscriptions()` fixes the number and order of bar series the engine
/// expects. Bars sharing a timestamp are delivered in that order.
pub trait Strategy: Send {
    fn name(&self) -> &str;

    fn subscriptions(&self) -> &[DataSubscription];

    fn on_init(&mut self) -> HookResult {
        Ok(())
    }

    /// Called with an open-only view of the bar (OHLC = open, volume 0).
    /// Orders submitted here are matched against the same bar.
    fn on_bar_start(
        &mut self,
        _bar: &Bar,
        _subscription: &DataSubscription,
        _ctx: &mut OrderContext<'_>,
    ) -> HookResult {
        Ok(())
    }

    /// Called with the resolved bar. Orders submitted here fill from the next
    /// bar of the asset onward.
    fn on_bar_complete(
        &mut self,
        bar: &Bar,
        subscription: &DataSubscription,
        ctx: &mut OrderContext<'_>,
    ) -> HookResult;

    /// Called after each committed fill, including protective exits (whose
    /// `order` is the entry order they protect).
    fn on_trade(&mut self, _fill: &Fill, _order: &Order) -> HookResult {
        Ok(())
    }
}
