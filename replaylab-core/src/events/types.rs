//! Event payloads (the envelope `d` field).

use super::mode::EventCategory;
use super::{tags, EngineEvent};
use crate::domain::{DataSubscription, Fill, Order, OrderId, Timeframe};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A fully resolved bar delivered to the strategy.
#[derive(Debug, Clone, Serialize)]
pub struct BarEvent {
    pub subscription_index: usize,
    pub asset: String,
    pub timeframe: Timeframe,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub exportable: bool,
}

impl EngineEvent for BarEvent {
    const TYPE_TAG: &'static str = tags::BAR;
    const CATEGORY: EventCategory = EventCategory::Bar;

    fn is_exportable(&self) -> bool {
        self.exportable
    }
}

/// Direction of a strategy signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    Long,
    Short,
    Flat,
}

/// A strategy decision, published for inspection.
#[derive(Debug, Clone, Serialize)]
pub struct SignalEvent {
    pub asset: String,
    pub subscription_index: usize,
    pub name: String,
    pub direction: SignalDirection,
    pub strength: f64,
}

impl EngineEvent for SignalEvent {
    const TYPE_TAG: &'static str = tags::SIGNAL;
    const CATEGORY: EventCategory = EventCategory::Signal;
}

/// Indicator values computed by the strategy on a bar.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorEvent {
    pub asset: String,
    pub subscription_index: usize,
    pub values: BTreeMap<String, f64>,
    pub exportable: bool,
}

impl EngineEvent for IndicatorEvent {
    const TYPE_TAG: &'static str = tags::INDICATOR;
    const CATEGORY: EventCategory = EventCategory::Indicator;

    fn is_exportable(&self) -> bool {
        self.exportable
    }
}

/// An admission decision made by the risk check.
#[derive(Debug, Clone, Serialize)]
pub struct RiskEvent {
    pub order_id: OrderId,
    pub asset: String,
    pub approved: bool,
    pub reason: String,
    pub required: f64,
    pub available: f64,
}

impl EngineEvent for RiskEvent {
    const TYPE_TAG: &'static str = tags::RISK;
    const CATEGORY: EventCategory = EventCategory::Risk;
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPlaced {
    #[serde(flatten)]
    pub order: Order,
}

impl EngineEvent for OrderPlaced {
    const TYPE_TAG: &'static str = tags::ORDER_PLACE;
    const CATEGORY: EventCategory = EventCategory::Order;
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderFilled {
    #[serde(flatten)]
    pub fill: Fill,
}

impl EngineEvent for OrderFilled {
    const TYPE_TAG: &'static str = tags::ORDER_FILL;
    const CATEGORY: EventCategory = EventCategory::Order;
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub asset: String,
}

impl EngineEvent for OrderCancelled {
    const TYPE_TAG: &'static str = tags::ORDER_CANCEL;
    const CATEGORY: EventCategory = EventCategory::Order;
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRejected {
    pub order_id: OrderId,
    pub asset: String,
    pub reason: String,
}

impl EngineEvent for OrderRejected {
    const TYPE_TAG: &'static str = tags::ORDER_REJECT;
    const CATEGORY: EventCategory = EventCategory::Order;
}

/// Position state after a fill was applied.
#[derive(Debug, Clone, Serialize)]
pub struct PositionUpdate {
    pub asset: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    pub cash: f64,
}

impl EngineEvent for PositionUpdate {
    const TYPE_TAG: &'static str = tags::POSITION;
    const CATEGORY: EventCategory = EventCategory::Position;
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStarted {
    pub subscriptions: Vec<DataSubscription>,
    pub initial_cash: f64,
}

impl EngineEvent for RunStarted {
    const TYPE_TAG: &'static str = tags::RUN_START;
    const CATEGORY: EventCategory = EventCategory::Run;
}

/// How a run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunEnded {
    pub status: RunStatus,
    pub total_bars: usize,
    pub fills: usize,
    pub final_equity: f64,
}

impl EngineEvent for RunEnded {
    const TYPE_TAG: &'static str = tags::RUN_END;
    const CATEGORY: EventCategory = EventCategory::Run;
}

/// A strategy failure. `context` locates it (hook, asset, bar timestamp).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub message: String,
    pub context: String,
}

impl EngineEvent for ErrorEvent {
    const TYPE_TAG: &'static str = tags::ERROR;
    const CATEGORY: EventCategory = EventCategory::Error;
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningEvent {
    pub message: String,
}

impl EngineEvent for WarningEvent {
    const TYPE_TAG: &'static str = tags::WARNING;
    const CATEGORY: EventCategory = EventCategory::Warning;
}
