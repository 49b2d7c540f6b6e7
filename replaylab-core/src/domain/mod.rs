//! Domain types for ReplayLab

pub mod bar;
pub mod fill;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod subscription;

pub use bar::Bar;
pub use fill::{Fill, FillReason};
pub use ids::OrderId;
pub use instrument::{Instrument, InstrumentError};
pub use order::{Order, OrderSide, OrderStatus, OrderType, TakeProfitLevel};
pub use portfolio::Portfolio;
pub use position::Position;
pub use subscription::{DataSubscription, Timeframe};

/// Asset identifier (e.g. "BTCUSDT", "ES").
pub type Asset = String;
