//! ReplayLab Core: deterministic bar-replay trading simulation.
//!
//! - Domain types (bars, subscriptions, orders, fills, positions, instruments)
//! - Chronological multi-series scheduler and engine loop
//! - Order matching, cash/margin admission, stop-loss/take-profit tracking
//! - Sequenced, mode-filtered event bus with pluggable sinks
//! - Gating debug probe and its wire protocol

pub mod debug;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod strategy;

pub use error::EngineError;
pub use strategy::{HookResult, Strategy, StrategyError};
