//! Simulation engine: chronological scheduling, order matching, risk checks,
//! and protective exits.
//!
//! The entry point is [`run`]. It merges one bar series per subscription,
//! drives the strategy hooks, and publishes every state transition to an
//! optional [`EventBus`](crate::events::EventBus) while consulting an optional
//! [`DebugProbe`](crate::debug::DebugProbe) after each bar.

pub mod cancel;
pub mod context;
pub mod exits;
pub mod loop_runner;
pub mod matching;
pub mod order_queue;
pub mod risk;
pub mod scheduler;
pub mod state;

pub use cancel::CancelToken;
pub use context::OrderContext;
pub use exits::{ActiveProtectiveExit, ExitOrder, ExitTracker};
pub use loop_runner::run;
pub use matching::{match_order, MatchResult, PriceModel};
pub use order_queue::OrderQueue;
pub use risk::{check_fill, RiskCheck, INSUFFICIENT_CASH, INSUFFICIENT_MARGIN};
pub use scheduler::{BarGroup, Scheduler};
pub use state::{EngineConfig, EngineState, EquityPoint, RunResult};
