//! Engine event stream.
//!
//! Every state transition the engine makes is published as an envelope
//! `{ts, sq, _t, src, d}`. Each payload type declares its `_t` tag and its
//! category as associated constants, so mode filtering is a static lookup per
//! `emit` call rather than a runtime inspection of the payload.

pub mod bus;
pub mod mode;
pub mod sinks;
pub mod types;

pub use bus::{EmittedEvent, EventBus, ExportOverride};
pub use mode::{EventCategory, ExportMode};
pub use sinks::{ChannelSink, EventSink, IndexSink, JsonlFileSink, MemorySink, SinkError};
pub use types::*;

use serde::Serialize;

/// A payload that can travel through the [`EventBus`].
pub trait EngineEvent: Serialize {
    /// The envelope `_t` value.
    const TYPE_TAG: &'static str;
    /// The category used by export-mode allow-lists.
    const CATEGORY: EventCategory;

    /// Whether this event originates from an exportable subscription.
    ///
    /// Only consulted for subscription-filtered categories (bars, indicators).
    fn is_exportable(&self) -> bool {
        true
    }
}

/// Well-known `_t` tags.
pub mod tags {
    pub const BAR: &str = "bar";
    pub const SIGNAL: &str = "sig";
    pub const RISK: &str = "risk";
    pub const INDICATOR: &str = "ind";
    pub const ORDER_PLACE: &str = "ord.place";
    pub const ORDER_FILL: &str = "ord.fill";
    pub const ORDER_CANCEL: &str = "ord.cancel";
    pub const ORDER_REJECT: &str = "ord.reject";
    pub const POSITION: &str = "pos";
    pub const RUN_START: &str = "run.start";
    pub const RUN_END: &str = "run.end";
    pub const ERROR: &str = "err";
    pub const WARNING: &str = "warn";
}

/// Envelope `src` values used by the engine.
pub mod sources {
    pub const ENGINE: &str = "engine";
    pub const STRATEGY: &str = "strategy";
    pub const RISK: &str = "risk";
    pub const EXITS: &str = "exits";
}
