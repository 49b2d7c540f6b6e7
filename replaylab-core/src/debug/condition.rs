//! Break conditions: when the probe should stop the engine.
//!
//! Each condition is evaluated at exactly one granularity. Bar-level
//! conditions see the snapshot taken after a bar; event-level conditions see
//! the type tag of an emitted event.

use super::snapshot::DebugSnapshot;
use crate::events::tags;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Bar,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BreakConditionError {
    #[error("cannot combine a {left:?}-level condition with a {right:?}-level condition")]
    MixedGranularity { left: Granularity, right: Granularity },
}

/// Two conditions of the same granularity, both of which must hold.
///
/// Only constructible through [`BreakCondition::and`].
#[derive(Debug, Clone, PartialEq)]
pub struct Conjunction {
    left: Box<BreakCondition>,
    right: Box<BreakCondition>,
    granularity: Granularity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreakCondition {
    Always,
    Never,
    OnExportableBar,
    OnFillBar,
    /// Break once the bus has assigned at least this sequence number.
    AtSequence(u64),
    /// Break on the first bar at or after this timestamp.
    AtTimestamp(i64),
    OnEventType(String),
    OnSignalEvent,
    And(Conjunction),
}

impl BreakCondition {
    /// Combine two conditions; both must share a granularity.
    pub fn and(left: BreakCondition, right: BreakCondition) -> Result<Self, BreakConditionError> {
        let (l, r) = (left.granularity(), right.granularity());
        if l != r {
            return Err(BreakConditionError::MixedGranularity { left: l, right: r });
        }
        Ok(BreakCondition::And(Conjunction {
            left: Box::new(left),
            right: Box::new(right),
            granularity: l,
        }))
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            BreakCondition::Always
            | BreakCondition::Never
            | BreakCondition::OnExportableBar
            | BreakCondition::OnFillBar
            | BreakCondition::AtSequence(_)
            | BreakCondition::AtTimestamp(_) => Granularity::Bar,
            BreakCondition::OnEventType(_) | BreakCondition::OnSignalEvent => Granularity::Event,
            BreakCondition::And(c) => c.granularity,
        }
    }

    /// Evaluate at a bar boundary. Event-level conditions never match here.
    pub fn matches_bar(&self, snapshot: &DebugSnapshot) -> bool {
        match self {
            BreakCondition::Always => true,
            BreakCondition::Never => false,
            BreakCondition::OnExportableBar => snapshot.is_exportable_subscription,
            BreakCondition::OnFillBar => snapshot.fills_this_bar > 0,
            BreakCondition::AtSequence(n) => snapshot.sequence_number >= *n,
            BreakCondition::AtTimestamp(t) => snapshot.timestamp_ms >= *t,
            BreakCondition::OnEventType(_) | BreakCondition::OnSignalEvent => false,
            BreakCondition::And(c) => {
                c.granularity == Granularity::Bar
                    && c.left.matches_bar(snapshot)
                    && c.right.matches_bar(snapshot)
            }
        }
    }

    /// Evaluate at an event boundary. Bar-level conditions never match here.
    pub fn matches_event(&self, type_tag: &str) -> bool {
        match self {
            BreakCondition::OnEventType(name) => name == type_tag,
            BreakCondition::OnSignalEvent => type_tag == tags::SIGNAL,
            BreakCondition::And(c) => {
                c.granularity == Granularity::Event
                    && c.left.matches_event(type_tag)
                    && c.right.matches_event(type_tag)
            }
            _ => false,
        }
    }
}
