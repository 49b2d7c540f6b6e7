//! Live inspection: break conditions, the gating probe, and the wire protocol.

pub mod command;
pub mod condition;
pub mod probe;
pub mod snapshot;

pub use command::{
    parse_command, parse_command_with_limit, CommandParseError, DebugCommand, ServerMessage,
    MAX_COMMAND_BYTES,
};
pub use condition::{BreakCondition, BreakConditionError, Conjunction, Granularity};
pub use probe::{DebugProbe, ProbeError, ProbeState, StepHandle};
pub use snapshot::DebugSnapshot;
