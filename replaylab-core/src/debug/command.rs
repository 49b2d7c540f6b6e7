//! Debug wire protocol: client commands and server messages.

use super::condition::BreakCondition;
use super::snapshot::DebugSnapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Client messages larger than this are rejected without parsing.
pub const MAX_COMMAND_BYTES: usize = 4096;

/// A command sent by a debug client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DebugCommand {
    Continue,
    Next,
    NextBar,
    NextTrade,
    Pause,
    RunToSequence {
        #[serde(rename = "sequenceNumber")]
        sequence_number: u64,
    },
    RunToTimestamp {
        #[serde(rename = "timestampMs")]
        timestamp_ms: i64,
    },
    NextSignal,
    NextType {
        #[serde(rename = "eventType")]
        event_type: String,
    },
    /// Configuration only: toggles admission of non-exportable bar and
    /// indicator events. Never steps the engine.
    SetExport { mutations: bool },
}

const KNOWN_COMMANDS: &[&str] = &[
    "continue",
    "next",
    "next_bar",
    "next_trade",
    "pause",
    "run_to_sequence",
    "run_to_timestamp",
    "next_signal",
    "next_type",
    "set_export",
];

impl DebugCommand {
    /// The break condition a stepping command installs. `None` for
    /// configuration commands.
    pub fn break_condition(&self) -> Option<BreakCondition> {
        Some(match self {
            DebugCommand::Continue => BreakCondition::Never,
            DebugCommand::Next => BreakCondition::OnExportableBar,
            DebugCommand::NextBar | DebugCommand::Pause => BreakCondition::Always,
            DebugCommand::NextTrade => BreakCondition::OnFillBar,
            DebugCommand::RunToSequence { sequence_number } => {
                BreakCondition::AtSequence(*sequence_number)
            }
            DebugCommand::RunToTimestamp { timestamp_ms } => BreakCondition::AtTimestamp(*timestamp_ms),
            DebugCommand::NextSignal => BreakCondition::OnSignalEvent,
            DebugCommand::NextType { event_type } => BreakCondition::OnEventType(event_type.clone()),
            DebugCommand::SetExport { .. } => return None,
        })
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandParseError {
    #[error("command too large: {len} bytes exceeds the {max}-byte limit")]
    TooLarge { len: usize, max: usize },

    #[error("malformed command: {0}")]
    Malformed(String),

    #[error("missing \"command\" field")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Parse one client text frame.
pub fn parse_command(text: &str) -> Result<DebugCommand, CommandParseError> {
    parse_command_with_limit(text, MAX_COMMAND_BYTES)
}

/// Parse one client text frame, rejecting frames over `max_bytes` unread.
pub fn parse_command_with_limit(text: &str, max_bytes: usize) -> Result<DebugCommand, CommandParseError> {
    if text.len() > max_bytes {
        return Err(CommandParseError::TooLarge {
            len: text.len(),
            max: max_bytes,
        });
    }
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| CommandParseError::Malformed(e.to_string()))?;
    let name = match value.get("command") {
        Some(serde_json::Value::String(name)) => name.clone(),
        Some(_) => return Err(CommandParseError::Malformed("\"command\" must be a string".into())),
        None => return Err(CommandParseError::MissingCommand),
    };
    if !KNOWN_COMMANDS.contains(&name.as_str()) {
        return Err(CommandParseError::UnknownCommand(name));
    }
    serde_json::from_value(value).map_err(|e| CommandParseError::Malformed(e.to_string()))
}

/// A control message sent to a debug client. Envelope events travel as raw
/// JSON alongside these.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Snapshot {
        session_active: bool,
        sequence_number: u64,
        timestamp_ms: i64,
        subscription_index: usize,
        is_exportable_subscription: bool,
        fills_this_bar: usize,
        portfolio_equity: f64,
    },
    Error {
        message: String,
    },
    Export {
        mutations: bool,
    },
}

impl ServerMessage {
    pub fn snapshot(session_active: bool, snap: &DebugSnapshot) -> Self {
        ServerMessage::Snapshot {
            session_active,
            sequence_number: snap.sequence_number,
            timestamp_ms: snap.timestamp_ms,
            subscription_index: snap.subscription_index,
            is_exportable_subscription: snap.is_exportable_subscription,
            fills_this_bar: snap.fills_this_bar,
            portfolio_equity: snap.portfolio_equity,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","message":"serialization failed: {e}"}}"#))
    }
}
