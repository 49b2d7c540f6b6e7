use super::mode::ExportMode;
use super::sinks::{EventSink, SinkError};
use super::EngineEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An envelope that passed filtering and received a sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub sequence: u64,
    pub timestamp_ms: i64,
    pub type_tag: &'static str,
    /// The serialized envelope, shared by every sink.
    pub payload: Arc<str>,
}

#[derive(Serialize)]
struct Envelope<'a, E: Serialize> {
    ts: i64,
    sq: u64,
    #[serde(rename = "_t")]
    type_tag: &'static str,
    src: &'a str,
    d: &'a E,
}

/// Shared switch that admits bar/indicator events from non-exportable
/// subscriptions even in modes that would normally withhold them.
#[derive(Debug, Clone, Default)]
pub struct ExportOverride {
    flag: Arc<AtomicBool>,
}

impl ExportOverride {
    pub fn set(&self, enabled: bool) {
        self.flag.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct SinkSlot {
    sink: Box<dyn EventSink>,
    enabled: bool,
}

/// Sequenced, mode-filtered fan-out of engine events.
///
/// Sequence numbers start at 1 and are only consumed by events that pass
/// filtering, so every sink observes a gap-free sequence.
pub struct EventBus {
    mode: ExportMode,
    next_sequence: u64,
    sinks: Vec<SinkSlot>,
    export_override: ExportOverride,
}

impl EventBus {
    pub fn new(mode: ExportMode) -> Self {
        Self {
            mode,
            next_sequence: 1,
            sinks: Vec::new(),
            export_override: ExportOverride::default(),
        }
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.add_sink(Box::new(sink));
        self
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        tracing::debug!(sink = sink.name(), "event sink attached");
        self.sinks.push(SinkSlot {
            sink,
            enabled: true,
        });
    }

    pub fn mode(&self) -> ExportMode {
        self.mode
    }

    /// Handle to the non-exportable override; clones control this bus.
    pub fn export_override(&self) -> ExportOverride {
        self.export_override.clone()
    }

    /// Sequence number of the last emitted event, 0 before the first.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Whether an event of this type and exportability would be sequenced.
    pub fn admits<E: EngineEvent>(&self, event: &E) -> bool {
        if !self.mode.admits(E::CATEGORY) {
            return false;
        }
        if E::CATEGORY.is_subscription_filtered()
            && !event.is_exportable()
            && self.mode.filters_non_exportable()
            && !self.export_override.is_enabled()
        {
            return false;
        }
        true
    }

    /// Filter, sequence, serialize once, and fan out.
    ///
    /// Returns the assigned sequence number, or `None` if the event was
    /// dropped by filtering.
    pub fn emit<E: EngineEvent>(&mut self, timestamp_ms: i64, source: &str, event: &E) -> Option<u64> {
        if !self.admits(event) {
            return None;
        }

        let sequence = self.next_sequence;
        let envelope = Envelope {
            ts: timestamp_ms,
            sq: sequence,
            type_tag: E::TYPE_TAG,
            src: source,
            d: event,
        };
        let payload: Arc<str> = match serde_json::to_string(&envelope) {
            Ok(json) => Arc::from(json),
            Err(err) => {
                tracing::warn!(type_tag = E::TYPE_TAG, error = %err, "event serialization failed");
                return None;
            }
        };
        self.next_sequence += 1;

        let emitted = EmittedEvent {
            sequence,
            timestamp_ms,
            type_tag: E::TYPE_TAG,
            payload,
        };
        for slot in self.sinks.iter_mut().filter(|s| s.enabled) {
            match slot.sink.accept(&emitted) {
                Ok(()) => {}
                Err(SinkError::Disconnected) => {
                    tracing::debug!(sink = slot.sink.name(), "sink disconnected, disabling");
                    slot.enabled = false;
                }
                Err(err) => {
                    tracing::warn!(sink = slot.sink.name(), error = %err, "sink rejected event");
                }
            }
        }
        Some(sequence)
    }

    /// Flush every sink; failures are logged, never propagated.
    pub fn flush(&mut self) {
        for slot in self.sinks.iter_mut().filter(|s| s.enabled) {
            if let Err(err) = slot.sink.flush() {
                tracing::warn!(sink = slot.sink.name(), error = %err, "sink flush failed");
            }
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.flush();
    }
}
