//! Destinations the bus fans envelopes out to.
//!
//! Durable sinks (file, index, memory) never drop. The live [`ChannelSink`]
//! never blocks the engine: when its channel is full the newest event is
//! dropped and counted.

use super::bus::EmittedEvent;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The consumer went away; the bus stops delivering to this sink.
    #[error("sink consumer disconnected")]
    Disconnected,
}

/// A destination for emitted envelopes.
pub trait EventSink: Send {
    fn name(&self) -> &str;

    /// Accept one envelope. The payload is shared, never re-serialized.
    fn accept(&mut self, event: &EmittedEvent) -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Appends one JSON envelope per line to a file.
pub struct JsonlFileSink {
    name: String,
    writer: BufWriter<File>,
}

impl JsonlFileSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            name: format!("jsonl:{}", path.display()),
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for JsonlFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn accept(&mut self, event: &EmittedEvent) -> Result<(), SinkError> {
        self.writer.write_all(event.payload.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct IndexState {
    by_type: BTreeMap<&'static str, Vec<u64>>,
    first_timestamp_ms: Option<i64>,
    last_timestamp_ms: Option<i64>,
}

/// Builds a per-type sequence index while the stream is produced.
///
/// Clones share the same index, so the caller keeps one handle and gives the
/// other to the bus.
#[derive(Debug, Clone, Default)]
pub struct IndexSink {
    state: Arc<Mutex<IndexState>>,
}

impl IndexSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence numbers of every event with this `_t` tag, ascending.
    pub fn sequences(&self, type_tag: &str) -> Vec<u64> {
        self.state
            .lock()
            .by_type
            .get(type_tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Event count per `_t` tag.
    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.state
            .lock()
            .by_type
            .iter()
            .map(|(tag, seqs)| (tag.to_string(), seqs.len()))
            .collect()
    }

    /// (first, last) envelope timestamps seen.
    pub fn time_range(&self) -> Option<(i64, i64)> {
        let state = self.state.lock();
        state.first_timestamp_ms.zip(state.last_timestamp_ms)
    }
}

impl EventSink for IndexSink {
    fn name(&self) -> &str {
        "index"
    }

    fn accept(&mut self, event: &EmittedEvent) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state
            .by_type
            .entry(event.type_tag)
            .or_default()
            .push(event.sequence);
        state.first_timestamp_ms.get_or_insert(event.timestamp_ms);
        state.last_timestamp_ms = Some(event.timestamp_ms);
        Ok(())
    }
}

/// Collects every envelope in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EmittedEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EmittedEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Envelopes parsed back into JSON values, for assertions.
    pub fn json(&self) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| serde_json::from_str(&e.payload).ok())
            .collect()
    }
}

impl EventSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn accept(&mut self, event: &EmittedEvent) -> Result<(), SinkError> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Live transport: forwards payloads into a bounded channel without blocking.
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<str>>,
    dropped: Arc<AtomicU64>,
}

impl ChannelSink {
    /// Create the sink and the receiving half for the transport.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Shared counter of events dropped because the channel was full.
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

impl EventSink for ChannelSink {
    fn name(&self) -> &str {
        "live"
    }

    fn accept(&mut self, event: &EmittedEvent) -> Result<(), SinkError> {
        match self.tx.try_send(Arc::clone(&event.payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::debug!(dropped, "live channel full, dropping newest events");
                }
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(sequence: u64, type_tag: &'static str) -> EmittedEvent {
        EmittedEvent {
            sequence,
            timestamp_ms: 1_000 * sequence as i64,
            type_tag,
            payload: Arc::from(format!(r#"{{"sq":{sequence}}}"#)),
        }
    }

    #[test]
    fn index_groups_sequences_by_type() {
        let index = IndexSink::new();
        let mut sink = index.clone();
        sink.accept(&event(1, "bar")).unwrap();
        sink.accept(&event(2, "ord.fill")).unwrap();
        sink.accept(&event(3, "bar")).unwrap();

        assert_eq!(index.sequences("bar"), vec![1, 3]);
        assert_eq!(index.sequences("ord.fill"), vec![2]);
        assert_eq!(index.counts()["bar"], 2);
        assert_eq!(index.time_range(), Some((1_000, 3_000)));
    }

    #[test]
    fn channel_sink_drops_newest_when_full() {
        let (mut sink, mut rx) = ChannelSink::channel(1);
        let dropped = sink.dropped_counter();
        sink.accept(&event(1, "bar")).unwrap();
        sink.accept(&event(2, "bar")).unwrap();

        assert_eq!(dropped.load(Ordering::Relaxed), 1);
        assert_eq!(&*rx.try_recv().unwrap(), r#"{"sq":1}"#);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_reports_disconnect() {
        let (mut sink, rx) = ChannelSink::channel(4);
        drop(rx);
        assert!(matches!(
            sink.accept(&event(1, "bar")),
            Err(SinkError::Disconnected)
        ));
    }

    #[test]
    fn jsonl_sink_writes_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events").join("run.jsonl");
        let mut sink = JsonlFileSink::create(&path).unwrap();
        sink.accept(&event(1, "bar")).unwrap();
        sink.accept(&event(2, "bar")).unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec![r#"{"sq":1}"#, r#"{"sq":2}"#]);
    }
}
