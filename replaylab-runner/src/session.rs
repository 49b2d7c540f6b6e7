//! Debug sessions: one engine run driven step by step from a client.
//!
//! A session owns the probe, the receiving end of the live event channel,
//! the engine task, and its cancel token. The engine runs on tokio's
//! blocking pool because the probe parks it between steps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use replaylab_core::debug::DebugProbe;
use replaylab_core::domain::Bar;
use replaylab_core::engine::CancelToken;
use replaylab_core::events::{ChannelSink, EventBus, ExportOverride};

use crate::config::RunConfig;
use crate::runner::{run_with_series, RunSummary, RunnerError};

pub type SessionId = u64;

type EngineTask = JoinHandle<Result<RunSummary, RunnerError>>;

pub struct DebugSession {
    id: SessionId,
    created_at: DateTime<Utc>,
    probe: Arc<DebugProbe>,
    export: ExportOverride,
    cancel: CancelToken,
    dropped: Arc<AtomicU64>,
    live: Mutex<Option<mpsc::Receiver<Arc<str>>>>,
    task: Mutex<Option<EngineTask>>,
}

impl DebugSession {
    /// Start the engine for `config` over `series`. The engine parks on the
    /// probe until the first stepping command. Must be called inside a tokio
    /// runtime.
    pub fn start(
        id: SessionId,
        config: RunConfig,
        series: Arc<Vec<Vec<Bar>>>,
        channel_capacity: usize,
    ) -> Result<Self, RunnerError> {
        config.validate()?;

        let probe = Arc::new(DebugProbe::new());
        let cancel = CancelToken::new();
        let (live_sink, live_rx) = ChannelSink::channel(channel_capacity);
        let dropped = live_sink.dropped_counter();
        let bus = EventBus::new(config.export_mode).with_sink(live_sink);
        let export = bus.export_override();

        let task = {
            let probe = Arc::clone(&probe);
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                run_with_series(&config, &series, &cancel, Some(&probe), bus)
            })
        };

        tracing::debug!(session = id, "debug session started");
        Ok(Self {
            id,
            created_at: Utc::now(),
            probe,
            export,
            cancel,
            dropped,
            live: Mutex::new(Some(live_rx)),
            task: Mutex::new(Some(task)),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn probe(&self) -> &Arc<DebugProbe> {
        &self.probe
    }

    /// Take the live event stream. Only the first caller gets it.
    pub fn take_live(&self) -> Option<mpsc::Receiver<Arc<str>>> {
        self.live.lock().take()
    }

    /// Admit or withhold non-exportable bar/indicator events from now on.
    pub fn set_export(&self, mutations: bool) {
        self.export.set(mutations);
        tracing::debug!(session = self.id, mutations, "export override changed");
    }

    pub fn export_enabled(&self) -> bool {
        self.export.is_enabled()
    }

    /// Live events dropped because the client fell behind.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Cancel the run, release the probe, and wait for the engine task.
    ///
    /// Returns the run outcome the first time; `None` afterwards.
    pub async fn shutdown(&self) -> Option<Result<RunSummary, RunnerError>> {
        self.cancel.cancel();
        self.probe.dispose();
        let task = self.task.lock().take()?;
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(session = self.id, error = %err, "engine task panicked");
                return None;
            }
        };
        match &outcome {
            Ok(summary) => tracing::debug!(session = self.id, bars = summary.total_bars, "session finished"),
            Err(err) if err.is_cancelled() => tracing::debug!(session = self.id, "session cancelled"),
            Err(err) => tracing::warn!(session = self.id, error = %err, "session run failed"),
        }
        Some(outcome)
    }
}

/// Live sessions keyed by id.
#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, Arc<DebugSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        config: RunConfig,
        series: Arc<Vec<Vec<Bar>>>,
        channel_capacity: usize,
    ) -> Result<Arc<DebugSession>, RunnerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session = Arc::new(DebugSession::start(id, config, series, channel_capacity)?);
        self.sessions.lock().insert(id, Arc::clone(&session));
        Ok(session)
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<DebugSession>> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: SessionId) -> Option<Arc<DebugSession>> {
        self.sessions.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a session and shut it down.
    pub async fn close(&self, id: SessionId) -> Option<Result<RunSummary, RunnerError>> {
        let session = self.remove(id)?;
        session.shutdown().await
    }

    /// Shut down every session, e.g. on server exit.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        for session in sessions {
            session.shutdown().await;
        }
    }
}
