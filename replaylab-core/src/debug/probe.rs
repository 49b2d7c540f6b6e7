//! The gating debug probe.
//!
//! The engine thread calls the `on_*` hooks synchronously and may block in
//! them. A controller thread calls [`DebugProbe::send_command`], which swaps
//! the break condition, registers a single waiter, and opens the gate.
//!
//! Lock order is `inner` then `gate`. The engine never waits on the gate while
//! holding `inner`.

use super::command::DebugCommand;
use super::condition::BreakCondition;
use super::snapshot::DebugSnapshot;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    NotStarted,
    Running,
    Blocked,
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("a stepping command is already pending")]
    CommandPending,

    #[error("probe has been disposed")]
    Disposed,

    #[error("command does not step the engine")]
    NotStepping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Closed,
    /// Permanently open; set at run end and on disposal.
    Released,
}

/// Two-state gate the engine thread parks on.
struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Closed),
            cv: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut state = self.state.lock();
        if *state == GateState::Closed {
            *state = GateState::Open;
            self.cv.notify_all();
        }
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if *state == GateState::Open {
            *state = GateState::Closed;
        }
    }

    fn release(&self) {
        *self.state.lock() = GateState::Released;
        self.cv.notify_all();
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        while *state == GateState::Closed {
            self.cv.wait(&mut state);
        }
    }
}

struct ProbeInner {
    state: ProbeState,
    condition: BreakCondition,
    last: DebugSnapshot,
    waiter: Option<oneshot::Sender<DebugSnapshot>>,
    disposed: bool,
}

impl ProbeInner {
    fn resolve_waiter(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(self.last);
        }
    }
}

/// Resolves with the snapshot at which a stepping command stopped the engine.
#[derive(Debug)]
pub enum StepHandle {
    Ready(DebugSnapshot),
    Pending(oneshot::Receiver<DebugSnapshot>),
}

impl StepHandle {
    pub fn is_ready(&self) -> bool {
        matches!(self, StepHandle::Ready(_))
    }

    pub async fn wait(self) -> Result<DebugSnapshot, ProbeError> {
        match self {
            StepHandle::Ready(snap) => Ok(snap),
            StepHandle::Pending(rx) => rx.await.map_err(|_| ProbeError::Disposed),
        }
    }

    /// Blocking variant for non-async controllers. Must not be called from
    /// inside a tokio runtime.
    pub fn blocking_wait(self) -> Result<DebugSnapshot, ProbeError> {
        match self {
            StepHandle::Ready(snap) => Ok(snap),
            StepHandle::Pending(rx) => rx.blocking_recv().map_err(|_| ProbeError::Disposed),
        }
    }
}

pub struct DebugProbe {
    inner: Mutex<ProbeInner>,
    gate: Gate,
}

impl Default for DebugProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugProbe {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ProbeInner {
                state: ProbeState::NotStarted,
                condition: BreakCondition::Never,
                last: DebugSnapshot::default(),
                waiter: None,
                disposed: false,
            }),
            gate: Gate::new(),
        }
    }

    pub fn state(&self) -> ProbeState {
        self.inner.lock().state
    }

    pub fn last_snapshot(&self) -> DebugSnapshot {
        self.inner.lock().last
    }

    /// True while the run has not ended and the probe is not disposed.
    pub fn is_session_active(&self) -> bool {
        let inner = self.inner.lock();
        !inner.disposed && inner.state != ProbeState::Ended
    }

    // ---- engine side ----

    /// Marks the run started and parks until the first command arrives.
    pub fn on_run_start(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.disposed {
                return;
            }
            inner.state = ProbeState::Running;
        }
        tracing::debug!("probe waiting for first command");
        self.gate.wait();
    }

    pub fn on_bar_processed(&self, snapshot: DebugSnapshot) {
        {
            let mut inner = self.inner.lock();
            inner.last = snapshot;
            if inner.disposed || inner.state == ProbeState::Ended {
                return;
            }
            if !inner.condition.matches_bar(&snapshot) {
                return;
            }
            self.stop_locked(&mut inner);
        }
        self.park();
    }

    /// Event-level break point. The waiter gets the last bar snapshot
    /// unchanged; the matching event's sequence number is only visible in
    /// the event stream.
    pub fn on_event_emitted(&self, type_tag: &str, sequence: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.disposed || inner.state == ProbeState::Ended {
                return;
            }
            if !inner.condition.matches_event(type_tag) {
                return;
            }
            tracing::debug!(event = type_tag, sequence, "probe stopping on event");
            self.stop_locked(&mut inner);
        }
        self.park();
    }

    pub fn on_run_end(&self) {
        let mut inner = self.inner.lock();
        inner.state = ProbeState::Ended;
        inner.resolve_waiter();
        self.gate.release();
    }

    /// Close the gate, then hand the snapshot to the waiter.
    fn stop_locked(&self, inner: &mut ProbeInner) {
        self.gate.close();
        inner.state = ProbeState::Blocked;
        inner.resolve_waiter();
    }

    fn park(&self) {
        self.gate.wait();
        let mut inner = self.inner.lock();
        if inner.state == ProbeState::Blocked {
            inner.state = ProbeState::Running;
        }
    }

    // ---- controller side ----

    pub fn send_command(&self, command: &DebugCommand) -> Result<StepHandle, ProbeError> {
        let condition = command.break_condition().ok_or(ProbeError::NotStepping)?;
        self.step(condition)
    }

    /// Install `condition` and resume the engine.
    ///
    /// `Never` resumes without a waiter and returns the last snapshot.
    pub fn step(&self, condition: BreakCondition) -> Result<StepHandle, ProbeError> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(ProbeError::Disposed);
        }
        if inner.state == ProbeState::Ended {
            return Ok(StepHandle::Ready(inner.last));
        }
        if inner.waiter.as_ref().is_some_and(|w| !w.is_closed()) {
            return Err(ProbeError::CommandPending);
        }

        let resume_freely = condition == BreakCondition::Never;
        inner.condition = condition;
        if resume_freely {
            inner.waiter = None;
            self.gate.open();
            return Ok(StepHandle::Ready(inner.last));
        }

        let (tx, rx) = oneshot::channel();
        inner.waiter = Some(tx);
        self.gate.open();
        Ok(StepHandle::Pending(rx))
    }

    /// Release the engine permanently and resolve any pending waiter.
    pub fn dispose(&self) {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return;
        }
        inner.disposed = true;
        inner.condition = BreakCondition::Never;
        inner.resolve_waiter();
        self.gate.release();
        tracing::debug!("probe disposed");
    }
}

impl Drop for DebugProbe {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_open_close_release() {
        let gate = Gate::new();
        gate.open();
        gate.wait();
        gate.close();
        gate.release();
        gate.close();
        gate.wait();
        assert_eq!(*gate.state.lock(), GateState::Released);
    }

    #[test]
    fn continue_before_start_does_not_block_start() {
        let probe = DebugProbe::new();
        let handle = probe.send_command(&DebugCommand::Continue).unwrap();
        assert!(handle.is_ready());
        probe.on_run_start();
        assert_eq!(probe.state(), ProbeState::Running);
    }

    #[test]
    fn set_export_is_not_a_step() {
        let probe = DebugProbe::new();
        assert_eq!(
            probe
                .send_command(&DebugCommand::SetExport { mutations: true })
                .unwrap_err(),
            ProbeError::NotStepping
        );
    }

    #[test]
    fn disposed_probe_rejects_commands() {
        let probe = DebugProbe::new();
        probe.dispose();
        assert!(!probe.is_session_active());
        assert_eq!(
            probe.send_command(&DebugCommand::Next).unwrap_err(),
            ProbeError::Disposed
        );
    }
}
