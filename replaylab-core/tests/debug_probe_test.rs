//! Stepping a live engine thread through the debug probe.

mod support;

use replaylab_core::debug::{DebugCommand, DebugProbe, ProbeError, ProbeState};
use replaylab_core::domain::{Bar, DataSubscription, Order, OrderSide, Timeframe};
use replaylab_core::engine::{self, CancelToken, EngineConfig, RunResult};
use replaylab_core::events::{EventBus, ExportMode, MemorySink, SignalDirection};
use replaylab_core::EngineError;
use std::sync::Arc;
use std::thread::JoinHandle;
use support::*;

type EngineThread = JoinHandle<(Result<RunResult, EngineError>, MemorySink)>;

fn spawn_engine(series: Vec<Vec<Bar>>, mut strategy: Scripted, probe: &Arc<DebugProbe>) -> EngineThread {
    let probe = Arc::clone(probe);
    std::thread::spawn(move || {
        let sink = MemorySink::new();
        let mut bus = EventBus::new(ExportMode::Backtest).with_sink(sink.clone());
        let result = engine::run(
            &series,
            &mut strategy,
            &EngineConfig::default(),
            &CancelToken::new(),
            Some(&probe),
            Some(&mut bus),
        );
        (result, sink)
    })
}

fn step(probe: &DebugProbe, command: DebugCommand) -> replaylab_core::debug::DebugSnapshot {
    probe.send_command(&command).unwrap().blocking_wait().unwrap()
}

/// Buys on the third bar's close, so the fill lands on the fourth bar.
fn buy_on_third_bar() -> Scripted {
    let mut count = 0;
    Scripted::single("SPY").on_complete(move |_, _, ctx| {
        count += 1;
        if count == 3 {
            ctx.signal("entry", SignalDirection::Long, 1.0);
            ctx.submit(Order::market("SPY", OrderSide::Buy, 1.0));
        }
        Ok(())
    })
}

#[test]
fn continue_runs_to_completion() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(5, 100.0)], Scripted::single("SPY"), &probe);

    let handle = probe.send_command(&DebugCommand::Continue).unwrap();
    assert!(handle.is_ready());

    let (result, _) = engine.join().unwrap();
    let result = result.unwrap();
    assert_eq!(result.total_bars, 5);
    assert_eq!(result.equity_curve.len(), 5);
    assert_eq!(probe.state(), ProbeState::Ended);
    assert!(!probe.is_session_active());
}

#[test]
fn next_stops_on_each_exportable_bar() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(5, 100.0)], Scripted::single("SPY"), &probe);

    let first = step(&probe, DebugCommand::Next);
    assert_eq!(first.timestamp_ms, 0);
    assert!(first.is_exportable_subscription);
    assert_eq!(probe.state(), ProbeState::Blocked);

    let second = step(&probe, DebugCommand::Next);
    assert_eq!(second.timestamp_ms, MINUTE);
    assert!(second.sequence_number > first.sequence_number);
    assert_eq!(second.portfolio_equity, 100_000.0);

    probe.send_command(&DebugCommand::Continue).unwrap();
    let (result, _) = engine.join().unwrap();
    assert_eq!(result.unwrap().total_bars, 5);
}

#[test]
fn next_skips_context_feeds_but_next_bar_does_not() {
    let strategy = Scripted::new(vec![
        DataSubscription::context_only("QQQ", Timeframe::M1),
        DataSubscription::new("SPY", Timeframe::M1),
    ]);
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(3, 1.0), flat_bars(3, 2.0)], strategy, &probe);

    let snap = step(&probe, DebugCommand::NextBar);
    assert_eq!((snap.timestamp_ms, snap.subscription_index), (0, 0));
    assert!(!snap.is_exportable_subscription);

    let snap = step(&probe, DebugCommand::Next);
    assert_eq!((snap.timestamp_ms, snap.subscription_index), (0, 1));

    let snap = step(&probe, DebugCommand::Next);
    assert_eq!((snap.timestamp_ms, snap.subscription_index), (MINUTE, 1));

    probe.send_command(&DebugCommand::Continue).unwrap();
    engine.join().unwrap().0.unwrap();
}

#[test]
fn next_trade_stops_on_fill_bar() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(6, 100.0)], buy_on_third_bar(), &probe);

    let snap = step(&probe, DebugCommand::NextTrade);
    assert_eq!(snap.timestamp_ms, 3 * MINUTE);
    assert_eq!(snap.fills_this_bar, 1);

    probe.send_command(&DebugCommand::Continue).unwrap();
    let (result, _) = engine.join().unwrap();
    assert_eq!(result.unwrap().fills.len(), 1);
}

#[test]
fn run_to_timestamp_and_sequence() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(10, 100.0)], Scripted::single("SPY"), &probe);

    let snap = step(
        &probe,
        DebugCommand::RunToTimestamp {
            timestamp_ms: 4 * MINUTE,
        },
    );
    assert_eq!(snap.timestamp_ms, 4 * MINUTE);

    let target = snap.sequence_number + 3;
    let snap = step(
        &probe,
        DebugCommand::RunToSequence {
            sequence_number: target,
        },
    );
    assert!(snap.sequence_number >= target);
    assert!(snap.timestamp_ms > 4 * MINUTE);

    probe.send_command(&DebugCommand::Continue).unwrap();
    engine.join().unwrap().0.unwrap();
}

#[test]
fn event_level_stops_report_the_last_bar_snapshot() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(6, 100.0)], buy_on_third_bar(), &probe);

    step(&probe, DebugCommand::NextBar);
    let second_bar = step(&probe, DebugCommand::NextBar);
    assert_eq!(second_bar.timestamp_ms, MINUTE);

    // The signal comes from the third bar's close; nothing about the
    // snapshot moves until that bar finishes.
    let at_signal = step(&probe, DebugCommand::NextSignal);
    assert_eq!(at_signal, second_bar);

    let third_bar = step(&probe, DebugCommand::NextBar);
    assert_eq!(third_bar.timestamp_ms, 2 * MINUTE);
    let at_fill = step(
        &probe,
        DebugCommand::NextType {
            event_type: "ord.fill".into(),
        },
    );
    assert_eq!(at_fill, third_bar);

    probe.send_command(&DebugCommand::Continue).unwrap();
    let (_, sink) = engine.join().unwrap();

    let signal_sq = events_of(&sink, "sig")[0]["sq"].as_u64().unwrap();
    let fill_sq = events_of(&sink, "ord.fill")[0]["sq"].as_u64().unwrap();
    assert_eq!(
        events_of(&sink, "bar")[1]["sq"].as_u64(),
        Some(second_bar.sequence_number)
    );
    assert!(signal_sq > at_signal.sequence_number);
    assert!(third_bar.sequence_number >= signal_sq);
    assert!(fill_sq > at_fill.sequence_number);
}

#[test]
fn second_command_while_pending_is_refused() {
    let probe = Arc::new(DebugProbe::new());
    let first = probe.send_command(&DebugCommand::Next).unwrap();
    assert!(!first.is_ready());
    assert_eq!(
        probe.send_command(&DebugCommand::NextBar).unwrap_err(),
        ProbeError::CommandPending
    );

    let engine = spawn_engine(vec![flat_bars(3, 1.0)], Scripted::single("SPY"), &probe);
    assert_eq!(first.blocking_wait().unwrap().timestamp_ms, 0);

    probe.send_command(&DebugCommand::Continue).unwrap();
    engine.join().unwrap().0.unwrap();
}

#[test]
fn abandoned_waiter_does_not_block_new_commands() {
    let probe = Arc::new(DebugProbe::new());
    drop(probe.send_command(&DebugCommand::Next).unwrap());
    let handle = probe.send_command(&DebugCommand::NextBar).unwrap();

    let engine = spawn_engine(vec![flat_bars(3, 1.0)], Scripted::single("SPY"), &probe);
    assert_eq!(handle.blocking_wait().unwrap().timestamp_ms, 0);
    probe.send_command(&DebugCommand::Continue).unwrap();
    engine.join().unwrap().0.unwrap();
}

#[test]
fn commands_after_run_end_return_last_snapshot() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(5, 100.0)], Scripted::single("SPY"), &probe);
    probe.send_command(&DebugCommand::Continue).unwrap();
    engine.join().unwrap().0.unwrap();

    let handle = probe.send_command(&DebugCommand::Next).unwrap();
    assert!(handle.is_ready());
    assert_eq!(handle.blocking_wait().unwrap().timestamp_ms, 4 * MINUTE);
}

#[test]
fn unreached_target_resolves_at_run_end() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(4, 100.0)], Scripted::single("SPY"), &probe);

    let snap = step(
        &probe,
        DebugCommand::RunToTimestamp {
            timestamp_ms: 100 * MINUTE,
        },
    );
    assert_eq!(snap.timestamp_ms, 3 * MINUTE);
    engine.join().unwrap().0.unwrap();
    assert_eq!(probe.state(), ProbeState::Ended);
}

#[test]
fn strategy_failure_resolves_the_pending_waiter() {
    let mut count = 0;
    let failing = Scripted::single("SPY").on_complete(move |_, _, _| {
        count += 1;
        if count == 3 {
            return Err(replaylab_core::StrategyError::new("boom"));
        }
        Ok(())
    });
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(6, 100.0)], failing, &probe);

    let first = step(&probe, DebugCommand::NextBar);
    assert_eq!(first.timestamp_ms, 0);

    // No trade ever happens, so only the failed run's end can answer this.
    let pending = probe.send_command(&DebugCommand::NextTrade).unwrap();
    let (result, sink) = engine.join().unwrap();
    let snap = pending.blocking_wait().unwrap();
    assert_eq!(snap.timestamp_ms, MINUTE);

    match result.unwrap_err() {
        EngineError::Strategy { hook, message, .. } => {
            assert_eq!(hook, "on_bar_complete");
            assert_eq!(message, "boom");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(probe.state(), ProbeState::Ended);
    assert!(!probe.is_session_active());
    assert_eq!(events_of(&sink, "err").len(), 1);
    assert_eq!(events_of(&sink, "run.end")[0]["d"]["status"], "failed");
}

#[test]
fn dispose_releases_a_parked_engine() {
    let probe = Arc::new(DebugProbe::new());
    let engine = spawn_engine(vec![flat_bars(5, 100.0)], Scripted::single("SPY"), &probe);

    step(&probe, DebugCommand::NextBar);
    assert_eq!(probe.state(), ProbeState::Blocked);
    probe.dispose();

    let (result, _) = engine.join().unwrap();
    assert_eq!(result.unwrap().total_bars, 5);
    assert_eq!(
        probe.send_command(&DebugCommand::Next).unwrap_err(),
        ProbeError::Disposed
    );
}

#[test]
fn dispose_before_start_never_parks() {
    let probe = Arc::new(DebugProbe::new());
    probe.dispose();
    let engine = spawn_engine(vec![flat_bars(3, 100.0)], Scripted::single("SPY"), &probe);
    assert_eq!(engine.join().unwrap().0.unwrap().total_bars, 3);
}
