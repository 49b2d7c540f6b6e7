//! Criterion benchmarks for ReplayLab hot paths.
//!
//! Benchmarks:
//! 1. Engine loop (single and multi-series replay, with and without a bus)
//! 2. Scheduler merge
//! 3. Order matching
//! 4. Event bus emit (serialize once, fan out)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use replaylab_core::domain::{Bar, DataSubscription, Order, OrderSide, Timeframe};
use replaylab_core::engine::{
    match_order, run, CancelToken, EngineConfig, OrderContext, PriceModel, Scheduler,
};
use replaylab_core::events::{BarEvent, EventBus, ExportMode, IndexSink, MemorySink};
use replaylab_core::{HookResult, Strategy};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize, step_ms: i64) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar::new(i as i64 * step_ms, open, close + 1.5, close - 1.5, close, 1_000.0)
        })
        .collect()
}

/// Flips between long and flat every `period` bars, with a protective stop.
struct Flipper {
    subscriptions: Vec<DataSubscription>,
    period: usize,
    count: usize,
}

impl Flipper {
    fn new(subscriptions: Vec<DataSubscription>) -> Self {
        Self {
            subscriptions,
            period: 20,
            count: 0,
        }
    }
}

impl Strategy for Flipper {
    fn name(&self) -> &str {
        "flipper"
    }

    fn subscriptions(&self) -> &[DataSubscription] {
        &self.subscriptions
    }

    fn on_bar_complete(
        &mut self,
        bar: &Bar,
        sub: &DataSubscription,
        ctx: &mut OrderContext<'_>,
    ) -> HookResult {
        if !sub.exportable {
            return Ok(());
        }
        self.count += 1;
        if self.count % self.period == 0 {
            let held = ctx.position(&sub.asset);
            if held > 0.0 {
                ctx.submit(Order::market(sub.asset.clone(), OrderSide::Sell, held));
            } else {
                ctx.submit(
                    Order::market(sub.asset.clone(), OrderSide::Buy, 10.0)
                        .with_stop_loss(bar.close * 0.95),
                );
            }
        }
        Ok(())
    }
}

// ── 1. Engine loop ───────────────────────────────────────────────────

fn bench_engine_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_loop");
    for &n in &[1_000usize, 10_000] {
        let series = vec![make_bars(n, 60_000)];
        group.bench_with_input(BenchmarkId::new("single_series", n), &n, |b, _| {
            b.iter(|| {
                let mut strategy = Flipper::new(vec![DataSubscription::new("BENCH", Timeframe::M1)]);
                run(
                    black_box(&series),
                    &mut strategy,
                    &EngineConfig::default(),
                    &CancelToken::new(),
                    None,
                    None,
                )
            })
        });

        group.bench_with_input(BenchmarkId::new("single_series_with_bus", n), &n, |b, _| {
            b.iter(|| {
                let mut strategy = Flipper::new(vec![DataSubscription::new("BENCH", Timeframe::M1)]);
                let mut bus = EventBus::new(ExportMode::Backtest).with_sink(IndexSink::new());
                run(
                    black_box(&series),
                    &mut strategy,
                    &EngineConfig::default(),
                    &CancelToken::new(),
                    None,
                    Some(&mut bus),
                )
            })
        });
    }

    let multi = vec![make_bars(10_000, 60_000), make_bars(2_000, 300_000)];
    group.bench_function("two_series_10k", |b| {
        b.iter(|| {
            let mut strategy = Flipper::new(vec![
                DataSubscription::new("BENCH", Timeframe::M1),
                DataSubscription::context_only("BENCH", Timeframe::M5),
            ]);
            run(
                black_box(&multi),
                &mut strategy,
                &EngineConfig::default(),
                &CancelToken::new(),
                None,
                None,
            )
        })
    });
    group.finish();
}

// ── 2. Scheduler ─────────────────────────────────────────────────────

fn bench_scheduler(c: &mut Criterion) {
    let series = vec![
        make_bars(10_000, 60_000),
        make_bars(2_000, 300_000),
        make_bars(500, 3_600_000),
    ];
    c.bench_function("scheduler_merge_3_series", |b| {
        b.iter(|| Scheduler::new(black_box(&series), None, None).map(|g| g.bars.len()).sum::<usize>())
    });
}

// ── 3. Matching ──────────────────────────────────────────────────────

fn bench_matching(c: &mut Criterion) {
    let bars = make_bars(1_000, 60_000);
    let orders = [
        Order::market("BENCH", OrderSide::Buy, 1.0),
        Order::limit("BENCH", OrderSide::Buy, 1.0, 95.0),
        Order::stop("BENCH", OrderSide::Sell, 1.0, 92.0),
        Order::stop_limit("BENCH", OrderSide::Buy, 1.0, 105.0, 106.0),
    ];
    let model = PriceModel {
        tick_size: 0.01,
        slippage_ticks: 1.0,
    };
    c.bench_function("match_order_4_types_1k_bars", |b| {
        b.iter(|| {
            for bar in &bars {
                for order in &orders {
                    black_box(match_order(order, bar, model));
                }
            }
        })
    });
}

// ── 4. Event bus ─────────────────────────────────────────────────────

fn bench_event_bus(c: &mut Criterion) {
    let event = BarEvent {
        subscription_index: 0,
        asset: "BENCH".into(),
        timeframe: Timeframe::M1,
        open: 100.0,
        high: 101.0,
        low: 99.0,
        close: 100.5,
        volume: 1_000.0,
        exportable: true,
    };
    c.bench_function("bus_emit_two_sinks", |b| {
        let mut bus = EventBus::new(ExportMode::Backtest)
            .with_sink(IndexSink::new())
            .with_sink(MemorySink::new());
        let mut ts = 0;
        b.iter(|| {
            ts += 1;
            bus.emit(ts, "engine", black_box(&event))
        })
    });

    c.bench_function("bus_emit_filtered", |b| {
        let mut bus = EventBus::new(ExportMode::Optimization).with_sink(IndexSink::new());
        b.iter(|| bus.emit(0, "engine", black_box(&event)))
    });
}

criterion_group!(
    benches,
    bench_engine_loop,
    bench_scheduler,
    bench_matching,
    bench_event_bus
);
criterion_main!(benches);
