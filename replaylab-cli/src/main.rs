//! ReplayLab CLI: run, serve, and synth commands.
//!
//! Commands:
//! - `run`: execute one or more TOML run configs in parallel, print JSON summaries
//! - `serve`: host the WebSocket debug server for a run config
//! - `synth`: write a seeded synthetic bar series as CSV

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use replaylab_core::domain::Timeframe;
use replaylab_core::engine::CancelToken;
use replaylab_runner::{
    generate_synthetic_bars, load_series, run_batch, serve, write_csv, RunConfig, RunSummary,
    ServerConfig, ServerState,
};

#[derive(Parser)]
#[command(name = "replaylab", about = "ReplayLab CLI: deterministic bar-replay trading simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run TOML configs (in parallel when more than one) and print JSON summaries.
    Run {
        /// Path(s) to TOML run config files.
        #[arg(long = "config", required = true, num_args = 1..)]
        configs: Vec<PathBuf>,

        /// Print one compact JSON object per line instead of pretty JSON.
        #[arg(long, default_value_t = false)]
        compact: bool,
    },
    /// Serve the WebSocket debug endpoint for one run config.
    Serve {
        /// Path to a TOML run config file.
        #[arg(long)]
        config: PathBuf,

        /// Bind address. Defaults to 127.0.0.1.
        #[arg(long)]
        bind: Option<String>,

        /// Port. Defaults to 8787.
        #[arg(long)]
        port: Option<u16>,

        /// Live event buffer per session.
        #[arg(long)]
        channel_capacity: Option<usize>,
    },
    /// Write a deterministic synthetic bar series as CSV.
    Synth {
        /// Number of bars.
        #[arg(long)]
        bars: usize,

        /// RNG seed; identical seeds produce identical files.
        #[arg(long)]
        seed: u64,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,

        /// Bar timeframe: 1m, 5m, 15m, 1h, 4h, 1d.
        #[arg(long, default_value = "1m")]
        timeframe: Timeframe,

        /// First bar's open price.
        #[arg(long, default_value_t = 100.0)]
        start_price: f64,

        /// First bar's date (YYYY-MM-DD, UTC midnight). Defaults to the epoch.
        #[arg(long)]
        start: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { configs, compact } => run_cmd(&configs, compact),
        Commands::Serve {
            config,
            bind,
            port,
            channel_capacity,
        } => serve_cmd(config, bind, port, channel_capacity),
        Commands::Synth {
            bars,
            seed,
            out,
            timeframe,
            start_price,
            start,
        } => synth_cmd(bars, seed, out, timeframe, start_price, start),
    }
}

fn run_cmd(paths: &[PathBuf], compact: bool) -> Result<()> {
    let configs = paths
        .iter()
        .map(|path| RunConfig::load(path).with_context(|| format!("loading {}", path.display())))
        .collect::<Result<Vec<_>>>()?;

    let results = run_batch(&configs, &CancelToken::new());

    let mut failures = 0;
    for (path, result) in paths.iter().zip(results) {
        match result {
            Ok(summary) => print_summary(&summary, compact)?,
            Err(err) => {
                failures += 1;
                eprintln!("Error for {}: {err}", path.display());
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} run(s) failed", paths.len());
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(summary)?
    } else {
        serde_json::to_string_pretty(summary)?
    };
    println!("{json}");
    Ok(())
}

fn serve_cmd(
    config_path: PathBuf,
    bind: Option<String>,
    port: Option<u16>,
    channel_capacity: Option<usize>,
) -> Result<()> {
    let config = RunConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    config.validate()?;

    let defaults = ServerConfig::default();
    let server = ServerConfig {
        bind: bind.unwrap_or(defaults.bind),
        port: port.unwrap_or(defaults.port),
        channel_capacity: channel_capacity.unwrap_or(defaults.channel_capacity),
        ..defaults
    };
    server.validate()?;

    // Bars are loaded once and shared by every debug session.
    let series = load_series(&config).context("loading bars")?;
    let addr = server.addr();
    let state = Arc::new(ServerState::new(config, server, series));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        serve(listener, state, shutdown_signal()).await?;
        Ok::<(), anyhow::Error>(())
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn synth_cmd(
    bars: usize,
    seed: u64,
    out: PathBuf,
    timeframe: Timeframe,
    start_price: f64,
    start: Option<String>,
) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be positive");
    }
    if !(start_price.is_finite() && start_price > 0.0) {
        bail!("--start-price must be positive, got {start_price}");
    }
    let start_ms = match start.as_deref() {
        Some(date) => date_to_epoch_ms(date)?,
        None => 0,
    };

    let series = generate_synthetic_bars(seed, bars, start_ms, timeframe, start_price);
    write_csv(&out, &series).with_context(|| format!("writing {}", out.display()))?;
    println!("Wrote {bars} {timeframe} bars to {}", out.display());
    Ok(())
}

fn date_to_epoch_ms(date: &str) -> Result<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("invalid --start date '{date}', expected YYYY-MM-DD"))?;
    let Some(midnight) = day.and_hms_opt(0, 0, 0) else {
        bail!("invalid --start date '{date}'");
    };
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}
