//! # tickheap timer demo driver
//!
//! Starts a timer, schedules a batch of recurring tasks, lets them run,
//! cancels one, then stops and prints the counters.
//!
//! Usage:
//!   tickheap                              # 100 tasks every second for 3s
//!   tickheap --strategy shared_lock       # Use the mutex-guarded engine
//!   tickheap --tasks 10 --interval-ms 250 --run-secs 2
//!   tickheap --config ~/.tickheap/config.toml -v

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tickheap_core::{Strategy, TickheapConfig};
use tickheap_scheduler::{Callback, TaskId, Timer, clamp_interval, timer_from_config};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tickheap", version, about = "⏰ tickheap, a heap-ordered software timer demo")]
struct Cli {
    /// Config file (defaults to ~/.tickheap/config.toml when present)
    #[arg(short, long)]
    config: Option<String>,

    /// Engine strategy: serialized or shared_lock
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Tick granularity in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Number of recurring tasks to schedule
    #[arg(long, default_value = "100")]
    tasks: u32,

    /// Interval between runs; negative values clamp to zero
    #[arg(long, default_value = "1000", allow_hyphen_values = true)]
    interval_ms: i64,

    /// How long to let the timer run before stopping
    #[arg(long, default_value = "3")]
    run_secs: u64,

    /// Task id to cancel before stopping
    #[arg(long, default_value = "10")]
    remove: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => TickheapConfig::load_from(Path::new(&expand_path(path)))?,
        None => TickheapConfig::load()?,
    };
    if let Some(strategy) = cli.strategy {
        config.timer.strategy = strategy;
    }
    if let Some(tick_ms) = cli.tick_ms {
        config.timer.tick_interval_ms = tick_ms;
    }
    config.validate()?;

    // Initialize logging
    let filter = if cli.verbose {
        "tickheap=debug,tickheap_scheduler=debug".to_string()
    } else {
        config.log_filter.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let timer = timer_from_config(&config.timer)?;
    timer.start().await?;

    let interval = clamp_interval(chrono::TimeDelta::milliseconds(cli.interval_ms));
    for i in 0..cli.tasks {
        let id = timer
            .add(
                Callback::blocking(move || tracing::info!("🔔 Task #{i} fired")),
                interval,
                false,
            )
            .await?;
        tracing::debug!("timerId={id}");
    }

    tokio::time::sleep(Duration::from_secs(cli.run_secs)).await;
    print_stats(timer.as_ref())?;

    let target = TaskId::new(cli.remove);
    if timer.remove(target).await? {
        tracing::info!("🗑️ Cancelled {target}");
    } else {
        tracing::info!("No pending task {target}");
    }

    timer.stop().await?;
    print_stats(timer.as_ref())?;
    Ok(())
}

fn print_stats(timer: &dyn Timer) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&timer.stats())?);
    Ok(())
}
