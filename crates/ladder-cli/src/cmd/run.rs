use crate::console::Console;
use crate::output::print_json;
use anyhow::{bail, Context};
use ladder_core::config::WarnLevel;
use ladder_core::snapshot::{load_snapshot, save_snapshot};
use ladder_core::{
    load_program, IoConfig, MonotonicClock, RuntimeConfig, ScanScheduler, ScanStats, SimulatedIo,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub program: PathBuf,
    pub io_config: Option<PathBuf>,
    pub no_io: bool,
    pub scan_time: Option<u64>,
    pub cycles: Option<u64>,
    pub state_file: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub console: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    program: &'a str,
    cycles: u64,
    overruns: u64,
    last_scan_ms: f64,
    avg_scan_ms: f64,
    min_scan_ms: f64,
    max_scan_ms: f64,
    faulted: bool,
}

pub fn run(opts: RunOptions, json: bool) -> anyhow::Result<()> {
    let config = match &opts.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("failed to load runtime config {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
            WarnLevel::Error => bail!("invalid runtime config: {}", warning.message),
        }
    }

    let program = load_program(&opts.program)
        .with_context(|| format!("failed to load program {}", opts.program.display()))?;
    let period_ms = config.resolve_scan_period(opts.scan_time, program.scan_time_ms());
    if period_ms == 0 {
        bail!("scan period must be greater than 0 ms");
    }

    let state_file = opts.state_file.clone().or_else(|| config.state_file.clone());
    if let Some(path) = state_file.as_ref().filter(|p| p.exists()) {
        let snapshot = load_snapshot(path)
            .with_context(|| format!("failed to restore state from {}", path.display()))?;
        snapshot.apply(program.store());
        tracing::info!(path = %path.display(), tags = snapshot.tags.len(), "restored tag state");
    }

    let mut sched = ScanScheduler::new(program, Arc::new(MonotonicClock::new()))
        .with_config(&config)
        .with_period(Duration::from_millis(period_ms))
        .with_max_cycles(opts.cycles.or(config.max_cycles));

    match (&opts.io_config, opts.no_io) {
        (Some(_), true) => tracing::info!("I/O disabled by --no-io"),
        (Some(path), false) => {
            let io_config = IoConfig::load(path)
                .with_context(|| format!("failed to load I/O config {}", path.display()))?;
            sched.attach_io(Box::new(SimulatedIo::new(io_config)));
        }
        (None, _) => tracing::info!("no I/O configured; running logic only"),
    }

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(drive(&mut sched, opts.console));
    // The console's stdin read may still be parked on a blocking thread.
    rt.shutdown_background();

    if let Some(path) = &state_file {
        save_snapshot(path, sched.store(), Some(sched.program().name()))
            .with_context(|| format!("failed to save state to {}", path.display()))?;
    }

    print_summary(sched.program().name(), sched.stats(), outcome.is_err(), json)?;
    outcome.context("scan loop stopped on a fault")?;
    Ok(())
}

async fn drive(sched: &mut ScanScheduler, console: bool) -> ladder_core::Result<ScanStats> {
    let (tx, rx) = watch::channel(false);

    let interrupt = tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            let _ = interrupt.send(true);
        }
    });

    if console {
        let console = Console::new(sched.store().clone(), sched.simulation(), sched.io_status());
        let stdin = BufReader::new(tokio::io::stdin());
        tokio::spawn(console.run(stdin, tx.clone()));
    }

    sched.run(rx).await
}

fn print_summary(
    program: &str,
    stats: &ScanStats,
    faulted: bool,
    json: bool,
) -> anyhow::Result<()> {
    if json {
        return print_json(&RunSummary {
            program,
            cycles: stats.cycles,
            overruns: stats.overruns,
            last_scan_ms: stats.last_ms,
            avg_scan_ms: stats.avg_ms(),
            min_scan_ms: stats.min_ms,
            max_scan_ms: stats.max_ms,
            faulted,
        });
    }

    println!("Total cycles: {}", stats.cycles);
    println!("Last scan:    {:.2} ms", stats.last_ms);
    println!("Average scan: {:.2} ms", stats.avg_ms());
    println!("Overruns:     {}", stats.overruns);
    Ok(())
}
