//! Scan scheduler: input latch, logic, output latch, bookkeeping, cadence.
//!
//! A scheduler is either stopped or running. [`ScanScheduler::run`] starts
//! it, executes cycles until shutdown, a cycle bound, or a fault, and always
//! leaves it stopped with the adapter cleaned up.

use crate::clock::Clock;
use crate::config::{CadenceMode, RuntimeConfig, DEFAULT_SCAN_PERIOD_MS};
use crate::error::{LadderError, Result};
use crate::instruction::ScanContext;
use crate::io::{IoAdapter, IoStatus, SimulationHandle};
use crate::program::Program;
use crate::tags::{TagStore, CYCLE_COUNT, ERROR, RUNNING, SCAN_TIME};
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

// ---------------------------------------------------------------------------
// SchedulerState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Stopped => f.write_str("stopped"),
            SchedulerState::Running => f.write_str("running"),
        }
    }
}

// ---------------------------------------------------------------------------
// ScanStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    pub cycles: u64,
    pub overruns: u64,
    pub last_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    total_ms: f64,
}

impl ScanStats {
    fn record(&mut self, elapsed_ms: f64, overrun: bool) {
        if self.cycles == 0 {
            self.min_ms = elapsed_ms;
            self.max_ms = elapsed_ms;
        } else {
            self.min_ms = self.min_ms.min(elapsed_ms);
            self.max_ms = self.max_ms.max(elapsed_ms);
        }
        self.cycles += 1;
        self.last_ms = elapsed_ms;
        self.total_ms += elapsed_ms;
        if overrun {
            self.overruns += 1;
        }
    }

    pub fn avg_ms(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.total_ms / self.cycles as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// Start deadline for the next cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub deadline: Instant,
    pub overrun: bool,
}

/// Computes cycle deadlines. Pure over the instants it is given.
#[derive(Debug, Clone)]
pub struct Cadence {
    mode: CadenceMode,
    period: Duration,
    origin: Instant,
    ticks: u32,
}

impl Cadence {
    pub fn new(mode: CadenceMode, period: Duration, origin: Instant) -> Self {
        Self {
            mode,
            period,
            origin,
            ticks: 0,
        }
    }

    /// Deadline for the cycle after one that ran from `start` to `end`.
    ///
    /// A cycle whose body took at least one period is an overrun: the next
    /// cycle starts at `end` and fixed-rate deadlines are re-anchored there,
    /// so no backlog of missed deadlines builds up.
    pub fn next(&mut self, start: Instant, end: Instant) -> Tick {
        let elapsed = end.saturating_duration_since(start);
        let overrun = elapsed >= self.period;

        let deadline = match self.mode {
            CadenceMode::SleepRemainder => end + self.period.saturating_sub(elapsed),
            CadenceMode::FixedRate => {
                self.ticks = self.ticks.saturating_add(1);
                let deadline = self.origin + self.period * self.ticks;
                if overrun || deadline <= end {
                    self.origin = end;
                    self.ticks = 0;
                    end
                } else {
                    deadline
                }
            }
        };
        Tick { deadline, overrun }
    }
}

// ---------------------------------------------------------------------------
// ScanScheduler
// ---------------------------------------------------------------------------

pub struct ScanScheduler {
    program: Program,
    clock: Arc<dyn Clock>,
    io: Option<Box<dyn IoAdapter>>,
    period: Duration,
    cadence: CadenceMode,
    max_cycles: Option<u64>,
    state: SchedulerState,
    stats: ScanStats,
}

impl fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("program", &self.program.name())
            .field("io_attached", &self.io.is_some())
            .field("period", &self.period)
            .field("cadence", &self.cadence)
            .field("max_cycles", &self.max_cycles)
            .field("state", &self.state)
            .finish()
    }
}

impl ScanScheduler {
    /// New stopped scheduler. The period is the program's own scan time, or
    /// the default when the program does not set one.
    pub fn new(program: Program, clock: Arc<dyn Clock>) -> Self {
        let period_ms = program.scan_time_ms().unwrap_or(DEFAULT_SCAN_PERIOD_MS);
        Self {
            program,
            clock,
            io: None,
            period: Duration::from_millis(period_ms),
            cadence: CadenceMode::default(),
            max_cycles: None,
            state: SchedulerState::Stopped,
            stats: ScanStats::default(),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_cadence(mut self, cadence: CadenceMode) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u64>) -> Self {
        self.max_cycles = max_cycles;
        self
    }

    /// Apply cadence and cycle bound from `config`. The period is left alone;
    /// see [`RuntimeConfig::resolve_scan_period`].
    pub fn with_config(self, config: &RuntimeConfig) -> Self {
        self.with_cadence(config.cadence)
            .with_max_cycles(config.max_cycles)
    }

    pub fn attach_io(&mut self, io: Box<dyn IoAdapter>) {
        self.io = Some(io);
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn store(&self) -> &TagStore {
        self.program.store()
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn io_status(&self) -> Option<IoStatus> {
        self.io.as_ref().map(|io| io.status())
    }

    pub fn simulation(&self) -> Option<SimulationHandle> {
        self.io.as_ref().and_then(|io| io.simulation())
    }

    // -----------------------------------------------------------------------
    // State transitions
    // -----------------------------------------------------------------------

    pub fn start(&mut self) -> Result<()> {
        if self.state == SchedulerState::Running {
            return Err(LadderError::AlreadyRunning);
        }
        self.state = SchedulerState::Running;
        let store = self.store();
        store.set(RUNNING, true);
        store.set(ERROR, false);
        self.program.rebase_timers(self.clock.now_ms());
        tracing::info!(
            program = self.program.name(),
            period_ms = self.period.as_millis() as u64,
            cadence = %self.cadence,
            "scheduler started"
        );
        Ok(())
    }

    /// Stop and clean up the adapter. Cleanup failures are logged, not
    /// returned, so stopping always completes.
    pub fn stop(&mut self) {
        self.state = SchedulerState::Stopped;
        self.store().set(RUNNING, false);
        if let Some(io) = self.io.as_mut() {
            if let Err(err) = io.cleanup() {
                tracing::error!(error = %err, "I/O cleanup failed");
            }
        }
        tracing::info!(cycles = self.stats.cycles, "scheduler stopped");
    }

    // -----------------------------------------------------------------------
    // Cycle
    // -----------------------------------------------------------------------

    /// Execute one cycle: read inputs, run the program, write outputs, then
    /// update the scan time and cycle count tags. Returns the elapsed
    /// milliseconds.
    pub fn run_scan_cycle(&mut self) -> Result<f64> {
        let started = Instant::now();
        let store = self.program.store().clone();

        if let Some(io) = self.io.as_mut() {
            io.read_inputs(&store)?;
        }
        self.program.execute(&ScanContext::at(self.clock.now_ms()));
        if let Some(io) = self.io.as_mut() {
            io.write_outputs(&store)?;
        }

        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        store.set(SCAN_TIME, (elapsed_ms * 100.0).round() / 100.0);
        let count = store.get_int(CYCLE_COUNT, 0);
        store.set(CYCLE_COUNT, count.saturating_add(1));
        self.stats.record(elapsed_ms, elapsed >= self.period);
        Ok(elapsed_ms)
    }

    /// Run one cycle, converting a panic into a fault.
    fn guarded_cycle(&mut self) -> Result<f64> {
        match catch_unwind(AssertUnwindSafe(|| self.run_scan_cycle())) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic in scan cycle".to_string());
                Err(LadderError::ScanFault(message))
            }
        }
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Start and run cycles until `shutdown` reads true (or its sender is
    /// dropped), the cycle bound is reached, or a cycle faults.
    ///
    /// A fault sets `_SYSTEM.ERROR` and is returned. Every exit path stops
    /// the scheduler and cleans up the adapter.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<ScanStats> {
        self.start()?;
        let outcome = self.cycle_loop(&mut shutdown).await;
        if let Err(err) = &outcome {
            self.store().set(ERROR, true);
            tracing::error!(error = %err, "scan cycle fault; stopping");
        }
        self.stop();
        outcome.map(|()| self.stats.clone())
    }

    async fn cycle_loop(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let mut cadence = Cadence::new(self.cadence, self.period, Instant::now());
        let mut executed: u64 = 0;

        loop {
            if *shutdown.borrow_and_update() {
                tracing::info!("shutdown requested");
                return Ok(());
            }
            if self.max_cycles.is_some_and(|max| executed >= max) {
                tracing::info!(cycles = executed, "cycle limit reached");
                return Ok(());
            }

            let start = Instant::now();
            let elapsed_ms = self.guarded_cycle()?;
            executed += 1;
            let tick = cadence.next(start, Instant::now());

            if tick.overrun {
                tracing::warn!(
                    elapsed_ms,
                    period_ms = self.period.as_millis() as u64,
                    "scan overrun"
                );
            }
            if self.max_cycles.is_some_and(|max| executed >= max) {
                continue;
            }
            if wait_until(tick.deadline, shutdown).await {
                tracing::info!("shutdown requested");
                return Ok(());
            }
        }
    }
}

/// Sleep until `deadline`. Returns true if shutdown was requested first.
async fn wait_until(deadline: Instant, shutdown: &mut watch::Receiver<bool>) -> bool {
    if deadline <= Instant::now() {
        return false;
    }
    let sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline));
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
