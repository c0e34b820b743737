//! Refresh scheduler.
//!
//! [`Scheduler::run`] evaluates every watched symbol once per refresh
//! interval, measured from the start of each cycle. A cycle that overruns
//! the interval is followed immediately by the next one; cycles never
//! overlap.
//!
//! Shutdown is cooperative: [`ShutdownHandle::request`] stops new symbols
//! from starting, lets in-flight evaluations commit, and wakes the scheduler
//! if it is sleeping between cycles.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{FutureExt, StreamExt, future, stream};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{error, info, warn};

use crate::config::ScreenerConfig;
use crate::error::ScreenError;
use crate::gateway::MarketDataGateway;
use crate::models::Signal;
use crate::pipeline::{PipelineSettings, evaluate_symbol};
use crate::registry::{RegistrySnapshot, SymbolUpdate, WatchList};

/// What the scheduler is doing right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    /// Waiting for the next cycle.
    Idle,
    /// Evaluating `symbol` (the most recently started one) in `cycle`.
    Running { cycle: u64, symbol: String },
    /// The run loop has exited.
    Stopped,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub evaluated: usize,
    pub failed: usize,
    pub candidates: usize,
    /// Symbols skipped because shutdown was requested mid-cycle.
    pub skipped: usize,
    pub elapsed: Duration,
}

/// Requests a cooperative stop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Outcome of one symbol within a cycle, for the report.
struct SymbolOutcome {
    failed: bool,
    candidate: bool,
}

/// Drives periodic evaluation of a [`WatchList`].
pub struct Scheduler<G> {
    gateway: Arc<G>,
    registry: Arc<WatchList>,
    settings: PipelineSettings,
    refresh_interval: Duration,
    max_concurrent: usize,
    cycle: u64,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<SchedulerState>,
    snapshot_tx: watch::Sender<Arc<RegistrySnapshot>>,
}

impl<G: MarketDataGateway> Scheduler<G> {
    /// Creates a scheduler over `registry`. The config is expected to be
    /// validated already.
    #[must_use]
    pub fn new(gateway: Arc<G>, registry: Arc<WatchList>, config: &ScreenerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        let (snapshot_tx, _) = watch::channel(Arc::new(RegistrySnapshot::default()));
        Self {
            gateway,
            registry,
            settings: PipelineSettings::from_config(config),
            refresh_interval: config.refresh_interval(),
            max_concurrent: config.max_concurrent_symbols.max(1),
            cycle: 0,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            state_tx,
            snapshot_tx,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Receives a fresh [`RegistrySnapshot`] after every cycle.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Arc<RegistrySnapshot>> {
        self.snapshot_tx.subscribe()
    }

    /// Runs cycles until shutdown is requested. Returns the number of
    /// cycles executed.
    pub async fn run(mut self) -> u64 {
        let mut shutdown = self.shutdown_rx.clone();
        let mut next_cycle = Instant::now();
        info!(
            interval_secs = self.refresh_interval.as_secs_f64(),
            symbols = self.registry.len(),
            "Scheduler started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            self.run_cycle().await;

            next_cycle += self.refresh_interval;
            let now = Instant::now();
            if next_cycle <= now {
                warn!(
                    cycle = self.cycle,
                    overrun_ms = (now - next_cycle).as_millis() as u64,
                    "Cycle overran refresh interval, starting next cycle immediately"
                );
                next_cycle = now;
                continue;
            }

            tokio::select! {
                () = sleep_until(next_cycle) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.state_tx.send_replace(SchedulerState::Stopped);
        info!(cycles = self.cycle, "Scheduler stopped");
        self.cycle
    }

    /// Evaluates every watched symbol once and publishes a snapshot.
    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let cycle = self.cycle;
        let started = Instant::now();
        let symbols = self.registry.list();
        let total = symbols.len();

        let outcomes = self.evaluate_all(cycle, symbols).await;

        let report = CycleReport {
            cycle,
            evaluated: outcomes.len(),
            failed: outcomes.iter().filter(|o| o.failed).count(),
            candidates: outcomes.iter().filter(|o| o.candidate).count(),
            skipped: total - outcomes.len(),
            elapsed: started.elapsed(),
        };

        let snapshot = self.registry.publishable(cycle, Utc::now());
        self.snapshot_tx.send_replace(Arc::new(snapshot));
        self.state_tx.send_replace(SchedulerState::Idle);

        info!(
            cycle,
            evaluated = report.evaluated,
            failed = report.failed,
            candidates = report.candidates,
            skipped = report.skipped,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cycle complete"
        );
        report
    }

    async fn evaluate_all(&self, cycle: u64, symbols: Vec<String>) -> Vec<SymbolOutcome> {
        let stop = self.shutdown_rx.clone();
        stream::iter(symbols)
            .take_while(move |_| future::ready(!*stop.borrow()))
            .map(|symbol| self.evaluate_one(cycle, symbol))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await
    }

    async fn evaluate_one(&self, cycle: u64, symbol: String) -> SymbolOutcome {
        self.state_tx.send_replace(SchedulerState::Running {
            cycle,
            symbol: symbol.clone(),
        });
        let iv_history = self
            .registry
            .get(&symbol)
            .map(|entry| entry.iv_history.clone())
            .unwrap_or_default();

        let evaluation = evaluate_symbol(
            self.gateway.as_ref(),
            &symbol,
            &self.settings,
            &iv_history,
            Utc::now(),
        );
        let update = match AssertUnwindSafe(evaluation).catch_unwind().await {
            Ok(update) => update,
            Err(_) => {
                error!(symbol = %symbol, "Evaluation panicked");
                SymbolUpdate {
                    price_history: None,
                    outcome: Err(ScreenError::data_unavailable(&symbol, "evaluation panicked")),
                    signal: None,
                    evaluated_at: Utc::now(),
                }
            }
        };

        let failed = update.outcome.is_err();
        let candidate = update.signal.as_ref().is_some_and(Signal::is_candidate);
        if let Some(signal) = update.signal.as_ref().filter(|s| s.is_candidate()) {
            info!(symbol = %symbol, signal = %signal.kind, "{}", signal.rationale.note);
        }
        if !self.registry.apply_result(&symbol, update) {
            warn!(symbol = %symbol, "Symbol removed mid-cycle, result dropped");
        }

        SymbolOutcome { failed, candidate }
    }
}
