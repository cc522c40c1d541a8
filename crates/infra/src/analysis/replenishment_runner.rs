use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use warehouse_analysis::{AnalysisError, AnalysisJob, ReplenishmentJob, ReplenishmentPolicy};
use warehouse_inventory::AnalysisNotice;

use crate::ledger::DEFAULT_STORE_TIMEOUT;
use crate::store::{NoticeStore, OperationLog, StoreError, bounded};

/// Config for the replenishment runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplenishmentRunnerConfig {
    /// Time between scheduled runs.
    pub interval: Duration,
    /// Trailing window of the audit trail considered by each run.
    pub window: Duration,
    pub policy: ReplenishmentPolicy,
    pub store_timeout: Duration,
}

impl Default for ReplenishmentRunnerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(180),
            window: Duration::from_secs(180),
            policy: ReplenishmentPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// What a single run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed {
        notices: Vec<AnalysisNotice>,
        operations_read: usize,
        /// Distinct (product, storage) pairs with activity in the window.
        pairs_considered: usize,
    },
    /// Another run held the exclusion guard.
    Skipped,
    /// The run was aborted; nothing was persisted.
    Failed { reason: String },
}

#[derive(Debug, Error)]
enum RunError {
    #[error("window of {0:?} cannot be subtracted from the run time")]
    Window(Duration),
    #[error("reading the audit trail failed: {0}")]
    Read(StoreError),
    #[error("analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
    #[error("writing notices failed: {0}")]
    Write(StoreError),
}

/// A finished pass, before it is reported.
struct Pass {
    window_start: DateTime<Utc>,
    operations_read: usize,
    pairs_considered: usize,
    notices: Vec<AnalysisNotice>,
}

/// Scheduled replenishment analysis.
///
/// Clones share one exclusion guard, so a manual `run_once` and the scheduled task never
/// overlap: whichever arrives second is skipped.
#[derive(Debug, Clone)]
pub struct ReplenishmentRunner {
    config: ReplenishmentRunnerConfig,
    exclusive: Arc<Mutex<()>>,
}

/// Handle for the running task (shutdown + trigger hook).
#[derive(Debug)]
pub struct ReplenishmentRunnerHandle {
    shutdown: watch::Sender<bool>,
    trigger: mpsc::Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ReplenishmentRunnerHandle {
    /// Request an extra run as soon as possible.
    ///
    /// Triggers are coalesced: if one is already pending this is a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    /// Stop the task after any in-flight run finishes.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl ReplenishmentRunner {
    pub fn new(config: ReplenishmentRunnerConfig) -> Self {
        Self {
            config,
            exclusive: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ReplenishmentRunnerConfig {
        &self.config
    }

    /// Run one analysis pass over `[now - window, now]`.
    ///
    /// Never overlaps with another pass of this runner (or its clones). Failures are logged and
    /// reported; the next scheduled pass is the retry.
    pub async fn run_once<S>(&self, store: &S, now: DateTime<Utc>) -> RunOutcome
    where
        S: OperationLog + NoticeStore + ?Sized,
    {
        let Ok(_guard) = self.exclusive.try_lock() else {
            debug!("replenishment run already in progress; skipping trigger");
            return RunOutcome::Skipped;
        };

        let started = Instant::now();
        match self.run_exclusive(store, now).await {
            Ok(pass) => {
                info!(
                    notices = pass.notices.len(),
                    operations_read = pass.operations_read,
                    pairs_considered = pass.pairs_considered,
                    window_start = %pass.window_start,
                    window_secs = self.config.window.as_secs(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "replenishment run completed"
                );
                RunOutcome::Completed {
                    notices: pass.notices,
                    operations_read: pass.operations_read,
                    pairs_considered: pass.pairs_considered,
                }
            }
            Err(e) => {
                warn!(error = %e, "replenishment run aborted");
                RunOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run_exclusive<S>(
        &self,
        store: &S,
        now: DateTime<Utc>,
    ) -> Result<Pass, RunError>
    where
        S: OperationLog + NoticeStore + ?Sized,
    {
        let window_start = chrono::Duration::from_std(self.config.window)
            .ok()
            .and_then(|w| now.checked_sub_signed(w))
            .ok_or(RunError::Window(self.config.window))?;

        let operations = bounded(self.config.store_timeout, store.operations_since(window_start))
            .await
            .map_err(RunError::Read)?;

        let report = ReplenishmentJob::new(window_start, now, operations)
            .with_policy(self.config.policy)
            .run()?;

        let mut pass = Pass {
            window_start: report.window_start,
            operations_read: report.operations_considered,
            pairs_considered: report.pairs_considered,
            notices: vec![],
        };
        if report.is_empty() {
            return Ok(pass);
        }

        pass.notices = bounded(
            self.config.store_timeout,
            store.append_notices(report.notices),
        )
        .await
        .map_err(RunError::Write)?;

        Ok(pass)
    }

    /// Spawn the scheduled task.
    ///
    /// - Schedule: runs immediately, then every `interval`; missed ticks are skipped, not bunched
    /// - Trigger: `handle.trigger()` requests an extra run
    /// - Failures: logged; never propagate out of the task
    pub fn spawn<S>(&self, name: &'static str, store: Arc<S>) -> ReplenishmentRunnerHandle
    where
        S: OperationLog + NoticeStore + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);

        let runner = self.clone();
        let join = tokio::spawn(runner_loop(name, runner, store, shutdown_rx, trigger_rx));

        ReplenishmentRunnerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join: Some(join),
        }
    }
}

async fn runner_loop<S>(
    name: &'static str,
    runner: ReplenishmentRunner,
    store: Arc<S>,
    mut shutdown_rx: watch::Receiver<bool>,
    mut trigger_rx: mpsc::Receiver<()>,
) where
    S: OperationLog + NoticeStore + ?Sized + 'static,
{
    info!(
        runner = name,
        interval_secs = runner.config.interval.as_secs(),
        window_secs = runner.config.window.as_secs(),
        "replenishment runner started"
    );

    let mut ticker = tokio::time::interval(runner.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Shutdown has priority; a dropped handle counts as shutdown.
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            _ = ticker.tick() => {}
            Some(()) = trigger_rx.recv() => {}
        }

        runner.run_once(&*store, Utc::now()).await;
    }

    info!(runner = name, "replenishment runner stopped");
}
