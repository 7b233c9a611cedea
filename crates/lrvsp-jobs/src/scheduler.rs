//! Cycle scheduler: fetch, process, notify, check remaining, then loop or sleep.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use lrvsp_core::defaults::{CREATE_LIMIT, CYCLE_TIME_SECS, EVENT_BUS_CAPACITY, PARSE_LIMIT};
use lrvsp_core::{
    DownstreamNotifier, Error, NotifyOutcome, QueueSession, QueueStore, RemainingScope, Result,
};

use crate::processor::{FailureReason, ItemOutcome, ItemProcessor};

/// Configuration for the cycle scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum work items fetched per cycle.
    pub parse_limit: i64,
    /// Capacity limit passed to the downstream trigger.
    pub create_limit: u32,
    /// Wall-clock anchored cycle interval.
    pub cycle_time: Duration,
    /// Tables counted when deciding whether to loop immediately.
    pub remaining_scope: RemainingScope,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parse_limit: PARSE_LIMIT,
            create_limit: CREATE_LIMIT,
            cycle_time: Duration::from_secs(CYCLE_TIME_SECS),
            remaining_scope: RemainingScope::default(),
        }
    }
}

impl SchedulerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `PARSE_LIMIT` | `10` | Work items fetched per cycle |
    /// | `CREATE_LIMIT` | `1200` | Downstream capacity limit |
    /// | `CYCLE_TIME` | `120` | Cycle interval in seconds |
    /// | `REMAINING_SCOPE` | `all` | `queue` or `all` |
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_limit = var("PARSE_LIMIT")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(PARSE_LIMIT)
            .max(1);

        let create_limit = var("CREATE_LIMIT")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(CREATE_LIMIT);

        let cycle_time = var("CYCLE_TIME")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(CYCLE_TIME_SECS));

        let remaining_scope = var("REMAINING_SCOPE")
            .and_then(|v| v.parse::<RemainingScope>().ok())
            .unwrap_or_default();

        Self {
            parse_limit,
            create_limit,
            cycle_time,
            remaining_scope,
        }
    }

    pub fn with_parse_limit(mut self, limit: i64) -> Self {
        self.parse_limit = limit;
        self
    }

    pub fn with_create_limit(mut self, limit: u32) -> Self {
        self.create_limit = limit;
        self
    }

    pub fn with_cycle_time(mut self, cycle_time: Duration) -> Self {
        self.cycle_time = cycle_time;
        self
    }

    pub fn with_remaining_scope(mut self, scope: RemainingScope) -> Self {
        self.remaining_scope = scope;
        self
    }
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle: u64,
    pub fetched: usize,
    pub committed: usize,
    pub failed: usize,
    pub left_queued: usize,
    /// Items abandoned or never started because shutdown was requested.
    pub interrupted: usize,
    pub remaining: i64,
    /// Time from cycle start until the downstream trigger returned.
    pub elapsed: Duration,
    pub notify: NotifyOutcome,
}

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum CycleEvent {
    /// Scheduler loop started.
    SchedulerStarted,
    /// A cycle began.
    CycleStarted { cycle: u64 },
    /// A work item's document was committed.
    ItemCommitted { item_id: i64, links: usize },
    /// A work item failed. `marked` is false when it was left queued.
    ItemFailed {
        item_id: i64,
        reason: FailureReason,
        marked: bool,
    },
    /// Shutdown stopped a work item before its write unit began.
    ItemInterrupted { item_id: i64 },
    /// A cycle ran to completion.
    CycleCompleted { report: CycleReport },
    /// A cycle-fatal error; retried on the next tick.
    CycleFailed { cycle: u64, error: String },
    /// Scheduler loop stopped.
    SchedulerStopped,
}

/// Delay before the next cycle.
///
/// Zero while work remains. Otherwise the rest of the interval, so a slow
/// cycle shortens or eliminates the sleep.
pub fn next_delay(remaining: i64, elapsed: Duration, cycle_time: Duration) -> Duration {
    if remaining > 0 {
        Duration::ZERO
    } else {
        cycle_time.saturating_sub(elapsed)
    }
}

/// Handle for controlling a running scheduler.
pub struct SchedulerHandle {
    shutdown: CancellationToken,
    event_rx: broadcast::Receiver<CycleEvent>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Ask the scheduler to stop.
    ///
    /// The in-flight write unit, if any, commits or rolls back. Items not yet
    /// written stay queued and the downstream trigger is skipped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<CycleEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait for the scheduler loop to exit.
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Scheduler task failed: {}", e)))
    }
}

/// Single-worker scheduler draining the queue one cycle at a time.
pub struct CycleScheduler {
    store: Arc<dyn QueueStore>,
    processor: ItemProcessor,
    notifier: Arc<dyn DownstreamNotifier>,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<CycleEvent>,
    cycles: AtomicU64,
    shutdown: CancellationToken,
}

impl CycleScheduler {
    pub fn new(
        store: Arc<dyn QueueStore>,
        processor: ItemProcessor,
        notifier: Arc<dyn DownstreamNotifier>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            store,
            processor,
            notifier,
            config: SchedulerConfig::default(),
            event_tx,
            cycles: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<CycleEvent> {
        self.event_tx.subscribe()
    }

    /// Token that stops this scheduler when cancelled, for use with
    /// [`run_cycle`](Self::run_cycle) outside the loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Start the scheduler loop and return a handle for control.
    pub fn start(self) -> SchedulerHandle {
        let shutdown = self.shutdown.clone();
        let event_rx = self.event_tx.subscribe();

        let scheduler = Arc::new(self);
        let task = tokio::spawn(async move {
            scheduler.run().await;
        });

        SchedulerHandle {
            shutdown,
            event_rx,
            task,
        }
    }

    /// Run cycles until shutdown is requested.
    ///
    /// Shutdown is checked before each cycle, between items, around the
    /// downstream trigger and while sleeping. A started write unit always
    /// resolves before the loop exits.
    #[instrument(skip(self))]
    async fn run(&self) {
        info!(
            subsystem = "jobs",
            component = "scheduler",
            parse_limit = self.config.parse_limit,
            create_limit = self.config.create_limit,
            cycle_time_secs = self.config.cycle_time.as_secs(),
            remaining_scope = %self.config.remaining_scope,
            "Scheduler started"
        );
        let _ = self.event_tx.send(CycleEvent::SchedulerStarted);

        loop {
            if self.shutdown.is_cancelled() {
                info!("Scheduler received shutdown signal");
                break;
            }

            let started = Instant::now();
            let delay = match self.run_cycle().await {
                Ok(report) => next_delay(report.remaining, report.elapsed, self.config.cycle_time),
                // Cycle-fatal errors wait for the next tick
                Err(_) => self.config.cycle_time.saturating_sub(started.elapsed()),
            };

            if delay.is_zero() {
                // Back-to-back cycles still let other tasks run
                tokio::task::yield_now().await;
                continue;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
                _ = sleep(delay) => {}
            }
        }

        let _ = self.event_tx.send(CycleEvent::SchedulerStopped);
        info!(subsystem = "jobs", component = "scheduler", "Scheduler stopped");
    }

    /// Run exactly one cycle.
    ///
    /// Per-item failures are contained in the report. Only connection,
    /// fetch, and remaining-count failures are returned as errors.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        let started = Instant::now();
        info!(
            subsystem = "jobs",
            component = "scheduler",
            cycle,
            "Start processing"
        );
        let _ = self.event_tx.send(CycleEvent::CycleStarted { cycle });

        let result = self.execute_cycle(cycle, started).await;
        match &result {
            Ok(report) => {
                info!(
                    subsystem = "jobs",
                    component = "scheduler",
                    cycle,
                    fetched = report.fetched,
                    committed = report.committed,
                    failed = report.failed,
                    left_queued = report.left_queued,
                    interrupted = report.interrupted,
                    remaining = report.remaining,
                    duration_ms = report.elapsed.as_millis() as u64,
                    "End processing"
                );
                let _ = self.event_tx.send(CycleEvent::CycleCompleted {
                    report: report.clone(),
                });
            }
            Err(e) => {
                error!(
                    subsystem = "jobs",
                    component = "scheduler",
                    cycle,
                    error = %e,
                    "Cycle failed"
                );
                let _ = self.event_tx.send(CycleEvent::CycleFailed {
                    cycle,
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// Open the cycle's connection, drain one batch, and always close it.
    async fn execute_cycle(&self, cycle: u64, started: Instant) -> Result<CycleReport> {
        let mut session = self.store.open_session().await?;
        let result = self.drain_batch(session.as_mut(), cycle, started).await;
        if let Err(e) = session.close().await {
            warn!(
                subsystem = "jobs",
                component = "scheduler",
                error = %e,
                "Failed to close queue connection"
            );
        }
        result
    }

    async fn drain_batch(
        &self,
        session: &mut dyn QueueSession,
        cycle: u64,
        started: Instant,
    ) -> Result<CycleReport> {
        let items = session.fetch_pending(self.config.parse_limit).await?;

        let mut committed = 0;
        let mut failed = 0;
        let mut left_queued = 0;
        let mut interrupted = 0;
        for item in &items {
            if self.shutdown.is_cancelled() {
                interrupted += 1;
                let _ = self
                    .event_tx
                    .send(CycleEvent::ItemInterrupted { item_id: item.id });
                continue;
            }
            match self
                .processor
                .process_until(&mut *session, item, &self.shutdown)
                .await
            {
                ItemOutcome::Committed { links } => {
                    committed += 1;
                    let _ = self.event_tx.send(CycleEvent::ItemCommitted {
                        item_id: item.id,
                        links,
                    });
                }
                ItemOutcome::MarkedFailed(reason) => {
                    failed += 1;
                    let _ = self.event_tx.send(CycleEvent::ItemFailed {
                        item_id: item.id,
                        reason,
                        marked: true,
                    });
                }
                ItemOutcome::LeftQueued(reason) => {
                    left_queued += 1;
                    let _ = self.event_tx.send(CycleEvent::ItemFailed {
                        item_id: item.id,
                        reason,
                        marked: false,
                    });
                }
                ItemOutcome::Interrupted => {
                    interrupted += 1;
                    let _ = self
                        .event_tx
                        .send(CycleEvent::ItemInterrupted { item_id: item.id });
                }
            }
        }

        let notify = self.notify_downstream(interrupted).await;
        let elapsed = started.elapsed();
        let remaining = session
            .remaining_count(self.config.remaining_scope)
            .await?;

        Ok(CycleReport {
            cycle,
            fetched: items.len(),
            committed,
            failed,
            left_queued,
            interrupted,
            remaining,
            elapsed,
            notify,
        })
    }

    /// Run the downstream trigger unless shutdown is pending. A trigger still
    /// running when shutdown arrives is abandoned, which kills the process.
    async fn notify_downstream(&self, interrupted: usize) -> NotifyOutcome {
        if self.shutdown.is_cancelled() {
            info!(
                subsystem = "jobs",
                component = "scheduler",
                interrupted,
                "Shutdown requested, skipping downstream trigger"
            );
            return NotifyOutcome::Skipped;
        }
        tokio::select! {
            outcome = self.notifier.notify(self.config.create_limit) => outcome,
            _ = self.shutdown.cancelled() => {
                warn!(
                    subsystem = "jobs",
                    component = "scheduler",
                    "Downstream trigger abandoned for shutdown"
                );
                NotifyOutcome::Skipped
            }
        }
    }
}
