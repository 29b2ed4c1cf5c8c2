// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cron scheduler with single-flight execution.
//!
//! Triggers sync cycles on a cron schedule, optionally once at startup, and
//! on demand. At most one cycle runs at a time:
//!
//! | Trigger | Cycle already running |
//! |---------|-----------------------|
//! | scheduled / startup | skipped and logged |
//! | manual [`Scheduler::trigger`] | [`SyncError::AlreadyRunning`] |
//!
//! The running flag is a watch channel owned by the scheduler. It is claimed
//! with a conditional send and released by a guard when the cycle ends (even
//! on panic), so waiters are woken instead of polling.

use crate::error::{Result, SyncError};
use crate::metrics;
use crate::model::SyncResult;
use crate::sync_log::SyncLogger;
use chrono::Utc;
use cron::Schedule;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something that runs one sync cycle.
pub trait CycleRunner: Send + Sync + 'static {
    fn run_cycle(&self) -> Pin<Box<dyn Future<Output = SyncResult> + Send + '_>>;
}

/// Parse a cron expression.
///
/// Five-field (minute-first) expressions get a leading seconds field of `0`;
/// six- and seven-field expressions are taken as-is.
pub fn parse_cron(expr: &str) -> std::result::Result<Schedule, String> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => return Err(format!("cron expression '{}' has {} fields, expected 5, 6 or 7", expr, n)),
    };
    Schedule::from_str(&normalized).map_err(|e| format!("invalid cron expression '{}': {}", expr, e))
}

/// Releases the single-flight flag on drop.
struct RunGuard<'a> {
    running: &'a watch::Sender<bool>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.send_replace(false);
        metrics::set_cycle_running(false);
    }
}

struct Inner {
    runner: Arc<dyn CycleRunner>,
    schedule: Schedule,
    run_on_startup: bool,
    logger: Arc<SyncLogger>,
    running: watch::Sender<bool>,
    last_result: Mutex<Option<SyncResult>>,
}

impl Inner {
    fn try_acquire(&self) -> Option<RunGuard<'_>> {
        let claimed = self.running.send_if_modified(|running| {
            if *running {
                false
            } else {
                *running = true;
                true
            }
        });
        claimed.then(|| {
            metrics::set_cycle_running(true);
            RunGuard { running: &self.running }
        })
    }

    async fn run_guarded(&self, _guard: RunGuard<'_>) -> SyncResult {
        let result = self.runner.run_cycle().await;
        *self.last_result.lock().unwrap_or_else(|p| p.into_inner()) = Some(result.clone());
        result
    }

    /// Scheduled or startup run: skip if a cycle is in flight.
    async fn run_scheduled(&self, reason: &'static str) {
        match self.try_acquire() {
            Some(guard) => {
                debug!(reason, "Running scheduled sync");
                self.run_guarded(guard).await;
            }
            None => {
                metrics::record_scheduler_skip();
                self.logger.scheduler_skipped();
            }
        }
    }
}

/// Owns the cron loop and the single-flight flag.
pub struct Scheduler {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(runner: Arc<dyn CycleRunner>, schedule: Schedule, run_on_startup: bool, logger: Arc<SyncLogger>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (running, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                runner,
                schedule,
                run_on_startup,
                logger,
                running,
                last_result: Mutex::new(None),
            }),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// True while a cycle is executing.
    pub fn is_running(&self) -> bool {
        *self.inner.running.borrow()
    }

    /// Result of the most recent cycle run through this scheduler.
    pub fn last_result(&self) -> Option<SyncResult> {
        self.inner.last_result.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Run one cycle now. Fails with [`SyncError::AlreadyRunning`] if one is in flight.
    pub async fn trigger(&self) -> Result<SyncResult> {
        let guard = self.inner.try_acquire().ok_or(SyncError::AlreadyRunning)?;
        info!("Manual sync triggered");
        Ok(self.inner.run_guarded(guard).await)
    }

    /// Start the cron loop (and the startup run, if configured). Idempotent.
    pub fn start(&self) {
        let mut slot = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return;
        }
        self.shutdown_tx.send_replace(false);
        let inner = Arc::clone(&self.inner);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *slot = Some(tokio::spawn(async move {
            info!(run_on_startup = inner.run_on_startup, "Starting sync scheduler");
            if inner.run_on_startup {
                inner.run_scheduled("startup").await;
            }

            loop {
                let Some(next) = inner.schedule.upcoming(Utc).next() else {
                    warn!("Cron schedule has no upcoming runs; scheduler exiting");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or_default();
                debug!(next = %next, wait_secs = wait.as_secs(), "Next scheduled sync");

                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("Sync scheduler stopping");
                            break;
                        }
                    }
                    _ = tokio::time::sleep(wait) => {
                        inner.run_scheduled("cron").await;
                    }
                }
            }
        }));
    }

    /// Stop the cron loop. A cycle already running completes first.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduler task panicked");
            }
        }
    }

    /// Wait until no cycle is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.running.subscribe();
        // The sender lives in `inner`, so the channel cannot close under us.
        let _ = rx.wait_for(|running| !*running).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, SyncCycleResult};
    use crate::sync_log::SyncEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct SlowRunner {
        calls: AtomicUsize,
        release: Notify,
    }

    impl CycleRunner for SlowRunner {
        fn run_cycle(&self) -> Pin<Box<dyn Future<Output = SyncResult> + Send + '_>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.release.notified().await;
                let now = Utc::now();
                SyncResult::new(
                    SyncCycleResult::failed(Direction::Pull, "a", "b", now, now, "test"),
                    SyncCycleResult::failed(Direction::Push, "a", "b", now, now, "test"),
                    None,
                )
            })
        }
    }

    fn scheduler(expr: &str, on_startup: bool) -> (Arc<Scheduler>, Arc<SlowRunner>, Arc<SyncLogger>) {
        let runner = Arc::new(SlowRunner {
            calls: AtomicUsize::new(0),
            release: Notify::new(),
        });
        let logger = Arc::new(SyncLogger::in_memory(100));
        let s = Scheduler::new(runner.clone(), parse_cron(expr).unwrap(), on_startup, logger.clone());
        (Arc::new(s), runner, logger)
    }

    #[test]
    fn test_parse_cron_field_counts() {
        assert!(parse_cron("0 3 * * *").is_ok());
        assert!(parse_cron("0 0 3 * * *").is_ok());
        assert!(parse_cron("0 0 3 * * * 2030").is_ok());
        assert!(parse_cron("* * *").unwrap_err().contains("3 fields"));
        assert!(parse_cron("99 3 * * *").is_err());
        assert!(parse_cron("").is_err());
    }

    #[test]
    fn test_five_field_is_minute_first() {
        let schedule = parse_cron("30 3 * * *").unwrap();
        let next = schedule.upcoming(Utc).next().unwrap();
        assert_eq!(next.format("%H:%M:%S").to_string(), "03:30:00");
    }

    #[tokio::test]
    async fn test_manual_trigger_rejected_while_running() {
        let (s, runner, _) = scheduler("0 3 * * *", false);
        let first = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.trigger().await })
        };
        while !s.is_running() {
            tokio::task::yield_now().await;
        }

        let second = s.trigger().await;
        assert!(matches!(second, Err(SyncError::AlreadyRunning)));

        runner.release.notify_one();
        assert!(first.await.unwrap().is_ok());
        assert!(!s.is_running());
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
        assert!(s.last_result().is_some());
    }

    #[tokio::test]
    async fn test_startup_run_skipped_when_busy() {
        let (s, runner, logger) = scheduler("0 3 * * *", true);
        let manual = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.trigger().await })
        };
        while !s.is_running() {
            tokio::task::yield_now().await;
        }

        s.start();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !logger.recent(10).iter().any(|e| e.event == SyncEvent::SchedulerSkipped) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        runner.release.notify_one();
        manual.await.unwrap().unwrap();
        s.stop().await;
        assert_eq!(runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_when_cycle_ends() {
        let (s, runner, _) = scheduler("0 3 * * *", false);
        let cycle = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.trigger().await })
        };
        while !s.is_running() {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.wait_idle().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!waiter.is_finished());

        runner.release.notify_one();
        tokio::time::timeout(Duration::from_secs(2), waiter).await.unwrap().unwrap();
        assert!(!s.is_running());
        cycle.await.unwrap().unwrap();

        // Already idle: returns immediately.
        tokio::time::timeout(Duration::from_secs(1), s.wait_idle()).await.unwrap();
    }

    #[tokio::test]
    async fn test_startup_run_executes() {
        let (s, runner, _) = scheduler("0 3 * * *", true);
        s.start();
        while runner.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        runner.release.notify_one();
        s.wait_idle().await;
        s.stop().await;
        assert!(s.last_result().is_some());
    }
}
