// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync event log and alerting.
//!
//! Every cycle result and every health/failover transition is appended as
//! one JSON object per line to the sync log file, mirrored to `tracing`, and
//! kept in a small in-memory ring for status queries.
//!
//! ```text
//! {"timestamp":"...","level":"WARNING","event":"cycle_failed","message":"...","details":{...}}
//! ```
//!
//! # Alerts
//!
//! | Condition | Level | Event |
//! |-----------|-------|-------|
//! | 3rd consecutive failed cycle (once per streak) | CRITICAL | `consecutive_failures_alert` |
//! | per-kind count difference above threshold | WARNING | `divergence_alert` |
//! | remote unreachable past the alert threshold | WARNING | `remote_down_alert` |
//!
//! Writing the log never fails a cycle: file errors are reported through
//! `tracing` and the entry is still kept in memory.
//!
//! File appends run on a dedicated writer task fed by a channel, so callers
//! on the cycle and health paths never block on disk. [`SyncLogger::flush`]
//! waits until everything logged so far has reached the file.

use crate::metrics;
use crate::model::SyncResult;
use crate::store::{NodeCounts, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Consecutive failed cycles that raise the CRITICAL alert.
pub const CONSECUTIVE_FAILURE_ALERT: u32 = 3;

/// Entries kept in memory.
const RECENT_CAPACITY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEvent {
    CycleStarted,
    CycleCompleted,
    CycleFailed,
    PeerUnreachable,
    ModelMismatch,
    ModelCheckSkipped,
    FailoverActivated,
    FailoverResolved,
    RemoteDownAlert,
    ConsecutiveFailuresAlert,
    DivergenceAlert,
    SchedulerSkipped,
}

impl SyncEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CycleStarted => "cycle_started",
            Self::CycleCompleted => "cycle_completed",
            Self::CycleFailed => "cycle_failed",
            Self::PeerUnreachable => "peer_unreachable",
            Self::ModelMismatch => "model_mismatch",
            Self::ModelCheckSkipped => "model_check_skipped",
            Self::FailoverActivated => "failover_activated",
            Self::FailoverResolved => "failover_resolved",
            Self::RemoteDownAlert => "remote_down_alert",
            Self::ConsecutiveFailuresAlert => "consecutive_failures_alert",
            Self::DivergenceAlert => "divergence_alert",
            Self::SchedulerSkipped => "scheduler_skipped",
        }
    }
}

/// One line of the sync log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub event: SyncEvent,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

#[derive(Default)]
struct LoggerState {
    recent: VecDeque<LogEntry>,
    consecutive_failures: u32,
    failure_alert_sent: bool,
}

enum WriterMsg {
    Line(String),
    Flush(oneshot::Sender<()>),
}

/// Structured sync event log with alert escalation.
pub struct SyncLogger {
    path: Option<PathBuf>,
    writer: Option<mpsc::UnboundedSender<WriterMsg>>,
    divergence_threshold: u64,
    state: Mutex<LoggerState>,
}

impl SyncLogger {
    /// Log to `path` (parent directory created), or memory only when `None`.
    ///
    /// A file-backed logger spawns its writer task, so it must be created
    /// inside a tokio runtime.
    pub fn new(path: Option<PathBuf>, divergence_threshold: u64) -> std::io::Result<Self> {
        let writer = match &path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let runtime = tokio::runtime::Handle::try_current()
                    .map_err(std::io::Error::other)?;
                let (tx, rx) = mpsc::unbounded_channel();
                runtime.spawn(write_lines(path.clone(), rx));
                Some(tx)
            }
            None => None,
        };
        Ok(Self {
            path,
            writer,
            divergence_threshold,
            state: Mutex::new(LoggerState::default()),
        })
    }

    /// Memory-only logger for tests and dry runs.
    pub fn in_memory(divergence_threshold: u64) -> Self {
        Self {
            path: None,
            writer: None,
            divergence_threshold,
            state: Mutex::new(LoggerState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, LoggerState> {
        // A panic while holding the lock leaves plain data; keep using it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one entry.
    pub fn log(&self, level: LogLevel, event: SyncEvent, message: impl Into<String>, details: Value) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            event,
            message: message.into(),
            details,
        };

        match level {
            LogLevel::Info => info!(event = event.as_str(), details = %entry.details, "{}", entry.message),
            LogLevel::Warning => warn!(event = event.as_str(), details = %entry.details, "{}", entry.message),
            LogLevel::Critical => error!(
                severity = "critical",
                event = event.as_str(),
                details = %entry.details,
                "{}",
                entry.message
            ),
        }

        if let Some(writer) = &self.writer {
            match serde_json::to_string(&entry) {
                Ok(mut line) => {
                    line.push('\n');
                    if writer.send(WriterMsg::Line(line)).is_err() {
                        warn!("Sync log writer stopped; entry kept in memory only");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode sync log entry"),
            }
        }

        let mut state = self.lock();
        if state.recent.len() == RECENT_CAPACITY {
            state.recent.pop_front();
        }
        state.recent.push_back(entry.clone());
        entry
    }

    /// Wait until every entry logged so far has been written to the file.
    /// Returns at once for a memory-only logger.
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if writer.send(WriterMsg::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let state = self.lock();
        let skip = state.recent.len().saturating_sub(n);
        state.recent.iter().skip(skip).cloned().collect()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn cycle_started(&self, node_id: &str, peer: &str) {
        self.log(
            LogLevel::Info,
            SyncEvent::CycleStarted,
            format!("Sync cycle started with {}", peer),
            json!({ "nodeId": node_id, "peer": peer }),
        );
    }

    pub fn peer_unreachable(&self, peer: &str, error: &str) {
        self.log(
            LogLevel::Warning,
            SyncEvent::PeerUnreachable,
            format!("Peer {} unreachable", peer),
            json!({ "peer": peer, "error": error }),
        );
    }

    pub fn model_mismatch(&self, local: &str, remote: &str) {
        self.log(
            LogLevel::Critical,
            SyncEvent::ModelMismatch,
            "Embedding model mismatch between nodes; sync blocked",
            json!({ "localHash": local, "remoteHash": remote }),
        );
    }

    pub fn model_check_skipped(&self, reason: &str) {
        self.log(
            LogLevel::Warning,
            SyncEvent::ModelCheckSkipped,
            "Embedding model verification skipped",
            json!({ "reason": reason }),
        );
    }

    pub fn failover_activated(&self, local_uri: &str, remote_uri: &str) {
        self.log(
            LogLevel::Warning,
            SyncEvent::FailoverActivated,
            format!("Local store unhealthy; routing to {}", remote_uri),
            json!({ "local": local_uri, "remote": remote_uri }),
        );
    }

    pub fn failover_resolved(&self, local_uri: &str, downtime: Duration) {
        self.log(
            LogLevel::Info,
            SyncEvent::FailoverResolved,
            format!("Local store healthy again after {}", humantime::format_duration(round_secs(downtime))),
            json!({ "local": local_uri, "downtimeMs": downtime.as_millis() as u64 }),
        );
    }

    pub fn remote_down(&self, remote_uri: &str, down_for: Duration) {
        metrics::record_alert(SyncEvent::RemoteDownAlert.as_str());
        self.log(
            LogLevel::Warning,
            SyncEvent::RemoteDownAlert,
            format!(
                "Remote store unreachable for {}",
                humantime::format_duration(round_secs(down_for))
            ),
            json!({ "remote": remote_uri, "downForSecs": down_for.as_secs() }),
        );
    }

    pub fn scheduler_skipped(&self) {
        self.log(
            LogLevel::Info,
            SyncEvent::SchedulerSkipped,
            "Scheduled sync skipped: a cycle is already running",
            Value::Null,
        );
    }

    /// Per-kind differences above the divergence threshold.
    pub fn divergent_kinds(&self, local: &NodeCounts, remote: &NodeCounts) -> BTreeMap<NodeKind, u64> {
        local
            .divergence(remote)
            .into_iter()
            .filter(|(_, diff)| *diff > self.divergence_threshold)
            .collect()
    }

    /// Log a finished cycle and raise any alerts it triggers.
    pub fn record_result(&self, result: &SyncResult) {
        let details = json!({
            "pull": direction_details(&result.pull),
            "push": direction_details(&result.push),
            "modelCheck": result.model_check,
        });

        if result.overall_success {
            self.log(
                LogLevel::Info,
                SyncEvent::CycleCompleted,
                format!(
                    "Sync completed: pulled {} nodes, pushed {} nodes",
                    result.pull.nodes_imported, result.push.nodes_imported
                ),
                details,
            );
        } else {
            self.log(
                LogLevel::Warning,
                SyncEvent::CycleFailed,
                format!("Sync failed: {}", result.errors().join("; ")),
                details,
            );
        }

        let raise_streak_alert = {
            let mut state = self.lock();
            if result.overall_success {
                state.consecutive_failures = 0;
                state.failure_alert_sent = false;
                None
            } else {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= CONSECUTIVE_FAILURE_ALERT && !state.failure_alert_sent {
                    state.failure_alert_sent = true;
                    Some(state.consecutive_failures)
                } else {
                    None
                }
            }
        };
        if let Some(streak) = raise_streak_alert {
            metrics::record_alert(SyncEvent::ConsecutiveFailuresAlert.as_str());
            self.log(
                LogLevel::Critical,
                SyncEvent::ConsecutiveFailuresAlert,
                format!("{} consecutive sync cycles failed", streak),
                json!({ "consecutiveFailures": streak, "lastErrors": result.errors() }),
            );
        }

        // Latest counts: push runs after pull.
        let counts = [&result.push, &result.pull]
            .into_iter()
            .find_map(|r| Some((r.local_counts.as_ref()?, r.remote_counts.as_ref()?)));
        if let Some((local, remote)) = counts {
            for (kind, diff) in local.divergence(remote) {
                metrics::set_divergence(kind.as_str(), diff);
            }
            for (kind, diff) in self.divergent_kinds(local, remote) {
                metrics::record_alert(SyncEvent::DivergenceAlert.as_str());
                self.log(
                    LogLevel::Warning,
                    SyncEvent::DivergenceAlert,
                    format!("{} count differs by {} between nodes", kind, diff),
                    json!({
                        "kind": kind.as_str(),
                        "local": local.get(kind),
                        "remote": remote.get(kind),
                        "difference": diff,
                        "threshold": self.divergence_threshold,
                    }),
                );
            }
        }
    }
}

fn round_secs(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs())
}

fn direction_details(r: &crate::model::SyncCycleResult) -> Value {
    json!({
        "success": r.success,
        "since": r.since,
        "watermark": r.watermark,
        "durationMs": r.duration_ms,
        "nodesImported": r.nodes_imported,
        "relationshipsImported": r.relationships_imported,
        "conflicts": r.conflicts.len(),
        "errors": r.errors,
    })
}

/// Writer task: appends lines in order, opening the file on first use and
/// again after a write error.
async fn write_lines(path: PathBuf, mut rx: mpsc::UnboundedReceiver<WriterMsg>) {
    let mut file: Option<tokio::fs::File> = None;
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Line(line) => {
                if file.is_none() {
                    match tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await {
                        Ok(f) => file = Some(f),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Failed to open sync log file");
                            continue;
                        }
                    }
                }
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.write_all(line.as_bytes()).await {
                        warn!(path = %path.display(), error = %e, "Failed to append sync log entry");
                        file = None;
                    }
                }
            }
            WriterMsg::Flush(ack) => {
                if let Some(f) = file.as_mut() {
                    if let Err(e) = f.flush().await {
                        warn!(path = %path.display(), error = %e, "Failed to flush sync log file");
                    }
                }
                let _ = ack.send(());
            }
        }
    }
    if let Some(mut f) = file {
        let _ = f.flush().await;
    }
    debug!(path = %path.display(), "Sync log writer stopped");
}

/// Read the last `n` entries of a sync log file, skipping malformed lines.
pub fn read_log_file(path: impl AsRef<Path>, n: usize) -> std::io::Result<Vec<LogEntry>> {
    let file = std::fs::File::open(path)?;
    let mut tail: VecDeque<LogEntry> = VecDeque::with_capacity(n.min(RECENT_CAPACITY));
    for line in BufReader::new(file).lines() {
        let line = line?;
        if let Ok(entry) = serde_json::from_str::<LogEntry>(&line) {
            if tail.len() == n {
                tail.pop_front();
            }
            if n > 0 {
                tail.push_back(entry);
            }
        }
    }
    Ok(tail.into())
}
