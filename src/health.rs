// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Health monitor.
//!
//! Probes the local and remote endpoints on a fixed interval and derives the
//! failover state consumed by [`FailoverClient`](crate::failover::FailoverClient).
//!
//! # Transitions
//!
//! ```text
//!                 local unhealthy, remote healthy
//!   ┌────────┐ ─────────────────────────────────► ┌─────────┐
//!   │ local  │                                    │ remote  │
//!   │ active │ ◄───────────────────────────────── │ active  │
//!   └────────┘    local healthy (no cooldown)     └─────────┘
//!                 or remote lost as well
//! ```
//!
//! Failover is active exactly while local is unhealthy and remote is
//! healthy. Flip-back happens on the first healthy local probe.
//!
//! Independently, a remote that stays unreachable for longer than the alert
//! threshold raises one WARNING per outage. It does not affect routing.

use crate::metrics;
use crate::store::GraphStore;
use crate::sync_log::SyncLogger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Local,
    Remote,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Health of one endpoint, recomputed every tick. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub role: NodeRole,
    pub uri: String,
    pub healthy: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub consecutive_failures: u32,
}

impl NodeHealth {
    fn new(role: NodeRole, uri: &str) -> Self {
        Self {
            role,
            uri: uri.to_string(),
            healthy: true,
            last_check: None,
            last_latency_ms: None,
            consecutive_failures: 0,
        }
    }

    fn record(&mut self, probe: Probe, at: DateTime<Utc>) {
        self.healthy = probe.healthy;
        self.last_check = Some(at);
        if let Some(latency) = probe.latency {
            self.last_latency_ms = Some(latency.as_millis() as u64);
        }
        if probe.healthy {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
    }
}

/// Derived routing view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailoverState {
    pub active_node: NodeRole,
    pub local: NodeHealth,
    pub remote: Option<NodeHealth>,
    pub failover_active: bool,
    pub failover_activated_at: Option<DateTime<Utc>>,
}

impl FailoverState {
    pub fn remote_healthy(&self) -> bool {
        self.remote.as_ref().is_some_and(|r| r.healthy)
    }
}

/// Result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub healthy: bool,
    pub latency: Option<Duration>,
}

impl Probe {
    pub fn up(latency: Duration) -> Self {
        Self {
            healthy: true,
            latency: Some(latency),
        }
    }

    pub fn down(latency: Option<Duration>) -> Self {
        Self { healthy: false, latency }
    }
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval: Duration,
    pub remote_down_alert: Duration,
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            remote_down_alert: Duration::from_secs(3600),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct Tracker {
    failover_started: Option<Instant>,
    remote_down_since: Option<Instant>,
    remote_alert_sent: bool,
}

/// Probes both endpoints and publishes [`FailoverState`].
pub struct HealthMonitor {
    local: Arc<dyn GraphStore>,
    remote: Option<Arc<dyn GraphStore>>,
    config: HealthConfig,
    logger: Arc<SyncLogger>,
    state_tx: watch::Sender<FailoverState>,
    tracker: Mutex<Tracker>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        local: Arc<dyn GraphStore>,
        remote: Option<Arc<dyn GraphStore>>,
        config: HealthConfig,
        logger: Arc<SyncLogger>,
    ) -> Self {
        let initial = FailoverState {
            active_node: NodeRole::Local,
            local: NodeHealth::new(NodeRole::Local, local.uri()),
            remote: remote.as_ref().map(|r| NodeHealth::new(NodeRole::Remote, r.uri())),
            failover_active: false,
            failover_activated_at: None,
        };
        let (state_tx, _) = watch::channel(initial);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            local,
            remote,
            config,
            logger,
            state_tx,
            tracker: Mutex::new(Tracker::default()),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    pub fn local(&self) -> &Arc<dyn GraphStore> {
        &self.local
    }

    pub fn remote(&self) -> Option<&Arc<dyn GraphStore>> {
        self.remote.as_ref()
    }

    /// Current failover state.
    pub fn state(&self) -> FailoverState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FailoverState> {
        self.state_tx.subscribe()
    }

    /// The healthy endpoint, preferring local; `None` when both are down.
    pub fn active_store(&self) -> Option<Arc<dyn GraphStore>> {
        let state = self.state_tx.borrow();
        if state.local.healthy {
            Some(Arc::clone(&self.local))
        } else if state.remote_healthy() {
            self.remote.clone()
        } else {
            None
        }
    }

    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn probe(&self, store: &dyn GraphStore, role: NodeRole) -> Probe {
        let started = Instant::now();
        let probe = match tokio::time::timeout(self.config.probe_timeout, store.ping()).await {
            Ok(Ok(())) => Probe::up(started.elapsed()),
            Ok(Err(e)) => {
                debug!(role = role.as_str(), uri = store.uri(), error = %e, "Health probe failed");
                Probe::down(Some(started.elapsed()))
            }
            Err(_) => {
                debug!(role = role.as_str(), uri = store.uri(), "Health probe timed out");
                Probe::down(None)
            }
        };
        metrics::record_health_probe(role.as_str(), probe.healthy, started.elapsed());
        probe
    }

    /// Probe both endpoints once and apply the result.
    pub async fn check_once(&self) -> FailoverState {
        let remote = self.remote.clone();
        let (local_probe, remote_probe) = tokio::join!(self.probe(self.local.as_ref(), NodeRole::Local), async {
            match &remote {
                Some(r) => Some(self.probe(r.as_ref(), NodeRole::Remote).await),
                None => None,
            }
        });
        self.record_probes(Some(local_probe), remote_probe, Instant::now())
    }

    /// Mark local unhealthy immediately, without waiting for the next tick.
    pub fn mark_local_unhealthy(&self) -> FailoverState {
        self.record_probes(Some(Probe::down(None)), None, Instant::now())
    }

    /// Apply probe outcomes (`None` leaves that endpoint unchanged) and run
    /// the transition rules.
    ///
    /// The tracker lock is held from reading the current state until the new
    /// one is published, so concurrent callers (the probe loop and
    /// [`mark_local_unhealthy`](Self::mark_local_unhealthy) from query tasks)
    /// apply their transitions one after another.
    pub fn record_probes(&self, local: Option<Probe>, remote: Option<Probe>, now: Instant) -> FailoverState {
        let at = Utc::now();
        let mut tracker = self.tracker();
        let previous = self.state();
        let mut next = previous.clone();

        if let Some(probe) = local {
            next.local.record(probe, at);
        }
        if let (Some(probe), Some(health)) = (remote, next.remote.as_mut()) {
            health.record(probe, at);
        }

        let should_fail_over = !next.local.healthy && next.remote_healthy();

        if should_fail_over && !previous.failover_active {
            next.failover_active = true;
            next.active_node = NodeRole::Remote;
            next.failover_activated_at = Some(at);
            tracker.failover_started = Some(now);
            metrics::record_failover_transition("activated");
            self.logger
                .failover_activated(&next.local.uri, next.remote.as_ref().map_or("", |r| r.uri.as_str()));
        } else if !should_fail_over && previous.failover_active {
            let downtime = tracker
                .failover_started
                .take()
                .map(|started| now.saturating_duration_since(started))
                .unwrap_or_default();
            next.failover_active = false;
            next.active_node = NodeRole::Local;
            next.failover_activated_at = None;
            metrics::record_failover_transition("resolved");
            if next.local.healthy {
                self.logger.failover_resolved(&next.local.uri, downtime);
            } else {
                warn!(
                    local = %next.local.uri,
                    "Remote store lost while failed over; no healthy endpoint"
                );
            }
        }

        if let Some(remote) = &next.remote {
            if remote.healthy {
                if tracker.remote_down_since.take().is_some() {
                    info!(remote = %remote.uri, "Remote store reachable again");
                }
                tracker.remote_alert_sent = false;
            } else {
                let since = *tracker.remote_down_since.get_or_insert(now);
                let down_for = now.saturating_duration_since(since);
                if down_for > self.config.remote_down_alert && !tracker.remote_alert_sent {
                    tracker.remote_alert_sent = true;
                    self.logger.remote_down(&remote.uri, down_for);
                }
            }
        }

        metrics::set_failover_active(next.failover_active);
        self.state_tx.send_replace(next.clone());
        drop(tracker);
        next
    }

    /// Start probing: immediately, then every interval. Idempotent.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() {
            return;
        }
        self.shutdown_tx.send_replace(false);
        let monitor = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        *slot = Some(tokio::spawn(async move {
            let mut timer = tokio::time::interval(monitor.config.interval);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(
                interval_secs = monitor.config.interval.as_secs(),
                remote = monitor.remote.is_some(),
                "Starting health monitor"
            );

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            debug!("Health monitor stopping");
                            break;
                        }
                    }
                    _ = timer.tick() => {
                        monitor.check_once().await;
                    }
                }
            }
        }));
    }

    /// Stop probing and wait for the task to exit.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let handle = self.task.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}
