// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync service: owns every component and their lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! ┌─────────┐  start()  ┌─────────┐  shutdown()  ┌──────────────┐     ┌─────────┐
//! │ Created │ ────────► │ Running │ ───────────► │ ShuttingDown │ ──► │ Stopped │
//! └─────────┘           └─────────┘              └──────────────┘     └─────────┘
//! ```
//!
//! While running, the health monitor probes both endpoints and (if sync is
//! enabled) the scheduler fires cycles on the cron schedule. Manual cycles via
//! [`SyncService::sync_now`] work in any state before `Stopped`.

use crate::config::SyncConfig;
use crate::engine::{EngineConfig, SyncEngine};
use crate::error::{Result, SyncError};
use crate::failover::FailoverClient;
use crate::health::{FailoverState, HealthConfig, HealthMonitor};
use crate::model::{list_metas, load_meta, SyncMeta, SyncResult};
use crate::scheduler::{parse_cron, Scheduler};
use crate::store::{open_endpoint, GraphStore, NodeCounts, NodeKind};
use crate::sync_log::{LogEntry, SyncLogger};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Events returned by [`SyncService::status`].
const STATUS_RECENT_EVENTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Operator-facing snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub node_id: String,
    pub state: ServiceState,
    pub enabled: bool,
    pub failover: FailoverState,
    pub meta: Option<SyncMeta>,
    pub local_counts: Option<NodeCounts>,
    /// `None` when the remote is unreachable or not configured.
    pub remote_counts: Option<NodeCounts>,
    /// Per-kind count differences above the divergence threshold.
    pub divergence: BTreeMap<NodeKind, u64>,
    pub is_running: bool,
    pub last_result: Option<SyncResult>,
    pub recent_events: Vec<LogEntry>,
}

pub struct SyncService {
    config: SyncConfig,
    node_id: String,
    logger: Arc<SyncLogger>,
    monitor: Arc<HealthMonitor>,
    failover: FailoverClient,
    engine: Option<Arc<SyncEngine>>,
    scheduler: Option<Scheduler>,
    state_tx: watch::Sender<ServiceState>,
}

impl SyncService {
    /// Validate `config`, open both endpoints and resolve the node identity.
    pub async fn open(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let local = open_endpoint(&config.local)?;
        let remote = config.peer.as_ref().map(open_endpoint).transpose()?;
        Self::with_stores(config, local, remote).await
    }

    /// As [`open`](Self::open), with endpoints supplied by the caller.
    pub async fn with_stores(
        config: SyncConfig,
        local: Arc<dyn GraphStore>,
        remote: Option<Arc<dyn GraphStore>>,
    ) -> Result<Self> {
        let logger = Arc::new(SyncLogger::new(config.log_file.clone(), config.divergence_threshold)?);
        let node_id = resolve_node_id(&config, local.as_ref()).await?;

        let monitor = Arc::new(HealthMonitor::new(
            Arc::clone(&local),
            remote.clone(),
            HealthConfig {
                interval: config.health_interval(),
                remote_down_alert: config.remote_down_alert(),
                ..HealthConfig::default()
            },
            Arc::clone(&logger),
        ));
        let failover = FailoverClient::new(Arc::clone(&monitor));

        let engine = remote.map(|remote| {
            Arc::new(SyncEngine::new(
                node_id.clone(),
                Arc::clone(&local),
                remote,
                EngineConfig {
                    batch_size: config.batch_size,
                    query_timeout: Some(config.query_timeout()),
                    model_path: config.resolve_model_path(),
                },
                Arc::clone(&logger),
            ))
        });

        let scheduler = match &engine {
            Some(engine) => {
                let schedule = parse_cron(&config.cron).map_err(SyncError::Config)?;
                Some(Scheduler::new(
                    Arc::clone(engine) as Arc<dyn crate::scheduler::CycleRunner>,
                    schedule,
                    config.run_on_startup,
                    Arc::clone(&logger),
                ))
            }
            None => None,
        };

        let (state_tx, _) = watch::channel(ServiceState::Created);
        info!(
            node_id = %node_id,
            local = %config.local.uri,
            peer = config.peer.as_ref().map(|p| p.uri.as_str()),
            enabled = config.enabled,
            "Sync service opened"
        );

        Ok(Self {
            config,
            node_id,
            logger,
            monitor,
            failover,
            engine,
            scheduler,
            state_tx,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        *self.state_tx.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }

    pub fn logger(&self) -> &Arc<SyncLogger> {
        &self.logger
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    /// The query entry point for the rest of the application.
    pub fn failover_client(&self) -> &FailoverClient {
        &self.failover
    }

    pub fn engine(&self) -> Option<&Arc<SyncEngine>> {
        self.engine.as_ref()
    }

    /// Start health monitoring and, when enabled, the scheduler.
    pub async fn start(&self) -> Result<()> {
        let state = self.state();
        if state != ServiceState::Created {
            return Err(SyncError::InvalidState {
                expected: ServiceState::Created.to_string(),
                actual: state.to_string(),
            });
        }

        // Settle routing before the first query arrives.
        self.monitor.check_once().await;
        self.monitor.start();

        match (&self.scheduler, self.config.enabled) {
            (Some(scheduler), true) => {
                info!(cron = %self.config.cron, "Scheduled sync enabled");
                scheduler.start();
            }
            _ => info!("Scheduled sync disabled"),
        }

        self.state_tx.send_replace(ServiceState::Running);
        Ok(())
    }

    /// Stop the scheduler (letting a running cycle finish) and the monitor.
    pub async fn shutdown(&self) {
        if matches!(self.state(), ServiceState::ShuttingDown | ServiceState::Stopped) {
            return;
        }
        info!("Shutting down sync service");
        self.state_tx.send_replace(ServiceState::ShuttingDown);

        if let Some(scheduler) = &self.scheduler {
            scheduler.stop().await;
            scheduler.wait_idle().await;
        }
        self.monitor.stop().await;
        self.logger.flush().await;

        self.state_tx.send_replace(ServiceState::Stopped);
        info!("Sync service stopped");
    }

    /// Run one cycle now.
    ///
    /// Fails with [`SyncError::AlreadyRunning`] if a cycle is in flight, and
    /// with a config error when no peer is configured.
    pub async fn sync_now(&self) -> Result<SyncResult> {
        let state = self.state();
        if matches!(state, ServiceState::ShuttingDown | ServiceState::Stopped) {
            return Err(SyncError::InvalidState {
                expected: ServiceState::Running.to_string(),
                actual: state.to_string(),
            });
        }
        let scheduler = self
            .scheduler
            .as_ref()
            .ok_or_else(|| SyncError::Config("no sync peer configured".to_string()))?;
        scheduler.trigger().await
    }

    pub fn is_syncing(&self) -> bool {
        self.scheduler.as_ref().is_some_and(Scheduler::is_running)
    }

    pub async fn status(&self) -> SyncStatus {
        let local = self.monitor.local();
        let remote = self.monitor.remote();

        let meta_fut = load_meta(local.as_ref(), &self.node_id);
        let local_fut = local.node_counts();
        let remote_fut = async {
            match remote {
                Some(remote) => remote.node_counts().await.ok(),
                None => None,
            }
        };
        let (meta, local_counts, remote_counts) = tokio::join!(meta_fut, local_fut, remote_fut);

        let meta = meta.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read sync meta for status");
            None
        });
        let local_counts = local_counts.ok();
        let divergence = match (&local_counts, &remote_counts) {
            (Some(l), Some(r)) => self.logger.divergent_kinds(l, r),
            _ => BTreeMap::new(),
        };

        SyncStatus {
            node_id: self.node_id.clone(),
            state: self.state(),
            enabled: self.config.enabled,
            failover: self.monitor.state(),
            meta,
            local_counts,
            remote_counts,
            divergence,
            is_running: self.is_syncing(),
            last_result: self.scheduler.as_ref().and_then(Scheduler::last_result),
            recent_events: self.logger.recent(STATUS_RECENT_EVENTS),
        }
    }
}

/// Configured id, else the one already recorded locally, else a new UUID.
///
/// A generated id is persisted at once so restarts keep it.
async fn resolve_node_id(config: &SyncConfig, local: &dyn GraphStore) -> Result<String> {
    if let Some(id) = &config.node_id {
        return Ok(id.clone());
    }

    let metas = list_metas(local)
        .await
        .map_err(|e| SyncError::store("resolve_node_id", e))?;
    if let Some(meta) = metas.first() {
        if metas.len() > 1 {
            warn!(count = metas.len(), chosen = %meta.node_id, "Several sync meta records in local store");
        }
        info!(node_id = %meta.node_id, "Reusing recorded node identity");
        return Ok(meta.node_id.clone());
    }

    let id = uuid::Uuid::new_v4().to_string();
    crate::model::save_meta(local, &SyncMeta::new(&id))
        .await
        .map_err(|e| SyncError::store("save_meta", e))?;
    info!(node_id = %id, "Generated node identity");
    Ok(id)
}
