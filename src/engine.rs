// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync engine: runs one full cycle between the local and remote endpoints.
//!
//! # Cycle
//!
//! ```text
//! START ─► reachability ─► model check ─► pull ─► push ─► END
//!               │               │          (remote→local) (local→remote)
//!               ▼               ▼
//!            failed          failed        (SyncMeta watermarks untouched)
//! ```
//!
//! Pull and push run independently: a failure in one does not stop the other.
//! Each advances only its own watermark, and only to the newest `updatedAt`
//! actually seen in the delta it transferred (never to "now"), so clock skew
//! between nodes cannot open a gap. A failed direction leaves its watermark
//! where it was; the next cycle replays the same range and the natural-key
//! merge makes the replay harmless.
//!
//! Every store call is bounded by the configured query timeout.

use crate::error::{Result, SyncError};
use crate::export::export_delta;
use crate::import::import_delta;
use crate::metrics;
use crate::model::{
    load_meta, load_or_create_meta, peer_metas, save_meta, Direction, ImportSummary, ModelCheck, NodeCounts,
    SyncCycleResult, SyncMeta, SyncResult,
};
use crate::model_hash::verify_model_match;
use crate::scheduler::CycleRunner;
use crate::store::GraphStore;
use crate::sync_log::SyncLogger;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Tunables for one engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Entities per import transaction.
    pub batch_size: usize,
    /// Deadline for each store call; `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
    /// Local embedding model file; `None` skips verification.
    pub model_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            query_timeout: Some(Duration::from_secs(300)),
            model_path: None,
        }
    }
}

/// Orchestrates pull and push between two endpoints.
pub struct SyncEngine {
    node_id: String,
    local: Arc<dyn GraphStore>,
    remote: Arc<dyn GraphStore>,
    config: EngineConfig,
    logger: Arc<SyncLogger>,
}

impl SyncEngine {
    pub fn new(
        node_id: impl Into<String>,
        local: Arc<dyn GraphStore>,
        remote: Arc<dyn GraphStore>,
        config: EngineConfig,
        logger: Arc<SyncLogger>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            local,
            remote,
            config,
            logger,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn local(&self) -> &Arc<dyn GraphStore> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn GraphStore> {
        &self.remote
    }

    /// Await `fut` within the query timeout.
    async fn bounded<T>(&self, operation: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.query_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
                Err(SyncError::Timeout {
                    operation: operation.to_string(),
                })
            }),
            None => fut.await,
        }
    }

    /// Current watermarks without creating the meta record.
    async fn watermarks(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        match load_meta(self.local.as_ref(), &self.node_id).await {
            Ok(Some(meta)) => (meta.last_pull_at, meta.last_push_at),
            _ => (DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH),
        }
    }

    async fn short_circuit(
        &self,
        started_at: DateTime<Utc>,
        error: &SyncError,
        model_check: Option<ModelCheck>,
    ) -> SyncResult {
        let (pull_wm, push_wm) = self.watermarks().await;
        let peer = self.remote.uri();
        let message = error.to_string();
        SyncResult::new(
            SyncCycleResult::failed(Direction::Pull, &self.node_id, peer, started_at, pull_wm, message.clone()),
            SyncCycleResult::failed(Direction::Push, &self.node_id, peer, started_at, push_wm, message),
            model_check,
        )
    }

    /// Compare embedding models. `Err` blocks the cycle; a local read
    /// problem skips verification instead.
    async fn check_model(&self) -> std::result::Result<Option<ModelCheck>, (SyncError, Option<ModelCheck>)> {
        let Some(path) = self.config.model_path.as_ref() else {
            let reason = "no embedding model file configured or found";
            self.logger.model_check_skipped(reason);
            return Ok(Some(ModelCheck {
                matched: true,
                local_hash: None,
                remote_hash: None,
                skipped: Some(reason.to_string()),
            }));
        };

        let verified = self
            .bounded(
                "verify_model_match",
                verify_model_match(path, self.local.as_ref(), self.remote.as_ref(), &self.node_id),
            )
            .await;

        match verified {
            Ok(check) if check.matched => Ok(Some(check)),
            Ok(check) => {
                let local = check.local_hash.clone().unwrap_or_default();
                let remote = check.remote_hash.clone().unwrap_or_default();
                self.logger.model_mismatch(&local, &remote);
                Err((SyncError::ModelMismatch { local, remote }, Some(check)))
            }
            Err(SyncError::Io(e)) => {
                let reason = format!("{}: {}", path.display(), e);
                self.logger.model_check_skipped(&reason);
                Ok(Some(ModelCheck {
                    matched: true,
                    local_hash: None,
                    remote_hash: None,
                    skipped: Some(reason),
                }))
            }
            Err(e) => Err((e, None)),
        }
    }

    /// Run one full cycle. Never returns an error: failures are reported in
    /// the result and logged.
    pub async fn sync(&self) -> SyncResult {
        let span = info_span!("sync_cycle", node_id = %self.node_id, peer_uri = %self.remote.uri());
        async {
            let started_at = Utc::now();
            let timer = Instant::now();
            self.logger.cycle_started(&self.node_id, self.remote.uri());

            let (result, outcome) = self.sync_inner(started_at).await;

            metrics::record_cycle(outcome, timer.elapsed());
            self.logger.record_result(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn sync_inner(&self, started_at: DateTime<Utc>) -> (SyncResult, &'static str) {
        // 1. Reachability
        let reachable = self
            .bounded("ping", async {
                self.remote.ping().await.map_err(|e| SyncError::PeerUnreachable {
                    uri: self.remote.uri().to_string(),
                    message: e.to_string(),
                })
            })
            .await;
        if let Err(e) = reachable {
            self.logger.peer_unreachable(self.remote.uri(), &e.to_string());
            return (self.short_circuit(started_at, &e, None).await, "unreachable");
        }

        // 2. Model check
        let model_check = match self.check_model().await {
            Ok(check) => check,
            Err((e, check)) => {
                let outcome = if matches!(e, SyncError::ModelMismatch { .. }) {
                    "model_mismatch"
                } else {
                    "failure"
                };
                warn!(error = %e, "Sync blocked before transfer");
                return (self.short_circuit(started_at, &e, check).await, outcome);
            }
        };

        let mut meta = match self
            .bounded("load_meta", async {
                load_or_create_meta(self.local.as_ref(), &self.node_id)
                    .await
                    .map_err(|e| SyncError::store("load_meta", e))
            })
            .await
        {
            Ok(meta) => meta,
            Err(e) => return (self.short_circuit(started_at, &e, model_check).await, "failure"),
        };

        // Learn the peer's identity from its own meta record.
        match peer_metas(self.remote.as_ref(), &self.node_id).await {
            Ok(peers) => {
                if let Some(peer) = peers.into_iter().next() {
                    if meta.peer_id.as_deref() != Some(peer.node_id.as_str()) {
                        info!(peer_id = %peer.node_id, "Learned peer identity");
                        meta.peer_id = Some(peer.node_id);
                    }
                }
            }
            Err(e) => debug!(error = %e, "Could not read peer meta"),
        }

        // 3. Pull, then 4. push
        let pull = self.run_direction(Direction::Pull, &mut meta).await;
        let push = self.run_direction(Direction::Push, &mut meta).await;

        let result = SyncResult::new(pull, push, model_check);
        let outcome = if result.overall_success { "success" } else { "failure" };
        (result, outcome)
    }

    async fn counts(&self) -> (Option<NodeCounts>, Option<NodeCounts>) {
        let local = async {
            self.bounded("node_counts", async {
                self.local.node_counts().await.map_err(|e| SyncError::store("node_counts", e))
            })
            .await
        };
        let remote = async {
            self.bounded("node_counts", async {
                self.remote.node_counts().await.map_err(|e| SyncError::store("node_counts", e))
            })
            .await
        };
        let (local, remote) = tokio::join!(local, remote);
        let keep = |r: Result<NodeCounts>, role: &str| match r {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(role, error = %e, "Could not read node counts");
                None
            }
        };
        (keep(local, "local"), keep(remote, "remote"))
    }

    /// Node that produced the delta for `direction`: us when pushing, the
    /// peer when pulling (its URI until its node id has been learned).
    fn delta_origin(&self, direction: Direction, meta: &SyncMeta) -> String {
        match direction {
            Direction::Push => self.node_id.clone(),
            Direction::Pull => meta
                .peer_id
                .clone()
                .unwrap_or_else(|| self.remote.uri().to_string()),
        }
    }

    async fn run_direction(&self, direction: Direction, meta: &mut SyncMeta) -> SyncCycleResult {
        let span = info_span!("sync_direction", direction = %direction);
        async {
            let started_at = Utc::now();
            let timer = Instant::now();
            let (source, dest, since) = match direction {
                Direction::Pull => (&self.remote, &self.local, meta.last_pull_at),
                Direction::Push => (&self.local, &self.remote, meta.last_push_at),
            };

            let mut summary = ImportSummary::default();
            let mut errors = Vec::new();
            let mut watermark = since;

            let origin = self.delta_origin(direction, meta);
            let exported = self
                .bounded("export_delta", async {
                    export_delta(source.as_ref(), &origin, since)
                        .await
                        .map_err(|e| SyncError::store("export_delta", e))
                })
                .await;

            match exported {
                Err(e) => errors.push(e.to_string()),
                Ok(delta) => {
                    let imported = self
                        .bounded("import_delta", async {
                            Ok(import_delta(dest.as_ref(), &delta, self.config.batch_size).await)
                        })
                        .await;
                    match imported {
                        Ok(Ok(s)) => summary = s,
                        Ok(Err(e)) => {
                            errors.push(e.to_string());
                            summary = e.partial;
                        }
                        Err(e) => errors.push(e.to_string()),
                    }

                    if errors.is_empty() {
                        let candidate = delta.max_updated_at().map_or(since, |max| max.max(since));
                        let mut updated = meta.clone();
                        match direction {
                            Direction::Pull => {
                                updated.last_pull_at = candidate;
                                updated.last_pull_count = summary.nodes_imported;
                            }
                            Direction::Push => {
                                updated.last_push_at = candidate;
                                updated.last_push_count = summary.nodes_imported;
                            }
                        }
                        let saved = self
                            .bounded("save_meta", async {
                                save_meta(self.local.as_ref(), &updated)
                                    .await
                                    .map_err(|e| SyncError::store("save_meta", e))
                            })
                            .await;
                        match saved {
                            Ok(()) => {
                                *meta = updated;
                                watermark = candidate;
                                metrics::set_watermark(direction.as_str(), candidate.timestamp());
                            }
                            Err(e) => errors.push(e.to_string()),
                        }
                    }
                }
            }

            let (local_counts, remote_counts) = self.counts().await;
            let success = errors.is_empty();
            let finished_at = Utc::now();
            metrics::record_direction(direction.as_str(), success, timer.elapsed());
            metrics::record_transfer(direction.as_str(), summary.nodes_imported, summary.relationships_imported);

            if success {
                info!(
                    since = %since,
                    watermark = %watermark,
                    nodes = summary.nodes_imported,
                    relationships = summary.relationships_imported,
                    conflicts = summary.conflicts.len(),
                    "Sync direction completed"
                );
            } else {
                warn!(errors = ?errors, "Sync direction failed; watermark unchanged");
            }

            SyncCycleResult {
                direction,
                node_id: self.node_id.clone(),
                peer: meta.peer_id.clone().unwrap_or_else(|| self.remote.uri().to_string()),
                started_at,
                finished_at,
                duration_ms: timer.elapsed().as_millis() as u64,
                since,
                watermark,
                nodes_imported: summary.nodes_imported,
                relationships_imported: summary.relationships_imported,
                conflicts: summary.conflicts,
                errors,
                local_counts,
                remote_counts,
                success,
            }
        }
        .instrument(span)
        .await
    }
}

impl CycleRunner for SyncEngine {
    fn run_cycle(&self) -> Pin<Box<dyn Future<Output = SyncResult> + Send + '_>> {
        Box::pin(self.sync())
    }
}
