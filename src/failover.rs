// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Failover client.
//!
//! The single query entry point the rest of the application uses. Each call
//! re-reads the active endpoint from the [`HealthMonitor`]; a failed call on
//! local marks local unhealthy at once and is retried one time on remote.
//!
//! ```rust,no_run
//! # use graph_sync::failover::FailoverClient;
//! # use graph_sync::store::NodeKind;
//! # async fn example(client: FailoverClient) -> Result<(), Box<dyn std::error::Error>> {
//! let links = client
//!     .run(|store| async move { store.list_nodes(NodeKind::Link).await })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::error::StoreResult;
use crate::health::{HealthMonitor, NodeRole};
use crate::metrics;
use crate::store::GraphStore;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tracing::{info, warn};

/// A handle bound to whichever endpoint was active when it was opened.
///
/// Do not hold one across calls: the active endpoint can change in between.
#[derive(Clone)]
pub struct Session {
    role: NodeRole,
    store: Arc<dyn GraphStore>,
}

impl Session {
    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }
}

impl Deref for Session {
    type Target = dyn GraphStore;

    fn deref(&self) -> &Self::Target {
        self.store.as_ref()
    }
}

/// Routes store calls to the healthy endpoint.
#[derive(Clone)]
pub struct FailoverClient {
    monitor: Arc<HealthMonitor>,
}

impl FailoverClient {
    pub fn new(monitor: Arc<HealthMonitor>) -> Self {
        Self { monitor }
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    fn active(&self) -> (NodeRole, Arc<dyn GraphStore>) {
        match self.monitor.active_store() {
            Some(store) if Arc::ptr_eq(&store, self.monitor.local()) => (NodeRole::Local, store),
            Some(store) => (NodeRole::Remote, store),
            // Both down: hand back local so callers get a real error, not a missing handle.
            None => (NodeRole::Local, Arc::clone(self.monitor.local())),
        }
    }

    /// The currently active endpoint; local when both are down.
    pub fn store(&self) -> Arc<dyn GraphStore> {
        self.active().1
    }

    pub fn active_role(&self) -> NodeRole {
        self.active().0
    }

    /// Open a session on the currently active endpoint.
    pub fn session(&self) -> Session {
        let (role, store) = self.active();
        Session { role, store }
    }

    /// Run `op` on the active endpoint, retrying once on remote if it fails on local.
    pub async fn run<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: Fn(Arc<dyn GraphStore>) -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let (role, store) = self.active();
        let err = match op(store).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if role != NodeRole::Local {
            return Err(err);
        }

        warn!(error = %err, "Query failed on local store; marking unhealthy");
        let state = self.monitor.mark_local_unhealthy();
        let remote = match self.monitor.remote() {
            Some(remote) if state.remote_healthy() => Arc::clone(remote),
            _ => return Err(err),
        };

        info!(remote = remote.uri(), "Retrying query on remote store");
        let retried = op(remote).await;
        metrics::record_failover_retry(retried.is_ok());
        retried
    }
}
