// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Health monitoring and failover routing.
//!
//! # Test Organization
//! - `failover_*` - activation and resolution driven by real probes
//! - `service_*` - the same through `SyncService`

mod common;

use common::*;
use graph_sync::health::{HealthConfig, HealthMonitor, NodeRole};
use graph_sync::store::{GraphStore, MemoryGraphStore, NodeKind};
use graph_sync::sync_log::SyncEvent;
use graph_sync::{FailoverClient, SyncConfig, SyncLogger, SyncService};
use std::sync::Arc;
use std::time::Duration;

fn monitor(pair: &Pair) -> Arc<HealthMonitor> {
    Arc::new(HealthMonitor::new(
        pair.local.clone(),
        Some(pair.remote.clone() as Arc<dyn GraphStore>),
        HealthConfig {
            interval: Duration::from_millis(20),
            ..HealthConfig::default()
        },
        pair.logger.clone(),
    ))
}

// =============================================================================
// Activation / resolution
// =============================================================================

#[tokio::test]
async fn failover_activates_and_resolves() {
    let pair = Pair::new();
    let monitor = monitor(&pair);

    let state = monitor.check_once().await;
    assert!(!state.failover_active);
    assert_eq!(state.active_node, NodeRole::Local);

    pair.local.set_reachable(false);
    let state = monitor.check_once().await;
    assert!(state.failover_active);
    assert_eq!(state.active_node, NodeRole::Remote);
    assert!(state.failover_activated_at.is_some());

    pair.local.set_reachable(true);
    let state = monitor.check_once().await;
    assert!(!state.failover_active);
    assert_eq!(state.active_node, NodeRole::Local);

    let events: Vec<SyncEvent> = pair.logger.recent(20).iter().map(|e| e.event).collect();
    assert!(events.contains(&SyncEvent::FailoverActivated));
    assert!(events.contains(&SyncEvent::FailoverResolved));
}

#[tokio::test]
async fn failover_not_activated_when_remote_also_down() {
    let pair = Pair::new();
    let monitor = monitor(&pair);
    pair.local.set_reachable(false);
    pair.remote.set_reachable(false);

    let state = monitor.check_once().await;
    assert!(!state.failover_active);
    assert!(monitor.active_store().is_none());
}

#[tokio::test]
async fn failover_background_probe_routes_queries() {
    let pair = Pair::new();
    pair.remote.seed(vec![upsert(&link("https://remote.example", 10))]).await;
    let monitor = monitor(&pair);
    let client = FailoverClient::new(monitor.clone());
    monitor.start();

    pair.local.set_reachable(false);
    let mut rx = monitor.subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.failover_active))
        .await
        .unwrap()
        .unwrap();

    let links = client
        .run(|store| async move { store.list_nodes(NodeKind::Link).await })
        .await
        .unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(client.active_role(), NodeRole::Remote);

    pair.local.set_reachable(true);
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| !s.failover_active))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.active_role(), NodeRole::Local);

    monitor.stop().await;
    assert!(!monitor.is_running());
}

// =============================================================================
// Through the service
// =============================================================================

#[tokio::test]
async fn service_failover_client_follows_health() {
    let local = Arc::new(MemoryGraphStore::named("memory://local"));
    let remote = Arc::new(MemoryGraphStore::named("memory://remote"));
    let mut config = SyncConfig::for_testing("svc");
    config.health_interval = "20ms".into();
    let service = SyncService::with_stores(config, local.clone(), Some(remote.clone() as Arc<dyn GraphStore>))
        .await
        .unwrap();
    service.start().await.unwrap();

    local.set_reachable(false);
    let mut rx = service.monitor().subscribe();
    tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| s.failover_active))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(service.failover_client().store().uri(), "memory://remote");

    let status = service.status().await;
    assert!(status.failover.failover_active);
    assert!(status.local_counts.is_none());

    service.shutdown().await;
}

#[tokio::test]
async fn failover_without_remote_counts_local_failures() {
    let pair = Pair::new();
    let logger = Arc::new(SyncLogger::in_memory(100));
    let monitor = HealthMonitor::new(
        pair.local.clone(),
        None,
        HealthConfig::default(),
        logger.clone(),
    );
    pair.local.set_reachable(false);
    let state = monitor.check_once().await;
    assert!(!state.local.healthy);
    assert_eq!(state.local.consecutive_failures, 1);
    // No remote: nothing to fail over to.
    assert!(!state.failover_active);
}
