// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics for observability.
//!
//! Exports Prometheus-compatible metrics for:
//! - Sync cycle outcomes and duration
//! - Entities and relationships transferred per direction
//! - Conflict resolutions by policy
//! - Health probe latency and failover state
//! - Scheduler skips
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `graph_sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration)
//!
//! No recorder is installed by the library; the host process decides where
//! metrics go.
//!
//! # Usage
//!
//! ```rust,no_run
//! use graph_sync::metrics;
//! use std::time::Duration;
//!
//! metrics::record_cycle("success", Duration::from_secs(4));
//! metrics::record_transfer("pull", 120, 340);
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a completed sync cycle (`success`, `failure`, `unreachable`, `model_mismatch`).
pub fn record_cycle(outcome: &'static str, duration: Duration) {
    counter!("graph_sync_cycles_total", "outcome" => outcome).increment(1);
    histogram!("graph_sync_cycle_duration_seconds").record(duration.as_secs_f64());
}

/// Record one direction's outcome.
pub fn record_direction(direction: &'static str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "failure" };
    counter!("graph_sync_directions_total", "direction" => direction, "status" => status).increment(1);
    histogram!("graph_sync_direction_duration_seconds", "direction" => direction).record(duration.as_secs_f64());
}

/// Record entities and relationships imported in one direction.
pub fn record_transfer(direction: &'static str, nodes: u64, relationships: u64) {
    counter!("graph_sync_nodes_imported_total", "direction" => direction).increment(nodes);
    counter!("graph_sync_relationships_imported_total", "direction" => direction).increment(relationships);
}

/// Record a conflict resolution.
pub fn record_conflict(policy: &'static str) {
    counter!("graph_sync_conflicts_total", "policy" => policy).increment(1);
}

/// Record an import batch commit or rollback.
pub fn record_batch(success: bool, size: usize) {
    let status = if success { "committed" } else { "rolled_back" };
    counter!("graph_sync_batches_total", "status" => status).increment(1);
    histogram!("graph_sync_batch_size").record(size as f64);
}

/// Record watermark position (unix seconds) per direction.
pub fn set_watermark(direction: &'static str, unix_secs: i64) {
    gauge!("graph_sync_watermark_seconds", "direction" => direction).set(unix_secs as f64);
}

/// Record a health probe.
pub fn record_health_probe(role: &'static str, healthy: bool, latency: Duration) {
    let status = if healthy { "success" } else { "failure" };
    counter!("graph_sync_health_probes_total", "role" => role, "status" => status).increment(1);
    histogram!("graph_sync_health_probe_latency_seconds", "role" => role).record(latency.as_secs_f64());
    gauge!("graph_sync_endpoint_healthy", "role" => role).set(if healthy { 1.0 } else { 0.0 });
}

/// Record failover state (1 = routing to remote).
pub fn set_failover_active(active: bool) {
    gauge!("graph_sync_failover_active").set(if active { 1.0 } else { 0.0 });
}

/// Record a failover transition (`activated`, `resolved`).
pub fn record_failover_transition(transition: &'static str) {
    counter!("graph_sync_failover_transitions_total", "transition" => transition).increment(1);
}

/// Record a query retried against the alternate endpoint.
pub fn record_failover_retry(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("graph_sync_failover_retries_total", "status" => status).increment(1);
}

/// Record a scheduled trigger skipped because a cycle was in flight.
pub fn record_scheduler_skip() {
    counter!("graph_sync_scheduler_skips_total").increment(1);
}

/// Record whether a cycle is running.
pub fn set_cycle_running(running: bool) {
    gauge!("graph_sync_cycle_running").set(if running { 1.0 } else { 0.0 });
}

/// Record an alert raised by the sync logger.
pub fn record_alert(event: &'static str) {
    counter!("graph_sync_alerts_total", "event" => event).increment(1);
}

/// Record per-kind count divergence between endpoints.
pub fn set_divergence(kind: &'static str, difference: u64) {
    gauge!("graph_sync_count_divergence", "kind" => kind).set(difference as f64);
}
