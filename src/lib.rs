// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Graph Sync
//!
//! Bidirectional synchronization between two property-graph stores holding a
//! shared knowledge graph of links, categories, tags, tools, technologies and
//! users, with health-checked failover for application queries.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                               graph-sync                                  │
//! │                                                                           │
//! │  ┌───────────┐ cron  ┌────────────┐ pull/push ┌─────────────────────────┐ │
//! │  │ Scheduler │──────►│ SyncEngine │──────────►│ export_delta ─► import_ │ │
//! │  │ (single-  │       │ (reachable │           │ (updatedAt > watermark) │ │
//! │  │  flight)  │       │  + model)  │           │  delta (merge policies) │ │
//! │  └───────────┘       └────────────┘           └─────────────────────────┘ │
//! │        │                   │                               │              │
//! │        ▼                   ▼                               ▼              │
//! │  ┌───────────┐       ┌────────────┐              ┌──────────────────┐     │
//! │  │ SyncLogger│       │ SyncMeta   │              │ GraphStore       │     │
//! │  │ (alerts)  │       │ watermarks │              │ local  ◄─► remote│     │
//! │  └───────────┘       └────────────┘              └──────────────────┘     │
//! │                                                           ▲               │
//! │  ┌───────────────┐   FailoverState   ┌────────────────┐   │               │
//! │  │ HealthMonitor │──────────────────►│ FailoverClient │───┘               │
//! │  └───────────────┘                   └────────────────┘                   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use graph_sync::{SyncConfig, SyncService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), graph_sync::SyncError> {
//!     let service = SyncService::open(SyncConfig::from_env()?).await?;
//!     service.start().await?;
//!
//!     let result = service.sync_now().await?;
//!     println!("pulled {} nodes", result.pull.nodes_imported);
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod failover;
pub mod health;
pub mod import;
pub mod metrics;
pub mod model;
pub mod model_hash;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod sync_log;

pub use config::SyncConfig;
pub use engine::{EngineConfig, SyncEngine};
pub use error::{Result, StoreError, StoreResult, SyncError};
pub use export::export_delta;
pub use failover::{FailoverClient, Session};
pub use health::{FailoverState, HealthConfig, HealthMonitor, NodeHealth, NodeRole};
pub use import::{import_delta, ImportError};
pub use model::{DeltaExport, SyncConflict, SyncCycleResult, SyncMeta, SyncResult};
pub use scheduler::Scheduler;
pub use service::{ServiceState, SyncService, SyncStatus};
pub use store::{open_endpoint, EndpointConfig, GraphStore, MemoryGraphStore, SqliteGraphStore};
pub use sync_log::{LogEntry, LogLevel, SyncEvent, SyncLogger};
