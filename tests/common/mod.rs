// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared test utilities for integration and property tests.
//!
//! This module provides:
//! - Timestamp and entity builders
//! - Delta fixtures
//! - Seeded `MemoryGraphStore` pairs and an engine wired to them

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use graph_sync::model::{Category, DeltaExport, Entity, ExportedLink, Link, Tool, User};
use graph_sync::store::{EdgeKind, MemoryGraphStore, Mutation};
use graph_sync::{EngineConfig, SyncEngine, SyncLogger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn link(url: &str, at: i64) -> Link {
    let mut link = Link::new(url);
    link.title = Some(format!("Title of {}", url));
    link.updated_at = Some(ts(at));
    link
}

pub fn processed_link(url: &str, at: i64, content: &str) -> Link {
    let mut link = link(url, at);
    link.content = Some(content.to_string());
    link
}

pub fn exported(link: Link, category: Option<&str>, tags: &[&str]) -> ExportedLink {
    let mut e = ExportedLink::new(link);
    e.category = category.map(str::to_string);
    e.tags = tags.iter().map(|t| t.to_string()).collect();
    e
}

pub fn user(id: &str, at: i64, interests: &[&str]) -> User {
    let mut u = User::new(id);
    u.interests = interests.iter().map(|i| i.to_string()).collect();
    u.updated_at = Some(ts(at));
    u
}

pub fn tool(name: &str, at: i64, description: &str) -> Tool {
    let mut t = Tool::new(name);
    t.description = Some(description.to_string());
    t.updated_at = Some(ts(at));
    t
}

pub fn category(name: &str, at: i64) -> Category {
    let mut c = Category::new(name);
    c.updated_at = Some(ts(at));
    c
}

pub fn delta() -> DeltaExport {
    DeltaExport::empty("peer-node", DateTime::UNIX_EPOCH)
}

/// Upsert mutation for any entity.
pub fn upsert<E: Entity>(entity: &E) -> Mutation {
    Mutation::UpsertNode(entity.to_node().unwrap())
}

/// Seed a link into a store together with its tag edges.
pub async fn seed_link(store: &MemoryGraphStore, link: &Link, tags: &[&str]) {
    let mut mutations = vec![upsert(link)];
    for tag in tags {
        mutations.push(Mutation::MergeEdge(graph_sync::store::Edge {
            kind: EdgeKind::TaggedWith,
            from: link.url.clone(),
            to: tag.to_string(),
            props: Default::default(),
        }));
    }
    store.seed(mutations).await;
}

/// Sorted tag names on a link.
pub async fn tags_of(store: &MemoryGraphStore, url: &str) -> Vec<String> {
    let mut tags: Vec<String> = store
        .edges_of(EdgeKind::TaggedWith, url)
        .await
        .into_iter()
        .map(|e| e.to)
        .collect();
    tags.sort();
    tags
}

pub struct Pair {
    pub local: Arc<MemoryGraphStore>,
    pub remote: Arc<MemoryGraphStore>,
    pub logger: Arc<SyncLogger>,
}

impl Pair {
    pub fn new() -> Self {
        Self {
            local: Arc::new(MemoryGraphStore::named("memory://local")),
            remote: Arc::new(MemoryGraphStore::named("memory://remote")),
            logger: Arc::new(SyncLogger::in_memory(100)),
        }
    }

    pub fn engine(&self, node_id: &str, model_path: Option<PathBuf>) -> SyncEngine {
        SyncEngine::new(
            node_id,
            self.local.clone(),
            self.remote.clone(),
            EngineConfig {
                batch_size: 50,
                query_timeout: Some(Duration::from_secs(10)),
                model_path,
            },
            self.logger.clone(),
        )
    }

    /// The same two stores seen from the peer's side.
    pub fn mirrored_engine(&self, node_id: &str) -> SyncEngine {
        SyncEngine::new(
            node_id,
            self.remote.clone(),
            self.local.clone(),
            EngineConfig {
                batch_size: 50,
                query_timeout: Some(Duration::from_secs(10)),
                model_path: None,
            },
            Arc::new(SyncLogger::in_memory(100)),
        )
    }
}
