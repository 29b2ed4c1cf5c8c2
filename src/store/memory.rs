// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process graph store.
//!
//! Backs `memory://` endpoints and the test suite. Besides the
//! [`GraphStore`] contract it offers fault injection: the endpoint can be
//! taken offline, and individual `apply` batches can be made to fail so
//! rollback behavior can be observed.

use super::{BoxFuture, Edge, EdgeKind, GraphStore, Mutation, Node, NodeCounts, NodeKind};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default, Clone)]
struct Graph {
    nodes: BTreeMap<(NodeKind, String), Node>,
    edges: BTreeMap<(EdgeKind, String, String), Edge>,
}

impl Graph {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::UpsertNode(node) => {
                self.nodes.insert((node.kind, node.key.clone()), node);
            }
            Mutation::EnsureNode { kind, key } => {
                self.nodes
                    .entry((kind, key.clone()))
                    .or_insert_with(|| Node::stub(kind, key));
            }
            Mutation::SetNodeProperty { kind, key, name, value } => {
                if let Some(node) = self.nodes.get_mut(&(kind, key)) {
                    node.props.insert(name, value);
                }
            }
            Mutation::MergeEdge(edge) => {
                self.edges
                    .insert((edge.kind, edge.from.clone(), edge.to.clone()), edge);
            }
            Mutation::RemoveEdgesFrom { kind, from } => {
                self.edges.retain(|(k, f, _), _| !(*k == kind && *f == from));
            }
        }
    }

    fn changed(&self, kind: NodeKind, key: &str, since: DateTime<Utc>) -> bool {
        self.nodes
            .get(&(kind, key.to_string()))
            .and_then(|n| n.updated_at)
            .is_some_and(|t| t > since)
    }
}

/// In-memory [`GraphStore`] implementation.
pub struct MemoryGraphStore {
    uri: String,
    graph: RwLock<Graph>,
    reachable: AtomicBool,
    /// Number of upcoming `apply` calls that succeed before one is failed.
    /// `usize::MAX` disables injection.
    fail_apply_after: AtomicUsize,
    apply_calls: AtomicUsize,
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryGraphStore {
    /// Create an empty, reachable store.
    pub fn new() -> Self {
        Self::named("memory://default")
    }

    /// Create an empty store reporting `uri`.
    pub fn named(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            graph: RwLock::new(Graph::default()),
            reachable: AtomicBool::new(true),
            fail_apply_after: AtomicUsize::new(usize::MAX),
            apply_calls: AtomicUsize::new(0),
        }
    }

    /// Simulate the endpoint going down or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Let the next `successes` apply batches commit, then fail the one after.
    pub fn fail_apply_after(&self, successes: usize) {
        self.fail_apply_after.store(successes, Ordering::SeqCst);
    }

    /// Total `apply` calls seen (including failed ones).
    pub fn apply_calls(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Snapshot one node (test helper, bypasses reachability).
    pub async fn node(&self, kind: NodeKind, key: &str) -> Option<Node> {
        self.graph.read().await.nodes.get(&(kind, key.to_string())).cloned()
    }

    /// Snapshot edges of a kind leaving `from` (test helper).
    pub async fn edges_of(&self, kind: EdgeKind, from: &str) -> Vec<Edge> {
        self.graph
            .read()
            .await
            .edges
            .values()
            .filter(|e| e.kind == kind && e.from == from)
            .cloned()
            .collect()
    }

    /// Seed nodes and edges directly (test helper, bypasses reachability).
    pub async fn seed(&self, mutations: Vec<Mutation>) {
        let mut graph = self.graph.write().await;
        for m in mutations {
            graph.apply(m);
        }
    }

    fn check_reachable(&self) -> Result<(), StoreError> {
        if self.is_reachable() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} is offline", self.uri)))
        }
    }
}

impl GraphStore for MemoryGraphStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.check_reachable() })
    }

    fn get_nodes(&self, kind: NodeKind, keys: Vec<String>) -> BoxFuture<'_, Vec<Node>> {
        Box::pin(async move {
            self.check_reachable()?;
            let graph = self.graph.read().await;
            Ok(keys
                .into_iter()
                .filter_map(|k| graph.nodes.get(&(kind, k)).cloned())
                .collect())
        })
    }

    fn list_nodes(&self, kind: NodeKind) -> BoxFuture<'_, Vec<Node>> {
        Box::pin(async move {
            self.check_reachable()?;
            let graph = self.graph.read().await;
            Ok(graph.nodes.values().filter(|n| n.kind == kind).cloned().collect())
        })
    }

    fn nodes_changed_since(&self, kind: NodeKind, since: DateTime<Utc>) -> BoxFuture<'_, Vec<Node>> {
        Box::pin(async move {
            self.check_reachable()?;
            let graph = self.graph.read().await;
            Ok(graph
                .nodes
                .values()
                .filter(|n| n.kind == kind && n.updated_at.is_some_and(|t| t > since))
                .cloned()
                .collect())
        })
    }

    fn edges_from(&self, kind: EdgeKind, from_keys: Vec<String>) -> BoxFuture<'_, Vec<Edge>> {
        Box::pin(async move {
            self.check_reachable()?;
            let wanted: HashSet<String> = from_keys.into_iter().collect();
            let graph = self.graph.read().await;
            Ok(graph
                .edges
                .values()
                .filter(|e| e.kind == kind && wanted.contains(&e.from))
                .cloned()
                .collect())
        })
    }

    fn edges_to(&self, kind: EdgeKind, to_keys: Vec<String>) -> BoxFuture<'_, Vec<Edge>> {
        Box::pin(async move {
            self.check_reachable()?;
            let wanted: HashSet<String> = to_keys.into_iter().collect();
            let graph = self.graph.read().await;
            Ok(graph
                .edges
                .values()
                .filter(|e| e.kind == kind && wanted.contains(&e.to))
                .cloned()
                .collect())
        })
    }

    fn edges_changed_since(&self, kind: EdgeKind, since: DateTime<Utc>) -> BoxFuture<'_, Vec<Edge>> {
        Box::pin(async move {
            self.check_reachable()?;
            let graph = self.graph.read().await;
            Ok(graph
                .edges
                .values()
                .filter(|e| {
                    e.kind == kind
                        && (graph.changed(kind.from_kind(), &e.from, since)
                            || graph.changed(kind.to_kind(), &e.to, since))
                })
                .cloned()
                .collect())
        })
    }

    fn count_edges_by_target(&self, kind: EdgeKind) -> BoxFuture<'_, HashMap<String, u64>> {
        Box::pin(async move {
            self.check_reachable()?;
            let graph = self.graph.read().await;
            let mut counts = HashMap::new();
            for edge in graph.edges.values().filter(|e| e.kind == kind) {
                *counts.entry(edge.to.clone()).or_insert(0) += 1;
            }
            Ok(counts)
        })
    }

    fn apply(&self, mutations: Vec<Mutation>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.check_reachable()?;
            self.apply_calls.fetch_add(1, Ordering::SeqCst);

            let remaining = self.fail_apply_after.load(Ordering::SeqCst);
            if remaining != usize::MAX {
                if remaining == 0 {
                    self.fail_apply_after.store(usize::MAX, Ordering::SeqCst);
                    return Err(StoreError::Transaction("injected batch failure".to_string()));
                }
                self.fail_apply_after.store(remaining - 1, Ordering::SeqCst);
            }

            // Stage on a copy so a failure mid-batch leaves nothing behind.
            let mut graph = self.graph.write().await;
            let mut staged = graph.clone();
            let count = mutations.len();
            for m in mutations {
                staged.apply(m);
            }
            *graph = staged;
            debug!(uri = %self.uri, mutations = count, "Applied batch");
            Ok(())
        })
    }

    fn node_counts(&self) -> BoxFuture<'_, NodeCounts> {
        Box::pin(async move {
            self.check_reachable()?;
            let graph = self.graph.read().await;
            let mut counts = NodeCounts::zeroed();
            for node in graph.nodes.values() {
                if node.kind != NodeKind::SyncMeta {
                    counts.set(node.kind, counts.get(node.kind) + 1);
                }
            }
            Ok(counts)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn link(url: &str, at: i64) -> Node {
        let mut node = Node::stub(NodeKind::Link, url);
        node.updated_at = Some(ts(at));
        node
    }

    #[tokio::test]
    async fn test_changed_since_is_exclusive() {
        let store = MemoryGraphStore::new();
        store
            .seed(vec![
                Mutation::UpsertNode(link("https://a", 100)),
                Mutation::UpsertNode(link("https://b", 200)),
            ])
            .await;

        let changed = store.nodes_changed_since(NodeKind::Link, ts(100)).await.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].key, "https://b");
    }

    #[tokio::test]
    async fn test_stub_nodes_never_reported_as_changed() {
        let store = MemoryGraphStore::new();
        store
            .seed(vec![Mutation::EnsureNode { kind: NodeKind::Tool, key: "rustc".into() }])
            .await;
        let changed = store.nodes_changed_since(NodeKind::Tool, ts(0)).await.unwrap();
        assert!(changed.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_node_keeps_existing() {
        let store = MemoryGraphStore::new();
        store.seed(vec![Mutation::UpsertNode(link("https://a", 100))]).await;
        store
            .apply(vec![Mutation::EnsureNode { kind: NodeKind::Link, key: "https://a".into() }])
            .await
            .unwrap();
        let node = store.node(NodeKind::Link, "https://a").await.unwrap();
        assert_eq!(node.updated_at, Some(ts(100)));
    }

    #[tokio::test]
    async fn test_edges_changed_when_either_endpoint_changed() {
        let store = MemoryGraphStore::new();
        store
            .seed(vec![
                Mutation::UpsertNode(link("https://old", 10)),
                Mutation::UpsertNode(link("https://new", 500)),
                Mutation::MergeEdge(Edge {
                    kind: EdgeKind::LinksTo,
                    from: "https://old".into(),
                    to: "https://new".into(),
                    props: Default::default(),
                }),
            ])
            .await;

        let edges = store.edges_changed_since(EdgeKind::LinksTo, ts(100)).await.unwrap();
        assert_eq!(edges.len(), 1);
        let none = store.edges_changed_since(EdgeKind::LinksTo, ts(500)).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_rolls_back_batch() {
        let store = MemoryGraphStore::new();
        store.fail_apply_after(1);

        store.apply(vec![Mutation::UpsertNode(link("https://a", 1))]).await.unwrap();
        let err = store
            .apply(vec![Mutation::UpsertNode(link("https://b", 2))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transaction(_)));
        assert!(store.node(NodeKind::Link, "https://b").await.is_none());

        // Injection is one-shot.
        store.apply(vec![Mutation::UpsertNode(link("https://c", 3))]).await.unwrap();
        assert_eq!(store.apply_calls(), 3);
    }

    #[tokio::test]
    async fn test_offline_store_rejects_calls() {
        let store = MemoryGraphStore::new();
        store.set_reachable(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.node_counts().await.is_err());
        store.set_reachable(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_counts_report_zero_for_empty_kinds() {
        let store = MemoryGraphStore::new();
        store.seed(vec![Mutation::UpsertNode(link("https://a", 1))]).await;
        let counts = store.node_counts().await.unwrap();
        assert_eq!(counts.get(NodeKind::Link), 1);
        assert_eq!(counts.get(NodeKind::Technology), 0);
        assert!(counts.0.contains_key(&NodeKind::Technology));
    }

    #[tokio::test]
    async fn test_count_edges_by_target() {
        let store = MemoryGraphStore::new();
        let belongs = |from: &str| {
            Mutation::MergeEdge(Edge {
                kind: EdgeKind::BelongsTo,
                from: from.into(),
                to: "Tools".into(),
                props: Default::default(),
            })
        };
        store.seed(vec![belongs("https://a"), belongs("https://b"), belongs("https://a")]).await;
        let counts = store.count_edges_by_target(EdgeKind::BelongsTo).await.unwrap();
        assert_eq!(counts.get("Tools"), Some(&2));
    }
}
