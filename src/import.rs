// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delta importer.
//!
//! Merges a [`DeltaExport`] into an endpoint. Every write is keyed on the
//! entity's natural key, so importing the same delta twice converges on the
//! same end state.
//!
//! # Order
//!
//! ```text
//! 1. categories, tools, technologies   last-write-wins on updatedAt
//! 2. users                             last-write-wins + interests set-union
//! 3. links                             first-write-wins once content exists
//! 4. edge arrays                       related, link refs, hierarchy, tool-tech
//! 5. category linkCount                recomputed from BELONGS_TO cardinality
//! ```
//!
//! Supporting entities land before the links that reference them. Derived
//! aggregates are never trusted from the wire.
//!
//! # Batching
//!
//! Each stage writes in batches of `batch_size` entities, each batch one
//! atomic [`GraphStore::apply`]. A failed batch is rolled back in full and
//! aborts the rest of the import; earlier batches stay committed.

use crate::error::StoreError;
use crate::metrics;
use crate::model::{
    Category, ConflictPolicy, DeltaExport, Entity, ExportedLink, ImportSummary, KeptSide, Link, SyncConflict,
    Technology, Tool, User,
};
use crate::store::{Edge, EdgeKind, GraphStore, Mutation, Node, NodeKind};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Property holding a category's derived link total.
pub const LINK_COUNT: &str = "linkCount";

/// Import aborted by a failed batch. Carries what was committed before it.
#[derive(Error, Debug, Clone)]
#[error("import aborted at {stage}: {source}")]
pub struct ImportError {
    pub stage: &'static str,
    pub partial: ImportSummary,
    #[source]
    pub source: StoreError,
}

/// Mutations, counts and conflicts for one atomic batch.
#[derive(Default)]
struct Batch {
    mutations: Vec<Mutation>,
    nodes: u64,
    relationships: u64,
    conflicts: Vec<SyncConflict>,
}

impl Batch {
    fn ensure(&mut self, kind: NodeKind, key: &str) {
        self.mutations.push(Mutation::EnsureNode {
            kind,
            key: key.to_string(),
        });
    }

    /// Merge an edge, creating stub endpoints when missing.
    fn link(&mut self, kind: EdgeKind, from: &str, to: &str, props: Map<String, Value>) {
        self.ensure(kind.from_kind(), from);
        self.ensure(kind.to_kind(), to);
        self.mutations.push(Mutation::MergeEdge(Edge {
            kind,
            from: from.to_string(),
            to: to.to_string(),
            props,
        }));
        self.relationships += 1;
    }

    fn conflict(&mut self, kind: NodeKind, key: &str, policy: ConflictPolicy, kept: KeptSide, detail: String) {
        self.conflicts.push(SyncConflict {
            entity_type: kind.as_str().to_string(),
            key: key.to_string(),
            policy,
            kept,
            detail,
        });
    }
}

/// Commits batches and accumulates the summary of what landed.
struct BatchWriter<'a> {
    store: &'a dyn GraphStore,
    summary: ImportSummary,
}

impl<'a> BatchWriter<'a> {
    fn new(store: &'a dyn GraphStore) -> Self {
        Self {
            store,
            summary: ImportSummary::default(),
        }
    }

    async fn commit(&mut self, stage: &'static str, batch: Batch) -> Result<(), ImportError> {
        let size = batch.mutations.len();
        if size > 0 {
            if let Err(source) = self.store.apply(batch.mutations).await {
                metrics::record_batch(false, size);
                warn!(stage, mutations = size, error = %source, "Import batch rolled back");
                return Err(ImportError {
                    stage,
                    partial: self.summary.clone(),
                    source,
                });
            }
            metrics::record_batch(true, size);
        }
        self.summary.nodes_imported += batch.nodes;
        self.summary.relationships_imported += batch.relationships;
        for conflict in &batch.conflicts {
            metrics::record_conflict(conflict.policy.as_str());
        }
        self.summary.conflicts.extend(batch.conflicts);
        Ok(())
    }

    /// Read the current nodes for a batch of keys.
    async fn existing(
        &self,
        stage: &'static str,
        kind: NodeKind,
        keys: Vec<String>,
    ) -> Result<HashMap<String, Node>, ImportError> {
        match self.store.get_nodes(kind, keys).await {
            Ok(nodes) => Ok(nodes.into_iter().map(|n| (n.key.clone(), n)).collect()),
            Err(source) => Err(ImportError {
                stage,
                partial: self.summary.clone(),
                source,
            }),
        }
    }
}

/// Keep one entry per key (newest `updatedAt` wins, later entries break ties),
/// preserving first-seen order. Entries with an empty key are returned separately.
fn latest_per_key<'a, T>(
    items: &'a [T],
    key: impl Fn(&T) -> &str,
    at: impl Fn(&T) -> Option<DateTime<Utc>>,
) -> (Vec<&'a T>, usize) {
    let mut order: Vec<&'a T> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut empty = 0;
    for item in items {
        let k = key(item);
        if k.trim().is_empty() {
            empty += 1;
            continue;
        }
        match index.get(k) {
            Some(&i) if at(order[i]) > at(item) => {}
            Some(&i) => order[i] = item,
            None => {
                index.insert(k, order.len());
                order.push(item);
            }
        }
    }
    (order, empty)
}

fn to_node<E: Entity>(entity: &E) -> Result<Node, StoreError> {
    entity.to_node().map_err(StoreError::from)
}

/// Last-write-wins for a supporting entity. `preserve` names local-only
/// properties carried over whichever side wins.
fn merge_lww(incoming: Node, existing: Option<&Node>, preserve: &[&str], batch: &mut Batch) {
    let key = incoming.key.clone();
    let kind = incoming.kind;
    let incoming_newer = match existing {
        None => true,
        Some(current) => match (current.updated_at, incoming.updated_at) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(local), Some(remote)) => remote > local,
        },
    };

    if incoming_newer {
        let mut node = incoming;
        if let Some(current) = existing {
            for name in preserve {
                if let Some(v) = current.props.get(*name) {
                    node.props.insert((*name).to_string(), v.clone());
                }
            }
        }
        batch.mutations.push(Mutation::UpsertNode(node));
        batch.nodes += 1;
        return;
    }

    if let Some(current) = existing {
        let strip = |props: &Map<String, Value>| {
            let mut p = props.clone();
            for name in preserve {
                p.remove(*name);
            }
            p
        };
        let identical = current.updated_at == incoming.updated_at && strip(&current.props) == strip(&incoming.props);
        if !identical {
            batch.conflict(
                kind,
                &key,
                ConflictPolicy::LastWriteWins,
                KeptSide::Local,
                format!(
                    "incoming updatedAt {} is not newer than local {}",
                    fmt_ts(incoming.updated_at),
                    fmt_ts(current.updated_at)
                ),
            );
        }
    }
    batch.nodes += 1;
}

fn fmt_ts(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "none".to_string())
}

async fn import_supporting<E: Entity>(
    writer: &mut BatchWriter<'_>,
    stage: &'static str,
    entities: &[E],
    batch_size: usize,
    prepare: impl Fn(&E) -> E,
    preserve: &[&str],
) -> Result<(), ImportError> {
    let (unique, empty) = latest_per_key(entities, |e| e.key(), |e| e.updated_at());
    if empty > 0 {
        let mut batch = Batch::default();
        for _ in 0..empty {
            batch.conflict(E::KIND, "", ConflictPolicy::Skipped, KeptSide::Neither, "empty natural key".into());
        }
        writer.commit(stage, batch).await?;
    }

    for chunk in unique.chunks(batch_size) {
        let keys = chunk.iter().map(|e| e.key().to_string()).collect();
        let existing = writer.existing(stage, E::KIND, keys).await?;
        let mut batch = Batch::default();
        for entity in chunk {
            let node = to_node(&prepare(entity)).map_err(|source| ImportError {
                stage,
                partial: writer.summary.clone(),
                source,
            })?;
            let current = existing.get(entity.key());
            merge_lww(node, current, preserve, &mut batch);
        }
        writer.commit(stage, batch).await?;
    }
    Ok(())
}

/// Sorted, deduplicated, non-blank union of two interest lists.
pub fn union_interests(local: &[String], incoming: &[String]) -> Vec<String> {
    local
        .iter()
        .chain(incoming.iter())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn import_users(writer: &mut BatchWriter<'_>, users: &[User], batch_size: usize) -> Result<(), ImportError> {
    const STAGE: &str = "users";
    let (unique, empty) = latest_per_key(users, |u| u.external_id.as_str(), |u| u.updated_at);
    if empty > 0 {
        let mut batch = Batch::default();
        for _ in 0..empty {
            batch.conflict(NodeKind::User, "", ConflictPolicy::Skipped, KeptSide::Neither, "empty external id".into());
        }
        writer.commit(STAGE, batch).await?;
    }

    for chunk in unique.chunks(batch_size) {
        let keys = chunk.iter().map(|u| u.external_id.clone()).collect();
        let existing = writer.existing(STAGE, NodeKind::User, keys).await?;
        let mut batch = Batch::default();

        for incoming in chunk {
            let local = match existing.get(&incoming.external_id) {
                Some(node) => match User::from_node(node) {
                    Ok(user) => Some(user),
                    Err(e) => {
                        warn!(key = %incoming.external_id, error = %e, "Local user undecodable, overwriting");
                        None
                    }
                },
                None => None,
            };

            let merged = match &local {
                None => {
                    let mut user = (*incoming).clone();
                    user.interests = union_interests(&[], &incoming.interests);
                    user
                }
                Some(current) => {
                    let union = union_interests(&current.interests, &incoming.interests);
                    let local_set: BTreeSet<&str> = current.interests.iter().map(|s| s.trim()).collect();
                    let incoming_set: BTreeSet<&str> = incoming.interests.iter().map(|s| s.trim()).collect();
                    if local_set != incoming_set {
                        batch.conflict(
                            NodeKind::User,
                            &incoming.external_id,
                            ConflictPolicy::SetUnion,
                            KeptSide::Both,
                            format!("interests merged to {:?}", union),
                        );
                    }

                    let incoming_newer = match (current.updated_at, incoming.updated_at) {
                        (None, _) => true,
                        (Some(_), None) => false,
                        (Some(l), Some(r)) => r > l,
                    };
                    let mut winner = if incoming_newer {
                        (*incoming).clone()
                    } else {
                        let mut scalars_in = (*incoming).clone();
                        scalars_in.interests = current.interests.clone();
                        if scalars_in != *current {
                            batch.conflict(
                                NodeKind::User,
                                &incoming.external_id,
                                ConflictPolicy::LastWriteWins,
                                KeptSide::Local,
                                format!(
                                    "incoming updatedAt {} is not newer than local {}",
                                    fmt_ts(incoming.updated_at),
                                    fmt_ts(current.updated_at)
                                ),
                            );
                        }
                        current.clone()
                    };
                    winner.interests = union;
                    winner
                }
            };

            if local.as_ref() != Some(&merged) {
                let node = to_node(&merged).map_err(|source| ImportError {
                    stage: STAGE,
                    partial: writer.summary.clone(),
                    source,
                })?;
                batch.mutations.push(Mutation::UpsertNode(node));
            }
            batch.nodes += 1;
        }
        writer.commit(STAGE, batch).await?;
    }
    Ok(())
}

/// Union membership edges a link carries (tags, tools, technologies).
fn merge_memberships(batch: &mut Batch, exported: &ExportedLink) {
    let url = exported.link.url.as_str();
    for tag in exported.tags.iter().filter(|t| !t.trim().is_empty()) {
        batch.link(EdgeKind::TaggedWith, url, tag, Map::new());
    }
    for tool in exported.tools.iter().filter(|t| !t.trim().is_empty()) {
        batch.link(EdgeKind::UsesTool, url, tool, Map::new());
    }
    for tech in exported.technologies.iter().filter(|t| !t.trim().is_empty()) {
        batch.link(EdgeKind::MentionsTechnology, url, tech, Map::new());
    }
}

async fn import_links(
    writer: &mut BatchWriter<'_>,
    links: &[ExportedLink],
    batch_size: usize,
) -> Result<(), ImportError> {
    const STAGE: &str = "links";
    let (unique, empty) = latest_per_key(links, |l| l.link.url.as_str(), |l| l.link.updated_at);
    if empty > 0 {
        let mut batch = Batch::default();
        for _ in 0..empty {
            batch.conflict(NodeKind::Link, "", ConflictPolicy::Skipped, KeptSide::Neither, "empty url".into());
        }
        writer.commit(STAGE, batch).await?;
    }

    for chunk in unique.chunks(batch_size) {
        let keys = chunk.iter().map(|l| l.link.url.clone()).collect();
        let existing = writer.existing(STAGE, NodeKind::Link, keys).await?;
        let mut batch = Batch::default();

        for exported in chunk {
            let url = exported.link.url.as_str();
            let current = existing.get(url);
            let has_local_content = current
                .and_then(|node| Link::from_node(node).ok())
                .is_some_and(|link| link.has_content());

            let mut node = to_node(&exported.link).map_err(|source| ImportError {
                stage: STAGE,
                partial: writer.summary.clone(),
                source,
            })?;

            // An echo of our own record (pushed back after a pull, or the same
            // delta imported again) changes nothing and takes the plain path.
            let echo = current.is_some_and(|c| {
                c.updated_at == node.updated_at && node.props.iter().all(|(k, v)| c.props.get(k) == Some(v))
            });
            if has_local_content && !echo {
                // Local content is authoritative; only memberships cross over.
                let before = batch.relationships;
                merge_memberships(&mut batch, exported);
                batch.conflict(
                    NodeKind::Link,
                    url,
                    ConflictPolicy::FirstWriteWins,
                    KeptSide::Local,
                    format!(
                        "content already present locally; kept local fields, merged {} memberships",
                        batch.relationships - before
                    ),
                );
                batch.nodes += 1;
                continue;
            }
            if let Some(current) = current {
                // Overlay incoming on local so local-only properties survive.
                let mut props = current.props.clone();
                props.extend(node.props);
                node.props = props;
            }
            batch.mutations.push(Mutation::UpsertNode(node));
            batch.nodes += 1;

            if let Some(category) = exported.category.as_deref().filter(|c| !c.trim().is_empty()) {
                batch.mutations.push(Mutation::RemoveEdgesFrom {
                    kind: EdgeKind::BelongsTo,
                    from: url.to_string(),
                });
                batch.link(EdgeKind::BelongsTo, url, category, Map::new());
            }
            merge_memberships(&mut batch, exported);
            if let Some(user) = exported.shared_by.as_deref().filter(|u| !u.trim().is_empty()) {
                batch.link(EdgeKind::SharedBy, user, url, Map::new());
            }
        }
        writer.commit(STAGE, batch).await?;
    }
    Ok(())
}

async fn import_edges(writer: &mut BatchWriter<'_>, delta: &DeltaExport, batch_size: usize) -> Result<(), ImportError> {
    const STAGE: &str = "relationships";
    let mut edges: Vec<(EdgeKind, &str, &str, Map<String, Value>)> = Vec::new();
    for r in &delta.related {
        let mut props = Map::new();
        if let Some(score) = serde_json::Number::from_f64(r.score) {
            props.insert("score".to_string(), Value::Number(score));
        }
        edges.push((EdgeKind::RelatedTo, r.from.as_str(), r.to.as_str(), props));
    }
    for r in &delta.link_refs {
        edges.push((EdgeKind::LinksTo, r.from.as_str(), r.to.as_str(), Map::new()));
    }
    for p in &delta.category_parents {
        edges.push((EdgeKind::SubcategoryOf, p.child.as_str(), p.parent.as_str(), Map::new()));
    }
    for t in &delta.tool_technologies {
        edges.push((EdgeKind::ToolUsesTechnology, t.tool.as_str(), t.technology.as_str(), Map::new()));
    }

    let mut skipped = Batch::default();
    edges.retain(|(kind, from, to, _)| {
        let valid = !from.trim().is_empty() && !to.trim().is_empty();
        if !valid {
            skipped.conflict(
                kind.from_kind(),
                from,
                ConflictPolicy::Skipped,
                KeptSide::Neither,
                format!("{} edge with empty endpoint", kind),
            );
        }
        valid
    });
    writer.commit(STAGE, skipped).await?;

    for chunk in edges.chunks(batch_size) {
        let mut batch = Batch::default();
        for (kind, from, to, props) in chunk {
            batch.link(*kind, from, to, props.clone());
        }
        writer.commit(STAGE, batch).await?;
    }
    Ok(())
}

/// Recompute every category's `linkCount` from actual BELONGS_TO edges.
async fn recompute_link_counts(writer: &mut BatchWriter<'_>, batch_size: usize) -> Result<(), ImportError> {
    const STAGE: &str = "recount";
    let store = writer.store;
    let fail = |writer: &BatchWriter<'_>, source| ImportError {
        stage: STAGE,
        partial: writer.summary.clone(),
        source,
    };
    let (counts, categories) = match tokio::try_join!(
        store.count_edges_by_target(EdgeKind::BelongsTo),
        store.list_nodes(NodeKind::Category),
    ) {
        Ok(pair) => pair,
        Err(source) => return Err(fail(writer, source)),
    };

    let updates: Vec<Mutation> = categories
        .into_iter()
        .filter_map(|category| {
            let actual = counts.get(&category.key).copied().unwrap_or(0);
            let stored = category.props.get(LINK_COUNT).and_then(Value::as_u64);
            (stored != Some(actual)).then(|| Mutation::SetNodeProperty {
                kind: NodeKind::Category,
                key: category.key,
                name: LINK_COUNT.to_string(),
                value: Value::from(actual),
            })
        })
        .collect();

    let changed = updates.len();
    for chunk in updates.chunks(batch_size) {
        let batch = Batch {
            mutations: chunk.to_vec(),
            ..Default::default()
        };
        writer.commit(STAGE, batch).await?;
    }
    debug!(categories_updated = changed, "Recomputed category link counts");
    Ok(())
}

/// Merge `delta` into `store`.
///
/// `batch_size` bounds the entities per transaction (clamped to at least 1).
pub async fn import_delta(
    store: &dyn GraphStore,
    delta: &DeltaExport,
    batch_size: usize,
) -> Result<ImportSummary, ImportError> {
    let batch_size = batch_size.max(1);
    let mut writer = BatchWriter::new(store);

    let strip_count = |c: &Category| {
        let mut c = c.clone();
        c.link_count = None;
        c.extra.remove(LINK_COUNT);
        c
    };
    import_supporting(&mut writer, "categories", &delta.categories, batch_size, strip_count, &[LINK_COUNT]).await?;
    import_supporting(&mut writer, "tools", &delta.tools, batch_size, Tool::clone, &[]).await?;
    import_supporting(&mut writer, "technologies", &delta.technologies, batch_size, Technology::clone, &[]).await?;
    import_users(&mut writer, &delta.users, batch_size).await?;
    import_links(&mut writer, &delta.links, batch_size).await?;
    import_edges(&mut writer, delta, batch_size).await?;
    recompute_link_counts(&mut writer, batch_size).await?;

    let summary = writer.summary;
    info!(
        uri = store.uri(),
        source = %delta.source_node_id,
        nodes = summary.nodes_imported,
        relationships = summary.relationships_imported,
        conflicts = summary.conflicts.len(),
        "Imported delta"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn delta() -> DeltaExport {
        DeltaExport::empty("peer", DateTime::UNIX_EPOCH)
    }

    fn tool(name: &str, at: i64, description: &str) -> Tool {
        let mut t = Tool::new(name);
        t.updated_at = Some(ts(at));
        t.description = Some(description.to_string());
        t
    }

    #[test]
    fn test_union_interests_sorted_dedup() {
        let local = vec!["ai".to_string(), "defi".to_string()];
        let incoming = vec!["crypto".to_string(), " ai ".to_string(), "".to_string()];
        assert_eq!(union_interests(&local, &incoming), vec!["ai", "crypto", "defi"]);
    }

    #[test]
    fn test_latest_per_key_keeps_newest() {
        let items = vec![tool("rg", 5, "old"), tool("fd", 1, "x"), tool("rg", 9, "new"), tool("", 1, "")];
        let (unique, empty) = latest_per_key(&items, |t| t.name.as_str(), |t| t.updated_at);
        assert_eq!(empty, 1);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].description.as_deref(), Some("new"));
        assert_eq!(unique[1].name, "fd");
    }

    #[tokio::test]
    async fn test_tool_lww_keeps_newer_local() {
        let store = MemoryGraphStore::new();
        store
            .seed(vec![Mutation::UpsertNode(tool("ripgrep", 200, "local").to_node().unwrap())])
            .await;

        let mut d = delta();
        d.tools.push(tool("ripgrep", 100, "incoming"));
        let summary = import_delta(&store, &d, 10).await.unwrap();

        let node = store.node(NodeKind::Tool, "ripgrep").await.unwrap();
        assert_eq!(node.str_prop("description"), Some("local"));
        assert_eq!(summary.conflicts.len(), 1);
        assert_eq!(summary.conflicts[0].policy, ConflictPolicy::LastWriteWins);
        assert_eq!(summary.conflicts[0].kept, KeptSide::Local);
    }

    #[tokio::test]
    async fn test_tool_lww_takes_newer_incoming() {
        let store = MemoryGraphStore::new();
        store
            .seed(vec![Mutation::UpsertNode(tool("ripgrep", 100, "local").to_node().unwrap())])
            .await;

        let mut d = delta();
        d.tools.push(tool("ripgrep", 300, "incoming"));
        let summary = import_delta(&store, &d, 10).await.unwrap();

        let node = store.node(NodeKind::Tool, "ripgrep").await.unwrap();
        assert_eq!(node.str_prop("description"), Some("incoming"));
        assert_eq!(node.updated_at, Some(ts(300)));
        assert!(summary.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_category_link_count_never_trusted() {
        let store = MemoryGraphStore::new();
        let mut d = delta();
        let mut category = Category::new("Tools");
        category.link_count = Some(999);
        category.updated_at = Some(ts(10));
        d.categories.push(category);

        import_delta(&store, &d, 10).await.unwrap();
        let node = store.node(NodeKind::Category, "Tools").await.unwrap();
        assert_eq!(node.props.get(LINK_COUNT), Some(&Value::from(0)));
    }

    #[tokio::test]
    async fn test_empty_key_is_skipped() {
        let store = MemoryGraphStore::new();
        let mut d = delta();
        d.links.push(ExportedLink::new(Link::new("")));
        let summary = import_delta(&store, &d, 10).await.unwrap();
        assert_eq!(summary.nodes_imported, 0);
        assert_eq!(summary.conflicts[0].policy, ConflictPolicy::Skipped);
        assert_eq!(store.node_counts().await.unwrap().get(NodeKind::Link), 0);
    }

    #[tokio::test]
    async fn test_batches_respect_size() {
        let store = MemoryGraphStore::new();
        let mut d = delta();
        for i in 0..5 {
            d.tools.push(tool(&format!("tool-{i}"), 10, "x"));
        }
        import_delta(&store, &d, 2).await.unwrap();
        // 3 tool batches; the recount has no categories to touch.
        assert_eq!(store.apply_calls(), 3);
        assert_eq!(store.node_counts().await.unwrap().get(NodeKind::Tool), 5);
    }

    #[tokio::test]
    async fn test_failed_batch_aborts_and_reports_partial() {
        let store = MemoryGraphStore::new();
        let mut d = delta();
        for i in 0..4 {
            d.tools.push(tool(&format!("tool-{i}"), 10, "x"));
        }
        d.technologies.push(Technology::new("rust"));
        store.fail_apply_after(1);

        let err = import_delta(&store, &d, 2).await.unwrap_err();
        assert_eq!(err.stage, "tools");
        assert_eq!(err.partial.nodes_imported, 2);
        // Second batch rolled back, technologies never attempted.
        assert_eq!(store.node_counts().await.unwrap().get(NodeKind::Tool), 2);
        assert_eq!(store.node_counts().await.unwrap().get(NodeKind::Technology), 0);
    }
}
