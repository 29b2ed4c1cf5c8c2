// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delta exporter.
//!
//! Reads everything that changed on one endpoint after a watermark. One read
//! per entity kind and one per edge kind, issued concurrently (all reads), so
//! each query stays bounded and independently retryable.
//!
//! # Boundary
//!
//! The filter is exclusive (`updatedAt > since`). A write landing in the same
//! instant as the previous watermark can be missed by the next cycle; the
//! boundary is kept exclusive so re-running a cycle never re-imports the
//! watermark entity.
//!
//! # Link membership
//!
//! Each exported link carries its category, tag, tool and technology names
//! and its sharer, so the importer rebuilds edges without extra lookups:
//!
//! ```text
//! (Link)-[BELONGS_TO]->(Category)         category
//! (Link)-[TAGGED_WITH]->(Tag)             tags
//! (Link)-[USES_TOOL]->(Tool)              tools
//! (Link)-[MENTIONS_TECHNOLOGY]->(Tech)    technologies
//! (User)-[SHARED_BY]->(Link)              shared_by
//! ```

use crate::error::StoreResult;
use crate::model::{
    Category, CategoryParent, DeltaExport, Entity, ExportedLink, Link, LinkRef, RelatedLink, Technology, Tool,
    ToolTechnology, User,
};
use crate::store::{Edge, EdgeKind, GraphStore, Node, NodeCounts};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Decode nodes, skipping (and logging) any that no longer fit the typed core.
fn decode_all<E: Entity>(nodes: Vec<Node>) -> Vec<E> {
    nodes
        .iter()
        .filter_map(|node| match E::from_node(node) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(kind = %node.kind, key = %node.key, error = %e, "Skipping undecodable node in export");
                None
            }
        })
        .collect()
}

/// Group edge targets by source key, sorted and deduplicated.
fn targets_by_source(edges: Vec<Edge>) -> HashMap<String, BTreeSet<String>> {
    let mut out: HashMap<String, BTreeSet<String>> = HashMap::new();
    for edge in edges {
        out.entry(edge.from).or_default().insert(edge.to);
    }
    out
}

/// Export every entity and edge changed on `store` after `since`.
pub async fn export_delta(
    store: &dyn GraphStore,
    source_node_id: &str,
    since: DateTime<Utc>,
) -> StoreResult<DeltaExport> {
    let (links, categories, tools, technologies, users) = tokio::try_join!(
        store.nodes_changed_since(Link::KIND, since),
        store.nodes_changed_since(Category::KIND, since),
        store.nodes_changed_since(Tool::KIND, since),
        store.nodes_changed_since(Technology::KIND, since),
        store.nodes_changed_since(User::KIND, since),
    )?;

    let (related, link_refs, category_parents, tool_technologies) = tokio::try_join!(
        store.edges_changed_since(EdgeKind::RelatedTo, since),
        store.edges_changed_since(EdgeKind::LinksTo, since),
        store.edges_changed_since(EdgeKind::SubcategoryOf, since),
        store.edges_changed_since(EdgeKind::ToolUsesTechnology, since),
    )?;

    let links: Vec<Link> = decode_all(links);
    let link_keys: Vec<String> = links.iter().map(|l| l.url.clone()).collect();

    let exported_links = if link_keys.is_empty() {
        Vec::new()
    } else {
        let (belongs, tagged, uses_tool, mentions, shared) = tokio::try_join!(
            store.edges_from(EdgeKind::BelongsTo, link_keys.clone()),
            store.edges_from(EdgeKind::TaggedWith, link_keys.clone()),
            store.edges_from(EdgeKind::UsesTool, link_keys.clone()),
            store.edges_from(EdgeKind::MentionsTechnology, link_keys.clone()),
            store.edges_to(EdgeKind::SharedBy, link_keys),
        )?;

        let categories = targets_by_source(belongs);
        let mut tags = targets_by_source(tagged);
        let mut tools = targets_by_source(uses_tool);
        let mut technologies = targets_by_source(mentions);
        let mut sharers: HashMap<String, BTreeSet<String>> = HashMap::new();
        for edge in shared {
            sharers.entry(edge.to).or_default().insert(edge.from);
        }

        links
            .into_iter()
            .map(|link| {
                let url = link.url.clone();
                ExportedLink {
                    // A link belongs to at most one category; take the first if the store holds more.
                    category: categories.get(&url).and_then(|c| c.iter().next().cloned()),
                    tags: tags.remove(&url).map(|s| s.into_iter().collect()).unwrap_or_default(),
                    tools: tools.remove(&url).map(|s| s.into_iter().collect()).unwrap_or_default(),
                    technologies: technologies.remove(&url).map(|s| s.into_iter().collect()).unwrap_or_default(),
                    shared_by: sharers.get(&url).and_then(|s| s.iter().next().cloned()),
                    link,
                }
            })
            .collect()
    };

    let delta = DeltaExport {
        source_node_id: source_node_id.to_string(),
        since,
        exported_at: Utc::now(),
        links: exported_links,
        categories: decode_all(categories),
        tools: decode_all(tools),
        technologies: decode_all(technologies),
        users: decode_all(users),
        related: related
            .into_iter()
            .map(|e| RelatedLink {
                score: e.props.get("score").and_then(serde_json::Value::as_f64).unwrap_or(0.0),
                from: e.from,
                to: e.to,
            })
            .collect(),
        link_refs: link_refs.into_iter().map(|e| LinkRef { from: e.from, to: e.to }).collect(),
        category_parents: category_parents
            .into_iter()
            .map(|e| CategoryParent { child: e.from, parent: e.to })
            .collect(),
        tool_technologies: tool_technologies
            .into_iter()
            .map(|e| ToolTechnology { tool: e.from, technology: e.to })
            .collect(),
    };

    debug!(
        uri = store.uri(),
        since = %since,
        entities = delta.entity_count(),
        edges = delta.edge_count(),
        "Exported delta"
    );
    Ok(delta)
}

/// Per-kind totals for status reporting and divergence alerts.
pub async fn node_counts(store: &dyn GraphStore) -> StoreResult<NodeCounts> {
    store.node_counts().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryGraphStore, Mutation, NodeKind};
    use chrono::TimeZone;
    use serde_json::{Map, Value};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn edge(kind: EdgeKind, from: &str, to: &str) -> Mutation {
        Mutation::MergeEdge(Edge {
            kind,
            from: from.into(),
            to: to.into(),
            props: Map::new(),
        })
    }

    fn link(url: &str, at: i64) -> Mutation {
        let mut l = Link::new(url);
        l.updated_at = Some(ts(at));
        Mutation::UpsertNode(l.to_node().unwrap())
    }

    async fn seeded() -> MemoryGraphStore {
        let store = MemoryGraphStore::new();
        let mut tools = Tool::new("ripgrep");
        tools.updated_at = Some(ts(50));
        let mut related = Map::new();
        related.insert("score".into(), Value::from(0.87));
        store
            .seed(vec![
                link("https://old", 10),
                link("https://new", 200),
                Mutation::UpsertNode(tools.to_node().unwrap()),
                Mutation::EnsureNode { kind: NodeKind::Category, key: "Tools".into() },
                Mutation::EnsureNode { kind: NodeKind::Tag, key: "cli".into() },
                Mutation::EnsureNode { kind: NodeKind::Tag, key: "search".into() },
                Mutation::EnsureNode { kind: NodeKind::User, key: "U1".into() },
                edge(EdgeKind::BelongsTo, "https://new", "Tools"),
                edge(EdgeKind::TaggedWith, "https://new", "search"),
                edge(EdgeKind::TaggedWith, "https://new", "cli"),
                edge(EdgeKind::UsesTool, "https://new", "ripgrep"),
                edge(EdgeKind::SharedBy, "U1", "https://new"),
                Mutation::MergeEdge(Edge {
                    kind: EdgeKind::RelatedTo,
                    from: "https://new".into(),
                    to: "https://old".into(),
                    props: related,
                }),
                edge(EdgeKind::LinksTo, "https://old", "https://old"),
            ])
            .await;
        store
    }

    #[tokio::test]
    async fn test_export_filters_by_watermark() {
        let store = seeded().await;
        let delta = export_delta(&store, "node-a", ts(100)).await.unwrap();

        assert_eq!(delta.links.len(), 1);
        assert!(delta.tools.is_empty());
        assert!(delta.categories.is_empty(), "stub categories have no updatedAt");

        let exported = &delta.links[0];
        assert_eq!(exported.link.url, "https://new");
        assert_eq!(exported.category.as_deref(), Some("Tools"));
        assert_eq!(exported.tags, vec!["cli".to_string(), "search".to_string()]);
        assert_eq!(exported.tools, vec!["ripgrep".to_string()]);
        assert_eq!(exported.shared_by.as_deref(), Some("U1"));

        // RELATED_TO is included because one endpoint changed; LINKS_TO is not.
        assert_eq!(delta.related.len(), 1);
        assert!((delta.related[0].score - 0.87).abs() < f64::EPSILON);
        assert!(delta.link_refs.is_empty());
    }

    #[tokio::test]
    async fn test_export_boundary_is_exclusive() {
        let store = seeded().await;
        let delta = export_delta(&store, "node-a", ts(200)).await.unwrap();
        assert!(delta.is_empty());
    }

    #[tokio::test]
    async fn test_export_from_epoch_includes_everything_timestamped() {
        let store = seeded().await;
        let delta = export_delta(&store, "node-a", DateTime::UNIX_EPOCH).await.unwrap();
        assert_eq!(delta.links.len(), 2);
        assert_eq!(delta.tools.len(), 1);
        assert_eq!(delta.link_refs.len(), 1);
        assert_eq!(delta.max_updated_at(), Some(ts(200)));
    }

    #[tokio::test]
    async fn test_node_counts_zero_for_empty_kinds() {
        let store = MemoryGraphStore::new();
        let counts = node_counts(&store).await.unwrap();
        assert_eq!(counts.get(NodeKind::Technology), 0);
        assert_eq!(counts.0.len(), NodeKind::COUNTED.len());
    }

    #[tokio::test]
    async fn test_export_unreachable_store_errors() {
        let store = seeded().await;
        store.set_reachable(false);
        assert!(export_delta(&store, "node-a", ts(0)).await.is_err());
    }
}
