// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merge-policy tests for the delta importer.
//!
//! # Test Organization
//! - `import_*` - idempotence and batching
//! - `link_*` - first-write-wins on processed content, membership union
//! - `user_*` - interests set-union
//! - `category_*` - derived link counts

mod common;

use common::*;
use graph_sync::import::{import_delta, union_interests, LINK_COUNT};
use graph_sync::model::{ConflictPolicy, Entity, KeptSide, Link, User};
use graph_sync::store::{EdgeKind, GraphStore, MemoryGraphStore, NodeKind};
use serde_json::json;

// =============================================================================
// Idempotence
// =============================================================================

fn rich_delta() -> graph_sync::DeltaExport {
    let mut d = delta();
    d.categories.push(category("Tools", 10));
    d.tools.push(tool("ripgrep", 10, "fast grep"));
    d.users.push(user("u-1", 10, &["ai", "rust"]));
    let mut a = exported(link("https://a.example", 20), Some("Tools"), &["cli", "search"]);
    a.tools.push("ripgrep".into());
    a.shared_by = Some("u-1".into());
    d.links.push(a);
    d.links.push(exported(link("https://b.example", 21), Some("Tools"), &["cli"]));
    let mut c = exported(processed_link("https://c.example", 22, "body"), Some("Tools"), &["rust"]);
    c.shared_by = Some("u-1".into());
    d.links.push(c);
    d.related.push(graph_sync::model::RelatedLink {
        from: "https://a.example".into(),
        to: "https://b.example".into(),
        score: 0.87,
    });
    d
}

#[tokio::test]
async fn import_twice_yields_same_state() {
    let store = MemoryGraphStore::new();
    let d = rich_delta();

    let first = import_delta(&store, &d, 2).await.unwrap();
    let counts_first = store.node_counts().await.unwrap();
    let a_first = store.node(NodeKind::Link, "https://a.example").await.unwrap();
    let tools_first = store.node(NodeKind::Category, "Tools").await.unwrap();

    let second = import_delta(&store, &d, 2).await.unwrap();
    assert_eq!(second.nodes_imported, first.nodes_imported);
    assert_eq!(second.relationships_imported, first.relationships_imported);
    assert!(first.conflicts.is_empty(), "{:?}", first.conflicts);
    // Identical supporting nodes and the already-processed link are not conflicts.
    assert!(second.conflicts.is_empty(), "{:?}", second.conflicts);

    assert_eq!(store.node_counts().await.unwrap(), counts_first);
    assert_eq!(store.node(NodeKind::Link, "https://a.example").await.unwrap(), a_first);
    assert_eq!(store.node(NodeKind::Category, "Tools").await.unwrap(), tools_first);
    assert_eq!(tags_of(&store, "https://a.example").await, vec!["cli", "search"]);
    assert_eq!(store.edges_of(EdgeKind::RelatedTo, "https://a.example").await.len(), 1);
    assert_eq!(store.edges_of(EdgeKind::SharedBy, "u-1").await.len(), 2);
    assert_eq!(tools_first.props.get(LINK_COUNT), Some(&json!(3)));
}

#[tokio::test]
async fn import_identical_supporting_node_is_not_a_conflict() {
    let store = MemoryGraphStore::new();
    store.seed(vec![upsert(&tool("ripgrep", 10, "fast grep"))]).await;

    let mut d = delta();
    d.tools.push(tool("ripgrep", 10, "fast grep"));
    let summary = import_delta(&store, &d, 10).await.unwrap();
    assert_eq!(summary.nodes_imported, 1);
    assert!(summary.conflicts.is_empty());

    // Same timestamp, different value: local kept and reported.
    let mut d = delta();
    d.tools.push(tool("ripgrep", 10, "changed"));
    let summary = import_delta(&store, &d, 10).await.unwrap();
    assert_eq!(summary.conflicts.len(), 1);
    assert_eq!(summary.conflicts[0].policy, ConflictPolicy::LastWriteWins);
    assert_eq!(summary.conflicts[0].kept, KeptSide::Local);
}

#[tokio::test]
async fn import_failed_batch_rolls_back_only_that_batch() {
    let store = MemoryGraphStore::new();
    let mut d = delta();
    for i in 0..6 {
        d.tools.push(tool(&format!("tool-{}", i), 10, "x"));
    }
    // tools are imported in batches of 2: first two batches commit, third fails.
    store.fail_apply_after(2);

    let err = import_delta(&store, &d, 2).await.unwrap_err();
    assert_eq!(err.stage, "tools");
    assert_eq!(err.partial.nodes_imported, 4);
    assert_eq!(store.node_counts().await.unwrap().get(NodeKind::Tool), 4);
    assert!(store.node(NodeKind::Tool, "tool-4").await.is_none());
}

// =============================================================================
// Links
// =============================================================================

#[tokio::test]
async fn link_with_local_content_keeps_content_and_unions_tags() {
    let store = MemoryGraphStore::new();
    let local = processed_link("https://a.example", 50, "local body");
    seed_link(&store, &local, &["rust", "async"]).await;

    let mut incoming = processed_link("https://a.example", 90, "remote body");
    incoming.title = Some("Remote title".into());
    let mut d = delta();
    d.links.push(exported(incoming, None, &["tokio", "rust"]));

    let summary = import_delta(&store, &d, 10).await.unwrap();

    let node = store.node(NodeKind::Link, "https://a.example").await.unwrap();
    let merged = Link::from_node(&node).unwrap();
    assert_eq!(merged.content.as_deref(), Some("local body"));
    assert_eq!(merged.title, local.title);
    assert_eq!(tags_of(&store, "https://a.example").await, vec!["async", "rust", "tokio"]);

    let conflict = summary
        .conflicts
        .iter()
        .find(|c| c.key == "https://a.example")
        .unwrap();
    assert_eq!(conflict.policy, ConflictPolicy::FirstWriteWins);
    assert_eq!(conflict.kept, KeptSide::Local);
}

#[tokio::test]
async fn link_stub_is_overwritten_and_keeps_unknown_fields() {
    let store = MemoryGraphStore::new();
    let mut stub = link("https://a.example", 5);
    stub.extra.insert("localOnly".into(), json!("keep me"));
    seed_link(&store, &stub, &[]).await;

    let mut incoming = processed_link("https://a.example", 80, "body");
    incoming.extra.insert("futureField".into(), json!({"nested": true}));
    let mut d = delta();
    d.links.push(exported(incoming, Some("Reading"), &["new"]));

    let summary = import_delta(&store, &d, 10).await.unwrap();
    assert!(summary.conflicts.is_empty());

    let node = store.node(NodeKind::Link, "https://a.example").await.unwrap();
    let merged = Link::from_node(&node).unwrap();
    assert_eq!(merged.content.as_deref(), Some("body"));
    assert_eq!(merged.updated_at, Some(ts(80)));
    assert_eq!(merged.extra.get("futureField"), Some(&json!({"nested": true})));
    assert_eq!(merged.extra.get("localOnly"), Some(&json!("keep me")));
    let category = store.edges_of(EdgeKind::BelongsTo, "https://a.example").await;
    assert_eq!(category.len(), 1);
    assert_eq!(category[0].to, "Reading");
}

#[tokio::test]
async fn link_recategorized_moves_to_new_category() {
    let store = MemoryGraphStore::new();
    let mut d = delta();
    d.links.push(exported(link("https://a.example", 10), Some("Old"), &[]));
    import_delta(&store, &d, 10).await.unwrap();

    let mut d = delta();
    d.links.push(exported(link("https://a.example", 20), Some("New"), &[]));
    import_delta(&store, &d, 10).await.unwrap();

    let edges = store.edges_of(EdgeKind::BelongsTo, "https://a.example").await;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].to, "New");
    let old = store.node(NodeKind::Category, "Old").await.unwrap();
    assert_eq!(old.props.get(LINK_COUNT), Some(&json!(0)));
}

// =============================================================================
// Users
// =============================================================================

async fn interests_after(local: &[&str], incoming: &[&str], local_newer: bool) -> Vec<String> {
    let store = MemoryGraphStore::new();
    let (local_at, incoming_at) = if local_newer { (20, 10) } else { (10, 20) };
    store.seed(vec![upsert(&user("u-1", local_at, local))]).await;

    let mut d = delta();
    d.users.push(user("u-1", incoming_at, incoming));
    import_delta(&store, &d, 10).await.unwrap();

    let node = store.node(NodeKind::User, "u-1").await.unwrap();
    User::from_node(&node).unwrap().interests
}

#[tokio::test]
async fn user_interests_union_regardless_of_order() {
    let expected = vec!["ai".to_string(), "crypto".to_string(), "defi".to_string()];
    assert_eq!(interests_after(&["ai", "defi"], &["ai", "crypto"], false).await, expected);
    assert_eq!(interests_after(&["ai", "defi"], &["ai", "crypto"], true).await, expected);
    assert_eq!(interests_after(&["ai", "crypto"], &["ai", "defi"], false).await, expected);
    assert_eq!(union_interests(&["ai".into()], &["ai".into(), " ai ".into()]), vec!["ai"]);
}

#[tokio::test]
async fn user_scalars_follow_last_write_wins() {
    let store = MemoryGraphStore::new();
    let mut local = user("u-1", 50, &[]);
    local.display_name = Some("Local Name".into());
    store.seed(vec![upsert(&local)]).await;

    let mut stale = user("u-1", 10, &[]);
    stale.display_name = Some("Stale Name".into());
    let mut d = delta();
    d.users.push(stale);
    let summary = import_delta(&store, &d, 10).await.unwrap();

    let node = store.node(NodeKind::User, "u-1").await.unwrap();
    assert_eq!(User::from_node(&node).unwrap().display_name.as_deref(), Some("Local Name"));
    assert!(summary
        .conflicts
        .iter()
        .any(|c| c.policy == ConflictPolicy::LastWriteWins && c.kept == KeptSide::Local));
}

// =============================================================================
// Categories
// =============================================================================

#[tokio::test]
async fn category_count_recomputed_from_edges() {
    let store = MemoryGraphStore::new();
    let mut d = delta();
    let mut wire = category("Tools", 10);
    wire.link_count = Some(999);
    d.categories.push(wire);
    for (i, url) in ["https://1.example", "https://2.example", "https://3.example"].iter().enumerate() {
        d.links.push(exported(link(url, 20 + i as i64), Some("Tools"), &[]));
    }

    import_delta(&store, &d, 2).await.unwrap();
    let node = store.node(NodeKind::Category, "Tools").await.unwrap();
    assert_eq!(node.props.get(LINK_COUNT), Some(&json!(3)));
}
