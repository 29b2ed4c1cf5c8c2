// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-node sync bookkeeping.
//!
//! One `SyncMeta` node per node identity lives in each store, keyed by
//! `nodeId`. It carries the two directional watermarks and the embedding
//! model digest the peer compares against. It has no `updatedAt`, so it is
//! never picked up by delta export.

use crate::error::{StoreError, StoreResult};
use crate::store::{GraphStore, Mutation, Node, NodeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Self-assigned identity, generated once and never regenerated.
    pub node_id: String,
    /// Last known identity of the other side.
    #[serde(default)]
    pub peer_id: Option<String>,
    /// Pull watermark: newest remote `updatedAt` already imported.
    #[serde(default = "epoch")]
    pub last_pull_at: DateTime<Utc>,
    /// Push watermark: newest local `updatedAt` already exported.
    #[serde(default = "epoch")]
    pub last_push_at: DateTime<Utc>,
    #[serde(default)]
    pub last_pull_count: u64,
    #[serde(default)]
    pub last_push_count: u64,
    #[serde(default)]
    pub embedding_model_hash: Option<String>,
}

impl SyncMeta {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            peer_id: None,
            last_pull_at: epoch(),
            last_push_at: epoch(),
            last_pull_count: 0,
            last_push_count: 0,
            embedding_model_hash: None,
        }
    }

    pub fn to_node(&self) -> StoreResult<Node> {
        let props = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            other => return Err(StoreError::Decode(format!("sync meta is not an object: {}", other))),
        };
        Ok(Node {
            kind: NodeKind::SyncMeta,
            key: self.node_id.clone(),
            updated_at: None,
            props,
        })
    }

    pub fn from_node(node: &Node) -> StoreResult<Self> {
        let mut props = node.props.clone();
        props
            .entry(NodeKind::SyncMeta.key_field().to_string())
            .or_insert_with(|| Value::String(node.key.clone()));
        Ok(serde_json::from_value(Value::Object(props))?)
    }
}

/// Read the meta record for `node_id`, if any.
pub async fn load_meta(store: &dyn GraphStore, node_id: &str) -> StoreResult<Option<SyncMeta>> {
    let nodes = store.get_nodes(NodeKind::SyncMeta, vec![node_id.to_string()]).await?;
    nodes.first().map(SyncMeta::from_node).transpose()
}

/// Read the meta record for `node_id`, creating and persisting a fresh one if absent.
pub async fn load_or_create_meta(store: &dyn GraphStore, node_id: &str) -> StoreResult<SyncMeta> {
    if let Some(meta) = load_meta(store, node_id).await? {
        return Ok(meta);
    }
    let meta = SyncMeta::new(node_id);
    save_meta(store, &meta).await?;
    tracing::info!(node_id, uri = store.uri(), "Created sync meta");
    Ok(meta)
}

pub async fn save_meta(store: &dyn GraphStore, meta: &SyncMeta) -> StoreResult<()> {
    store.apply(vec![Mutation::UpsertNode(meta.to_node()?)]).await
}

/// Every meta record in a store, sorted by node id.
pub async fn list_metas(store: &dyn GraphStore) -> StoreResult<Vec<SyncMeta>> {
    let nodes = store.list_nodes(NodeKind::SyncMeta).await?;
    let mut metas = nodes.iter().map(SyncMeta::from_node).collect::<StoreResult<Vec<_>>>()?;
    metas.sort_by(|a, b| a.node_id.cmp(&b.node_id));
    Ok(metas)
}

/// Meta records in a store that belong to some node other than `node_id`.
pub async fn peer_metas(store: &dyn GraphStore, node_id: &str) -> StoreResult<Vec<SyncMeta>> {
    Ok(list_metas(store)
        .await?
        .into_iter()
        .filter(|m| m.node_id != node_id)
        .collect())
}
