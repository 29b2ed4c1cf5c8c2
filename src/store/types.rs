// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-graph records exchanged with a [`GraphStore`](super::GraphStore).
//!
//! Nodes are keyed by `(kind, natural key)` and carry an optional
//! `updatedAt` plus an open JSON property map. Edges are typed, directed and
//! keyed by `(kind, from, to)`; the node kinds at either end are implied by
//! the edge kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Node labels known to the sync subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Link,
    Category,
    Tag,
    Tool,
    Technology,
    User,
    SyncMeta,
}

impl NodeKind {
    /// Kinds reported by per-type counts (sync bookkeeping excluded).
    pub const COUNTED: [NodeKind; 6] = [
        NodeKind::Link,
        NodeKind::Category,
        NodeKind::Tag,
        NodeKind::Tool,
        NodeKind::Technology,
        NodeKind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "Link",
            Self::Category => "Category",
            Self::Tag => "Tag",
            Self::Tool => "Tool",
            Self::Technology => "Technology",
            Self::User => "User",
            Self::SyncMeta => "SyncMeta",
        }
    }

    /// Property holding the natural key.
    pub fn key_field(&self) -> &'static str {
        match self {
            Self::Link => "url",
            Self::User => "externalId",
            Self::SyncMeta => "nodeId",
            Self::Category | Self::Tag | Self::Tool | Self::Technology => "name",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Link" => Some(Self::Link),
            "Category" => Some(Self::Category),
            "Tag" => Some(Self::Tag),
            "Tool" => Some(Self::Tool),
            "Technology" => Some(Self::Technology),
            "User" => Some(Self::User),
            "SyncMeta" => Some(Self::SyncMeta),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types known to the sync subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Link → Category
    BelongsTo,
    /// Link → Tag
    TaggedWith,
    /// Link → Tool
    UsesTool,
    /// Link → Technology
    MentionsTechnology,
    /// User → Link
    SharedBy,
    /// Link → Link, carries `score`
    RelatedTo,
    /// Link → Link
    LinksTo,
    /// Category → Category (child to parent)
    SubcategoryOf,
    /// Tool → Technology
    ToolUsesTechnology,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BelongsTo => "BELONGS_TO",
            Self::TaggedWith => "TAGGED_WITH",
            Self::UsesTool => "USES_TOOL",
            Self::MentionsTechnology => "MENTIONS_TECHNOLOGY",
            Self::SharedBy => "SHARED_BY",
            Self::RelatedTo => "RELATED_TO",
            Self::LinksTo => "LINKS_TO",
            Self::SubcategoryOf => "SUBCATEGORY_OF",
            Self::ToolUsesTechnology => "TOOL_USES_TECHNOLOGY",
        }
    }

    pub fn from_kind(&self) -> NodeKind {
        match self {
            Self::BelongsTo
            | Self::TaggedWith
            | Self::UsesTool
            | Self::MentionsTechnology
            | Self::RelatedTo
            | Self::LinksTo => NodeKind::Link,
            Self::SharedBy => NodeKind::User,
            Self::SubcategoryOf => NodeKind::Category,
            Self::ToolUsesTechnology => NodeKind::Tool,
        }
    }

    pub fn to_kind(&self) -> NodeKind {
        match self {
            Self::BelongsTo | Self::SubcategoryOf => NodeKind::Category,
            Self::TaggedWith => NodeKind::Tag,
            Self::UsesTool => NodeKind::Tool,
            Self::MentionsTechnology | Self::ToolUsesTechnology => NodeKind::Technology,
            Self::SharedBy | Self::RelatedTo | Self::LinksTo => NodeKind::Link,
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub key: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub props: Map<String, Value>,
}

impl Node {
    /// A placeholder node holding only its natural key.
    pub fn stub(kind: NodeKind, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut props = Map::new();
        props.insert(kind.key_field().to_string(), Value::String(key.clone()));
        Self {
            kind,
            key,
            updated_at: None,
            props,
        }
    }

    /// String property, `None` when absent, null or not a string.
    pub fn str_prop(&self, name: &str) -> Option<&str> {
        self.props.get(name).and_then(Value::as_str)
    }
}

/// A stored edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub props: Map<String, Value>,
}

/// A single write inside an atomic [`GraphStore::apply`](super::GraphStore::apply) batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Create or fully replace a node's properties and `updatedAt`.
    UpsertNode(Node),
    /// Create a stub node if no node with this key exists; never modifies an
    /// existing one.
    EnsureNode { kind: NodeKind, key: String },
    /// Set one property without touching `updatedAt`. No-op if the node is missing.
    SetNodeProperty {
        kind: NodeKind,
        key: String,
        name: String,
        value: Value,
    },
    /// Create or replace an edge's properties.
    MergeEdge(Edge),
    /// Delete every edge of `kind` leaving `from`.
    RemoveEdgesFrom { kind: EdgeKind, from: String },
}

/// Per-kind node totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeCounts(pub BTreeMap<NodeKind, u64>);

impl NodeCounts {
    /// Counts with every counted kind present (zero when empty).
    pub fn zeroed() -> Self {
        Self(NodeKind::COUNTED.iter().map(|k| (*k, 0)).collect())
    }

    pub fn get(&self, kind: NodeKind) -> u64 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    pub fn set(&mut self, kind: NodeKind, count: u64) {
        self.0.insert(kind, count);
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Absolute per-kind difference against `other`.
    pub fn divergence(&self, other: &NodeCounts) -> BTreeMap<NodeKind, u64> {
        NodeKind::COUNTED
            .iter()
            .map(|k| (*k, self.get(*k).abs_diff(other.get(*k))))
            .collect()
    }
}
