// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Graph store endpoint integration.
//!
//! Defines the interface the sync subsystem needs from a property-graph
//! store. Nothing beyond this trait is assumed: a node model keyed by natural
//! key, filtering by `updatedAt`, upsert-by-key, atomic batch writes and
//! per-kind counts.
//!
//! Two backends ship with the crate:
//!
//! - [`SqliteGraphStore`]: durable endpoint on SQLite (`sqlite://`, `file://`)
//! - [`MemoryGraphStore`]: in-process endpoint with fault injection (`memory://`)
//!
//! # Example
//!
//! ```rust,no_run
//! use graph_sync::store::{EndpointConfig, open_endpoint, NodeKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = open_endpoint(&EndpointConfig::new("sqlite://data/graph.db"))?;
//! store.ping().await?;
//! let counts = store.node_counts().await?;
//! println!("links: {}", counts.get(NodeKind::Link));
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod sqlite;
mod types;

pub use memory::MemoryGraphStore;
pub use sqlite::SqliteGraphStore;
pub use types::{Edge, EdgeKind, Mutation, Node, NodeCounts, NodeKind};

use crate::error::{StoreResult, SyncError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for boxed async futures (reduces trait signature complexity).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Connection schemes accepted for endpoint URIs.
pub const RECOGNIZED_SCHEMES: [&str; 3] = ["sqlite", "file", "memory"];

/// Trait defining what we need from a graph store endpoint.
///
/// Every method is a single round trip; callers compose them. Implementations
/// must be safe to call concurrently (reads run in parallel during export).
pub trait GraphStore: Send + Sync + 'static {
    /// The endpoint URI, for logging.
    fn uri(&self) -> &str;

    /// Trivial round trip used by health probes and reachability checks.
    fn ping(&self) -> BoxFuture<'_, ()>;

    /// Fetch nodes by natural key. Missing keys are omitted from the result.
    fn get_nodes(&self, kind: NodeKind, keys: Vec<String>) -> BoxFuture<'_, Vec<Node>>;

    /// Every node of a kind.
    fn list_nodes(&self, kind: NodeKind) -> BoxFuture<'_, Vec<Node>>;

    /// Nodes whose `updatedAt` is strictly after `since`. Nodes without an
    /// `updatedAt` are never returned.
    fn nodes_changed_since(&self, kind: NodeKind, since: DateTime<Utc>) -> BoxFuture<'_, Vec<Node>>;

    /// Edges of `kind` leaving any of `from_keys`.
    fn edges_from(&self, kind: EdgeKind, from_keys: Vec<String>) -> BoxFuture<'_, Vec<Edge>>;

    /// Edges of `kind` arriving at any of `to_keys`.
    fn edges_to(&self, kind: EdgeKind, to_keys: Vec<String>) -> BoxFuture<'_, Vec<Edge>>;

    /// Edges of `kind` where either endpoint's `updatedAt` is strictly after `since`.
    fn edges_changed_since(&self, kind: EdgeKind, since: DateTime<Utc>) -> BoxFuture<'_, Vec<Edge>>;

    /// Number of `kind` edges arriving at each target key.
    fn count_edges_by_target(&self, kind: EdgeKind) -> BoxFuture<'_, HashMap<String, u64>>;

    /// Apply a batch of writes atomically: either every mutation lands or none do.
    fn apply(&self, mutations: Vec<Mutation>) -> BoxFuture<'_, ()>;

    /// Per-kind node totals; kinds with no instances report zero.
    fn node_counts(&self) -> BoxFuture<'_, NodeCounts>;
}

/// How to reach one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub uri: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl EndpointConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            user: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }
}

/// A parsed endpoint URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointUri {
    /// SQLite file, created if missing.
    Sqlite { path: String },
    /// SQLite file that must already exist.
    File { path: String },
    /// Fresh in-process store.
    Memory { name: String },
}

impl EndpointUri {
    /// Parse `scheme://rest`. Only [`RECOGNIZED_SCHEMES`] are accepted.
    pub fn parse(uri: &str) -> Result<Self, String> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| format!("'{}' has no scheme (expected one of {:?})", uri, RECOGNIZED_SCHEMES))?;

        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" | "file" if rest.is_empty() => Err(format!("'{}' has an empty path", uri)),
            "sqlite" => Ok(Self::Sqlite { path: rest.to_string() }),
            "file" => Ok(Self::File { path: rest.to_string() }),
            "memory" => Ok(Self::Memory {
                name: if rest.is_empty() { "default".to_string() } else { rest.to_string() },
            }),
            other => Err(format!(
                "unrecognized scheme '{}' in '{}' (expected one of {:?})",
                other, uri, RECOGNIZED_SCHEMES
            )),
        }
    }
}

/// Open a handle to an endpoint.
///
/// Handles are lazy: no connection is made here, so an unreachable endpoint
/// still yields a well-formed handle that fails on first use. Only a
/// malformed URI is rejected.
pub fn open_endpoint(config: &EndpointConfig) -> crate::Result<Arc<dyn GraphStore>> {
    let parsed = EndpointUri::parse(&config.uri).map_err(SyncError::Config)?;
    if config.user.is_some() {
        tracing::debug!(uri = %config.uri, "Endpoint backend does not authenticate; credentials unused");
    }
    Ok(match parsed {
        EndpointUri::Sqlite { path } => Arc::new(SqliteGraphStore::open_lazy(&config.uri, &path, true)),
        EndpointUri::File { path } => Arc::new(SqliteGraphStore::open_lazy(&config.uri, &path, false)),
        EndpointUri::Memory { .. } => Arc::new(MemoryGraphStore::named(&config.uri)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recognized_schemes() {
        assert_eq!(
            EndpointUri::parse("sqlite://data/graph.db").unwrap(),
            EndpointUri::Sqlite { path: "data/graph.db".to_string() }
        );
        assert_eq!(
            EndpointUri::parse("file:///srv/peer.db").unwrap(),
            EndpointUri::File { path: "/srv/peer.db".to_string() }
        );
        assert_eq!(
            EndpointUri::parse("memory://").unwrap(),
            EndpointUri::Memory { name: "default".to_string() }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        let err = EndpointUri::parse("http://peer:7474").unwrap_err();
        assert!(err.contains("unrecognized scheme"));
    }

    #[test]
    fn test_parse_rejects_missing_scheme_and_empty_path() {
        assert!(EndpointUri::parse("peer.db").is_err());
        assert!(EndpointUri::parse("sqlite://").is_err());
    }

    #[test]
    fn test_open_endpoint_memory() {
        let store = open_endpoint(&EndpointConfig::new("memory://scratch")).unwrap();
        assert_eq!(store.uri(), "memory://scratch");
    }

    #[test]
    fn test_open_endpoint_bad_uri_is_config_error() {
        let err = open_endpoint(&EndpointConfig::new("ftp://x")).err().unwrap();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_password_never_serialized() {
        let cfg = EndpointConfig::new("sqlite://a.db").with_credentials("graph", "s3cret-value");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("s3cret-value"));
    }
}
