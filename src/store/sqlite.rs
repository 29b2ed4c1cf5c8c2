// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed graph store.
//!
//! Stores the property graph in two tables:
//!
//! ```text
//! graph_nodes(kind, key, updated_at, props)      PK (kind, key)
//! graph_edges(kind, from_key, to_key, props)     PK (kind, from_key, to_key)
//! ```
//!
//! `updated_at` is stored as microseconds since the epoch so the
//! `updatedAt > since` filter is an indexed integer comparison. `props` is
//! the node's open property bag as JSON text.
//!
//! The pool is opened lazily and the schema is created on first use, so a
//! handle to an endpoint that cannot be opened is still well-formed and
//! reports [`StoreError::Unavailable`] from its first call.

use super::{BoxFuture, Edge, EdgeKind, GraphStore, Mutation, Node, NodeCounts, NodeKind};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Keys per `IN (...)` list; stays under SQLite's bound-parameter limit.
const KEY_CHUNK: usize = 500;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS graph_nodes (
        kind TEXT NOT NULL,
        key TEXT NOT NULL,
        updated_at INTEGER,
        props TEXT NOT NULL,
        PRIMARY KEY (kind, key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_graph_nodes_updated ON graph_nodes (kind, updated_at)",
    r#"
    CREATE TABLE IF NOT EXISTS graph_edges (
        kind TEXT NOT NULL,
        from_key TEXT NOT NULL,
        to_key TEXT NOT NULL,
        props TEXT NOT NULL,
        PRIMARY KEY (kind, from_key, to_key)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_graph_edges_to ON graph_edges (kind, to_key)",
];

fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn from_micros(v: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_micros(v)
        .single()
        .ok_or_else(|| StoreError::Decode(format!("timestamp out of range: {}", v)))
}

fn parse_props(raw: &str) -> StoreResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!("props is not an object: {}", other))),
    }
}

fn node_from_row(row: &SqliteRow) -> StoreResult<Node> {
    let kind: String = row.try_get("kind")?;
    let kind = NodeKind::parse(&kind).ok_or_else(|| StoreError::Decode(format!("unknown node kind {}", kind)))?;
    let updated_at: Option<i64> = row.try_get("updated_at")?;
    let props: String = row.try_get("props")?;
    Ok(Node {
        kind,
        key: row.try_get("key")?,
        updated_at: updated_at.map(from_micros).transpose()?,
        props: parse_props(&props)?,
    })
}

fn edge_from_row(kind: EdgeKind, row: &SqliteRow) -> StoreResult<Edge> {
    let props: String = row.try_get("props")?;
    Ok(Edge {
        kind,
        from: row.try_get("from_key")?,
        to: row.try_get("to_key")?,
        props: parse_props(&props)?,
    })
}

/// Write failures surface as transaction errors unless the endpoint itself is gone.
fn tx_err(e: sqlx::Error) -> StoreError {
    match StoreError::from(e) {
        StoreError::Query(msg) => StoreError::Transaction(msg),
        other => other,
    }
}

/// SQLite [`GraphStore`] implementation.
pub struct SqliteGraphStore {
    uri: String,
    path: String,
    create: bool,
    pool: SqlitePool,
    schema: OnceCell<()>,
}

impl SqliteGraphStore {
    /// Build a lazily-connected handle.
    ///
    /// With `create == false` the database file must already exist; a
    /// missing file makes every call fail with [`StoreError::Unavailable`].
    pub fn open_lazy(uri: &str, path: &str, create: bool) -> Self {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);

        Self {
            uri: uri.to_string(),
            path: path.to_string(),
            create,
            pool,
            schema: OnceCell::new(),
        }
    }

    /// Database file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    async fn ready(&self) -> StoreResult<&SqlitePool> {
        self.schema
            .get_or_try_init(|| async {
                if self.create {
                    if let Some(parent) = Path::new(&self.path).parent().filter(|p| !p.as_os_str().is_empty()) {
                        tokio::fs::create_dir_all(parent)
                            .await
                            .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
                    }
                } else if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
                    return Err(StoreError::Unavailable(format!("{}: database file not found", self.path)));
                }
                for stmt in SCHEMA {
                    sqlx::query(stmt).execute(&self.pool).await?;
                }
                info!(uri = %self.uri, "Graph store schema ready");
                Ok::<(), StoreError>(())
            })
            .await?;
        Ok(&self.pool)
    }

    async fn apply_one(conn: &mut SqliteConnection, mutation: Mutation) -> Result<(), sqlx::Error> {
        match mutation {
            Mutation::UpsertNode(node) => {
                sqlx::query(
                    r#"
                    INSERT INTO graph_nodes (kind, key, updated_at, props)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(kind, key) DO UPDATE SET
                        updated_at = excluded.updated_at,
                        props = excluded.props
                    "#,
                )
                .bind(node.kind.as_str())
                .bind(&node.key)
                .bind(node.updated_at.map(to_micros))
                .bind(Value::Object(node.props).to_string())
                .execute(&mut *conn)
                .await?;
            }
            Mutation::EnsureNode { kind, key } => {
                let stub = Node::stub(kind, key);
                sqlx::query(
                    r#"
                    INSERT INTO graph_nodes (kind, key, updated_at, props)
                    VALUES (?, ?, NULL, ?)
                    ON CONFLICT(kind, key) DO NOTHING
                    "#,
                )
                .bind(kind.as_str())
                .bind(&stub.key)
                .bind(Value::Object(stub.props).to_string())
                .execute(&mut *conn)
                .await?;
            }
            Mutation::SetNodeProperty { kind, key, name, value } => {
                let current: Option<String> =
                    sqlx::query_scalar("SELECT props FROM graph_nodes WHERE kind = ? AND key = ?")
                        .bind(kind.as_str())
                        .bind(&key)
                        .fetch_optional(&mut *conn)
                        .await?;
                if let Some(raw) = current {
                    let mut props = parse_props(&raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
                    props.insert(name, value);
                    sqlx::query("UPDATE graph_nodes SET props = ? WHERE kind = ? AND key = ?")
                        .bind(Value::Object(props).to_string())
                        .bind(kind.as_str())
                        .bind(&key)
                        .execute(&mut *conn)
                        .await?;
                }
            }
            Mutation::MergeEdge(edge) => {
                sqlx::query(
                    r#"
                    INSERT INTO graph_edges (kind, from_key, to_key, props)
                    VALUES (?, ?, ?, ?)
                    ON CONFLICT(kind, from_key, to_key) DO UPDATE SET
                        props = excluded.props
                    "#,
                )
                .bind(edge.kind.as_str())
                .bind(&edge.from)
                .bind(&edge.to)
                .bind(Value::Object(edge.props).to_string())
                .execute(&mut *conn)
                .await?;
            }
            Mutation::RemoveEdgesFrom { kind, from } => {
                sqlx::query("DELETE FROM graph_edges WHERE kind = ? AND from_key = ?")
                    .bind(kind.as_str())
                    .bind(&from)
                    .execute(&mut *conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn edges_by_endpoint(
        &self,
        kind: EdgeKind,
        column: &'static str,
        keys: Vec<String>,
    ) -> StoreResult<Vec<Edge>> {
        let pool = self.ready().await?;
        let mut edges = Vec::new();
        for chunk in keys.chunks(KEY_CHUNK) {
            let mut qb = QueryBuilder::<Sqlite>::new("SELECT from_key, to_key, props FROM graph_edges WHERE kind = ");
            qb.push_bind(kind.as_str());
            qb.push(" AND ");
            qb.push(column);
            qb.push(" IN (");
            let mut sep = qb.separated(", ");
            for key in chunk {
                sep.push_bind(key.clone());
            }
            sep.push_unseparated(")");
            for row in qb.build().fetch_all(pool).await? {
                edges.push(edge_from_row(kind, &row)?);
            }
        }
        Ok(edges)
    }

    /// Close the pool (checkpointing WAL first).
    pub async fn close(&self) {
        if self.schema.initialized() {
            if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&self.pool).await {
                debug!(uri = %self.uri, error = %e, "WAL checkpoint on close failed");
            }
        }
        self.pool.close().await;
    }
}

impl GraphStore for SqliteGraphStore {
    fn uri(&self) -> &str {
        &self.uri
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let pool = self.ready().await?;
            sqlx::query("SELECT 1").execute(pool).await?;
            Ok(())
        })
    }

    fn get_nodes(&self, kind: NodeKind, keys: Vec<String>) -> BoxFuture<'_, Vec<Node>> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let mut nodes = Vec::with_capacity(keys.len());
            for chunk in keys.chunks(KEY_CHUNK) {
                let mut qb =
                    QueryBuilder::<Sqlite>::new("SELECT kind, key, updated_at, props FROM graph_nodes WHERE kind = ");
                qb.push_bind(kind.as_str());
                qb.push(" AND key IN (");
                let mut sep = qb.separated(", ");
                for key in chunk {
                    sep.push_bind(key.clone());
                }
                sep.push_unseparated(")");
                for row in qb.build().fetch_all(pool).await? {
                    nodes.push(node_from_row(&row)?);
                }
            }
            Ok(nodes)
        })
    }

    fn list_nodes(&self, kind: NodeKind) -> BoxFuture<'_, Vec<Node>> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let rows = sqlx::query("SELECT kind, key, updated_at, props FROM graph_nodes WHERE kind = ? ORDER BY key")
                .bind(kind.as_str())
                .fetch_all(pool)
                .await?;
            rows.iter().map(node_from_row).collect()
        })
    }

    fn nodes_changed_since(&self, kind: NodeKind, since: DateTime<Utc>) -> BoxFuture<'_, Vec<Node>> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let rows = sqlx::query(
                r#"
                SELECT kind, key, updated_at, props FROM graph_nodes
                WHERE kind = ? AND updated_at IS NOT NULL AND updated_at > ?
                ORDER BY updated_at
                "#,
            )
            .bind(kind.as_str())
            .bind(to_micros(since))
            .fetch_all(pool)
            .await?;
            rows.iter().map(node_from_row).collect()
        })
    }

    fn edges_from(&self, kind: EdgeKind, from_keys: Vec<String>) -> BoxFuture<'_, Vec<Edge>> {
        Box::pin(self.edges_by_endpoint(kind, "from_key", from_keys))
    }

    fn edges_to(&self, kind: EdgeKind, to_keys: Vec<String>) -> BoxFuture<'_, Vec<Edge>> {
        Box::pin(self.edges_by_endpoint(kind, "to_key", to_keys))
    }

    fn edges_changed_since(&self, kind: EdgeKind, since: DateTime<Utc>) -> BoxFuture<'_, Vec<Edge>> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let since = to_micros(since);
            let rows = sqlx::query(
                r#"
                SELECT e.from_key, e.to_key, e.props FROM graph_edges e
                LEFT JOIN graph_nodes a ON a.kind = ? AND a.key = e.from_key
                LEFT JOIN graph_nodes b ON b.kind = ? AND b.key = e.to_key
                WHERE e.kind = ? AND (a.updated_at > ? OR b.updated_at > ?)
                "#,
            )
            .bind(kind.from_kind().as_str())
            .bind(kind.to_kind().as_str())
            .bind(kind.as_str())
            .bind(since)
            .bind(since)
            .fetch_all(pool)
            .await?;
            rows.iter().map(|r| edge_from_row(kind, r)).collect()
        })
    }

    fn count_edges_by_target(&self, kind: EdgeKind) -> BoxFuture<'_, HashMap<String, u64>> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT to_key, COUNT(*) FROM graph_edges WHERE kind = ? GROUP BY to_key")
                    .bind(kind.as_str())
                    .fetch_all(pool)
                    .await?;
            Ok(rows.into_iter().map(|(k, n)| (k, n.max(0) as u64)).collect())
        })
    }

    fn apply(&self, mutations: Vec<Mutation>) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let count = mutations.len();
            let mut tx = pool.begin().await.map_err(tx_err)?;
            for mutation in mutations {
                // Dropping `tx` on error rolls the whole batch back.
                Self::apply_one(&mut *tx, mutation).await.map_err(tx_err)?;
            }
            tx.commit().await.map_err(tx_err)?;
            debug!(uri = %self.uri, mutations = count, "Committed batch");
            Ok(())
        })
    }

    fn node_counts(&self) -> BoxFuture<'_, NodeCounts> {
        Box::pin(async move {
            let pool = self.ready().await?;
            let rows: Vec<(String, i64)> = sqlx::query_as("SELECT kind, COUNT(*) FROM graph_nodes GROUP BY kind")
                .fetch_all(pool)
                .await?;
            let mut counts = NodeCounts::zeroed();
            for (kind, n) in rows {
                match NodeKind::parse(&kind) {
                    Some(NodeKind::SyncMeta) | None => {}
                    Some(k) => counts.set(k, n.max(0) as u64),
                }
            }
            Ok(counts)
        })
    }
}
