// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for graph sync.
//!
//! Errors are categorized by how the sync cycle reacts to them. Nothing in
//! this crate is fatal to the host process: every failure is caught, logged
//! and returned inside a structured [`SyncResult`](crate::model::SyncResult).
//!
//! # Error Categories
//!
//! | Error Type | Retryable | Description |
//! |------------|-----------|-------------|
//! | `Store` | Yes | A query or batch failed against an endpoint |
//! | `PeerUnreachable` | Yes | Peer endpoint did not answer the reachability probe |
//! | `Timeout` | Yes | A store call exceeded its deadline |
//! | `ModelMismatch` | No | Embedding models differ between nodes (blocks sync) |
//! | `AlreadyRunning` | No | A sync cycle is already in flight |
//! | `Config` | No | Configuration invalid |
//! | `Io` | No | Local file error (model file, sync log) |
//! | `Serialization` | No | JSON encode/decode failure |
//! | `InvalidState` | No | Service state machine violation |
//! | `Internal` | No | Unexpected internal error |
//!
//! # Retry Behavior
//!
//! Retryable errors leave the watermark untouched, so the next scheduled
//! cycle replays the same range. The importer's natural-key merge makes the
//! replay safe.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Result type for graph store endpoint calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`GraphStore`](crate::store::GraphStore) endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The endpoint could not be reached (connection refused, missing file,
    /// injected outage).
    #[error("endpoint unavailable: {0}")]
    Unavailable(String),

    /// A read query failed.
    #[error("query failed: {0}")]
    Query(String),

    /// A write transaction failed and was rolled back.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// A stored record could not be decoded.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Unavailable(e.to_string())
            }
            sqlx::Error::Database(ref db) if db.message().contains("unable to open") => {
                Self::Unavailable(e.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Self::Decode(e.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Errors that can occur while synchronizing two endpoints.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Endpoint query or transaction failure.
    #[error("Store error ({operation}): {message}")]
    Store {
        operation: String,
        message: String,
        #[source]
        source: Option<StoreError>,
    },

    /// The peer did not answer the reachability probe.
    #[error("Peer unreachable ({uri}): {message}")]
    PeerUnreachable { uri: String, message: String },

    /// A store call exceeded its deadline.
    #[error("Timed out: {operation}")]
    Timeout { operation: String },

    /// The two nodes run different embedding models.
    #[error("Embedding model mismatch: local={local} remote={remote}")]
    ModelMismatch { local: String, remote: String },

    /// A sync cycle is already running.
    #[error("Sync cycle already in progress")]
    AlreadyRunning,

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation attempted in the wrong lifecycle state.
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Wrap a store error with the operation that produced it.
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation: operation.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Create a store error without source.
    pub fn store_msg(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is retryable on the next cycle.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { .. } => true,
            Self::PeerUnreachable { .. } => true,
            Self::Timeout { .. } => true,
            Self::ModelMismatch { .. } => false, // operator must align models
            Self::AlreadyRunning => false,
            Self::Config(_) => false,
            Self::Io(_) => false,
            Self::Serialization(_) => false,
            Self::InvalidState { .. } => false,
            Self::Internal(_) => false,
        }
    }

    /// Short machine-readable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store { .. } => "store",
            Self::PeerUnreachable { .. } => "peer_unreachable",
            Self::Timeout { .. } => "timeout",
            Self::ModelMismatch { .. } => "model_mismatch",
            Self::AlreadyRunning => "already_running",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::InvalidState { .. } => "invalid_state",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        Self::store("unknown", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable_store() {
        let err = SyncError::store_msg("apply", "database is locked");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("apply"));
    }

    #[test]
    fn test_is_retryable_peer_unreachable() {
        let err = SyncError::PeerUnreachable {
            uri: "file:///srv/peer.db".to_string(),
            message: "unable to open database file".to_string(),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("file:///srv/peer.db"));
        assert_eq!(err.kind(), "peer_unreachable");
    }

    #[test]
    fn test_is_retryable_timeout() {
        let err = SyncError::Timeout {
            operation: "nodes_changed_since".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_not_retryable_model_mismatch() {
        let err = SyncError::ModelMismatch {
            local: "abc".to_string(),
            remote: "xyz".to_string(),
        };
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("xyz"));
    }

    #[test]
    fn test_not_retryable_config() {
        let err = SyncError::Config("SYNC_PEER_URI is required".to_string());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_retryable_already_running() {
        assert!(!SyncError::AlreadyRunning.is_retryable());
        assert_eq!(SyncError::AlreadyRunning.kind(), "already_running");
    }

    #[test]
    fn test_not_retryable_invalid_state() {
        let err = SyncError::InvalidState {
            expected: "Created".to_string(),
            actual: "Running".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Created"));
        assert!(err.to_string().contains("Running"));
    }

    #[test]
    fn test_store_error_conversion_keeps_source() {
        let err: SyncError = StoreError::Transaction("constraint failed".to_string()).into();
        match err {
            SyncError::Store { source, message, .. } => {
                assert_eq!(source, Some(StoreError::Transaction("constraint failed".to_string())));
                assert!(message.contains("constraint failed"));
            }
            other => panic!("expected Store, got {other:?}"),
        }
    }

    #[test]
    fn test_sqlx_pool_timeout_is_unavailable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_sqlx_row_not_found_is_query() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Query(_)));
    }
}
