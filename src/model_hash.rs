// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Embedding model verification.
//!
//! Two nodes may only exchange data when they embed text with byte-identical
//! models; otherwise vectors computed on one side are meaningless on the
//! other. Each node records the SHA-256 of its model file in its own
//! `SyncMeta`, and compares against the digest the peer recorded.
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | digests equal | match |
//! | peer never recorded a digest | match (first contact) |
//! | digests differ | mismatch, cycle blocked |
//! | local file unreadable | caller logs and skips verification |

use crate::error::{Result, SyncError};
use crate::model::{load_or_create_meta, peer_metas, save_meta, ModelCheck};
use crate::store::GraphStore;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

const CHUNK_SIZE: usize = 64 * 1024;

/// Streaming SHA-256 of a file, hex encoded.
pub async fn compute_file_hash(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path.as_ref()).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a local digest against the digest stored by the peer.
///
/// Persists `local_hash` into the local meta for `node_id` first, so the
/// peer can compare against us on its next cycle.
pub async fn verify_hash(
    local_hash: &str,
    local: &dyn GraphStore,
    remote: &dyn GraphStore,
    node_id: &str,
) -> Result<ModelCheck> {
    let mut meta = load_or_create_meta(local, node_id)
        .await
        .map_err(|e| SyncError::store("load_meta", e))?;
    if meta.embedding_model_hash.as_deref() != Some(local_hash) {
        meta.embedding_model_hash = Some(local_hash.to_string());
        save_meta(local, &meta)
            .await
            .map_err(|e| SyncError::store("save_meta", e))?;
        info!(node_id, hash = %local_hash, "Recorded local embedding model hash");
    }

    let remote_hash = peer_metas(remote, node_id)
        .await
        .map_err(|e| SyncError::store("read_peer_meta", e))?
        .into_iter()
        .find_map(|m| m.embedding_model_hash);

    let matched = remote_hash.as_deref().map_or(true, |r| r == local_hash);
    debug!(node_id, local = %local_hash, remote = ?remote_hash, matched, "Model hash compared");

    Ok(ModelCheck {
        matched,
        local_hash: Some(local_hash.to_string()),
        remote_hash,
        skipped: None,
    })
}

/// Hash the local model file, then [`verify_hash`].
///
/// A read failure on the local file surfaces as [`SyncError::Io`]; the
/// orchestrator treats that as "skip verification" rather than a mismatch.
pub async fn verify_model_match(
    local_path: impl AsRef<Path>,
    local: &dyn GraphStore,
    remote: &dyn GraphStore,
    node_id: &str,
) -> Result<ModelCheck> {
    let local_hash = compute_file_hash(local_path).await?;
    verify_hash(&local_hash, local, remote, node_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{load_meta, SyncMeta};
    use crate::store::MemoryGraphStore;
    use std::io::Write;

    #[tokio::test]
    async fn test_hash_known_value() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abc").unwrap();
        let hash = compute_file_hash(file.path()).await.unwrap();
        assert_eq!(hash, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[tokio::test]
    async fn test_hash_spans_chunks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = vec![7u8; CHUNK_SIZE * 2 + 17];
        file.write_all(&data).unwrap();
        let streamed = compute_file_hash(file.path()).await.unwrap();
        assert_eq!(streamed, hex::encode(Sha256::digest(&data)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let local = MemoryGraphStore::new();
        let remote = MemoryGraphStore::new();
        let err = verify_model_match("/nonexistent/model.gguf", &local, &remote, "a")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }

    #[tokio::test]
    async fn test_first_contact_matches_and_persists() {
        let local = MemoryGraphStore::new();
        let remote = MemoryGraphStore::new();
        let check = verify_hash("abc", &local, &remote, "node-a").await.unwrap();
        assert!(check.matched);
        assert!(check.remote_hash.is_none());

        let meta = load_meta(&local, "node-a").await.unwrap().unwrap();
        assert_eq!(meta.embedding_model_hash.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_mismatch_detected() {
        let local = MemoryGraphStore::new();
        let remote = MemoryGraphStore::new();
        let mut peer = SyncMeta::new("node-b");
        peer.embedding_model_hash = Some("xyz".into());
        save_meta(&remote, &peer).await.unwrap();

        let check = verify_hash("abc", &local, &remote, "node-a").await.unwrap();
        assert!(!check.matched);
        assert_eq!(check.remote_hash.as_deref(), Some("xyz"));
    }
}
