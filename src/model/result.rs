// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Records produced by import and by sync cycles.

use crate::store::NodeCounts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Conflict resolution rule that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    FirstWriteWins,
    LastWriteWins,
    SetUnion,
    Skipped,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstWriteWins => "first_write_wins",
            Self::LastWriteWins => "last_write_wins",
            Self::SetUnion => "set_union",
            Self::Skipped => "skipped",
        }
    }
}

/// Which side's value survived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeptSide {
    Local,
    Incoming,
    Both,
    Neither,
}

/// One resolution decision taken during import. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConflict {
    pub entity_type: String,
    pub key: String,
    pub policy: ConflictPolicy,
    pub kept: KeptSide,
    pub detail: String,
}

/// Outcome of importing one delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub nodes_imported: u64,
    pub relationships_imported: u64,
    pub conflicts: Vec<SyncConflict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Remote to local.
    Pull,
    /// Local to remote.
    Push,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pull or push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCycleResult {
    pub direction: Direction,
    pub node_id: String,
    pub peer: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Watermark the delta was computed from.
    pub since: DateTime<Utc>,
    /// Watermark after this direction (unchanged on failure).
    pub watermark: DateTime<Utc>,
    pub nodes_imported: u64,
    pub relationships_imported: u64,
    pub conflicts: Vec<SyncConflict>,
    pub errors: Vec<String>,
    pub local_counts: Option<NodeCounts>,
    pub remote_counts: Option<NodeCounts>,
    pub success: bool,
}

impl SyncCycleResult {
    /// A direction that never ran because the cycle short-circuited.
    pub fn failed(
        direction: Direction,
        node_id: &str,
        peer: &str,
        started_at: DateTime<Utc>,
        watermark: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        let finished_at = Utc::now();
        Self {
            direction,
            node_id: node_id.to_string(),
            peer: peer.to_string(),
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            since: watermark,
            watermark,
            nodes_imported: 0,
            relationships_imported: 0,
            conflicts: Vec::new(),
            errors: vec![error.into()],
            local_counts: None,
            remote_counts: None,
            success: false,
        }
    }
}

/// Outcome of the embedding model comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCheck {
    pub matched: bool,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    /// Why verification was skipped, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// A full cycle: one pull paired with one push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub pull: SyncCycleResult,
    pub push: SyncCycleResult,
    pub overall_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_check: Option<ModelCheck>,
}

impl SyncResult {
    pub fn new(pull: SyncCycleResult, push: SyncCycleResult, model_check: Option<ModelCheck>) -> Self {
        let overall_success = pull.success && push.success;
        Self {
            pull,
            push,
            overall_success,
            model_check,
        }
    }

    /// Every error from both directions, deduplicated in order.
    pub fn errors(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for e in self.pull.errors.iter().chain(self.push.errors.iter()) {
            if !out.contains(e) {
                out.push(e.clone());
            }
        }
        out
    }

    pub fn conflict_count(&self) -> usize {
        self.pull.conflicts.len() + self.push.conflicts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_success_is_and() {
        let now = Utc::now();
        let ok = |d| {
            let mut r = SyncCycleResult::failed(d, "a", "b", now, now, "x");
            r.errors.clear();
            r.success = true;
            r
        };
        let bad = SyncCycleResult::failed(Direction::Push, "a", "b", now, now, "boom");

        assert!(SyncResult::new(ok(Direction::Pull), ok(Direction::Push), None).overall_success);
        let mixed = SyncResult::new(ok(Direction::Pull), bad, None);
        assert!(!mixed.overall_success);
        assert_eq!(mixed.errors(), vec!["boom".to_string()]);
    }

    #[test]
    fn test_errors_deduplicated() {
        let now = Utc::now();
        let pull = SyncCycleResult::failed(Direction::Pull, "a", "b", now, now, "peer down");
        let push = SyncCycleResult::failed(Direction::Push, "a", "b", now, now, "peer down");
        assert_eq!(SyncResult::new(pull, push, None).errors().len(), 1);
    }
}
