// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the graph sync service.
//!
//! Configuration is read from environment-style key/value pairs with
//! [`SyncConfig::from_env()`], or from any lookup function with
//! [`SyncConfig::from_lookup()`]. It can also be built programmatically or
//! deserialized with serde (JSON in the tests).
//!
//! # Quick Start
//!
//! ```rust
//! use graph_sync::config::SyncConfig;
//!
//! let config = SyncConfig::from_lookup(|key| match key {
//!     "SYNC_ENABLED" => Some("true".into()),
//!     "SYNC_PEER_URI" => Some("sqlite:///srv/peer/graph.db".into()),
//!     "SYNC_PEER_PASSWORD" => Some("s3cret-peer-pass".into()),
//!     _ => None,
//! })
//! .unwrap();
//! assert_eq!(config.batch_size, 500);
//! ```
//!
//! # Configuration Structure
//!
//! ```text
//! SyncConfig
//! ├── enabled: bool                # SYNC_ENABLED
//! ├── node_id: Option<String>      # SYNC_NODE_ID (else reused / generated)
//! ├── local: EndpointConfig        # LOCAL_STORE_URI
//! ├── peer: Option<EndpointConfig> # SYNC_PEER_URI / _USER / _PASSWORD
//! ├── cron, run_on_startup         # SYNC_CRON, SYNC_ON_STARTUP
//! ├── batch_size                   # SYNC_BATCH_SIZE
//! ├── log_file                     # SYNC_LOG_FILE
//! ├── embedding_model_path         # EMBEDDING_MODEL_PATH
//! ├── health_interval              # SYNC_HEALTH_INTERVAL  (humantime)
//! ├── remote_down_alert            # SYNC_REMOTE_DOWN_ALERT (humantime)
//! ├── query_timeout                # SYNC_QUERY_TIMEOUT    (humantime)
//! └── divergence_threshold         # SYNC_DIVERGENCE_THRESHOLD
//! ```

use crate::error::{Result, SyncError};
use crate::scheduler::parse_cron;
use crate::store::{EndpointConfig, EndpointUri};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Passwords rejected when sync is enabled (case-insensitive).
pub const INSECURE_PASSWORDS: &[&str] = &["password", "neo4j", "admin", "changeme", "graph"];

/// Searched in order when no model path is configured.
pub const MODEL_FALLBACK_PATHS: &[&str] = &[
    "models/embedding-model.gguf",
    "data/models/embedding-model.gguf",
    "/usr/share/graph-sync/embedding-model.gguf",
];

pub const MAX_BATCH_SIZE: usize = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// SyncConfig: everything the service needs
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Master switch. When false the service still serves local queries but
    /// never schedules a cycle.
    #[serde(default)]
    pub enabled: bool,

    /// Stable identity of this node. `None` reuses the one recorded in the
    /// local store, or generates one.
    #[serde(default)]
    pub node_id: Option<String>,

    #[serde(default = "default_local")]
    pub local: EndpointConfig,

    /// The remote endpoint. Required when `enabled`.
    #[serde(default)]
    pub peer: Option<EndpointConfig>,

    /// Cron expression: 5-field (minute-first) or 6/7-field (seconds-first).
    #[serde(default = "default_cron")]
    pub cron: String,

    #[serde(default)]
    pub run_on_startup: bool,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// JSON-lines event log. `None` keeps events in memory only.
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub embedding_model_path: Option<PathBuf>,

    /// Probe interval (humantime, e.g. "30s").
    #[serde(default = "default_health_interval")]
    pub health_interval: String,

    /// How long the remote may stay down before a WARNING alert.
    #[serde(default = "default_remote_down_alert")]
    pub remote_down_alert: String,

    /// Deadline for each store call made by a cycle.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: String,

    /// Per-kind count difference that raises a divergence warning.
    #[serde(default = "default_divergence_threshold")]
    pub divergence_threshold: u64,
}

fn default_local() -> EndpointConfig {
    EndpointConfig::new("sqlite://data/graph.db")
}

fn default_cron() -> String {
    "0 3 * * *".to_string() // daily at 03:00
}

fn default_batch_size() -> usize {
    500
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/sync.jsonl"))
}

fn default_health_interval() -> String {
    "30s".to_string()
}

fn default_remote_down_alert() -> String {
    "1h".to_string()
}

fn default_query_timeout() -> String {
    "5m".to_string()
}

fn default_divergence_threshold() -> u64 {
    100
}

fn default_peer_user() -> String {
    "graph".to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            node_id: None,
            local: default_local(),
            peer: None,
            cron: default_cron(),
            run_on_startup: false,
            batch_size: default_batch_size(),
            log_file: default_log_file(),
            embedding_model_path: None,
            health_interval: default_health_interval(),
            remote_down_alert: default_remote_down_alert(),
            query_timeout: default_query_timeout(),
            divergence_threshold: default_divergence_threshold(),
        }
    }
}

impl SyncConfig {
    /// Two in-memory endpoints, sync enabled, no log file.
    pub fn for_testing(node_id: &str) -> Self {
        Self {
            enabled: true,
            node_id: Some(node_id.to_string()),
            local: EndpointConfig::new(format!("memory://{}-local", node_id)),
            peer: Some(EndpointConfig::new(format!("memory://{}-peer", node_id)).with_credentials(
                "graph",
                "test-only-peer-secret",
            )),
            log_file: None,
            ..Default::default()
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, then [`validate`](Self::validate).
    ///
    /// Every malformed value is reported, not just the first.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut errors = Vec::new();
        let mut config = Self::default();

        if let Some(v) = get("SYNC_ENABLED") {
            match parse_bool(&v) {
                Some(b) => config.enabled = b,
                None => errors.push(format!("SYNC_ENABLED: '{}' is not a boolean", v)),
            }
        }
        if let Some(v) = get("SYNC_ON_STARTUP") {
            match parse_bool(&v) {
                Some(b) => config.run_on_startup = b,
                None => errors.push(format!("SYNC_ON_STARTUP: '{}' is not a boolean", v)),
            }
        }

        config.node_id = get("SYNC_NODE_ID");
        if let Some(uri) = get("LOCAL_STORE_URI") {
            config.local = EndpointConfig::new(uri);
        }
        if let Some(uri) = get("SYNC_PEER_URI") {
            let mut peer = EndpointConfig::new(uri);
            peer.user = Some(get("SYNC_PEER_USER").unwrap_or_else(default_peer_user));
            peer.password = get("SYNC_PEER_PASSWORD");
            config.peer = Some(peer);
        }

        if let Some(v) = get("SYNC_CRON") {
            config.cron = v;
        }
        if let Some(v) = get("SYNC_BATCH_SIZE") {
            match v.parse() {
                Ok(n) => config.batch_size = n,
                Err(_) => errors.push(format!("SYNC_BATCH_SIZE: '{}' is not an integer", v)),
            }
        }
        if let Some(v) = get("SYNC_DIVERGENCE_THRESHOLD") {
            match v.parse() {
                Ok(n) => config.divergence_threshold = n,
                Err(_) => errors.push(format!("SYNC_DIVERGENCE_THRESHOLD: '{}' is not an integer", v)),
            }
        }
        if let Some(v) = get("SYNC_LOG_FILE") {
            config.log_file = Some(PathBuf::from(v));
        }
        config.embedding_model_path = get("EMBEDDING_MODEL_PATH").map(PathBuf::from);
        if let Some(v) = get("SYNC_HEALTH_INTERVAL") {
            config.health_interval = v;
        }
        if let Some(v) = get("SYNC_REMOTE_DOWN_ALERT") {
            config.remote_down_alert = v;
        }
        if let Some(v) = get("SYNC_QUERY_TIMEOUT") {
            config.query_timeout = v;
        }

        errors.extend(config.problems());
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(SyncError::Config(errors.join("; ")))
        }
    }

    /// Check the whole config, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Config(problems.join("; ")))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = EndpointUri::parse(&self.local.uri) {
            errors.push(format!("LOCAL_STORE_URI: {}", e));
        }
        if let Err(e) = parse_cron(&self.cron) {
            errors.push(format!("SYNC_CRON: {}", e));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            errors.push(format!(
                "SYNC_BATCH_SIZE: {} is outside 1..={}",
                self.batch_size, MAX_BATCH_SIZE
            ));
        }
        for (key, value) in [
            ("SYNC_HEALTH_INTERVAL", &self.health_interval),
            ("SYNC_REMOTE_DOWN_ALERT", &self.remote_down_alert),
            ("SYNC_QUERY_TIMEOUT", &self.query_timeout),
        ] {
            if let Err(e) = humantime::parse_duration(value) {
                errors.push(format!("{}: '{}' {}", key, value, e));
            }
        }
        if let Some(node_id) = &self.node_id {
            if node_id.trim().is_empty() {
                errors.push("SYNC_NODE_ID must not be blank".to_string());
            }
        }

        if let Some(peer) = &self.peer {
            if let Err(e) = EndpointUri::parse(&peer.uri) {
                errors.push(format!("SYNC_PEER_URI: {}", e));
            }
        }

        if self.enabled {
            match &self.peer {
                None => errors.push("SYNC_PEER_URI is required when SYNC_ENABLED=true".to_string()),
                Some(peer) => match peer.password.as_deref() {
                    None => errors.push("SYNC_PEER_PASSWORD is required when SYNC_ENABLED=true".to_string()),
                    Some(p) if is_insecure_password(p) => errors.push(format!(
                        "SYNC_PEER_PASSWORD is an insecure default ('{}'); set a real password",
                        p
                    )),
                    Some(_) => {}
                },
            }
        }

        errors
    }

    pub fn health_interval(&self) -> Duration {
        humantime::parse_duration(&self.health_interval).unwrap_or(Duration::from_secs(30))
    }

    pub fn remote_down_alert(&self) -> Duration {
        humantime::parse_duration(&self.remote_down_alert).unwrap_or(Duration::from_secs(3600))
    }

    pub fn query_timeout(&self) -> Duration {
        humantime::parse_duration(&self.query_timeout).unwrap_or(Duration::from_secs(300))
    }

    /// The configured model path, else the first fallback that exists.
    pub fn resolve_model_path(&self) -> Option<PathBuf> {
        self.resolve_model_path_in(Path::new("."))
    }

    /// As [`resolve_model_path`](Self::resolve_model_path), with relative
    /// fallbacks resolved against `base`.
    pub fn resolve_model_path_in(&self, base: &Path) -> Option<PathBuf> {
        if let Some(path) = &self.embedding_model_path {
            return Some(path.clone());
        }
        MODEL_FALLBACK_PATHS
            .iter()
            .map(|p| base.join(p))
            .find(|p| p.is_file())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

pub fn is_insecure_password(password: &str) -> bool {
    INSECURE_PASSWORDS.iter().any(|p| p.eq_ignore_ascii_case(password))
}
