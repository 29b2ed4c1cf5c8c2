// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fuzz target for configuration parsing.
//!
//! Cron expressions, endpoint URIs and full env-style configs come straight
//! from operators; none of them may panic on arbitrary input.

#![no_main]

use graph_sync::config::SyncConfig;
use graph_sync::scheduler::parse_cron;
use graph_sync::store::EndpointUri;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: (&str, &str, &str)| {
    let (cron, uri, batch) = data;

    if let Ok(schedule) = parse_cron(cron) {
        // An accepted schedule must be iterable.
        let _ = schedule.upcoming(chrono::Utc).next();
    }

    if let Ok(parsed) = EndpointUri::parse(uri) {
        match parsed {
            EndpointUri::Sqlite { path } | EndpointUri::File { path } => assert!(!path.is_empty()),
            EndpointUri::Memory { name } => assert!(!name.is_empty()),
        }
    }

    let _ = SyncConfig::from_lookup(|key| match key {
        "SYNC_ENABLED" => Some("true".to_string()),
        "SYNC_CRON" => Some(cron.to_string()),
        "SYNC_PEER_URI" => Some(uri.to_string()),
        "SYNC_PEER_PASSWORD" => Some("fuzz-peer-secret".to_string()),
        "SYNC_BATCH_SIZE" => Some(batch.to_string()),
        _ => None,
    });
});
