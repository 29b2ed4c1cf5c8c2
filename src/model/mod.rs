// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync data model.
//!
//! ```text
//! entities   Link, Category, Tool, Technology, User  (typed core + open bag)
//! meta       SyncMeta: node identity, watermarks, model digest
//! delta      DeltaExport: one direction's changes since a watermark
//! result     SyncConflict, SyncCycleResult, SyncResult
//! ```

mod delta;
mod entities;
mod meta;
mod result;

pub use delta::{CategoryParent, DeltaExport, ExportedLink, LinkRef, RelatedLink, ToolTechnology};
pub use entities::{Category, Entity, Link, Technology, Tool, User, UPDATED_AT};
pub use meta::{list_metas, load_meta, load_or_create_meta, peer_metas, save_meta, SyncMeta};
pub use result::{
    ConflictPolicy, Direction, ImportSummary, KeptSide, ModelCheck, SyncConflict, SyncCycleResult, SyncResult,
};
pub use crate::store::NodeCounts;
