// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delta bundle exchanged between endpoints in one cycle direction.

use super::entities::{Category, Link, Technology, Tool, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A link plus the relationship membership needed to rebuild its edges on
/// import without extra lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedLink {
    pub link: Link,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    /// External id of the user who shared it.
    #[serde(default)]
    pub shared_by: Option<String>,
}

impl ExportedLink {
    pub fn new(link: Link) -> Self {
        Self {
            link,
            category: None,
            tags: Vec::new(),
            tools: Vec::new(),
            technologies: Vec::new(),
            shared_by: None,
        }
    }
}

/// Similarity edge between two links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedLink {
    pub from: String,
    pub to: String,
    pub score: f64,
}

/// Directed link-to-link reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRef {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryParent {
    pub child: String,
    pub parent: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolTechnology {
    pub tool: String,
    pub technology: String,
}

/// Everything that changed on one endpoint after a watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaExport {
    pub source_node_id: String,
    pub since: DateTime<Utc>,
    pub exported_at: DateTime<Utc>,
    #[serde(default)]
    pub links: Vec<ExportedLink>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    #[serde(default)]
    pub technologies: Vec<Technology>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub related: Vec<RelatedLink>,
    #[serde(default)]
    pub link_refs: Vec<LinkRef>,
    #[serde(default)]
    pub category_parents: Vec<CategoryParent>,
    #[serde(default)]
    pub tool_technologies: Vec<ToolTechnology>,
}

impl DeltaExport {
    pub fn empty(source_node_id: impl Into<String>, since: DateTime<Utc>) -> Self {
        Self {
            source_node_id: source_node_id.into(),
            since,
            exported_at: Utc::now(),
            links: Vec::new(),
            categories: Vec::new(),
            tools: Vec::new(),
            technologies: Vec::new(),
            users: Vec::new(),
            related: Vec::new(),
            link_refs: Vec::new(),
            category_parents: Vec::new(),
            tool_technologies: Vec::new(),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.links.len() + self.categories.len() + self.tools.len() + self.technologies.len() + self.users.len()
    }

    pub fn edge_count(&self) -> usize {
        self.related.len() + self.link_refs.len() + self.category_parents.len() + self.tool_technologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0 && self.edge_count() == 0
    }

    /// Newest `updatedAt` carried by any entity in the bundle.
    pub fn max_updated_at(&self) -> Option<DateTime<Utc>> {
        let links = self.links.iter().filter_map(|l| l.link.updated_at);
        let categories = self.categories.iter().filter_map(|e| e.updated_at);
        let tools = self.tools.iter().filter_map(|e| e.updated_at);
        let technologies = self.technologies.iter().filter_map(|e| e.updated_at);
        let users = self.users.iter().filter_map(|e| e.updated_at);
        links.chain(categories).chain(tools).chain(technologies).chain(users).max()
    }
}
