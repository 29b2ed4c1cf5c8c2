// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed graph entities.
//!
//! Each entity is a typed core plus an `extra` map that captures every
//! property this crate does not know about, so fields added by other parts of
//! the application round-trip through export and import unchanged.

use crate::store::{Node, NodeKind};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Property name of the change timestamp on every synced node.
pub const UPDATED_AT: &str = "updatedAt";

/// Conversion between a typed entity and its stored [`Node`].
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: NodeKind;

    /// Natural key (URL, name or external id).
    fn key(&self) -> &str;

    fn updated_at(&self) -> Option<DateTime<Utc>>;

    fn to_node(&self) -> Result<Node, serde_json::Error> {
        let mut props = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        // Timestamp lives on the node itself, not in the bag.
        props.remove(UPDATED_AT);
        Ok(Node {
            kind: Self::KIND,
            key: self.key().to_string(),
            updated_at: self.updated_at(),
            props,
        })
    }

    fn from_node(node: &Node) -> Result<Self, serde_json::Error> {
        let mut props = node.props.clone();
        props
            .entry(Self::KIND.key_field().to_string())
            .or_insert_with(|| Value::String(node.key.clone()));
        props.remove(UPDATED_AT);
        if let Some(at) = node.updated_at {
            props.insert(UPDATED_AT.to_string(), serde_json::to_value(at)?);
        }
        serde_json::from_value(Value::Object(props))
    }
}

/// A saved web link, the primary entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Heavy extracted content; its presence marks a link as fully processed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Link {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            description: None,
            content: None,
            summary: None,
            domain: None,
            source: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// True when the link already carries non-blank content.
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

impl Entity for Link {
    const KIND: NodeKind = NodeKind::Link;

    fn key(&self) -> &str {
        &self.url
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Derived aggregate; recomputed locally, never trusted from the wire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            link_count: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Entity for Category {
    const KIND: NodeKind = NodeKind::Category;

    fn key(&self) -> &str {
        &self.name
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Tool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            url: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Entity for Tool {
    const KIND: NodeKind = NodeKind::Tool;

    fn key(&self) -> &str {
        &self.name
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Technology {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Technology {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Entity for Technology {
    const KIND: NodeKind = NodeKind::Technology;

    fn key(&self) -> &str {
        &self.name
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

/// A person who shares links, keyed by their external identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Free-text topics; merged as a set union, never overwritten.
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            display_name: None,
            interests: Vec::new(),
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Entity for User {
    const KIND: NodeKind = NodeKind::User;

    fn key(&self) -> &str {
        &self.external_id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_unknown_fields_round_trip_through_node() {
        let json = serde_json::json!({
            "url": "https://example.com",
            "title": "Example",
            "readingTimeMinutes": 7,
            "embedding": [0.1, 0.2],
            "updatedAt": "2025-01-02T03:04:05Z"
        });
        let link: Link = serde_json::from_value(json).unwrap();
        assert_eq!(link.extra.get("readingTimeMinutes"), Some(&Value::from(7)));

        let node = link.to_node().unwrap();
        assert_eq!(node.key, "https://example.com");
        assert!(node.props.get(UPDATED_AT).is_none());
        assert_eq!(node.updated_at, Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()));

        let back = Link::from_node(&node).unwrap();
        assert_eq!(back, link);
    }

    #[test]
    fn test_from_stub_node() {
        let stub = Node::stub(NodeKind::User, "U42");
        let user = User::from_node(&stub).unwrap();
        assert_eq!(user.external_id, "U42");
        assert!(user.interests.is_empty());
        assert!(user.updated_at.is_none());
    }

    #[test]
    fn test_has_content_ignores_blank() {
        let mut link = Link::new("https://a");
        assert!(!link.has_content());
        link.content = Some("   ".into());
        assert!(!link.has_content());
        link.content = Some("body".into());
        assert!(link.has_content());
    }

    #[test]
    fn test_none_fields_not_stored() {
        let node = Tool::new("ripgrep").to_node().unwrap();
        assert_eq!(node.props.len(), 1);
        assert_eq!(node.str_prop("name"), Some("ripgrep"));
    }
}
