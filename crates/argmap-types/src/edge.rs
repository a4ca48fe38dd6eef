//! Directed edges between argument-map nodes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::anchor_id;

/// Relationship an edge expresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum EdgeKind {
    /// Source argues against target.
    #[default]
    Negation,
    /// Objection node → anchor of the edge it objects to.
    Objection,
    /// Source argues for target.
    Support,
}

impl EdgeKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Negation => "negation",
            EdgeKind::Objection => "objection",
            EdgeKind::Support => "support",
        }
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub kind: EdgeKind,
}

impl Edge {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        kind: EdgeKind,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind,
        }
    }

    pub fn negation(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(id, source, target, EdgeKind::Negation)
    }

    pub fn support(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(id, source, target, EdgeKind::Support)
    }

    /// The edge from an objection node to the anchor of `objected_edge_id`.
    pub fn objection(id: impl Into<String>, objection_id: impl Into<String>, objected_edge_id: &str) -> Self {
        Self::new(id, objection_id, anchor_id(objected_edge_id), EdgeKind::Objection)
    }

    /// Whether `node_id` is either endpoint.
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objection_edge_targets_anchor() {
        let e = Edge::objection("oe1", "o1", "e1");
        assert_eq!(e.target, "anchor:e1");
        assert_eq!(e.kind, EdgeKind::Objection);
        assert!(e.touches("o1"));
        assert!(e.touches("anchor:e1"));
        assert!(!e.touches("e1"));
    }

    #[test]
    fn test_edge_kind_parse_and_serde() {
        assert_eq!(EdgeKind::from_str("Support"), Some(EdgeKind::Support));
        let e = Edge::negation("e1", "a", "b");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["type"], "negation");
        let back: Edge = serde_json::from_value(json).unwrap();
        assert_eq!(back, e);
    }
}
