//! Argument-map nodes.
//!
//! A node is a tagged union over its kind-specific `data`. Common fields
//! (`id`, `position`, `parent_id`, interaction flags) live on [`Node`]; the
//! variant payload lives in [`NodeData`].
//!
//! ## Coordinates
//!
//! `position` is relative to the parent group when `parent_id` is set and
//! absolute otherwise. [`Node::absolute_position`] converts.
//!
//! ## Wire shape
//!
//! ```text
//! { "id": "p1", "position": {"x":0,"y":0}, "parentId": null,
//!   "draggable": true, "selectable": true, "resizable": true,
//!   "data": { "type": "point", "content": "...", "cred": 0.5, ... } }
//! ```

use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{anchor_id, anchored_edge_id};

/// A 2D position in canvas coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A measured bounding box, as reported by layout measurement.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Pointer interaction flags the renderer honours.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub draggable: bool,
    pub selectable: bool,
    pub resizable: bool,
}

impl Interaction {
    /// Fully interactive (the default for content nodes).
    pub const fn free() -> Self {
        Self { draggable: true, selectable: true, resizable: true }
    }

    /// Not draggable, selectable, or resizable (pair groups).
    pub const fn locked() -> Self {
        Self { draggable: false, selectable: false, resizable: false }
    }
}

impl Default for Interaction {
    fn default() -> Self {
        Self::free()
    }
}

/// What a node *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum NodeKind {
    Point,
    Statement,
    Group,
    #[strum(serialize = "edge_anchor", serialize = "anchor")]
    EdgeAnchor,
    Objection,
    Comment,
}

impl NodeKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Point => "point",
            NodeKind::Statement => "statement",
            NodeKind::Group => "group",
            NodeKind::EdgeAnchor => "edge_anchor",
            NodeKind::Objection => "objection",
            NodeKind::Comment => "comment",
        }
    }

    /// Whether nodes of this kind carry user-editable text.
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            NodeKind::Point | NodeKind::Statement | NodeKind::Objection | NodeKind::Comment
        )
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of a `Point` node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointData {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cred: Option<f64>,
    /// Set on the original member of an inverse pair.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub original_in_pair: bool,
    /// Set on the generated inverse member of an inverse pair.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub direct_inverse: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_height: Option<f64>,
    /// Fields this crate does not interpret; carried through replacement.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PointData {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), ..Default::default() }
    }

    /// Whether this point is a member of an inverse pair.
    pub fn is_paired(&self) -> bool {
        self.original_in_pair || self.direct_inverse
    }

    /// Drop every pairing-only field.
    pub fn clear_pairing(&mut self) {
        self.original_in_pair = false;
        self.direct_inverse = false;
        self.group_id = None;
        self.pair_height = None;
    }
}

/// Payload of a `Group` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupData {
    /// Two-phase deletion marker: the group is animating out.
    #[serde(default)]
    pub closing: bool,
    #[serde(default)]
    pub is_new: bool,
}

/// Payload of a synthetic `EdgeAnchor` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorData {
    pub edge_id: String,
}

/// Payload of an `Objection` node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectionData {
    #[serde(default)]
    pub content: String,
    /// The edge this objection targets.
    pub parent_edge_id: String,
}

/// Payload of `Statement` and `Comment` nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextData {
    #[serde(default)]
    pub content: String,
}

/// Kind-specific node payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeData {
    Point(PointData),
    Statement(TextData),
    Group(GroupData),
    EdgeAnchor(AnchorData),
    Objection(ObjectionData),
    Comment(TextData),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Point(_) => NodeKind::Point,
            NodeData::Statement(_) => NodeKind::Statement,
            NodeData::Group(_) => NodeKind::Group,
            NodeData::EdgeAnchor(_) => NodeKind::EdgeAnchor,
            NodeData::Objection(_) => NodeKind::Objection,
            NodeData::Comment(_) => NodeKind::Comment,
        }
    }
}

/// A node in the argument map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub position: Position,
    /// Owning group, if nested.
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(flatten)]
    pub interaction: Interaction,
    pub data: NodeData,
}

impl Node {
    fn with_data(id: impl Into<String>, position: Position, data: NodeData) -> Self {
        Self {
            id: id.into(),
            position,
            parent_id: None,
            interaction: Interaction::free(),
            data,
        }
    }

    pub fn point(id: impl Into<String>, position: Position, content: impl Into<String>) -> Self {
        Self::with_data(id, position, NodeData::Point(PointData::new(content)))
    }

    pub fn statement(id: impl Into<String>, position: Position, content: impl Into<String>) -> Self {
        Self::with_data(id, position, NodeData::Statement(TextData { content: content.into() }))
    }

    pub fn comment(id: impl Into<String>, position: Position, content: impl Into<String>) -> Self {
        Self::with_data(id, position, NodeData::Comment(TextData { content: content.into() }))
    }

    /// A non-interactive container node.
    pub fn group(id: impl Into<String>, position: Position) -> Self {
        Self {
            interaction: Interaction::locked(),
            ..Self::with_data(id, position, NodeData::Group(GroupData::default()))
        }
    }

    /// The synthetic anchor node for `edge_id`.
    pub fn anchor(edge_id: &str, position: Position) -> Self {
        Self::with_data(
            anchor_id(edge_id),
            position,
            NodeData::EdgeAnchor(AnchorData { edge_id: edge_id.to_string() }),
        )
    }

    pub fn objection(
        id: impl Into<String>,
        position: Position,
        parent_edge_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::with_data(
            id,
            position,
            NodeData::Objection(ObjectionData {
                content: content.into(),
                parent_edge_id: parent_edge_id.into(),
            }),
        )
    }

    /// Builder-style parent assignment.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn is_group(&self) -> bool {
        matches!(self.data, NodeData::Group(_))
    }

    pub fn as_point(&self) -> Option<&PointData> {
        match &self.data {
            NodeData::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_point_mut(&mut self) -> Option<&mut PointData> {
        match &mut self.data {
            NodeData::Point(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupData> {
        match &self.data {
            NodeData::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_group_mut(&mut self) -> Option<&mut GroupData> {
        match &mut self.data {
            NodeData::Group(g) => Some(g),
            _ => None,
        }
    }

    /// For objections, the edge they target.
    pub fn objection_edge(&self) -> Option<&str> {
        match &self.data {
            NodeData::Objection(o) => Some(&o.parent_edge_id),
            _ => None,
        }
    }

    /// For anchors, the edge they stand for.
    pub fn anchored_edge(&self) -> Option<&str> {
        match &self.data {
            NodeData::EdgeAnchor(a) => Some(&a.edge_id),
            _ => anchored_edge_id(&self.id),
        }
    }

    /// User-visible text, for text-bearing kinds.
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Point(p) => Some(&p.content),
            NodeData::Statement(t) | NodeData::Comment(t) => Some(&t.content),
            NodeData::Objection(o) => Some(&o.content),
            NodeData::Group(_) | NodeData::EdgeAnchor(_) => None,
        }
    }

    /// Replace user-visible text; returns false for kinds without text.
    pub fn set_text(&mut self, text: impl Into<String>) -> bool {
        let text = text.into();
        match &mut self.data {
            NodeData::Point(p) => p.content = text,
            NodeData::Statement(t) | NodeData::Comment(t) => t.content = text,
            NodeData::Objection(o) => o.content = text,
            NodeData::Group(_) | NodeData::EdgeAnchor(_) => return false,
        }
        true
    }

    /// Position in the canvas frame, given the owning group (if any).
    ///
    /// A node with `parent_id` set stores its position relative to the
    /// parent; passing `None` for such a node returns the stored position
    /// unchanged.
    pub fn absolute_position(&self, parent: Option<&Node>) -> Position {
        match (self.parent_id.as_deref(), parent) {
            (Some(pid), Some(p)) if p.id == pid => p.position + self.position,
            _ => self.position,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
