//! Typed identifiers for peers, graphs, and transaction origins, plus the
//! string-id conventions used for nodes, edges, and anchors.
//!
//! Peer, graph, and origin IDs wrap UUIDv7 (time-ordered, globally unique).
//! They display as standard UUID text for logging; `short()` (first 8 hex
//! chars) is for human-facing output only, never a lookup key.
//!
//! Node and edge IDs are plain strings because they travel through the
//! replicated maps as keys. Anchors reuse the edge id: `anchor:<edgeId>`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A collaborating peer (one client attached to the shared graph).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(uuid::Uuid);

/// A replicated argument-map document.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(uuid::Uuid);

/// Per-client token attached to every document transaction.
///
/// A client compares incoming change origins against its own token to tell
/// its own echo apart from changes made by other peers.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginToken(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for human display only (not lookup).
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(PeerId, "PeerId");
impl_typed_id!(GraphId, "GraphId");
impl_typed_id!(OriginToken, "OriginToken");

/// Fixed namespace for deriving deterministic origin tokens via UUIDv5.
const ARGMAP_ORIGIN_NS: uuid::Uuid = uuid::uuid!("3f1c9a52-6d0e-4b8a-9e27-51c4d8a0b6f3");

impl OriginToken {
    /// Derive a stable origin token for a peer.
    ///
    /// Same peer always yields the same token, so a reconnecting client still
    /// recognizes transactions it issued before the reconnect.
    pub fn for_peer(peer: PeerId) -> Self {
        Self(uuid::Uuid::new_v5(&ARGMAP_ORIGIN_NS, peer.0.as_bytes()))
    }
}

// ── String ids ──────────────────────────────────────────────────────────────

/// Prefix shared by all synthetic anchor node ids.
pub const ANCHOR_PREFIX: &str = "anchor:";

/// The anchor node id for an edge: `anchor:<edge_id>`.
pub fn anchor_id(edge_id: &str) -> String {
    format!("{ANCHOR_PREFIX}{edge_id}")
}

/// The edge id an anchor node stands for, or `None` if `id` is not an anchor.
pub fn anchored_edge_id(id: &str) -> Option<&str> {
    id.strip_prefix(ANCHOR_PREFIX)
}

/// Generate a fresh node id with a readable prefix (`group-…`, `inverse-…`).
pub fn new_node_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::now_v7().as_simple())
}

/// A node or edge id that cannot be a key in the replicated maps.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("id is empty")]
    Empty,
    #[error("id {0:?} contains whitespace or control characters")]
    InvalidCharacter(String),
    #[error("anchor id {0:?} names no edge")]
    EmptyAnchor(String),
}

/// Check that a string id is usable as a replicated-map key.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(IdError::InvalidCharacter(id.to_string()));
    }
    if anchored_edge_id(id).is_some_and(str::is_empty) {
        return Err(IdError::EmptyAnchor(id.to_string()));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
