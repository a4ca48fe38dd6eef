//! Shared identity, node, and edge types for argmap.
//!
//! This crate is the vocabulary of the collaborative argument map: typed
//! peer/graph/origin IDs, the node tagged union, and edges. It has **no
//! internal argmap dependencies**: a pure leaf crate the replicated
//! document and the mutation engine build on.
//!
//! # Graph Overview
//!
//! ```text
//! Point ──negation/support──▶ Point
//!   │
//!   └── edge E ── anchor:E ◀──objection── Objection (parentEdgeId = E)
//!
//! Group (non-interactive)
//!   ├── Point (originalInPair)
//!   └── Point (directInverse)      no edge between the two
//! ```
//!
//! # Key Types
//!
//! |-----------------|------------------------------------------------|
//! | Type            | Purpose                                        |
//! |-----------------|------------------------------------------------|
//! | [`Node`]        | Common fields + [`NodeData`] payload           |
//! | [`Edge`]        | Directed edge with an [`EdgeKind`]             |
//! | [`PeerId`]      | Which collaborating client                     |
//! | [`GraphId`]     | Which replicated document                      |
//! | [`OriginToken`] | Tag distinguishing a client's own echo         |
//! |-----------------|------------------------------------------------|

pub mod edge;
pub mod ids;
pub mod node;

pub use edge::{Edge, EdgeKind};
pub use ids::{
    ANCHOR_PREFIX, GraphId, IdError, OriginToken, PeerId, anchor_id, anchored_edge_id,
    new_node_id, validate_id,
};
pub use node::{
    AnchorData, GroupData, Interaction, Node, NodeData, NodeKind, ObjectionData, PointData,
    Position, Size, TextData,
};
