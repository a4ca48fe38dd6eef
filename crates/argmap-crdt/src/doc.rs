//! Replicated document abstraction.
//!
//! The graph lives in three replicated maps keyed by string id:
//!
//! ```text
//! NodeMap  id -> Node
//! EdgeMap  id -> Edge
//! TextMap  id -> String      # collaborative text of text-bearing nodes
//! ```
//!
//! Every write is a whole-entry replacement (or removal). Writes are grouped
//! into transactions; each committed transaction is tagged with the writer's
//! [`OriginToken`] and published once on the change stream.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use argmap_types::{Edge, GraphId, Node, OriginToken, PeerId};

// ============================================================================
// Origin Tracking
// ============================================================================

/// Where a document change came from.
///
/// Used to prevent echo loops: a client skips re-reducing changes tagged
/// with its own token into local view state, and merges everything else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeOrigin {
    /// Committed through `transact` on this replica, by the holder of the token.
    Local(OriginToken),
    /// Merged from another replica.
    Remote,
}

impl ChangeOrigin {
    /// Check if this change is the echo of a transaction issued with `token`.
    pub fn is_echo_of(&self, token: OriginToken) -> bool {
        matches!(self, ChangeOrigin::Local(t) if *t == token)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, ChangeOrigin::Remote)
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Last-writer-wins stamp. Ordered by Lamport time, then peer id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Stamp {
    pub lamport: u64,
    pub peer: PeerId,
}

/// A single key write. `None` removes the entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntryWrite {
    Node { id: String, node: Option<Node> },
    Edge { id: String, edge: Option<Edge> },
    Text { id: String, text: Option<String> },
}

impl EntryWrite {
    /// The key this write targets.
    pub fn key(&self) -> &str {
        match self {
            EntryWrite::Node { id, .. } | EntryWrite::Edge { id, .. } | EntryWrite::Text { id, .. } => id,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            EntryWrite::Node { node: None, .. }
                | EntryWrite::Edge { edge: None, .. }
                | EntryWrite::Text { text: None, .. }
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StampedWrite {
    pub stamp: Stamp,
    pub write: EntryWrite,
}

/// The replicable effect of one or more transactions.
///
/// Produced by a local commit; applied on other replicas with
/// [`MemoryDoc::apply_update`](crate::MemoryDoc::apply_update).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocUpdate {
    pub graph_id: GraphId,
    /// Replica that produced the update.
    pub peer: PeerId,
    pub writes: Vec<StampedWrite>,
}

impl DocUpdate {
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }
}

/// One event on the change stream.
#[derive(Clone, Debug, PartialEq)]
pub struct DocChange {
    pub origin: ChangeOrigin,
    pub update: DocUpdate,
}

impl DocChange {
    /// Node puts and removals in this change.
    pub fn node_writes(&self) -> impl Iterator<Item = (&str, Option<&Node>)> {
        self.update.writes.iter().filter_map(|w| match &w.write {
            EntryWrite::Node { id, node } => Some((id.as_str(), node.as_ref())),
            _ => None,
        })
    }

    /// Edge puts and removals in this change.
    pub fn edge_writes(&self) -> impl Iterator<Item = (&str, Option<&Edge>)> {
        self.update.writes.iter().filter_map(|w| match &w.write {
            EntryWrite::Edge { id, edge } => Some((id.as_str(), edge.as_ref())),
            _ => None,
        })
    }

    /// Text puts and removals in this change.
    pub fn text_writes(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.update.writes.iter().filter_map(|w| match &w.write {
            EntryWrite::Text { id, text } => Some((id.as_str(), text.as_deref())),
            _ => None,
        })
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Read/write access inside one atomic transaction.
///
/// Reads observe the transaction's own pending writes.
pub trait DocTxn {
    fn node(&self, id: &str) -> Option<Node>;
    fn put_node(&mut self, node: Node);
    /// Remove a node entry. Returns false if it was already absent.
    fn remove_node(&mut self, id: &str) -> bool;

    fn edge(&self, id: &str) -> Option<Edge>;
    fn put_edge(&mut self, edge: Edge);
    fn remove_edge(&mut self, id: &str) -> bool;

    fn text(&self, id: &str) -> Option<String>;
    fn put_text(&mut self, id: &str, text: String);
    fn remove_text(&mut self, id: &str) -> bool;
}

/// Handle to a replicated argument-map document.
///
/// Implementations hold their transaction lock for the duration of
/// `transact`; calling back into the same handle from inside the closure is
/// not supported. Use the [`DocTxn`] reads instead.
pub trait GraphDoc: Send + Sync {
    fn graph_id(&self) -> GraphId;

    fn node(&self, id: &str) -> Option<Node>;
    fn edge(&self, id: &str) -> Option<Edge>;
    fn text(&self, id: &str) -> Option<String>;

    /// All live nodes, in first-insertion order.
    fn nodes(&self) -> Vec<Node>;
    /// All live edges, in first-insertion order.
    fn edges(&self) -> Vec<Edge>;

    /// Run `f` as one atomic transaction tagged with `origin`.
    ///
    /// Returns the committed update, or `None` when `f` wrote nothing (in
    /// which case no change is published).
    fn transact(&self, origin: OriginToken, f: &mut dyn FnMut(&mut dyn DocTxn)) -> Option<DocUpdate>;

    /// Subscribe to committed changes (local and remote).
    fn subscribe(&self) -> broadcast::Receiver<DocChange>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_detection() {
        let mine = OriginToken::new();
        let theirs = OriginToken::new();
        assert!(ChangeOrigin::Local(mine).is_echo_of(mine));
        assert!(!ChangeOrigin::Local(theirs).is_echo_of(mine));
        assert!(!ChangeOrigin::Remote.is_echo_of(mine));
        assert!(ChangeOrigin::Remote.is_remote());
    }

    #[test]
    fn test_stamp_order_breaks_ties_by_peer() {
        let (a, b) = {
            let x = PeerId::new();
            let y = PeerId::new();
            if x < y { (x, y) } else { (y, x) }
        };
        let s1 = Stamp { lamport: 3, peer: b };
        let s2 = Stamp { lamport: 4, peer: a };
        let s3 = Stamp { lamport: 4, peer: b };
        assert!(s1 < s2);
        assert!(s2 < s3);
    }

    #[test]
    fn test_entry_write_accessors() {
        let w = EntryWrite::Edge { id: "e1".into(), edge: None };
        assert_eq!(w.key(), "e1");
        assert!(w.is_removal());
        let w = EntryWrite::Text { id: "p1".into(), text: Some("x".into()) };
        assert!(!w.is_removal());
    }
}
