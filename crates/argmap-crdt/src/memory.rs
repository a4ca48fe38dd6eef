//! In-memory replica of the argument-map document.
//!
//! `MemoryDoc` is a last-writer-wins map-of-maps: each key carries a
//! [`Stamp`] and the highest stamp wins on merge. Removals are kept as
//! tombstones so a late-arriving older put cannot resurrect a deleted entry.
//!
//! Uses a Lamport clock (not wall-clock) for stamps. The clock advances once
//! per committed local transaction and on merge (`max(local, remote) + 1`),
//! so a local write always supersedes everything this replica has seen.

use std::path::Path;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use argmap_types::{Edge, GraphId, Node, OriginToken, PeerId};

use crate::doc::{ChangeOrigin, DocChange, DocTxn, DocUpdate, EntryWrite, GraphDoc, Stamp, StampedWrite};
use crate::{CrdtError, Result};

/// Default change-stream capacity.
pub const DEFAULT_CHANGE_BUFFER: usize = 1024;

/// Snapshot format version written by [`MemoryDoc::snapshot`].
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug)]
struct Slot<T> {
    /// `None` is a tombstone.
    value: Option<T>,
    stamp: Stamp,
}

/// Outcome of an LWW write against one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Merge {
    /// Lost to an equal or newer stamp.
    Stale,
    /// Won, but the key was absent before and after (tombstone over nothing).
    Silent,
    /// Won and changed what readers see.
    Visible,
}

fn lww<T>(map: &mut IndexMap<String, Slot<T>>, id: &str, value: Option<T>, stamp: Stamp) -> Merge {
    match map.get_mut(id) {
        Some(slot) if slot.stamp >= stamp => Merge::Stale,
        Some(slot) => {
            let visible = slot.value.is_some() || value.is_some();
            slot.value = value;
            slot.stamp = stamp;
            if visible { Merge::Visible } else { Merge::Silent }
        }
        None => {
            let visible = value.is_some();
            map.insert(id.to_string(), Slot { value, stamp });
            if visible { Merge::Visible } else { Merge::Silent }
        }
    }
}

fn live<'a, T>(map: &'a IndexMap<String, Slot<T>>, id: &str) -> Option<&'a T> {
    map.get(id).and_then(|slot| slot.value.as_ref())
}

#[derive(Default)]
struct State {
    nodes: IndexMap<String, Slot<Node>>,
    edges: IndexMap<String, Slot<Edge>>,
    texts: IndexMap<String, Slot<String>>,
    /// Lamport clock for LWW stamps.
    lamport: u64,
}

impl State {
    /// Advance the Lamport clock and return the new value.
    fn tick(&mut self) -> u64 {
        self.lamport += 1;
        self.lamport
    }

    /// Advance the Lamport clock to at least `remote_ts + 1`.
    fn merge_clock(&mut self, remote_ts: u64) {
        self.lamport = self.lamport.max(remote_ts) + 1;
    }

    fn apply(&mut self, sw: &StampedWrite) -> Merge {
        match &sw.write {
            EntryWrite::Node { id, node } => lww(&mut self.nodes, id, node.clone(), sw.stamp),
            EntryWrite::Edge { id, edge } => lww(&mut self.edges, id, edge.clone(), sw.stamp),
            EntryWrite::Text { id, text } => lww(&mut self.texts, id, text.clone(), sw.stamp),
        }
    }
}

/// Pending writes of one transaction, layered over committed state.
struct MemoryTxn<'a> {
    state: &'a State,
    nodes: IndexMap<String, Option<Node>>,
    edges: IndexMap<String, Option<Edge>>,
    texts: IndexMap<String, Option<String>>,
}

impl<'a> MemoryTxn<'a> {
    fn new(state: &'a State) -> Self {
        Self {
            state,
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            texts: IndexMap::new(),
        }
    }

    fn into_writes(self) -> Vec<EntryWrite> {
        let nodes = self.nodes.into_iter().map(|(id, node)| EntryWrite::Node { id, node });
        let edges = self.edges.into_iter().map(|(id, edge)| EntryWrite::Edge { id, edge });
        let texts = self.texts.into_iter().map(|(id, text)| EntryWrite::Text { id, text });
        nodes.chain(edges).chain(texts).collect()
    }
}

impl DocTxn for MemoryTxn<'_> {
    fn node(&self, id: &str) -> Option<Node> {
        match self.nodes.get(id) {
            Some(pending) => pending.clone(),
            None => live(&self.state.nodes, id).cloned(),
        }
    }

    fn put_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), Some(node));
    }

    fn remove_node(&mut self, id: &str) -> bool {
        let existed = self.node(id).is_some();
        if existed {
            self.nodes.insert(id.to_string(), None);
        }
        existed
    }

    fn edge(&self, id: &str) -> Option<Edge> {
        match self.edges.get(id) {
            Some(pending) => pending.clone(),
            None => live(&self.state.edges, id).cloned(),
        }
    }

    fn put_edge(&mut self, edge: Edge) {
        self.edges.insert(edge.id.clone(), Some(edge));
    }

    fn remove_edge(&mut self, id: &str) -> bool {
        let existed = self.edge(id).is_some();
        if existed {
            self.edges.insert(id.to_string(), None);
        }
        existed
    }

    fn text(&self, id: &str) -> Option<String> {
        match self.texts.get(id) {
            Some(pending) => pending.clone(),
            None => live(&self.state.texts, id).cloned(),
        }
    }

    fn put_text(&mut self, id: &str, text: String) {
        self.texts.insert(id.to_string(), Some(text));
    }

    fn remove_text(&mut self, id: &str) -> bool {
        let existed = self.text(id).is_some();
        if existed {
            self.texts.insert(id.to_string(), None);
        }
        existed
    }
}

/// Serializable durable state: live entries only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocSnapshot {
    pub version: u32,
    pub graph_id: GraphId,
    pub lamport: u64,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub texts: IndexMap<String, String>,
}

/// In-memory replica with LWW merge and a broadcast change stream.
pub struct MemoryDoc {
    graph_id: GraphId,
    peer: PeerId,
    state: RwLock<State>,
    changes: broadcast::Sender<DocChange>,
}

impl MemoryDoc {
    /// Create an empty replica.
    pub fn new(graph_id: GraphId, peer: PeerId) -> Self {
        Self::with_change_buffer(graph_id, peer, DEFAULT_CHANGE_BUFFER)
    }

    /// Create an empty replica with a specific change-stream capacity.
    pub fn with_change_buffer(graph_id: GraphId, peer: PeerId, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            graph_id,
            peer,
            state: RwLock::new(State::default()),
            changes,
        }
    }

    /// The replica (peer) this document writes as.
    pub fn peer(&self) -> PeerId {
        self.peer
    }

    /// Current Lamport clock value.
    pub fn lamport(&self) -> u64 {
        self.state.read().lamport
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.state.read().nodes.values().filter(|s| s.value.is_some()).count()
    }

    /// Number of live edges.
    pub fn edge_count(&self) -> usize {
        self.state.read().edges.values().filter(|s| s.value.is_some()).count()
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Everything this replica knows, tombstones included.
    ///
    /// Applying it to a fresh replica brings that replica fully up to date.
    pub fn full_update(&self) -> DocUpdate {
        let state = self.state.read();
        let nodes = state.nodes.iter().map(|(id, s)| StampedWrite {
            stamp: s.stamp,
            write: EntryWrite::Node { id: id.clone(), node: s.value.clone() },
        });
        let edges = state.edges.iter().map(|(id, s)| StampedWrite {
            stamp: s.stamp,
            write: EntryWrite::Edge { id: id.clone(), edge: s.value.clone() },
        });
        let texts = state.texts.iter().map(|(id, s)| StampedWrite {
            stamp: s.stamp,
            write: EntryWrite::Text { id: id.clone(), text: s.value.clone() },
        });
        DocUpdate {
            graph_id: self.graph_id,
            peer: self.peer,
            writes: nodes.chain(edges).chain(texts).collect(),
        }
    }

    /// Merge an update produced by another replica.
    ///
    /// Each write is applied only if its stamp beats the local one. The
    /// writes that changed visible state are published as a single
    /// [`ChangeOrigin::Remote`] change. Returns how many writes won;
    /// re-applying the same update returns 0.
    pub fn apply_update(&self, update: &DocUpdate) -> Result<usize> {
        if update.graph_id != self.graph_id {
            return Err(CrdtError::GraphMismatch {
                expected: self.graph_id,
                got: update.graph_id,
            });
        }

        let mut won = 0;
        let mut visible = Vec::new();
        {
            let mut state = self.state.write();
            let mut max_remote_ts = 0;
            for sw in &update.writes {
                max_remote_ts = max_remote_ts.max(sw.stamp.lamport);
                match state.apply(sw) {
                    Merge::Stale => {}
                    Merge::Silent => won += 1,
                    Merge::Visible => {
                        won += 1;
                        visible.push(sw.clone());
                    }
                }
            }
            if max_remote_ts > 0 {
                state.merge_clock(max_remote_ts);
            }
        }

        tracing::trace!(
            graph = %self.graph_id,
            from = %update.peer.short(),
            received = update.len(),
            won,
            "merged remote update"
        );

        if !visible.is_empty() {
            let change = DocChange {
                origin: ChangeOrigin::Remote,
                update: DocUpdate {
                    graph_id: self.graph_id,
                    peer: update.peer,
                    writes: visible,
                },
            };
            // No subscribers is fine.
            let _ = self.changes.send(change);
        }

        Ok(won)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Capture live state.
    pub fn snapshot(&self) -> DocSnapshot {
        let state = self.state.read();
        DocSnapshot {
            version: SNAPSHOT_VERSION,
            graph_id: self.graph_id,
            lamport: state.lamport,
            nodes: state.nodes.values().filter_map(|s| s.value.clone()).collect(),
            edges: state.edges.values().filter_map(|s| s.value.clone()).collect(),
            texts: state
                .texts
                .iter()
                .filter_map(|(id, s)| s.value.clone().map(|t| (id.clone(), t)))
                .collect(),
        }
    }

    /// Rebuild a replica from a snapshot.
    ///
    /// Restored entries are stamped with the snapshot's Lamport time and the
    /// nil peer, so any later write from a real peer supersedes them.
    pub fn from_snapshot(snapshot: DocSnapshot, peer: PeerId) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CrdtError::UnsupportedSnapshot {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let stamp = Stamp { lamport: snapshot.lamport, peer: PeerId::nil() };
        let mut state = State {
            lamport: snapshot.lamport,
            ..State::default()
        };
        for node in snapshot.nodes {
            state.nodes.insert(node.id.clone(), Slot { value: Some(node), stamp });
        }
        for edge in snapshot.edges {
            state.edges.insert(edge.id.clone(), Slot { value: Some(edge), stamp });
        }
        for (id, text) in snapshot.texts {
            state.texts.insert(id, Slot { value: Some(text), stamp });
        }

        let doc = Self::new(snapshot.graph_id, peer);
        *doc.state.write() = state;
        Ok(doc)
    }

    /// Write a JSON snapshot to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.snapshot())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a replica from a JSON snapshot at `path`.
    pub fn load(path: &Path, peer: PeerId) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let snapshot: DocSnapshot = serde_json::from_slice(&bytes)?;
        Self::from_snapshot(snapshot, peer)
    }
}

impl GraphDoc for MemoryDoc {
    fn graph_id(&self) -> GraphId {
        self.graph_id
    }

    fn node(&self, id: &str) -> Option<Node> {
        live(&self.state.read().nodes, id).cloned()
    }

    fn edge(&self, id: &str) -> Option<Edge> {
        live(&self.state.read().edges, id).cloned()
    }

    fn text(&self, id: &str) -> Option<String> {
        live(&self.state.read().texts, id).cloned()
    }

    fn nodes(&self) -> Vec<Node> {
        self.state.read().nodes.values().filter_map(|s| s.value.clone()).collect()
    }

    fn edges(&self) -> Vec<Edge> {
        self.state.read().edges.values().filter_map(|s| s.value.clone()).collect()
    }

    fn transact(&self, origin: OriginToken, f: &mut dyn FnMut(&mut dyn DocTxn)) -> Option<DocUpdate> {
        let update = {
            let mut state = self.state.write();
            let pending = {
                let mut txn = MemoryTxn::new(&state);
                f(&mut txn);
                txn.into_writes()
            };
            if pending.is_empty() {
                return None;
            }

            let stamp = Stamp { lamport: state.tick(), peer: self.peer };
            let writes: Vec<StampedWrite> = pending
                .into_iter()
                .map(|write| StampedWrite { stamp, write })
                .collect();
            for sw in &writes {
                state.apply(sw);
            }
            DocUpdate { graph_id: self.graph_id, peer: self.peer, writes }
        };

        tracing::trace!(
            graph = %self.graph_id,
            origin = %origin.short(),
            writes = update.len(),
            "committed transaction"
        );

        let _ = self.changes.send(DocChange {
            origin: ChangeOrigin::Local(origin),
            update: update.clone(),
        });
        Some(update)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocChange> {
        self.changes.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
