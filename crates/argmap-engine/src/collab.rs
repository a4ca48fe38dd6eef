//! Collaborator interfaces the engine consumes, plus small in-process
//! implementations for single-process use and tests.
//!
//! - [`LockOracle`]: soft, presence-based exclusive edit locks
//! - [`UndoScope`]: undo history for text-bearing nodes
//! - [`LayoutMeasure`]: rendered bounding boxes
//!
//! The engine only consults these; it never owns lock or undo state.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use argmap_types::{PeerId, Size};

// ============================================================================
// Locks
// ============================================================================

/// Holder of an exclusive edit lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockOwner {
    pub peer: PeerId,
    pub name: String,
}

/// Answers "who may structurally mutate node X right now".
pub trait LockOracle: Send + Sync {
    /// True when another peer holds an exclusive lock on `id`.
    fn is_locked_for_me(&self, id: &str) -> bool;
    /// Current holder of the lock on `id`, if any.
    fn lock_owner(&self, id: &str) -> Option<LockOwner>;
}

/// Presence-based lock table for one client.
pub struct PresenceLocks {
    me: PeerId,
    held: RwLock<HashMap<String, LockOwner>>,
}

impl PresenceLocks {
    pub fn new(me: PeerId) -> Self {
        Self { me, held: RwLock::new(HashMap::new()) }
    }

    /// Record that `owner` holds `id`. Returns false if someone else already does.
    pub fn acquire(&self, id: &str, owner: LockOwner) -> bool {
        let mut held = self.held.write();
        match held.get(id) {
            Some(current) if current.peer != owner.peer => false,
            _ => {
                held.insert(id.to_string(), owner);
                true
            }
        }
    }

    /// Drop the lock on `id`, whoever held it (presence expired).
    pub fn release(&self, id: &str) -> Option<LockOwner> {
        self.held.write().remove(id)
    }
}

impl LockOracle for PresenceLocks {
    fn is_locked_for_me(&self, id: &str) -> bool {
        self.held.read().get(id).is_some_and(|owner| owner.peer != self.me)
    }

    fn lock_owner(&self, id: &str) -> Option<LockOwner> {
        self.held.read().get(id).cloned()
    }
}

// ============================================================================
// Undo
// ============================================================================

/// Undo/redo registrar for text-bearing nodes.
pub trait UndoScope: Send + Sync {
    /// A text-bearing node was created; include it in undo history.
    fn register_text(&self, id: &str, text: &str);
    /// A node was deleted; drop any optimistic text tracked for it.
    fn release_text(&self, id: &str);
}

/// Undo scope that just remembers tracked text.
#[derive(Default)]
pub struct TrackedText {
    texts: Mutex<IndexMap<String, String>>,
}

impl TrackedText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<String> {
        self.texts.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.texts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.lock().is_empty()
    }
}

impl UndoScope for TrackedText {
    fn register_text(&self, id: &str, text: &str) {
        self.texts.lock().insert(id.to_string(), text.to_string());
    }

    fn release_text(&self, id: &str) {
        self.texts.lock().shift_remove(id);
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Reports rendered bounding boxes. `None` when the node is not laid out
/// (yet) or measurement is unavailable.
pub trait LayoutMeasure: Send + Sync {
    fn measure(&self, node_id: &str) -> Option<Size>;
}

/// Layout measurements fed in by whoever renders.
#[derive(Default)]
pub struct MeasuredLayout {
    sizes: RwLock<HashMap<String, Size>>,
}

impl MeasuredLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, node_id: impl Into<String>, size: Size) {
        self.sizes.write().insert(node_id.into(), size);
    }

    pub fn forget(&self, node_id: &str) {
        self.sizes.write().remove(node_id);
    }
}

impl LayoutMeasure for MeasuredLayout {
    fn measure(&self, node_id: &str) -> Option<Size> {
        self.sizes.read().get(node_id).copied()
    }
}

// ============================================================================
// Leadership
// ============================================================================

/// Deterministic leader among peers: the lowest peer id.
pub fn elect_leader(peers: impl IntoIterator<Item = PeerId>) -> Option<PeerId> {
    peers.into_iter().min()
}

/// Whether `me` is the leader among `peers` (which should include `me`).
pub fn is_leader(me: PeerId, peers: impl IntoIterator<Item = PeerId>) -> bool {
    elect_leader(peers).is_some_and(|leader| leader == me)
}
