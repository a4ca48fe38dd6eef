//! Everything a mutation needs besides the local view.

use argmap_crdt::GraphDoc;
use argmap_types::OriginToken;

use crate::collab::{LayoutMeasure, LockOracle, UndoScope};
use crate::config::EngineConfig;

/// Borrowed handles and flags for one mutation call.
///
/// `doc` is optional: without it an operation only updates local state,
/// which is how a purely local (or test) view is driven.
#[derive(Clone, Copy)]
pub struct MutationContext<'a> {
    pub doc: Option<&'a dyn GraphDoc>,
    pub origin: OriginToken,
    pub can_write: bool,
    pub is_leader: bool,
    pub locks: Option<&'a dyn LockOracle>,
    pub undo: Option<&'a dyn UndoScope>,
    pub layout: Option<&'a dyn LayoutMeasure>,
    pub config: &'a EngineConfig,
}

impl<'a> MutationContext<'a> {
    /// Writable, non-leader context with no document or collaborators.
    pub fn new(origin: OriginToken, config: &'a EngineConfig) -> Self {
        Self {
            doc: None,
            origin,
            can_write: true,
            is_leader: false,
            locks: None,
            undo: None,
            layout: None,
            config,
        }
    }

    pub fn with_doc(mut self, doc: &'a dyn GraphDoc) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn with_write(mut self, can_write: bool) -> Self {
        self.can_write = can_write;
        self
    }

    pub fn with_leader(mut self, is_leader: bool) -> Self {
        self.is_leader = is_leader;
        self
    }

    pub fn with_locks(mut self, locks: &'a dyn LockOracle) -> Self {
        self.locks = Some(locks);
        self
    }

    pub fn with_undo(mut self, undo: &'a dyn UndoScope) -> Self {
        self.undo = Some(undo);
        self
    }

    pub fn with_layout(mut self, layout: &'a dyn LayoutMeasure) -> Self {
        self.layout = Some(layout);
        self
    }

    pub(crate) fn release_texts<'i>(&self, ids: impl IntoIterator<Item = &'i String>) {
        if let Some(undo) = self.undo {
            for id in ids {
                undo.release_text(id);
            }
        }
    }
}
