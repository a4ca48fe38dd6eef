//! Shared guards every mutation runs behind.
//!
//! Permission and lock guards turn a denial into
//! [`Outcome::Skipped`] before the wrapped closure runs, so a denied
//! operation makes no local and no document writes.

use argmap_crdt::{DocTxn, DocUpdate, GraphDoc};
use argmap_types::OriginToken;

use crate::collab::LockOracle;
use crate::error::EngineError;
use crate::outcome::{Outcome, SkipReason};

/// Run `f` only when this client may write.
pub fn with_write_permission<F>(can_write: bool, f: F) -> Result<Outcome, EngineError>
where
    F: FnOnce() -> Result<Outcome, EngineError>,
{
    if !can_write {
        tracing::debug!("read-only client, skipping mutation");
        return Ok(Outcome::Skipped(SkipReason::ReadOnly));
    }
    f()
}

/// Run `f` unless another peer holds an exclusive lock on `node_id`.
///
/// Without an oracle every node counts as unlocked. A lock held by this
/// client never blocks.
pub fn with_lock<F>(node_id: &str, locks: Option<&dyn LockOracle>, f: F) -> Result<Outcome, EngineError>
where
    F: FnOnce() -> Result<Outcome, EngineError>,
{
    if let Some(locks) = locks
        && locks.is_locked_for_me(node_id)
    {
        let owner = locks.lock_owner(node_id);
        tracing::debug!(
            node = node_id,
            owner = owner.as_ref().map(|o| o.name.as_str()).unwrap_or("unknown"),
            "node locked by another peer, skipping mutation"
        );
        return Ok(Outcome::Skipped(SkipReason::Locked { owner }));
    }
    f()
}

/// Apply `f` as one document transaction tagged with this client's origin.
///
/// The client's change listener recognises the tag and does not reduce its
/// own echo back into local state. Returns `None` without a document, or
/// when `f` wrote nothing.
pub fn with_local_origin<F>(doc: Option<&dyn GraphDoc>, origin: OriginToken, mut f: F) -> Option<DocUpdate>
where
    F: FnMut(&mut dyn DocTxn),
{
    let doc = doc?;
    doc.transact(origin, &mut f)
}
