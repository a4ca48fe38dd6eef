//! What a mutation did, or why it did nothing.

use crate::collab::LockOwner;

/// Result of a mutation that did not error.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Applied(Effect),
    /// Silent no-op: nothing was written locally or to the document.
    Skipped(SkipReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }

    pub fn effect(&self) -> Option<&Effect> {
        match self {
            Outcome::Applied(effect) => Some(effect),
            Outcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Outcome::Applied(_) => None,
            Outcome::Skipped(reason) => Some(reason),
        }
    }
}

/// The applied change.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Deleted {
        nodes: Vec<String>,
        edges: Vec<String>,
        /// Pair originals put back standalone by the cascade.
        restored: Vec<String>,
    },
    PairCreated {
        group_id: String,
        original_id: String,
        inverse_id: String,
    },
    PairHeightSynced {
        group_id: String,
        height: f64,
    },
    ContentFilled {
        node_id: String,
    },
    PairClosing {
        group_id: String,
    },
    PairRemoved {
        group_id: String,
        restored: Option<String>,
        removed: Vec<String>,
    },
}

impl Effect {
    /// Node ids this effect removed (timers keyed on them are dead).
    pub fn removed_nodes(&self) -> &[String] {
        match self {
            Effect::Deleted { nodes, .. } => nodes,
            Effect::PairRemoved { removed, .. } => removed,
            _ => &[],
        }
    }
}

/// Why a mutation was a no-op.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    /// This client may not write.
    ReadOnly,
    /// Another peer holds an exclusive lock on the target.
    Locked { owner: Option<LockOwner> },
    NotFound,
    /// The point is already inside a container.
    AlreadyPaired,
    /// The node is not a member of an inverse pair.
    NotPaired,
    AlreadyClosing,
    /// Leader-only step on a non-leader.
    NotLeader,
    /// Layout measurement is not available for one of the nodes.
    Unmeasured,
    /// The write would not change anything.
    Unchanged,
    /// The state a deferred step was scheduled against is gone.
    Stale,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::ReadOnly => "read_only",
            SkipReason::Locked { .. } => "locked",
            SkipReason::NotFound => "not_found",
            SkipReason::AlreadyPaired => "already_paired",
            SkipReason::NotPaired => "not_paired",
            SkipReason::AlreadyClosing => "already_closing",
            SkipReason::NotLeader => "not_leader",
            SkipReason::Unmeasured => "unmeasured",
            SkipReason::Unchanged => "unchanged",
            SkipReason::Stale => "stale",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Locked { owner: Some(owner) } => write!(f, "locked by {}", owner.name),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
