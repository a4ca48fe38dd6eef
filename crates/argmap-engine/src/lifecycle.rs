//! Pair-group lifecycle.
//!
//! ```text
//! Active --(remove initiated)--> Closing --(transition complete)--> Removed
//! ```
//!
//! The replicated form is just `GroupData::closing` plus the presence of the
//! group entry; this module gives it an explicit state machine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use argmap_crdt::GraphDoc;
use argmap_types::Node;

use crate::error::EngineError;
use crate::view::find_node;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLifecycle {
    Active,
    Closing,
    Removed,
}

impl GroupLifecycle {
    /// Lifecycle of a group entry. `None` (absent) reads as `Removed`;
    /// a non-group node has no lifecycle.
    pub fn of(node: Option<&Node>) -> Option<Self> {
        match node {
            None => Some(GroupLifecycle::Removed),
            Some(n) => n.as_group().map(|g| {
                if g.closing {
                    GroupLifecycle::Closing
                } else {
                    GroupLifecycle::Active
                }
            }),
        }
    }

    /// Move to `to`, rejecting transitions the machine does not define.
    pub fn transition(self, to: GroupLifecycle) -> Result<GroupLifecycle, EngineError> {
        match (self, to) {
            (GroupLifecycle::Active, GroupLifecycle::Closing)
            | (GroupLifecycle::Closing, GroupLifecycle::Removed) => Ok(to),
            (from, to) => Err(EngineError::InvalidTransition { from, to }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupLifecycle::Active => "active",
            GroupLifecycle::Closing => "closing",
            GroupLifecycle::Removed => "removed",
        }
    }
}

impl std::fmt::Display for GroupLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Current lifecycle of group `id`, read through the document when there is
/// one and from local state otherwise.
pub fn group_lifecycle(
    doc: Option<&dyn GraphDoc>,
    nodes: &[Arc<Node>],
    id: &str,
) -> Option<GroupLifecycle> {
    match doc {
        Some(doc) => GroupLifecycle::of(doc.node(id).as_ref()),
        None => GroupLifecycle::of(find_node(nodes, id).map(|n| &**n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argmap_types::Position;

    #[test]
    fn test_lifecycle_of_node() {
        let mut group = Node::group("g1", Position::ORIGIN);
        assert_eq!(GroupLifecycle::of(Some(&group)), Some(GroupLifecycle::Active));
        group.as_group_mut().unwrap().closing = true;
        assert_eq!(GroupLifecycle::of(Some(&group)), Some(GroupLifecycle::Closing));
        assert_eq!(GroupLifecycle::of(None), Some(GroupLifecycle::Removed));

        let point = Node::point("p1", Position::ORIGIN, "x");
        assert_eq!(GroupLifecycle::of(Some(&point)), None);
    }

    #[test]
    fn test_transitions() {
        use GroupLifecycle::*;
        assert_eq!(Active.transition(Closing), Ok(Closing));
        assert_eq!(Closing.transition(Removed), Ok(Removed));

        for (from, to) in [(Closing, Active), (Active, Removed), (Removed, Active), (Closing, Closing)] {
            assert_eq!(
                from.transition(to),
                Err(EngineError::InvalidTransition { from, to })
            );
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = GroupLifecycle::Removed.transition(GroupLifecycle::Active).unwrap_err();
        assert_eq!(err.to_string(), "invalid group transition removed -> active");
    }
}
