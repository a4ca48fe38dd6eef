//! The structural mutations.
//!
//! Each operation follows the same shape:
//!
//! 1. validate ids (malformed ids are the only errors)
//! 2. permission and lock guards
//! 3. compute the next lists from a snapshot of the local view
//! 4. at most one `set_nodes` and one `set_edges` call
//! 5. one document transaction tagged with the client's origin
//!
//! | Operation                         | Local writes            | Document writes              |
//! |-----------------------------------|-------------------------|------------------------------|
//! | [`delete_node`]                   | nodes + edges           | removals, restored originals |
//! | [`create_inverse_pair`]           | nodes                   | group + 2 children + text    |
//! | [`sync_pair_height`]              | nodes                   | `pairHeight` on both children|
//! | [`fill_inverse_content`]          | nodes                   | inverse content + text       |
//! | [`begin_remove_inverse_pair`]     | nodes                   | `closing = true` on group    |
//! | [`finish_remove_inverse_pair`]    | nodes + edges           | removals, restored original  |
//! | [`dissolve_broken_pair`]          | nodes + edges           | removals, restored original  |

mod cascade;
mod delete_node;
mod inverse_pair;
mod remove_pair;

use std::sync::Arc;

use argmap_types::Node;

pub use delete_node::delete_node;
pub use inverse_pair::{create_inverse_pair, fill_inverse_content, sync_pair_height};
pub use remove_pair::{begin_remove_inverse_pair, dissolve_broken_pair, finish_remove_inverse_pair};

use crate::view::{NodeList, find_node};

/// `child` taken out of `group`: parent and pairing fields cleared, position
/// converted from group-relative to absolute.
pub(crate) fn standalone(child: &Node, group: &Node) -> Node {
    let mut node = child.clone();
    node.position = child.absolute_position(Some(group));
    node.parent_id = None;
    if let Some(point) = node.as_point_mut() {
        point.clear_pairing();
    }
    node
}

/// Copy of `prev` where nodes for which `replace` returns a new value are
/// swapped out; all other entries keep their `Arc`.
pub(crate) fn replace_nodes<F>(prev: &[Arc<Node>], replace: F) -> NodeList
where
    F: Fn(&Node) -> Option<Node>,
{
    prev.iter()
        .map(|node| match replace(node) {
            Some(next) => Arc::new(next),
            None => Arc::clone(node),
        })
        .collect()
}

/// The pair group owning `child_id`, via `parent_id` or the point's `group_id`.
pub(crate) fn owning_group(nodes: &[Arc<Node>], child_id: &str) -> Option<String> {
    let child = find_node(nodes, child_id)?;
    child
        .parent_id
        .clone()
        .or_else(|| child.as_point().and_then(|p| p.group_id.clone()))
}

/// The `(original, inverse)` children of `group_id`, if present.
pub(crate) fn pair_children<'a>(
    nodes: &'a [Arc<Node>],
    group_id: &str,
) -> (Option<&'a Arc<Node>>, Option<&'a Arc<Node>>) {
    let mut original = None;
    let mut inverse = None;
    for node in nodes.iter().filter(|n| n.parent_id.as_deref() == Some(group_id)) {
        match node.as_point() {
            Some(p) if p.original_in_pair => original = Some(node),
            Some(p) if p.direct_inverse => inverse = Some(node),
            _ => {}
        }
    }
    (original, inverse)
}

/// A group holding only one of the two pair members.
pub(crate) fn is_broken_pair(nodes: &[Arc<Node>], group_id: &str) -> bool {
    matches!(pair_children(nodes, group_id), (Some(_), None) | (None, Some(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use argmap_types::Position;

    #[test]
    fn test_standalone_restores_absolute_position() {
        let group = Node::group("g1", Position::new(88.0, 88.0));
        let mut child = Node::point("p1", Position::new(12.0, 12.0), "claim").with_parent("g1");
        {
            let p = child.as_point_mut().unwrap();
            p.original_in_pair = true;
            p.group_id = Some("g1".into());
            p.pair_height = Some(64.0);
            p.cred = Some(0.7);
        }

        let node = standalone(&child, &group);
        assert_eq!(node.position, Position::new(100.0, 100.0));
        assert_eq!(node.parent_id, None);
        let p = node.as_point().unwrap();
        assert!(!p.is_paired());
        assert_eq!(p.group_id, None);
        assert_eq!(p.pair_height, None);
        assert_eq!(p.cred, Some(0.7));
        assert_eq!(p.content, "claim");
    }
}
