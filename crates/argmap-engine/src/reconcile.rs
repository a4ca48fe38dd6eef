//! Merging document changes into the local view.
//!
//! A client's own transactions come back on the change stream tagged with
//! its origin token; those are skipped since the optimistic update already
//! happened. Everything else (remote merges, other local writers) is
//! reduced into the view with at most one `set_nodes` and one `set_edges`.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{trace, warn};

use argmap_crdt::DocChange;
use argmap_types::{Edge, Node, OriginToken, validate_id};

use crate::ops::is_broken_pair;
use crate::view::{LocalView, find_node};

/// What a reconciled change did to the view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciled {
    pub nodes_changed: usize,
    pub edges_changed: usize,
    /// Groups that were not closing before and are now.
    pub entered_closing: Vec<String>,
    /// Node ids that were in the view and are now gone.
    pub removed_nodes: Vec<String>,
    /// Groups that arrived with this change.
    pub new_pairs: Vec<String>,
    /// Groups touched by this change that now hold only one pair member.
    pub broken_pairs: Vec<String>,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.nodes_changed == 0 && self.edges_changed == 0
    }
}

/// Reduce `change` into `view`. Returns `None` for this client's own echo.
pub fn reconcile(change: &DocChange, local_origin: OriginToken, view: &dyn LocalView) -> Option<Reconciled> {
    if change.origin.is_echo_of(local_origin) {
        trace!(writes = change.update.len(), "skipping own echo");
        return None;
    }

    let node_writes: IndexMap<&str, Option<&Node>> = change
        .node_writes()
        .filter(|(id, node)| accept(id, node.map(|n| n.id.as_str())))
        .collect();
    let edge_writes: IndexMap<&str, Option<&Edge>> = change
        .edge_writes()
        .filter(|(id, edge)| accept(id, edge.map(|e| e.id.as_str())))
        .collect();
    let text_writes: IndexMap<&str, &str> = change
        .text_writes()
        .filter_map(|(id, text)| Some((id, text?)))
        .collect();

    let mut out = Reconciled::default();
    let before = view.nodes();
    let mut touched_groups: IndexSet<String> = IndexSet::new();
    for (id, write) in &node_writes {
        let was = find_node(&before, id);
        match write {
            Some(node) => {
                let closing = node.as_group().is_some_and(|g| g.closing);
                let was_closing = was.and_then(|n| n.as_group()).is_some_and(|g| g.closing);
                if closing && !was_closing {
                    out.entered_closing.push(id.to_string());
                }
                if node.is_group() {
                    touched_groups.insert(id.to_string());
                    if was.is_none() && !closing {
                        out.new_pairs.push(id.to_string());
                    }
                }
                touched_groups.extend(node.parent_id.iter().cloned());
            }
            None => {
                if let Some(was) = was {
                    out.removed_nodes.push(id.to_string());
                    touched_groups.extend(was.parent_id.iter().cloned());
                }
            }
        }
    }

    if !node_writes.is_empty() || !text_writes.is_empty() {
        out.nodes_changed = node_writes.len() + text_writes.len();
        view.set_nodes(&|prev| {
            let mut next: Vec<Arc<Node>> = Vec::with_capacity(prev.len() + node_writes.len());
            for node in prev {
                match node_writes.get(node.id.as_str()) {
                    Some(Some(incoming)) => next.push(Arc::new(with_text(incoming, &text_writes))),
                    Some(None) => {}
                    None => match text_writes.get(node.id.as_str()) {
                        Some(text) if node.text().is_some_and(|t| t != *text) => {
                            next.push(Arc::new(with_text(node, &text_writes)));
                        }
                        _ => next.push(Arc::clone(node)),
                    },
                }
            }
            let mut added: Vec<&Node> = node_writes
                .iter()
                .filter(|(id, _)| find_node(prev, id).is_none())
                .filter_map(|(_, node)| *node)
                .collect();
            // Parents ahead of children.
            added.sort_by_key(|n| !n.is_group());
            next.extend(added.into_iter().map(|n| Arc::new(with_text(n, &text_writes))));
            next
        });
    }

    if !touched_groups.is_empty() {
        let after = view.nodes();
        out.broken_pairs = touched_groups
            .into_iter()
            .filter(|id| find_node(&after, id).is_some_and(|n| n.is_group()) && is_broken_pair(&after, id))
            .collect();
    }

    if !edge_writes.is_empty() {
        out.edges_changed = edge_writes.len();
        view.set_edges(&|prev| {
            let mut next: Vec<Arc<Edge>> = prev
                .iter()
                .filter_map(|edge| match edge_writes.get(edge.id.as_str()) {
                    Some(Some(incoming)) => Some(Arc::new((*incoming).clone())),
                    Some(None) => None,
                    None => Some(Arc::clone(edge)),
                })
                .collect();
            for (id, edge) in &edge_writes {
                if let Some(edge) = edge
                    && !prev.iter().any(|e| e.id == *id)
                {
                    next.push(Arc::new((*edge).clone()));
                }
            }
            next
        });
    }

    trace!(
        nodes = out.nodes_changed,
        edges = out.edges_changed,
        closing = out.entered_closing.len(),
        broken = out.broken_pairs.len(),
        "reconciled change"
    );
    Some(out)
}

fn accept(key: &str, entry_id: Option<&str>) -> bool {
    if let Err(err) = validate_id(key) {
        warn!(key, %err, "dropping write with malformed id");
        return false;
    }
    match entry_id {
        Some(id) if id != key => {
            warn!(key, id, "dropping write whose entry id does not match its key");
            false
        }
        _ => true,
    }
}

/// `node` with the text carried in the same change, if any.
fn with_text(node: &Node, texts: &IndexMap<&str, &str>) -> Node {
    let mut node = node.clone();
    if let Some(text) = texts.get(node.id.as_str()) {
        node.set_text(*text);
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::ViewState;
    use argmap_crdt::{GraphDoc, MemoryDoc};
    use argmap_types::{GraphId, PeerId, Position};

    fn replicas() -> (MemoryDoc, MemoryDoc) {
        let graph = GraphId::new();
        (MemoryDoc::new(graph, PeerId::new()), MemoryDoc::new(graph, PeerId::new()))
    }

    #[test]
    fn test_own_echo_is_skipped() {
        let (doc, _) = replicas();
        let view = ViewState::default();
        let mine = OriginToken::new();
        let mut rx = doc.subscribe();
        doc.transact(mine, &mut |tx| tx.put_node(Node::point("p1", Position::ORIGIN, "x")));

        let change = rx.try_recv().unwrap();
        assert_eq!(reconcile(&change, mine, &view), None);
        assert_eq!(view.node_writes(), 0);
    }

    #[test]
    fn test_remote_change_merges_once() {
        let (a, b) = replicas();
        let view = ViewState::new(vec![Node::point("keep", Position::ORIGIN, "k")], vec![]);
        let kept = view.node("keep").unwrap();
        let mut rx = b.subscribe();

        let update = a
            .transact(OriginToken::new(), &mut |tx| {
                tx.put_node(Node::point("p1", Position::ORIGIN, "hello"));
                tx.put_node(Node::point("p2", Position::ORIGIN, "world"));
                tx.put_edge(Edge::negation("e1", "p1", "p2"));
            })
            .unwrap();
        b.apply_update(&update).unwrap();

        let change = rx.try_recv().unwrap();
        let out = reconcile(&change, OriginToken::new(), &view).unwrap();
        assert_eq!(out.nodes_changed, 2);
        assert_eq!(out.edges_changed, 1);
        assert_eq!((view.node_writes(), view.edge_writes()), (1, 1));
        assert_eq!(view.node_ids(), vec!["keep", "p1", "p2"]);
        assert!(Arc::ptr_eq(&kept, &view.node("keep").unwrap()));
    }

    #[test]
    fn test_removal_and_closing_reported() {
        let mut group = Node::group("g1", Position::ORIGIN);
        let view = ViewState::new(
            vec![group.clone(), Node::point("p1", Position::ORIGIN, "x")],
            vec![Edge::negation("e1", "p1", "zz")],
        );
        let (doc, _) = replicas();
        let mut rx = doc.subscribe();
        if let Some(g) = group.as_group_mut() {
            g.closing = true;
        }
        doc.transact(OriginToken::new(), &mut |tx| {
            tx.put_node(Node::point("p1", Position::ORIGIN, "x"));
            tx.put_edge(Edge::negation("e1", "p1", "zz"));
        });
        let _ = rx.try_recv();
        doc.transact(OriginToken::new(), &mut |tx| {
            tx.put_node(group.clone());
            tx.remove_node("p1");
            tx.remove_edge("e1");
        });

        let change = rx.try_recv().unwrap();
        let out = reconcile(&change, OriginToken::new(), &view).unwrap();
        assert_eq!(out.entered_closing, vec!["g1".to_string()]);
        assert_eq!(out.removed_nodes, vec!["p1".to_string()]);
        assert_eq!(view.node_ids(), vec!["g1"]);
        assert!(view.edge_ids().is_empty());
        assert!(view.node("g1").unwrap().as_group().unwrap().closing);
    }

    #[test]
    fn test_text_write_updates_content() {
        let view = ViewState::new(vec![Node::point("p1", Position::ORIGIN, "Generating...")], vec![]);
        let (doc, _) = replicas();
        let mut rx = doc.subscribe();
        doc.transact(OriginToken::new(), &mut |tx| tx.put_text("p1", "filled".into()));

        let change = rx.try_recv().unwrap();
        reconcile(&change, OriginToken::new(), &view).unwrap();
        assert_eq!(view.node("p1").unwrap().text(), Some("filled"));
    }

    #[test]
    fn test_new_groups_precede_children() {
        let view = ViewState::default();
        let (doc, _) = replicas();
        let mut rx = doc.subscribe();
        doc.transact(OriginToken::new(), &mut |tx| {
            tx.put_node(Node::point("child", Position::ORIGIN, "c").with_parent("g1"));
            tx.put_node(Node::group("g1", Position::ORIGIN));
        });

        let change = rx.try_recv().unwrap();
        reconcile(&change, OriginToken::new(), &view).unwrap();
        assert_eq!(view.node_ids(), vec!["g1", "child"]);
    }

    fn pair_member(id: &str, original: bool) -> Node {
        let mut node = Node::point(id, Position::ORIGIN, id).with_parent("g1");
        if let Some(p) = node.as_point_mut() {
            p.original_in_pair = original;
            p.direct_inverse = !original;
            p.group_id = Some("g1".into());
        }
        node
    }

    #[test]
    fn test_new_and_broken_pairs_reported() {
        let view = ViewState::default();
        let (doc, _) = replicas();
        let mut rx = doc.subscribe();
        doc.transact(OriginToken::new(), &mut |tx| {
            tx.put_node(Node::group("g1", Position::ORIGIN));
            tx.put_node(pair_member("p1", true));
            tx.put_node(pair_member("p2", false));
        });
        let out = reconcile(&rx.try_recv().unwrap(), OriginToken::new(), &view).unwrap();
        assert_eq!(out.new_pairs, vec!["g1".to_string()]);
        assert!(out.broken_pairs.is_empty());

        doc.transact(OriginToken::new(), &mut |tx| {
            tx.remove_node("p1");
        });
        let out = reconcile(&rx.try_recv().unwrap(), OriginToken::new(), &view).unwrap();
        assert!(out.new_pairs.is_empty());
        assert_eq!(out.removed_nodes, vec!["p1".to_string()]);
        assert_eq!(out.broken_pairs, vec!["g1".to_string()]);

        doc.transact(OriginToken::new(), &mut |tx| {
            tx.remove_node("p2");
            tx.remove_node("g1");
        });
        let out = reconcile(&rx.try_recv().unwrap(), OriginToken::new(), &view).unwrap();
        assert!(out.broken_pairs.is_empty(), "a removed group is not broken");
        assert!(view.node_ids().is_empty());
    }
}
