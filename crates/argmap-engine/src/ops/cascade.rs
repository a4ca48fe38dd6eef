//! Transitive closure of a structural delete.
//!
//! Removing an entity drags along everything that cannot exist without it:
//!
//! ```text
//! edge E         -> anchor:E, objections with parentEdgeId = E
//! node N         -> edges touching N, nodes owned by N
//! anchor:E       -> objections with parentEdgeId = E
//! last objection -> its anchor
//! pair child     -> original gone: whole pair; inverse gone: pair dissolved,
//!                   original restored standalone
//! ```
//!
//! The plan is computed once from a snapshot; the updaters it hands out are
//! plain filters, so entries the plan does not name keep their `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;

use argmap_crdt::DocTxn;
use argmap_types::{Edge, Node, anchor_id};

use super::{pair_children, standalone};
use crate::view::{EdgeList, NodeList, find_node};

pub(crate) enum Seed<'a> {
    Node(&'a str),
    Edge(&'a str),
}

enum Item {
    Node(String),
    Edge(String),
}

/// A pair original put back on the canvas because its inverse went away.
#[derive(Clone, Debug)]
pub(crate) struct Restored {
    pub group_id: String,
    pub node: Node,
}

#[derive(Debug, Default)]
pub(crate) struct Cascade {
    pub nodes: IndexSet<String>,
    pub edges: IndexSet<String>,
    pub restored: Vec<Restored>,
}

impl Cascade {
    pub fn plan(nodes: &[Arc<Node>], edges: &[Arc<Edge>], seed: Seed<'_>) -> Self {
        let item = match seed {
            Seed::Node(id) => Item::Node(id.to_string()),
            Seed::Edge(id) => Item::Edge(id.to_string()),
        };
        Self::run(nodes, edges, Cascade::default(), HashSet::new(), vec![item])
    }

    /// Take pair group `group_id` apart: the group and every child except
    /// the original go, the original is restored standalone.
    pub fn dissolve(nodes: &[Arc<Node>], edges: &[Arc<Edge>], group_id: &str) -> Self {
        let mut plan = Cascade::default();
        let mut keep = HashSet::new();
        if let Some(group) = find_node(nodes, group_id)
            && let (Some(original), _) = pair_children(nodes, group_id)
        {
            keep.insert(original.id.clone());
            plan.restored.push(Restored {
                group_id: group_id.to_string(),
                node: standalone(original, group),
            });
        }
        Self::run(nodes, edges, plan, keep, vec![Item::Node(group_id.to_string())])
    }

    fn run(
        nodes: &[Arc<Node>],
        edges: &[Arc<Edge>],
        mut plan: Cascade,
        mut keep: HashSet<String>,
        mut work: Vec<Item>,
    ) -> Self {
        loop {
            while let Some(item) = work.pop() {
                match item {
                    Item::Edge(id) => {
                        if !plan.edges.insert(id.clone()) {
                            continue;
                        }
                        let anchor = anchor_id(&id);
                        if find_node(nodes, &anchor).is_some() {
                            work.push(Item::Node(anchor));
                        }
                        push_objections(nodes, &id, &mut work);
                    }
                    Item::Node(id) => {
                        if keep.contains(&id) || !plan.nodes.insert(id.clone()) {
                            continue;
                        }
                        for edge in edges.iter().filter(|e| e.touches(&id)) {
                            work.push(Item::Edge(edge.id.clone()));
                        }
                        for child in nodes.iter().filter(|n| n.parent_id.as_deref() == Some(id.as_str())) {
                            if !keep.contains(&child.id) {
                                work.push(Item::Node(child.id.clone()));
                            }
                        }
                        if let Some(node) = find_node(nodes, &id)
                            && let Some(edge_id) = node.anchored_edge()
                        {
                            push_objections(nodes, edge_id, &mut work);
                        }
                    }
                }
            }

            let mut grew = false;
            for anchor in plan.orphaned_anchors(nodes) {
                work.push(Item::Node(anchor));
                grew = true;
            }
            for group_id in plan.touched_groups(nodes) {
                let Some(group) = find_node(nodes, &group_id) else {
                    continue;
                };
                let (original, inverse) = pair_children(nodes, &group_id);
                let Some(original) = original else {
                    continue;
                };
                if plan.nodes.contains(&original.id) {
                    work.push(Item::Node(group_id));
                    grew = true;
                } else if inverse.is_some_and(|inv| plan.nodes.contains(&inv.id)) {
                    keep.insert(original.id.clone());
                    plan.restored.push(Restored {
                        group_id: group_id.clone(),
                        node: standalone(original, group),
                    });
                    work.push(Item::Node(group_id));
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        plan
    }

    /// Anchors whose last objection this plan removes.
    fn orphaned_anchors(&self, nodes: &[Arc<Node>]) -> Vec<String> {
        let mut out = Vec::new();
        for id in &self.nodes {
            let Some(edge_id) = find_node(nodes, id).and_then(|n| n.objection_edge()) else {
                continue;
            };
            let anchor = anchor_id(edge_id);
            if self.nodes.contains(&anchor) || out.contains(&anchor) || find_node(nodes, &anchor).is_none() {
                continue;
            }
            let survivors = nodes
                .iter()
                .any(|n| n.objection_edge() == Some(edge_id) && !self.nodes.contains(&n.id));
            if !survivors {
                out.push(anchor);
            }
        }
        out
    }

    /// Surviving groups that lost at least one child to this plan.
    fn touched_groups(&self, nodes: &[Arc<Node>]) -> IndexSet<String> {
        self.nodes
            .iter()
            .filter_map(|id| find_node(nodes, id)?.parent_id.clone())
            .filter(|group_id| !self.nodes.contains(group_id))
            .collect()
    }

    /// Mirror the plan into a document transaction.
    ///
    /// Restored originals are rebuilt from the document copies (while the
    /// group entry is still readable) so concurrent field edits survive.
    pub fn commit(&self, tx: &mut dyn DocTxn) {
        for restored in &self.restored {
            let node = match (tx.node(&restored.node.id), tx.node(&restored.group_id)) {
                (Some(child), Some(group)) => standalone(&child, &group),
                _ => restored.node.clone(),
            };
            tx.put_node(node);
        }
        for id in &self.edges {
            tx.remove_edge(id);
        }
        for id in &self.nodes {
            tx.remove_node(id);
            tx.remove_text(id);
        }
    }

    pub fn restored_ids(&self) -> Vec<String> {
        self.restored.iter().map(|r| r.node.id.clone()).collect()
    }

    /// Next node list: planned removals dropped, restored originals
    /// replaced in place, everything else carried over as-is.
    pub fn apply_nodes(&self, prev: &[Arc<Node>]) -> NodeList {
        prev.iter()
            .filter_map(|node| {
                if let Some(restored) = self.restored.iter().find(|r| r.node.id == node.id) {
                    return Some(Arc::new(restored.node.clone()));
                }
                (!self.nodes.contains(&node.id)).then(|| Arc::clone(node))
            })
            .collect()
    }

    pub fn apply_edges(&self, prev: &[Arc<Edge>]) -> EdgeList {
        prev.iter()
            .filter(|edge| !self.edges.contains(&edge.id))
            .cloned()
            .collect()
    }
}

fn push_objections(nodes: &[Arc<Node>], edge_id: &str, work: &mut Vec<Item>) {
    for node in nodes.iter().filter(|n| n.objection_edge() == Some(edge_id)) {
        work.push(Item::Node(node.id.clone()));
    }
}
