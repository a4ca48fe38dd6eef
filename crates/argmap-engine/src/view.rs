//! Local view state: the in-memory node and edge lists that drive the UI.
//!
//! Lists hold `Arc`s so an updater can carry untouched entries into the
//! next list without re-creating them; `Arc::ptr_eq` on an entry across an
//! update tells you whether the operation touched it.
//!
//! All writes go through [`LocalView::set_nodes`] / [`LocalView::set_edges`]
//! with a pure updater `prev -> next`, mirroring how a reactive UI store is
//! driven.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use argmap_crdt::GraphDoc;
use argmap_types::{Edge, Node};

pub type NodeList = Vec<Arc<Node>>;
pub type EdgeList = Vec<Arc<Edge>>;

/// Pure node-list updater.
pub type NodeUpdater<'a> = &'a dyn Fn(&[Arc<Node>]) -> NodeList;
/// Pure edge-list updater.
pub type EdgeUpdater<'a> = &'a dyn Fn(&[Arc<Edge>]) -> EdgeList;

/// The optimistic local view an operation reads from and writes to.
pub trait LocalView {
    /// Current nodes (cheap: clones `Arc`s).
    fn nodes(&self) -> NodeList;
    /// Current edges.
    fn edges(&self) -> EdgeList;
    fn set_nodes(&self, updater: NodeUpdater<'_>);
    fn set_edges(&self, updater: EdgeUpdater<'_>);
}

/// Thread-safe local view.
///
/// Counts `set_nodes` / `set_edges` calls so callers can tell whether an
/// operation wrote at all (and how many times).
#[derive(Default)]
pub struct ViewState {
    nodes: RwLock<NodeList>,
    edges: RwLock<EdgeList>,
    node_writes: AtomicU64,
    edge_writes: AtomicU64,
}

impl ViewState {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes: RwLock::new(nodes.into_iter().map(Arc::new).collect()),
            edges: RwLock::new(edges.into_iter().map(Arc::new).collect()),
            node_writes: AtomicU64::new(0),
            edge_writes: AtomicU64::new(0),
        }
    }

    /// Rebuild a view from the replicated document (the durable truth).
    pub fn from_doc(doc: &dyn GraphDoc) -> Self {
        let (nodes, edges) = load_view(doc);
        Self::new(nodes, edges)
    }

    /// Replace both lists wholesale (resync after a lagged change stream).
    pub fn reset(&self, nodes: Vec<Node>, edges: Vec<Edge>) {
        *self.nodes.write() = nodes.into_iter().map(Arc::new).collect();
        *self.edges.write() = edges.into_iter().map(Arc::new).collect();
        self.node_writes.fetch_add(1, Ordering::SeqCst);
        self.edge_writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of `set_nodes` calls so far.
    pub fn node_writes(&self) -> u64 {
        self.node_writes.load(Ordering::SeqCst)
    }

    /// Number of `set_edges` calls so far.
    pub fn edge_writes(&self) -> u64 {
        self.edge_writes.load(Ordering::SeqCst)
    }

    pub fn node(&self, id: &str) -> Option<Arc<Node>> {
        self.nodes.read().iter().find(|n| n.id == id).cloned()
    }

    pub fn edge(&self, id: &str) -> Option<Arc<Edge>> {
        self.edges.read().iter().find(|e| e.id == id).cloned()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.read().iter().map(|n| n.id.clone()).collect()
    }

    pub fn edge_ids(&self) -> Vec<String> {
        self.edges.read().iter().map(|e| e.id.clone()).collect()
    }
}

impl LocalView for ViewState {
    fn nodes(&self) -> NodeList {
        self.nodes.read().clone()
    }

    fn edges(&self) -> EdgeList {
        self.edges.read().clone()
    }

    fn set_nodes(&self, updater: NodeUpdater<'_>) {
        let mut nodes = self.nodes.write();
        let next = updater(&nodes);
        *nodes = next;
        self.node_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn set_edges(&self, updater: EdgeUpdater<'_>) {
        let mut edges = self.edges.write();
        let next = updater(&edges);
        *edges = next;
        self.edge_writes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Read the document into plain lists, groups ahead of everything else.
///
/// Renderers need a parent before its children; document order alone does
/// not guarantee that once remote writes interleave.
pub fn load_view(doc: &dyn GraphDoc) -> (Vec<Node>, Vec<Edge>) {
    (parents_first(doc.nodes()), doc.edges())
}

/// Stable partition: groups first, then everything else.
pub(crate) fn parents_first(nodes: Vec<Node>) -> Vec<Node> {
    let (mut groups, rest): (Vec<Node>, Vec<Node>) = nodes.into_iter().partition(Node::is_group);
    groups.extend(rest);
    groups
}

/// Find a node by id in a list.
pub(crate) fn find_node<'a>(nodes: &'a [Arc<Node>], id: &str) -> Option<&'a Arc<Node>> {
    nodes.iter().find(|n| n.id == id)
}
