//! Two sessions over replicas joined by an in-process relay.
//!
//! Time is paused; `settle` lets the relay and both change listeners drain
//! without advancing past any deferred step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use argmap_crdt::{ChangeOrigin, GraphDoc, MemoryDoc};
use argmap_engine::{
    Collaborators, Effect, EngineConfig, GraphSession, LayoutMeasure, MeasuredLayout, Outcome, SkipReason,
    TimerKey,
};
use argmap_types::{Edge, GraphId, Node, OriginToken, PeerId, Position, Size};

struct Mesh {
    doc_a: Arc<MemoryDoc>,
    doc_b: Arc<MemoryDoc>,
    a: GraphSession,
    b: GraphSession,
    relays: Vec<JoinHandle<()>>,
}

impl Mesh {
    /// `a` leads, `b` follows. Both start from the same seeded graph.
    async fn start() -> Self {
        Self::start_with(Collaborators::default()).await
    }

    /// Same as [`Mesh::start`], both sessions sharing `collab`.
    async fn start_with(collab: Collaborators) -> Self {
        argmap_telemetry::init_test_tracing();
        let graph = GraphId::new();
        let doc_a = Arc::new(MemoryDoc::new(graph, PeerId::new()));
        let doc_b = Arc::new(MemoryDoc::new(graph, PeerId::new()));
        let relays = vec![relay(doc_a.clone(), doc_b.clone()), relay(doc_b.clone(), doc_a.clone())];

        doc_a.transact(OriginToken::new(), &mut |tx| {
            tx.put_node(Node::point("p1", Position::new(100.0, 100.0), "claim"));
            tx.put_node(Node::point("p2", Position::new(500.0, 100.0), "rebuttal"));
            tx.put_edge(Edge::negation("e1", "p1", "p2"));
        });
        settle().await;

        let a = GraphSession::new(doc_a.peer(), doc_a.clone(), EngineConfig::default(), collab.clone());
        let b = GraphSession::new(doc_b.peer(), doc_b.clone(), EngineConfig::default(), collab);
        a.set_leader(true);
        assert!(a.spawn_listener() && b.spawn_listener());
        Self { doc_a, doc_b, a, b, relays }
    }

    fn assert_converged(&self) {
        assert_eq!(node_ids(&self.doc_a.nodes()), node_ids(&self.doc_b.nodes()));
        let mut edges_a: Vec<_> = self.doc_a.edges().into_iter().map(|e| e.id).collect();
        let mut edges_b: Vec<_> = self.doc_b.edges().into_iter().map(|e| e.id).collect();
        edges_a.sort();
        edges_b.sort();
        assert_eq!(edges_a, edges_b);
        for (session, doc) in [(&self.a, &self.doc_a), (&self.b, &self.doc_b)] {
            let mut view = session.view().node_ids();
            view.sort();
            assert_eq!(view, node_ids(&doc.nodes()), "view follows its replica");
        }
    }

    /// Every group on both replicas owns both pair members or nothing.
    fn assert_pairs_whole(&self) {
        for doc in [&self.doc_a, &self.doc_b] {
            let nodes = doc.nodes();
            for group in nodes.iter().filter(|n| n.is_group()) {
                let children = nodes.iter().filter(|n| n.parent_id.as_deref() == Some(group.id.as_str())).count();
                assert!(children == 2 || children == 0, "group {} owns {children} children", group.id);
            }
        }
    }

    fn stop(self) {
        self.a.shutdown();
        self.b.shutdown();
        for relay in self.relays {
            relay.abort();
        }
    }
}

fn relay(from: Arc<MemoryDoc>, to: Arc<MemoryDoc>) -> JoinHandle<()> {
    let mut rx = from.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) if matches!(change.origin, ChangeOrigin::Local(_)) => {
                    to.apply_update(&change.update).unwrap();
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {
                    to.apply_update(&from.full_update()).unwrap();
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn node_ids(nodes: &[Node]) -> Vec<String> {
    let mut ids: Vec<String> = nodes.iter().map(|n| n.id.clone()).collect();
    ids.sort();
    ids
}

fn created(outcome: &Outcome) -> (String, String) {
    match outcome {
        Outcome::Applied(Effect::PairCreated { group_id, inverse_id, .. }) => {
            (group_id.clone(), inverse_id.clone())
        }
        other => panic!("expected pair creation, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_pair_round_trip_across_peers() {
    let mesh = Mesh::start().await;

    let (group_id, inverse_id) = created(&mesh.a.create_inverse_pair("p1").unwrap());
    mesh.a.fill_inverse_content(&inverse_id, Ok("counter-claim".into())).unwrap();
    settle().await;

    let inverse = mesh.b.view().node(&inverse_id).expect("pair reached b");
    assert_eq!(inverse.text(), Some("counter-claim"));
    assert_eq!(mesh.b.view().node("p1").unwrap().parent_id.as_deref(), Some(group_id.as_str()));

    let out = mesh.b.remove_inverse_pair(&inverse_id).unwrap();
    assert_eq!(out, Outcome::Applied(Effect::PairClosing { group_id: group_id.clone() }));
    settle().await;
    assert!(mesh.a.view().node(&group_id).unwrap().as_group().unwrap().closing);
    assert!(mesh.a.timers().is_pending(&TimerKey::closing(&group_id)), "leader fallback armed");

    tokio::time::sleep(mesh.b.config().closing_delay()).await;
    settle().await;

    assert_eq!(mesh.a.view().node_ids(), vec!["p1".to_string(), "p2".to_string()]);
    let restored = mesh.a.view().node("p1").unwrap();
    assert_eq!(restored.position, Position::new(100.0, 100.0));
    assert!(!restored.as_point().unwrap().is_paired());
    assert_eq!(mesh.a.timers().pending(), 0, "fallback cancelled once the group went");
    mesh.assert_converged();
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_leader_finishes_abandoned_closing() {
    let mesh = Mesh::start().await;
    let (group_id, inverse_id) = created(&mesh.a.create_inverse_pair("p1").unwrap());
    settle().await;

    // b starts the removal and goes away before its own timer fires.
    mesh.b.remove_inverse_pair(&inverse_id).unwrap();
    mesh.b.shutdown();
    settle().await;
    assert!(mesh.doc_a.node(&group_id).unwrap().as_group().unwrap().closing);

    tokio::time::sleep(mesh.a.config().closing_grace()).await;
    settle().await;

    assert!(mesh.doc_a.node(&group_id).is_none());
    assert!(mesh.doc_b.node(&group_id).is_none(), "relay still carries the leader's write");
    assert_eq!(mesh.a.view().node_ids(), vec!["p1".to_string(), "p2".to_string()]);
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_remote_delete_cancels_local_timers() {
    let mesh = Mesh::start().await;
    let (group_id, _) = created(&mesh.a.create_inverse_pair("p1").unwrap());
    assert!(mesh.a.timers().is_pending(&TimerKey::pair_height(&group_id)));
    settle().await;

    let out = mesh.b.delete(&group_id).unwrap();
    assert!(out.is_applied());
    settle().await;

    assert!(!mesh.a.timers().is_pending(&TimerKey::pair_height(&group_id)));
    assert!(mesh.a.view().node(&group_id).is_none());
    mesh.assert_converged();
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_leader_syncs_height_of_remote_pair() {
    let layout = Arc::new(MeasuredLayout::new());
    let collab = Collaborators {
        layout: Some(layout.clone() as Arc<dyn LayoutMeasure>),
        ..Default::default()
    };
    let mesh = Mesh::start_with(collab).await;

    let (group_id, inverse_id) = created(&mesh.b.create_inverse_pair("p1").unwrap());
    layout.record("p1", Size::new(240.0, 40.0));
    layout.record(inverse_id.clone(), Size::new(240.0, 72.0));
    settle().await;
    assert!(mesh.a.timers().is_pending(&TimerKey::pair_height(&group_id)), "leader took over the sync");

    tokio::time::sleep(mesh.a.config().pair_height_delay()).await;
    settle().await;

    for doc in [&mesh.doc_a, &mesh.doc_b] {
        for id in ["p1", inverse_id.as_str()] {
            assert_eq!(doc.node(id).unwrap().as_point().unwrap().pair_height, Some(72.0));
        }
    }
    mesh.assert_converged();
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_delete_and_pair_converge() {
    let mesh = Mesh::start().await;

    // Both act on the same point before either hears from the other.
    assert!(mesh.a.delete("p1").unwrap().is_applied());
    let paired = mesh.b.create_inverse_pair("p1").unwrap();
    assert!(paired.is_applied());
    settle().await;
    tokio::time::sleep(mesh.a.config().pair_height_delay()).await;

    mesh.assert_converged();
    mesh.assert_pairs_whole();
    assert!(mesh.doc_a.edge("e1").is_none(), "edge went with p1 on a");
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_delete_ahead_of_concurrent_pair_leaves_no_half_pair() {
    let mesh = Mesh::start().await;

    // a's clock runs ahead, so its delete beats b's concurrent pairing.
    for i in 0..3 {
        mesh.doc_a.transact(OriginToken::new(), &mut |tx| tx.put_text("p2", format!("rebuttal {i}")));
    }
    assert!(mesh.a.delete("p1").unwrap().is_applied());
    let (group_id, _) = created(&mesh.b.create_inverse_pair("p1").unwrap());
    assert!(mesh.doc_a.lamport() > mesh.doc_b.lamport());
    settle().await;
    settle().await;
    tokio::time::sleep(mesh.a.config().pair_height_delay()).await;

    mesh.assert_converged();
    mesh.assert_pairs_whole();
    assert!(mesh.doc_a.node("p1").is_none());
    assert!(mesh.doc_b.node(&group_id).is_none(), "leader dissolved the half pair");
    assert_eq!(mesh.b.view().node_ids(), vec!["p2".to_string()]);
    assert_eq!(mesh.a.timers().pending() + mesh.b.timers().pending(), 0);
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_guarded_operations_leave_peers_alone() {
    let mesh = Mesh::start().await;
    mesh.b.set_can_write(false);
    let before = mesh.doc_a.lamport();

    assert_eq!(mesh.b.delete("p1").unwrap(), Outcome::Skipped(SkipReason::ReadOnly));
    settle().await;
    assert_eq!(mesh.doc_a.lamport(), before);
    assert!(mesh.a.view().node("p1").is_some());
    mesh.stop();
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_reload_resumes_removal() {
    let mesh = Mesh::start().await;
    let (group_id, inverse_id) = created(&mesh.a.create_inverse_pair("p1").unwrap());
    mesh.a.remove_inverse_pair(&inverse_id).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.json");
    mesh.doc_a.save_to(&path).unwrap();
    mesh.stop();

    let doc = Arc::new(MemoryDoc::load(&path, PeerId::new()).unwrap());
    let session = GraphSession::new(doc.peer(), doc.clone(), EngineConfig::default(), Collaborators::default());
    assert!(session.view().node(&group_id).unwrap().as_group().unwrap().closing);
    assert_eq!(session.view().node_ids()[0], group_id, "groups load first");

    let out = session.finish_inverse_pair_removal(&group_id).unwrap();
    assert!(out.is_applied());
    assert_eq!(node_ids(&doc.nodes()), vec!["p1".to_string(), "p2".to_string()]);
}
