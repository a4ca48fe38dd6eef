//! DeleteNode: remove a node or an edge together with everything that
//! depends on it.

use tracing::{debug, info};

use argmap_types::validate_id;

use super::cascade::{Cascade, Seed};
use crate::context::MutationContext;
use crate::error::EngineError;
use crate::guard::{with_local_origin, with_lock, with_write_permission};
use crate::outcome::{Effect, Outcome, SkipReason};
use crate::view::{LocalView, find_node};

/// Delete `target_id`, which may name an edge or a node.
///
/// Edge ids take precedence: an id present in both lists is treated as the
/// edge. An id absent from local state is a no-op, so a repeated or
/// concurrent delete is harmless.
///
/// Only the target is checked against the lock oracle; cascaded anchors,
/// objections and pair members follow their owner.
pub fn delete_node(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    target_id: &str,
) -> Result<Outcome, EngineError> {
    validate_id(target_id)?;
    with_write_permission(ctx.can_write, || {
        with_lock(target_id, ctx.locks, || delete_unguarded(view, ctx, target_id))
    })
}

fn delete_unguarded(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    target_id: &str,
) -> Result<Outcome, EngineError> {
    let nodes = view.nodes();
    let edges = view.edges();

    let seed = if edges.iter().any(|e| e.id == target_id) {
        Seed::Edge(target_id)
    } else if find_node(&nodes, target_id).is_some() {
        Seed::Node(target_id)
    } else {
        debug!(target = target_id, "delete target not found");
        return Ok(Outcome::Skipped(SkipReason::NotFound));
    };

    let plan = Cascade::plan(&nodes, &edges, seed);

    view.set_edges(&|prev| plan.apply_edges(prev));
    view.set_nodes(&|prev| plan.apply_nodes(prev));

    with_local_origin(ctx.doc, ctx.origin, |tx| plan.commit(tx));
    ctx.release_texts(&plan.nodes);

    info!(
        target = target_id,
        nodes = plan.nodes.len(),
        edges = plan.edges.len(),
        restored = plan.restored.len(),
        "deleted"
    );

    Ok(Outcome::Applied(Effect::Deleted {
        nodes: plan.nodes.iter().cloned().collect(),
        edges: plan.edges.iter().cloned().collect(),
        restored: plan.restored_ids(),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::collab::{LockOwner, PresenceLocks, TrackedText, UndoScope};
    use crate::config::EngineConfig;
    use crate::view::ViewState;
    use argmap_crdt::{GraphDoc, MemoryDoc};
    use argmap_types::{Edge, GraphId, Node, OriginToken, PeerId, Position};

    fn objection_view() -> (Vec<Node>, Vec<Edge>) {
        let nodes = vec![
            Node::point("other-node", Position::ORIGIN, "other"),
            Node::anchor("test-edge-3", Position::new(50.0, 50.0)),
            Node::objection("o-123-456", Position::ORIGIN, "test-edge-3", "first"),
            Node::objection("o-789-012", Position::ORIGIN, "test-edge-3", "second"),
        ];
        let edges = vec![
            Edge::negation("test-edge-3", "a", "b"),
            Edge::objection("oe-1", "o-123-456", "test-edge-3"),
            Edge::objection("oe-2", "o-789-012", "test-edge-3"),
        ];
        (nodes, edges)
    }

    #[test]
    fn test_edge_delete_cascades_objections() {
        let (nodes, edges) = objection_view();
        let view = ViewState::new(nodes, edges);
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config);

        let out = delete_node(&view, &ctx, "test-edge-3").unwrap();
        assert!(out.is_applied());
        assert!(view.edge_ids().is_empty());
        assert_eq!(view.node_ids(), vec!["other-node".to_string()]);
        assert_eq!((view.node_writes(), view.edge_writes()), (1, 1));
    }

    #[test]
    fn test_edge_delete_without_objections() {
        let view = ViewState::new(
            vec![Node::point("a", Position::ORIGIN, "A"), Node::point("b", Position::ORIGIN, "B")],
            vec![Edge::negation("e1", "a", "b")],
        );
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config);

        delete_node(&view, &ctx, "e1").unwrap();
        assert!(view.edge_ids().is_empty());
        assert_eq!(view.node_ids().len(), 2);
        assert_eq!((view.node_writes(), view.edge_writes()), (1, 1));
    }

    #[test]
    fn test_node_delete_removes_only_incident_edges() {
        let view = ViewState::new(
            vec![
                Node::point("test-node-1", Position::ORIGIN, "x"),
                Node::point("other-node", Position::ORIGIN, "y"),
                Node::point("another-node", Position::ORIGIN, "z"),
            ],
            vec![
                Edge::negation("edge-1", "test-node-1", "other-node"),
                Edge::support("edge-2", "another-node", "test-node-1"),
                Edge::negation("edge-3", "other-node", "another-node"),
            ],
        );
        let kept_node = view.node("other-node").unwrap();
        let kept_edge = view.edge("edge-3").unwrap();
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config);

        delete_node(&view, &ctx, "test-node-1").unwrap();
        assert_eq!(view.edge_ids(), vec!["edge-3".to_string()]);
        assert_eq!(view.node_ids(), vec!["other-node".to_string(), "another-node".to_string()]);
        assert!(Arc::ptr_eq(&kept_node, &view.node("other-node").unwrap()));
        assert!(Arc::ptr_eq(&kept_edge, &view.edge("edge-3").unwrap()));
    }

    #[test]
    fn test_read_only_is_noop() {
        let (nodes, edges) = objection_view();
        let view = ViewState::new(nodes, edges);
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config).with_write(false);

        let out = delete_node(&view, &ctx, "test-edge-3").unwrap();
        assert_eq!(out, Outcome::Skipped(SkipReason::ReadOnly));
        assert_eq!((view.node_writes(), view.edge_writes()), (0, 0));
    }

    #[test]
    fn test_foreign_lock_is_noop() {
        let view = ViewState::new(vec![Node::point("p1", Position::ORIGIN, "x")], vec![]);
        let me = PeerId::new();
        let locks = PresenceLocks::new(me);
        locks.acquire("p1", LockOwner { peer: PeerId::new(), name: "bob".into() });
        let doc = MemoryDoc::new(GraphId::new(), me);
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config)
            .with_doc(&doc)
            .with_locks(&locks);

        let out = delete_node(&view, &ctx, "p1").unwrap();
        assert!(matches!(out, Outcome::Skipped(SkipReason::Locked { .. })));
        assert_eq!(view.node_writes(), 0);
        assert_eq!(doc.lamport(), 0, "no document transaction");
    }

    #[test]
    fn test_own_lock_does_not_block() {
        let view = ViewState::new(vec![Node::point("p1", Position::ORIGIN, "x")], vec![]);
        let me = PeerId::new();
        let locks = PresenceLocks::new(me);
        locks.acquire("p1", LockOwner { peer: me, name: "me".into() });
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config).with_locks(&locks);

        assert!(delete_node(&view, &ctx, "p1").unwrap().is_applied());
        assert!(view.node_ids().is_empty());
    }

    #[test]
    fn test_missing_target_is_noop() {
        let view = ViewState::new(vec![Node::point("p1", Position::ORIGIN, "x")], vec![]);
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config);

        let out = delete_node(&view, &ctx, "ghost").unwrap();
        assert_eq!(out, Outcome::Skipped(SkipReason::NotFound));
        assert_eq!(view.node_writes(), 0);
    }

    #[test]
    fn test_malformed_id_errors_before_writes() {
        let view = ViewState::new(vec![Node::point("p1", Position::ORIGIN, "x")], vec![]);
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config);

        assert!(matches!(delete_node(&view, &ctx, ""), Err(EngineError::MalformedId(_))));
        assert!(matches!(delete_node(&view, &ctx, "anchor:"), Err(EngineError::MalformedId(_))));
        assert_eq!(view.node_writes(), 0);
    }

    #[test]
    fn test_document_mirrors_delete_and_releases_text() {
        let (nodes, edges) = objection_view();
        let doc = MemoryDoc::new(GraphId::new(), PeerId::new());
        let seed = OriginToken::new();
        doc.transact(seed, &mut |tx| {
            for n in &nodes {
                tx.put_node(n.clone());
                if let Some(text) = n.text() {
                    tx.put_text(&n.id, text.to_string());
                }
            }
            for e in &edges {
                tx.put_edge(e.clone());
            }
        });
        let undo = TrackedText::new();
        undo.register_text("o-123-456", "first");

        let view = ViewState::from_doc(&doc);
        let config = EngineConfig::default();
        let origin = OriginToken::new();
        let ctx = MutationContext::new(origin, &config).with_doc(&doc).with_undo(&undo);
        let mut rx = doc.subscribe();

        delete_node(&view, &ctx, "test-edge-3").unwrap();

        let change = rx.try_recv().unwrap();
        assert!(change.origin.is_echo_of(origin));
        assert!(rx.try_recv().is_err(), "exactly one transaction");
        assert!(doc.edges().is_empty());
        assert_eq!(doc.nodes().len(), 1);
        assert_eq!(doc.text("o-123-456"), None);
        assert_eq!(doc.text("other-node").as_deref(), Some("other"));
        assert_eq!(undo.get("o-123-456"), None);
    }

    #[test]
    fn test_deleting_inverse_restores_original() {
        let mut original = Node::point("p1", Position::new(12.0, 12.0), "claim").with_parent("g1");
        if let Some(p) = original.as_point_mut() {
            p.original_in_pair = true;
            p.group_id = Some("g1".into());
            p.cred = Some(0.4);
        }
        let mut inverse = Node::point("p2", Position::new(276.0, 12.0), "counter").with_parent("g1");
        if let Some(p) = inverse.as_point_mut() {
            p.direct_inverse = true;
            p.group_id = Some("g1".into());
        }
        let nodes = vec![Node::group("g1", Position::new(88.0, 88.0)), original, inverse];
        let doc = MemoryDoc::new(GraphId::new(), PeerId::new());
        doc.transact(OriginToken::new(), &mut |tx| {
            for n in &nodes {
                tx.put_node(n.clone());
            }
        });
        let view = ViewState::from_doc(&doc);
        let config = EngineConfig::default();
        let ctx = MutationContext::new(OriginToken::new(), &config).with_doc(&doc);

        let out = delete_node(&view, &ctx, "p2").unwrap();
        match out {
            Outcome::Applied(Effect::Deleted { restored, .. }) => assert_eq!(restored, vec!["p1".to_string()]),
            other => panic!("unexpected outcome {other:?}"),
        }

        assert_eq!(view.node_ids(), vec!["p1".to_string()]);
        let restored = doc.node("p1").unwrap();
        assert_eq!(restored.position, Position::new(100.0, 100.0));
        assert_eq!(restored.parent_id, None);
        assert_eq!(restored.as_point().unwrap().cred, Some(0.4));
        assert!(!restored.as_point().unwrap().is_paired());
        assert_eq!(doc.nodes().len(), 1);
    }
}
