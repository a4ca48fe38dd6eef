//! DeleteInversePair, in two phases, plus the leader's repair of pairs
//! that concurrent edits left half-removed.
//!
//! Phase 1 only flags the group `closing` in the document, so every peer
//! (not just the initiator) sees the transition and can animate it out.
//! Phase 2 runs once the transition is over: the group and the inverse go,
//! the original is restored standalone at its absolute position.

use std::sync::Arc;

use tracing::{debug, info, warn};

use argmap_types::{Node, validate_id};

use super::cascade::Cascade;
use super::{is_broken_pair, owning_group, replace_nodes};
use crate::context::MutationContext;
use crate::error::EngineError;
use crate::guard::{with_local_origin, with_lock, with_write_permission};
use crate::lifecycle::{GroupLifecycle, group_lifecycle};
use crate::outcome::{Effect, Outcome, SkipReason};
use crate::view::{LocalView, find_node};

/// Phase 1: mark the pair owning `child_id` as closing.
///
/// `child_id` may be either member of the pair. Nothing is removed yet.
pub fn begin_remove_inverse_pair(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    child_id: &str,
) -> Result<Outcome, EngineError> {
    validate_id(child_id)?;
    with_write_permission(ctx.can_write, || {
        with_lock(child_id, ctx.locks, || begin_unguarded(view, ctx, child_id))
    })
}

fn begin_unguarded(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    child_id: &str,
) -> Result<Outcome, EngineError> {
    let nodes = view.nodes();
    let Some(child) = find_node(&nodes, child_id) else {
        return Ok(Outcome::Skipped(SkipReason::NotFound));
    };
    let paired = child.as_point().is_some_and(|p| p.is_paired());
    let Some(group_id) = owning_group(&nodes, child_id).filter(|_| paired) else {
        debug!(child = child_id, "not a pair member");
        return Ok(Outcome::Skipped(SkipReason::NotPaired));
    };

    match group_lifecycle(ctx.doc, &nodes, &group_id) {
        Some(GroupLifecycle::Active) => {}
        Some(GroupLifecycle::Closing) => {
            debug!(group = %group_id, "pair already closing");
            return Ok(Outcome::Skipped(SkipReason::AlreadyClosing));
        }
        Some(GroupLifecycle::Removed) => return Ok(Outcome::Skipped(SkipReason::NotFound)),
        None => return Ok(Outcome::Skipped(SkipReason::NotPaired)),
    }

    view.set_nodes(&|prev| replace_nodes(prev, |n| (n.id == group_id).then(|| closing(n))));
    with_local_origin(ctx.doc, ctx.origin, |tx| {
        if let Some(group) = tx.node(&group_id) {
            tx.put_node(closing(&group));
        }
    });

    info!(group = %group_id, child = child_id, "inverse pair closing");
    Ok(Outcome::Applied(Effect::PairClosing { group_id }))
}

fn closing(group: &Node) -> Node {
    let mut next = group.clone();
    if let Some(g) = next.as_group_mut() {
        g.closing = true;
    }
    next
}

/// Phase 2: remove a closing pair group and restore its original.
///
/// Runs after a delay and possibly on a peer that did not start the
/// removal, so it only proceeds while the group still exists and is
/// closing. Repeating it is a no-op.
pub fn finish_remove_inverse_pair(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    group_id: &str,
) -> Result<Outcome, EngineError> {
    validate_id(group_id)?;
    with_write_permission(ctx.can_write, || finish_unguarded(view, ctx, group_id))
}

fn finish_unguarded(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    group_id: &str,
) -> Result<Outcome, EngineError> {
    let mut nodes = view.nodes();
    let mut edges = view.edges();

    let state = group_lifecycle(ctx.doc, &nodes, group_id);
    let transition = match state {
        Some(state) => state.transition(GroupLifecycle::Removed),
        None => return Ok(Outcome::Skipped(SkipReason::NotPaired)),
    };
    if let Err(err) = transition {
        debug!(group = group_id, %err, "pair removal no longer applies");
        return Ok(Outcome::Skipped(SkipReason::Stale));
    }

    // A view lagging the document plans against the document instead.
    if find_node(&nodes, group_id).is_none()
        && let Some(doc) = ctx.doc
    {
        nodes = doc.nodes().into_iter().map(Arc::new).collect();
        edges = doc.edges().into_iter().map(Arc::new).collect();
    }

    let plan = Cascade::dissolve(&nodes, &edges, group_id);
    let outcome = commit_dissolve(view, ctx, &plan, group_id);
    info!(
        group = group_id,
        restored = restored_label(&plan),
        removed = plan.nodes.len(),
        "inverse pair removed"
    );
    Ok(outcome)
}

/// Dissolve a pair group left holding only one of its members.
///
/// Concurrent edits can leave such a group behind, e.g. one peer deletes a
/// point while another pairs it and the delete wins. Leader-only. A
/// surviving original is restored standalone; a surviving inverse goes
/// with the group.
pub fn dissolve_broken_pair(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    group_id: &str,
) -> Result<Outcome, EngineError> {
    validate_id(group_id)?;
    with_write_permission(ctx.can_write, || {
        if !ctx.is_leader {
            return Ok(Outcome::Skipped(SkipReason::NotLeader));
        }
        let nodes = view.nodes();
        let edges = view.edges();
        if !find_node(&nodes, group_id).is_some_and(|n| n.is_group()) {
            return Ok(Outcome::Skipped(SkipReason::NotFound));
        }
        if !is_broken_pair(&nodes, group_id) {
            return Ok(Outcome::Skipped(SkipReason::Unchanged));
        }

        let plan = Cascade::dissolve(&nodes, &edges, group_id);
        let outcome = commit_dissolve(view, ctx, &plan, group_id);
        warn!(
            group = group_id,
            restored = restored_label(&plan),
            removed = plan.nodes.len(),
            "broken inverse pair dissolved"
        );
        Ok(outcome)
    })
}

fn commit_dissolve(view: &dyn LocalView, ctx: &MutationContext<'_>, plan: &Cascade, group_id: &str) -> Outcome {
    view.set_edges(&|prev| plan.apply_edges(prev));
    view.set_nodes(&|prev| plan.apply_nodes(prev));
    with_local_origin(ctx.doc, ctx.origin, |tx| plan.commit(tx));
    ctx.release_texts(&plan.nodes);

    Outcome::Applied(Effect::PairRemoved {
        group_id: group_id.to_string(),
        restored: plan.restored_ids().into_iter().next(),
        removed: plan.nodes.iter().cloned().collect(),
    })
}

fn restored_label(plan: &Cascade) -> &str {
    plan.restored.first().map_or("-", |r| r.node.id.as_str())
}
