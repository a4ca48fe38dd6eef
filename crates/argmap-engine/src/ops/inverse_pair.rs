//! CreateInversePair and the deferred steps that follow it.
//!
//! ```text
//! Group (non-interactive, isNew)          position = point - (pad, pad)
//!   ├── original  (originalInPair)        relative  (pad, pad)
//!   └── inverse   (directInverse)         relative  (pad + width + gap, pad)
//! ```
//!
//! The pairing is expressed only through `parent_id`; no edge links the
//! two children.

use std::sync::Arc;

use tracing::{debug, info, warn};

use argmap_types::{Node, Position, new_node_id, validate_id};

use super::{pair_children, replace_nodes};
use crate::context::MutationContext;
use crate::error::EngineError;
use crate::guard::{with_local_origin, with_lock, with_write_permission};
use crate::outcome::{Effect, Outcome, SkipReason};
use crate::view::{LocalView, find_node};

/// Pair the unparented point `point_id` with a generated inverse.
///
/// The inverse starts with the configured placeholder content; a content
/// generator fills it in later through [`fill_inverse_content`].
pub fn create_inverse_pair(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    point_id: &str,
) -> Result<Outcome, EngineError> {
    validate_id(point_id)?;
    with_write_permission(ctx.can_write, || {
        with_lock(point_id, ctx.locks, || create_unguarded(view, ctx, point_id))
    })
}

fn create_unguarded(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    point_id: &str,
) -> Result<Outcome, EngineError> {
    let nodes = view.nodes();
    let Some(point) = find_node(&nodes, point_id).cloned() else {
        debug!(point = point_id, "pair target not found");
        return Ok(Outcome::Skipped(SkipReason::NotFound));
    };
    let Some(data) = point.as_point() else {
        debug!(point = point_id, kind = %point.kind(), "pair target is not a point");
        return Ok(Outcome::Skipped(SkipReason::NotFound));
    };
    if point.parent_id.is_some() || data.is_paired() {
        debug!(point = point_id, "point already inside a container");
        return Ok(Outcome::Skipped(SkipReason::AlreadyPaired));
    }
    // The document may already have moved on (concurrent delete or pairing).
    if let Some(doc) = ctx.doc {
        match doc.node(point_id) {
            None => {
                debug!(point = point_id, "pair target deleted concurrently");
                return Ok(Outcome::Skipped(SkipReason::NotFound));
            }
            Some(current) if current.parent_id.is_some() => {
                debug!(point = point_id, "pair target paired concurrently");
                return Ok(Outcome::Skipped(SkipReason::AlreadyPaired));
            }
            Some(_) => {}
        }
    }

    let config = ctx.config;
    let pad = config.pair_padding;
    let group_id = new_node_id("group");
    let inverse_id = new_node_id("inverse");

    let mut group = Node::group(&group_id, point.position - Position::new(pad, pad));
    if let Some(g) = group.as_group_mut() {
        g.is_new = true;
    }
    let original = as_original(&point, &group_id, pad);
    let mut inverse = Node::point(
        &inverse_id,
        Position::new(pad + config.point_width + config.pair_gap, pad),
        config.placeholder_text.clone(),
    )
    .with_parent(&group_id);
    if let Some(p) = inverse.as_point_mut() {
        p.direct_inverse = true;
        p.group_id = Some(group_id.clone());
    }

    let entries = [Arc::new(group), Arc::new(original), Arc::new(inverse)];
    view.set_nodes(&|prev| {
        let Some(index) = prev.iter().position(|n| n.id == point_id) else {
            return prev.to_vec();
        };
        let mut next = Vec::with_capacity(prev.len() + 2);
        next.extend_from_slice(&prev[..index]);
        next.extend(entries.iter().cloned());
        next.extend_from_slice(&prev[index + 1..]);
        next
    });

    let [group, original, inverse] = &entries;
    with_local_origin(ctx.doc, ctx.origin, |tx| {
        let original = match tx.node(point_id) {
            Some(current) => as_original(&current, &group_id, pad),
            None => original.as_ref().clone(),
        };
        tx.put_node(group.as_ref().clone());
        tx.put_node(original);
        tx.put_node(inverse.as_ref().clone());
        tx.put_text(&inverse_id, config.placeholder_text.clone());
    });
    if let Some(undo) = ctx.undo {
        undo.register_text(&inverse_id, &config.placeholder_text);
    }

    info!(point = point_id, group = %group_id, inverse = %inverse_id, "created inverse pair");

    Ok(Outcome::Applied(Effect::PairCreated {
        group_id,
        original_id: point_id.to_string(),
        inverse_id,
    }))
}

/// A replacement of `point` nested in `group_id`, keeping all its data.
fn as_original(point: &Node, group_id: &str, pad: f64) -> Node {
    let mut node = point.clone().with_parent(group_id);
    node.position = Position::new(pad, pad);
    if let Some(p) = node.as_point_mut() {
        p.original_in_pair = true;
        p.group_id = Some(group_id.to_string());
    }
    node
}

/// Write the taller of the two rendered child heights to both children.
///
/// Leader-only. Runs after a delay, so the group and both children are
/// re-validated first; anything missing makes this a no-op.
pub fn sync_pair_height(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    group_id: &str,
) -> Result<Outcome, EngineError> {
    validate_id(group_id)?;
    if !ctx.is_leader {
        return Ok(Outcome::Skipped(SkipReason::NotLeader));
    }
    with_write_permission(ctx.can_write, || sync_unguarded(view, ctx, group_id))
}

fn sync_unguarded(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    group_id: &str,
) -> Result<Outcome, EngineError> {
    let nodes = view.nodes();
    let live = |node: Option<&Node>| node.and_then(Node::as_group).is_some_and(|g| !g.closing);
    let in_doc = ctx.doc.is_none_or(|doc| live(doc.node(group_id).as_ref()));
    if !live(find_node(&nodes, group_id).map(|n| &**n)) || !in_doc {
        debug!(group = group_id, "pair gone or closing before height sync");
        return Ok(Outcome::Skipped(SkipReason::Stale));
    }
    let (Some(original), Some(inverse)) = pair_children(&nodes, group_id) else {
        return Ok(Outcome::Skipped(SkipReason::Stale));
    };

    let measured = ctx
        .layout
        .and_then(|layout| Some((layout.measure(&original.id)?, layout.measure(&inverse.id)?)));
    let Some((a, b)) = measured else {
        debug!(group = group_id, "pair children not measured yet");
        return Ok(Outcome::Skipped(SkipReason::Unmeasured));
    };
    let height = a.height.max(b.height);

    let holds = |n: &Node| n.as_point().is_some_and(|p| p.pair_height == Some(height));
    if holds(original) && holds(inverse) {
        return Ok(Outcome::Skipped(SkipReason::Unchanged));
    }

    let ids = [original.id.clone(), inverse.id.clone()];
    let with_height = |node: &Node| -> Option<Node> {
        let mut next = node.clone();
        let point = next.as_point_mut()?;
        if point.pair_height == Some(height) {
            return None;
        }
        point.pair_height = Some(height);
        Some(next)
    };

    view.set_nodes(&|prev| {
        replace_nodes(prev, |node| if ids.contains(&node.id) { with_height(node) } else { None })
    });
    with_local_origin(ctx.doc, ctx.origin, |tx| {
        for id in &ids {
            if let Some(next) = tx.node(id).as_ref().and_then(&with_height) {
                tx.put_node(next);
            }
        }
    });

    debug!(group = group_id, height, "synced pair height");
    Ok(Outcome::Applied(Effect::PairHeightSynced { group_id: group_id.to_string(), height }))
}

/// Deliver the content generator's result for an inverse point.
///
/// Only replaces the placeholder: if the inverse was edited (or filled)
/// in the meantime, the generated text is dropped. A failed generation
/// leaves the placeholder in place.
pub fn fill_inverse_content(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    inverse_id: &str,
    generated: Result<String, String>,
) -> Result<Outcome, EngineError> {
    validate_id(inverse_id)?;
    let text = match generated {
        Ok(text) => text,
        Err(reason) => {
            warn!(inverse = inverse_id, %reason, "inverse generation failed, keeping placeholder");
            return Ok(Outcome::Skipped(SkipReason::Unchanged));
        }
    };
    with_write_permission(ctx.can_write, || fill_unguarded(view, ctx, inverse_id, &text))
}

fn fill_unguarded(
    view: &dyn LocalView,
    ctx: &MutationContext<'_>,
    inverse_id: &str,
    text: &str,
) -> Result<Outcome, EngineError> {
    let placeholder = ctx.config.placeholder_text.as_str();
    let nodes = view.nodes();
    let Some(node) = find_node(&nodes, inverse_id) else {
        return Ok(Outcome::Skipped(SkipReason::NotFound));
    };
    if !node.as_point().is_some_and(|p| p.direct_inverse) {
        return Ok(Outcome::Skipped(SkipReason::NotPaired));
    }
    let pending = |n: &Node| n.text() == Some(placeholder);
    let doc_pending = ctx.doc.is_none_or(|doc| doc.node(inverse_id).is_some_and(|n| pending(&n)));
    if !pending(node) || !doc_pending {
        debug!(inverse = inverse_id, "inverse already has content");
        return Ok(Outcome::Skipped(SkipReason::Stale));
    }

    let filled = |n: &Node| {
        let mut next = n.clone();
        next.set_text(text);
        next
    };
    view.set_nodes(&|prev| {
        replace_nodes(prev, |n| (n.id == inverse_id).then(|| filled(n)))
    });
    with_local_origin(ctx.doc, ctx.origin, |tx| {
        if let Some(current) = tx.node(inverse_id) {
            tx.put_node(filled(&current));
        }
        tx.put_text(inverse_id, text.to_string());
    });

    info!(inverse = inverse_id, "filled inverse content");
    Ok(Outcome::Applied(Effect::ContentFilled { node_id: inverse_id.to_string() }))
}
