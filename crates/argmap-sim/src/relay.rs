//! In-process transport between replicas.
//!
//! Forwards each replica's own transactions to its peers. Remote changes
//! are not forwarded again, so two or more replicas never loop.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use argmap_crdt::{ChangeOrigin, GraphDoc, MemoryDoc};

/// Forward local transactions of `from` into every doc in `to`.
pub fn spawn_relay(from: Arc<MemoryDoc>, to: Vec<Arc<MemoryDoc>>) -> JoinHandle<()> {
    let mut rx = from.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(change) => {
                    if !matches!(change.origin, ChangeOrigin::Local(_)) {
                        continue;
                    }
                    for peer in &to {
                        match peer.apply_update(&change.update) {
                            Ok(won) => trace!(from = %from.peer().short(), to = %peer.peer().short(), won, "relayed"),
                            Err(err) => warn!(%err, "relay rejected update"),
                        }
                    }
                }
                // Catch up by shipping the whole state; merging is idempotent.
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "relay lagged, sending full state");
                    let update = from.full_update();
                    for peer in &to {
                        if let Err(err) = peer.apply_update(&update) {
                            warn!(%err, "relay rejected full state");
                        }
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
