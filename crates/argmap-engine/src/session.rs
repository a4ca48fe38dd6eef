//! One client's editing session over a replicated graph.
//!
//! `GraphSession` owns the local view and wires the mutation functions to
//! the document, the collaborators and the deferred-step timers:
//!
//! ```text
//! UI call ──▶ mutation gate ──▶ op(view, ctx) ──▶ set_nodes / set_edges
//!                                     │
//!                                     └──▶ doc.transact(origin) ──▶ change stream
//!                                                                    │
//! listener ◀─────────────────────────────────────────────────────────┘
//!    └─ own echo: skip; otherwise reconcile into the view
//! ```
//!
//! The gate serializes mutations and reconciliation so no two of them
//! interleave their local writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use argmap_crdt::{DocChange, GraphDoc};
use argmap_types::{OriginToken, PeerId};

use crate::collab::{LayoutMeasure, LockOracle, UndoScope};
use crate::config::EngineConfig;
use crate::context::MutationContext;
use crate::error::EngineError;
use crate::ops;
use crate::outcome::{Effect, Outcome};
use crate::reconcile::{Reconciled, reconcile};
use crate::timers::{TimerKey, TimerRegistry};
use crate::view::{LocalView, ViewState, load_view};

/// External services a session consults. All optional.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub locks: Option<Arc<dyn LockOracle>>,
    pub undo: Option<Arc<dyn UndoScope>>,
    pub layout: Option<Arc<dyn LayoutMeasure>>,
}

struct SessionInner {
    peer: PeerId,
    origin: OriginToken,
    doc: Arc<dyn GraphDoc>,
    view: ViewState,
    config: EngineConfig,
    collab: Collaborators,
    timers: TimerRegistry,
    can_write: AtomicBool,
    is_leader: AtomicBool,
    gate: Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

type Step = fn(&GraphSession, &str) -> Result<Outcome, EngineError>;

/// A client session. Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct GraphSession {
    inner: Arc<SessionInner>,
}

impl GraphSession {
    /// Start a writable, non-leader session; the view is loaded from `doc`.
    pub fn new(peer: PeerId, doc: Arc<dyn GraphDoc>, config: EngineConfig, collab: Collaborators) -> Self {
        let view = ViewState::from_doc(doc.as_ref());
        let origin = OriginToken::for_peer(peer);
        info!(peer = %peer.short(), graph = %doc.graph_id().short(), "session started");
        Self {
            inner: Arc::new(SessionInner {
                peer,
                origin,
                doc,
                view,
                config,
                collab,
                timers: TimerRegistry::new(),
                can_write: AtomicBool::new(true),
                is_leader: AtomicBool::new(false),
                gate: Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    fn from_weak(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn peer(&self) -> PeerId {
        self.inner.peer
    }

    pub fn origin(&self) -> OriginToken {
        self.inner.origin
    }

    pub fn view(&self) -> &ViewState {
        &self.inner.view
    }

    pub fn doc(&self) -> &Arc<dyn GraphDoc> {
        &self.inner.doc
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn timers(&self) -> &TimerRegistry {
        &self.inner.timers
    }

    pub fn set_can_write(&self, can_write: bool) {
        self.inner.can_write.store(can_write, Ordering::SeqCst);
    }

    pub fn set_leader(&self, is_leader: bool) {
        self.inner.is_leader.store(is_leader, Ordering::SeqCst);
    }

    pub fn is_leader(&self) -> bool {
        self.inner.is_leader.load(Ordering::SeqCst)
    }

    fn context(&self) -> MutationContext<'_> {
        let inner = &self.inner;
        let mut ctx = MutationContext::new(inner.origin, &inner.config)
            .with_doc(inner.doc.as_ref())
            .with_write(inner.can_write.load(Ordering::SeqCst))
            .with_leader(self.is_leader());
        ctx.locks = inner.collab.locks.as_deref();
        ctx.undo = inner.collab.undo.as_deref();
        ctx.layout = inner.collab.layout.as_deref();
        ctx
    }

    /// Run one operation behind the mutation gate.
    fn mutate<F>(&self, op: F) -> Result<Outcome, EngineError>
    where
        F: FnOnce(&dyn LocalView, &MutationContext<'_>) -> Result<Outcome, EngineError>,
    {
        let outcome = {
            let _gate = self.inner.gate.lock();
            let view: &dyn LocalView = &self.inner.view;
            op(view, &self.context())?
        };
        if let Outcome::Applied(effect) = &outcome {
            for id in effect.removed_nodes() {
                self.inner.timers.cancel_entity(id);
            }
        }
        Ok(outcome)
    }

    /// Run `step` for `key.entity` after `delay`, unless cancelled.
    fn defer(&self, key: TimerKey, delay: Duration, step: Step) {
        let weak = Arc::downgrade(&self.inner);
        let entity = key.entity.clone();
        let label = key.to_string();
        self.inner.timers.schedule(key, delay, move || {
            let Some(session) = GraphSession::from_weak(&weak) else {
                return;
            };
            match step(&session, &entity) {
                Ok(outcome) => debug!(timer = %label, ?outcome, "deferred step ran"),
                Err(err) => warn!(timer = %label, %err, "deferred step failed"),
            }
        });
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub fn delete(&self, target_id: &str) -> Result<Outcome, EngineError> {
        self.mutate(|view, ctx| ops::delete_node(view, ctx, target_id))
    }

    /// Pair a point with a generated inverse and schedule the height sync.
    pub fn create_inverse_pair(&self, point_id: &str) -> Result<Outcome, EngineError> {
        let outcome = self.mutate(|view, ctx| ops::create_inverse_pair(view, ctx, point_id))?;
        if let Outcome::Applied(Effect::PairCreated { group_id, .. }) = &outcome {
            self.defer(
                TimerKey::pair_height(group_id),
                self.inner.config.pair_height_delay(),
                GraphSession::sync_pair_height,
            );
        }
        Ok(outcome)
    }

    pub fn sync_pair_height(&self, group_id: &str) -> Result<Outcome, EngineError> {
        self.mutate(|view, ctx| ops::sync_pair_height(view, ctx, group_id))
    }

    pub fn fill_inverse_content(
        &self,
        inverse_id: &str,
        generated: Result<String, String>,
    ) -> Result<Outcome, EngineError> {
        self.mutate(|view, ctx| ops::fill_inverse_content(view, ctx, inverse_id, generated))
    }

    /// Start removing the pair owning `child_id`; the removal itself runs
    /// after the closing transition.
    pub fn remove_inverse_pair(&self, child_id: &str) -> Result<Outcome, EngineError> {
        let outcome = self.mutate(|view, ctx| ops::begin_remove_inverse_pair(view, ctx, child_id))?;
        if let Outcome::Applied(Effect::PairClosing { group_id }) = &outcome {
            self.inner.timers.cancel(&TimerKey::pair_height(group_id));
            self.defer(
                TimerKey::closing(group_id),
                self.inner.config.closing_delay(),
                GraphSession::finish_inverse_pair_removal,
            );
        }
        Ok(outcome)
    }

    pub fn finish_inverse_pair_removal(&self, group_id: &str) -> Result<Outcome, EngineError> {
        self.mutate(|view, ctx| ops::finish_remove_inverse_pair(view, ctx, group_id))
    }

    pub fn dissolve_broken_pair(&self, group_id: &str) -> Result<Outcome, EngineError> {
        self.mutate(|view, ctx| ops::dissolve_broken_pair(view, ctx, group_id))
    }

    // =========================================================================
    // Change stream
    // =========================================================================

    /// Reduce one document change into the view. `None` for our own echo.
    ///
    /// A leader also takes over deferred work started elsewhere. Pairs the
    /// change left with a single member are dissolved right away. Pairs
    /// another peer created or started closing get their height sync or
    /// fallback removal scheduled here.
    pub fn apply_change(&self, change: &DocChange) -> Option<Reconciled> {
        let out = {
            let _gate = self.inner.gate.lock();
            reconcile(change, self.inner.origin, &self.inner.view)?
        };

        for id in &out.removed_nodes {
            self.inner.timers.cancel_entity(id);
        }
        if self.is_leader() {
            for group_id in &out.broken_pairs {
                if let Err(err) = self.dissolve_broken_pair(group_id) {
                    warn!(group = %group_id, %err, "could not dissolve broken pair");
                }
            }
            for group_id in out.new_pairs.iter().filter(|g| !out.broken_pairs.contains(g)) {
                let key = TimerKey::pair_height(group_id);
                if !self.inner.timers.is_pending(&key) {
                    debug!(group = %group_id, "remote pair created, scheduling height sync");
                    self.defer(key, self.inner.config.pair_height_delay(), GraphSession::sync_pair_height);
                }
            }
            for group_id in &out.entered_closing {
                let key = TimerKey::closing(group_id);
                if !self.inner.timers.is_pending(&key) {
                    debug!(group = %group_id, "remote pair closing, scheduling fallback removal");
                    self.defer(key, self.inner.config.closing_grace(), GraphSession::finish_inverse_pair_removal);
                }
            }
        }
        Some(out)
    }

    /// Rebuild the view from the document.
    pub fn resync(&self) {
        let _gate = self.inner.gate.lock();
        let (nodes, edges) = load_view(self.inner.doc.as_ref());
        info!(nodes = nodes.len(), edges = edges.len(), "view reloaded from document");
        self.inner.view.reset(nodes, edges);
    }

    /// Follow the document's change stream on a background task.
    ///
    /// Returns false outside a tokio runtime. A lagging receiver reloads
    /// the view from the document instead of replaying what it missed.
    pub fn spawn_listener(&self) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime, change listener not started");
            return false;
        };
        let mut rx = self.inner.doc.subscribe();
        let weak = Arc::downgrade(&self.inner);

        let task = handle.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        let Some(session) = GraphSession::from_weak(&weak) else {
                            break;
                        };
                        session.apply_change(&change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        let Some(session) = GraphSession::from_weak(&weak) else {
                            break;
                        };
                        warn!(skipped, "change stream lagged, reloading view");
                        session.resync();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("change listener stopped");
        });

        if let Some(previous) = self.inner.listener.lock().replace(task) {
            previous.abort();
        }
        true
    }

    /// Stop the listener and cancel every pending deferred step.
    pub fn shutdown(&self) {
        if let Some(task) = self.inner.listener.lock().take() {
            task.abort();
        }
        self.inner.timers.cancel_all();
        info!(peer = %self.inner.peer.short(), "session stopped");
    }
}
