//! Collaborative mutation engine for argument maps.
//!
//! Every structural edit is applied twice: optimistically to the local view
//! (one `set_nodes` / `set_edges` call each) and to the replicated document
//! in one transaction tagged with the client's [`OriginToken`]. Peers merge
//! each other's transactions back into their views through [`reconcile`];
//! a client's own echo is recognised by its origin and skipped.
//!
//! # Operations
//!
//! - [`delete_node`]: edge or node delete with anchor/objection/pair cascade
//! - [`create_inverse_pair`]: group a point with a generated inverse
//! - [`begin_remove_inverse_pair`] / [`finish_remove_inverse_pair`]: the two
//!   phases of pair removal (`Active -> Closing -> Removed`)
//! - [`sync_pair_height`], [`fill_inverse_content`]: deferred follow-ups
//!
//! Routine refusals (read-only client, foreign lock, missing target) come
//! back as [`Outcome::Skipped`]; [`EngineError`] is reserved for malformed
//! ids and is returned before anything is written.
//!
//! [`GraphSession`] bundles a view, a document handle, collaborators and
//! timers into one client.
//!
//! [`OriginToken`]: argmap_types::OriginToken

pub mod collab;
pub mod config;
pub mod context;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod ops;
pub mod outcome;
pub mod reconcile;
pub mod session;
pub mod timers;
pub mod view;

pub use collab::{
    LayoutMeasure, LockOracle, LockOwner, MeasuredLayout, PresenceLocks, TrackedText, UndoScope,
    elect_leader, is_leader,
};
pub use config::{DEFAULT_PLACEHOLDER, EngineConfig};
pub use context::MutationContext;
pub use error::{ConfigError, EngineError};
pub use guard::{with_local_origin, with_lock, with_write_permission};
pub use lifecycle::{GroupLifecycle, group_lifecycle};
pub use ops::{
    begin_remove_inverse_pair, create_inverse_pair, delete_node, dissolve_broken_pair, fill_inverse_content,
    finish_remove_inverse_pair, sync_pair_height,
};
pub use outcome::{Effect, Outcome, SkipReason};
pub use reconcile::{Reconciled, reconcile};
pub use session::{Collaborators, GraphSession};
pub use timers::{TimerKey, TimerKind, TimerRegistry};
pub use view::{EdgeList, LocalView, NodeList, ViewState, load_view};
