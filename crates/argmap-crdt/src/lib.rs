//! Replicated document model for argmap.
//!
//! The argument map is replicated as three maps (nodes, edges, node text),
//! each a mapping from string id to a whole record. The engine talks to the
//! document only through the [`GraphDoc`] / [`DocTxn`] traits, so any
//! replication runtime that offers per-key last-writer-wins, atomic
//! origin-tagged transactions, and a change stream can stand behind it.
//!
//! [`MemoryDoc`] is the in-process implementation used by tests, the
//! simulator, and single-process deployments.
//!
//! # CRDT Semantics
//!
//! - **Maps**: Last-Write-Wins per key, ordered by `(lamport, peer)` stamps
//! - **Removals**: tombstones, so stale puts cannot resurrect entries
//! - **Transactions**: all writes of one transaction share one stamp and
//!   surface as one [`DocChange`]

mod doc;
mod error;
mod memory;

pub use doc::{ChangeOrigin, DocChange, DocTxn, DocUpdate, EntryWrite, GraphDoc, Stamp, StampedWrite};
pub use error::CrdtError;
pub use memory::{DEFAULT_CHANGE_BUFFER, DocSnapshot, MemoryDoc, SNAPSHOT_VERSION};

/// Result type for replicated-document operations.
pub type Result<T> = std::result::Result<T, CrdtError>;
