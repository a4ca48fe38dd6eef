//! Error types for replicated-document operations.

use thiserror::Error;

use argmap_types::GraphId;

/// Errors that can occur while syncing or persisting a replica.
#[derive(Error, Debug)]
pub enum CrdtError {
    /// Update produced by a replica of a different document.
    #[error("update for graph {got} applied to graph {expected}")]
    GraphMismatch { expected: GraphId, got: GraphId },

    /// Snapshot written by an incompatible format version.
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedSnapshot { found: u32, expected: u32 },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file could not be read or written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
