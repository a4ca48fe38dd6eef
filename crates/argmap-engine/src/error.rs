//! Error types for the mutation engine.
//!
//! Routine absence (missing target, denied permission, foreign lock) is not
//! an error; operations report it as [`SkipReason`](crate::SkipReason).
//! Errors are reserved for caller mistakes and are returned before any
//! local or document write happens.

use thiserror::Error;

use argmap_types::IdError;

use crate::lifecycle::GroupLifecycle;

/// Errors returned by mutation operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The id cannot name a node or edge.
    #[error("malformed id: {0}")]
    MalformedId(#[from] IdError),

    /// A group lifecycle transition that the state machine does not define.
    #[error("invalid group transition {from} -> {to}")]
    InvalidTransition { from: GroupLifecycle, to: GroupLifecycle },
}

/// Errors loading engine configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}
