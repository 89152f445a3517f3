//! Error types for listener registration and dispatch
//!
//! Only usage errors live here. A listener that throws is not an error of
//! the dispatch; it is reported and the walk continues.

use thiserror::Error;

use crate::target::TargetId;

pub type Result<T> = std::result::Result<T, EventError>;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event type must not be empty")]
    EmptyEventType,

    #[error("The event is already being dispatched")]
    AlreadyDispatching,

    #[error("The event provided is uninitialized")]
    Uninitialized,

    #[error("Event target not found: {0}")]
    UnknownTarget(TargetId),

    #[error("Propagation path too deep: {depth} > {max}")]
    PathTooDeep { depth: usize, max: usize },

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
}
