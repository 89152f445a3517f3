//! Error types for DOM operations
//!
//! Simple, flat error hierarchy. Dispatch usage errors pass through as-is.

use events::EventError;
use thiserror::Error;

use crate::types::NodeId;

pub type Result<T> = std::result::Result<T, DomError>;

#[derive(Debug, Error)]
pub enum DomError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Hierarchy request error: {0}")]
    HierarchyRequest(String),

    #[error(transparent)]
    Event(#[from] EventError),
}
