//! Error types for the foreign-function boundary
//!
//! None of these ever unwind into foreign code. Entry points convert them
//! into a `ScriptException` and leave it in the caller's exception relay.

use dom::DomError;
use events::{ErrorKind, ScriptException};
use std::ffi::c_double;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Null pointer passed for {0}")]
    NullPointer(&'static str),

    #[error("Method table version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: c_double, actual: c_double },

    #[error("The underlying event target has been disposed")]
    Disposed,

    #[error("Event type is not valid UTF-8")]
    InvalidEventType,

    #[error("Panic at the boundary: {0}")]
    Panicked(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}

impl BridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::NullPointer(_)
            | BridgeError::VersionMismatch { .. }
            | BridgeError::InvalidEventType => ErrorKind::TypeError,
            BridgeError::Disposed | BridgeError::Panicked(_) => ErrorKind::InternalError,
            BridgeError::Dom(_) => ErrorKind::Error,
        }
    }
}

impl From<&BridgeError> for ScriptException {
    fn from(error: &BridgeError) -> Self {
        ScriptException::new(error.kind(), error.to_string())
    }
}
