//! Exception slot and error reporting
//!
//! Script exceptions never unwind through the dispatcher. A failing call
//! leaves its exception in an `ExceptionState`; whoever owns the slot
//! decides what happens next.

use serde::Serialize;
use std::cell::RefCell;
use std::fmt;

use crate::target::TargetId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Error,
    TypeError,
    RangeError,
    InternalError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Error => "Error",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::RangeError => "RangeError",
            ErrorKind::InternalError => "InternalError",
        };
        f.write_str(name)
    }
}

/// A value thrown by a listener or raised at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptException {
    pub kind: ErrorKind,
    pub message: String,
}

impl ScriptException {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Error, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

impl fmt::Display for ScriptException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ScriptException {}

/// Out-slot for one pending exception. The first thrown value wins.
#[derive(Debug, Default)]
pub struct ExceptionState {
    slot: RefCell<Option<ScriptException>>,
}

impl ExceptionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn throw(&self, exception: ScriptException) {
        let mut slot = self.slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(exception);
        }
    }

    pub fn has_exception(&self) -> bool {
        self.slot.borrow().is_some()
    }

    pub fn exception(&self) -> Option<ScriptException> {
        self.slot.borrow().clone()
    }

    pub fn take(&self) -> Option<ScriptException> {
        self.slot.borrow_mut().take()
    }

    /// Human readable form of the pending exception, empty when none.
    pub fn stringify(&self) -> String {
        self.slot
            .borrow()
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}

/// Receives listener failures that were isolated during dispatch.
pub trait ErrorReporter {
    fn report(&self, target: TargetId, event_type: &str, exception: &ScriptException);
}

/// Default reporter: uncaught listener errors go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, target: TargetId, event_type: &str, exception: &ScriptException) {
        tracing::error!(
            target_id = target,
            "Uncaught exception in '{}' listener: {}",
            event_type,
            exception
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_exception_wins() {
        let state = ExceptionState::new();
        assert!(!state.has_exception());
        assert_eq!(state.stringify(), "");

        state.throw(ScriptException::type_error("first"));
        state.throw(ScriptException::error("second"));

        assert!(state.has_exception());
        assert_eq!(state.stringify(), "TypeError: first");
        assert_eq!(state.take().unwrap().message, "first");
        assert!(!state.has_exception());
    }
}
