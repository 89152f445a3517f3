//! Exception relay
//!
//! Foreign callers pass an exception state they created through
//! `ExceptionMethods::create`. Every entry point runs inside [`guarded`]:
//! errors and panics end up in that state, never in an unwind across the ABI.

use events::native::{exception_state_from_opaque, ExceptionMethods, OpaqueExceptionState, EXCEPTION_METHODS};
use events::ScriptException;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::{BridgeError, Result};

/// Table foreign code uses to create, inspect and free exception states.
pub type ExceptionRelayMethods = ExceptionMethods;

pub fn exception_relay_methods() -> &'static ExceptionRelayMethods {
    &EXCEPTION_METHODS
}

/// Leave `error` in the foreign caller's relay, or log it if there is none.
pub fn throw(exception_state: *const OpaqueExceptionState, error: &BridgeError) {
    match unsafe { exception_state_from_opaque(exception_state) } {
        Some(state) => state.throw(ScriptException::from(error)),
        None => tracing::error!("Boundary error with no exception state: {}", error),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run an entry point body. On failure the relay receives the error and
/// `fallback` is returned.
pub fn guarded<R>(
    exception_state: *const OpaqueExceptionState,
    fallback: R,
    body: impl FnOnce() -> Result<R>,
) -> R {
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => value,
        Ok(Err(error)) => {
            tracing::debug!("Boundary call failed: {}", error);
            throw(exception_state, &error);
            fallback
        }
        Err(payload) => {
            let error = BridgeError::Panicked(panic_message(payload.as_ref()));
            tracing::error!("{}", error);
            throw(exception_state, &error);
            fallback
        }
    }
}
