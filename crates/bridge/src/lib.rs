//! # Bridge
//!
//! C ABI surface over `dom` and `events` for plugins written in other
//! languages.
//!
//! ```text
//! plugin ──NativeValue<EventTargetMethods>──→ BoundaryTarget ──→ Document
//!    │                                                            │
//!    └── EventCallbackContext ──→ NativeListener ←── dispatch ────┘
//! ```
//!
//! Every table starts with a `version` so a plugin built against another
//! layout is rejected by [`value::checked_table`] instead of misreading
//! function pointers. No Rust error or panic crosses the boundary: entry
//! points report through the caller's exception state (see [`relay`]).

pub mod error;
pub mod event_target;
pub mod relay;
pub mod value;

pub use error::{BridgeError, Result};
pub use event_target::{
    event_create, event_release, expose_target, EventCallbackContext, EventTargetMethods,
    NativeAddEventListenerOptions, NativeEventInit, NativeEventListenerOptions, OpaqueEventTarget,
    EVENT_TARGET_METHODS,
};
pub use relay::{exception_relay_methods, guarded, ExceptionRelayMethods};
pub use value::{checked_table, MethodTable, NativeValue};
