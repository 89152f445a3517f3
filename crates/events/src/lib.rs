//! DOM Event Dispatch Core
//!
//! Listener registries, the event state machine and W3C capture/target/
//! bubble propagation for a tree of event targets.
//!
//! ## Philosophy
//!
//! - **Data first**: a registry is an ordered list of buckets, an event is
//!   a bag of cells, a path is a frozen vector
//! - **No special cases**: script and native listeners are one closed enum
//!   with one contract
//! - **Failures stay local**: a throwing listener is reported, the walk
//!   goes on
//!
//! ## Core Design
//!
//! ```text
//! TargetTree ──→ path [target .. root] (frozen EventTarget clones)
//!                  │
//!                  ▼
//! Dispatcher ──→ per node: ListenerRegistry::slot(type, i) ──→ Listener::invoke
//!                  │                                              │
//!                  ▼                                              ▼
//!            Event (phase, current_target, flags)         ExceptionState → ErrorReporter
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod exception;
pub mod keep_alive;
pub mod listener;
pub mod native;
pub mod options;
pub mod record;
pub mod registry;
pub mod target;
pub mod trace;

pub use config::DispatchConfig;
pub use dispatcher::{Dispatcher, MicrotaskHook, NodeDispatchResult};
pub use error::{EventError, Result};
pub use event::{DispatchEventResult, Event, EventPhase, PassiveMode};
pub use exception::{ErrorKind, ErrorReporter, ExceptionState, ScriptException, TracingReporter};
pub use keep_alive::{KeepAlive, KeepAliveToken};
pub use listener::{HandlerKind, Listener, ListenerRef, ScriptFunction, ScriptListener};
pub use native::{
    NativeContext, NativeContextFree, NativeEventCallback, NativeInvocation, NativeListener,
};
pub use options::{AddEventListenerOptions, EventInit, EventListenerOptions};
pub use record::ListenerRecord;
pub use registry::ListenerRegistry;
pub use target::{EventTarget, ListenerObserver, TargetId, TargetTree};
pub use trace::{EdgeCollector, GcHandle, Trace, Visitor};
