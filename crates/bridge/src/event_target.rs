//! EventTarget entry points for foreign callers
//!
//! A foreign caller gets a `NativeValue<EventTargetMethods>` from
//! [`expose_target`] and drives the node only through the table. Native
//! listeners are registered as an `EventCallbackContext`; the host copies
//! its fields, the struct itself stays owned by the caller.
//!
//! Events handed across are always `Rc`-managed: either created by
//! [`event_create`] or received by a native listener during dispatch.

use ahash::AHashMap;
use dom::{Document, DomError, NodeId};
use events::native::{
    event_as_opaque, EventMethods, NativeContextFree, NativeEventCallback, OpaqueEvent,
    OpaqueExceptionState, EVENT_METHODS,
};
use events::{
    AddEventListenerOptions, Event, EventInit, EventListenerOptions, EventTarget, Listener,
    NativeContext, NativeListener, NodeDispatchResult,
};
use std::cell::RefCell;
use std::ffi::{c_char, c_double, c_void, CStr};
use std::rc::{Rc, Weak};

use crate::error::{BridgeError, Result};
use crate::relay::guarded;
use crate::value::{MethodTable, NativeValue};

pub const EVENT_TARGET_METHODS_VERSION: c_double = 1.0;

/// Opaque stand-in for a boundary target on the foreign side.
#[repr(C)]
pub struct OpaqueEventTarget {
    _private: [u8; 0],
}

/// A plugin callback plus the context it is invoked with.
#[repr(C)]
pub struct EventCallbackContext {
    pub callback: NativeEventCallback,
    /// Called once with `ptr` when the registration is dropped.
    pub free_ptr: Option<NativeContextFree>,
    pub ptr: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeAddEventListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

impl From<NativeAddEventListenerOptions> for AddEventListenerOptions {
    fn from(options: NativeAddEventListenerOptions) -> Self {
        Self {
            capture: options.capture,
            passive: options.passive,
            once: options.once,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEventListenerOptions {
    pub capture: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEventInit {
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

impl From<NativeEventInit> for EventInit {
    fn from(init: NativeEventInit) -> Self {
        Self {
            bubbles: init.bubbles,
            cancelable: init.cancelable,
            composed: init.composed,
        }
    }
}

#[repr(C)]
pub struct EventTargetMethods {
    pub version: c_double,
    pub add_event_listener: extern "C" fn(
        event_target: *const OpaqueEventTarget,
        event_name: *const c_char,
        callback_context: *const EventCallbackContext,
        options: *const NativeAddEventListenerOptions,
        exception_state: *const OpaqueExceptionState,
    ),
    pub remove_event_listener: extern "C" fn(
        event_target: *const OpaqueEventTarget,
        event_name: *const c_char,
        callback_context: *const EventCallbackContext,
        options: *const NativeEventListenerOptions,
        exception_state: *const OpaqueExceptionState,
    ),
    pub dispatch_event: extern "C" fn(
        event_target: *const OpaqueEventTarget,
        event: *const OpaqueEvent,
        exception_state: *const OpaqueExceptionState,
    ) -> bool,
    /// One step of a walk the host drives itself.
    pub fire_listeners: extern "C" fn(
        event_target: *const OpaqueEventTarget,
        event: *const OpaqueEvent,
        capture: bool,
        exception_state: *const OpaqueExceptionState,
    ) -> NodeDispatchResult,
    pub release: extern "C" fn(event_target: *const OpaqueEventTarget),
}

unsafe impl MethodTable for EventTargetMethods {
    const VERSION: c_double = EVENT_TARGET_METHODS_VERSION;
}

pub static EVENT_TARGET_METHODS: EventTargetMethods = EventTargetMethods {
    version: EVENT_TARGET_METHODS_VERSION,
    add_event_listener,
    remove_event_listener,
    dispatch_event,
    fire_listeners,
    release,
};

thread_local! {
    /// Live plugin contexts by pointer. Registrations of one pointer share a
    /// single owner, so its `free_ptr` runs once.
    static CONTEXTS: RefCell<AHashMap<usize, Weak<NativeContext>>> = RefCell::new(AHashMap::new());
}

fn shared_context(context: &EventCallbackContext) -> Rc<NativeContext> {
    CONTEXTS.with(|contexts| {
        let mut contexts = contexts.borrow_mut();
        let key = context.ptr as usize;
        if let Some(live) = contexts
            .get(&key)
            .and_then(Weak::upgrade)
            .filter(|c| !c.is_disposed())
        {
            return live;
        }

        contexts.retain(|_, weak| weak.strong_count() > 0);
        let fresh = unsafe { NativeContext::new(context.ptr, context.free_ptr) };
        contexts.insert(key, Rc::downgrade(&fresh));
        fresh
    })
}

/// What a foreign `event_target` pointer refers to.
struct BoundaryTarget {
    document: Document,
    node: NodeId,
}

impl BoundaryTarget {
    fn target(&self) -> Result<EventTarget> {
        self.document.target(self.node).map_err(|e| match e {
            DomError::NodeNotFound(_) => BridgeError::Disposed,
            other => BridgeError::Dom(other),
        })
    }
}

/// Hand `node` to foreign code. Pair with the table's `release`.
pub fn expose_target(document: &Document, node: NodeId) -> Result<NativeValue<EventTargetMethods>> {
    document.target(node)?;
    let boundary = Box::new(BoundaryTarget {
        document: document.clone(),
        node,
    });
    tracing::debug!("Exposed event target {} across the boundary", node);
    Ok(NativeValue::new(
        Box::into_raw(boundary) as *const c_void,
        &EVENT_TARGET_METHODS,
    ))
}

unsafe fn boundary_target<'a>(ptr: *const OpaqueEventTarget) -> Result<&'a BoundaryTarget> {
    (ptr as *const BoundaryTarget)
        .as_ref()
        .ok_or(BridgeError::NullPointer("event_target"))
}

unsafe fn event_name(ptr: *const c_char) -> Result<String> {
    if ptr.is_null() {
        return Err(BridgeError::NullPointer("event_name"));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map(str::to_string)
        .map_err(|_| BridgeError::InvalidEventType)
}

/// Owned clone of a boundary event.
unsafe fn shared_event(ptr: *const OpaqueEvent) -> Result<Rc<Event>> {
    if ptr.is_null() {
        return Err(BridgeError::NullPointer("event"));
    }
    let event = ptr as *const Event;
    Rc::increment_strong_count(event);
    Ok(Rc::from_raw(event))
}

extern "C" fn add_event_listener(
    event_target: *const OpaqueEventTarget,
    event_name_ptr: *const c_char,
    callback_context: *const EventCallbackContext,
    options: *const NativeAddEventListenerOptions,
    exception_state: *const OpaqueExceptionState,
) {
    guarded(exception_state, (), || {
        let boundary = unsafe { boundary_target(event_target) }?;
        let event_type = unsafe { event_name(event_name_ptr) }?;
        let context = unsafe { callback_context.as_ref() }
            .ok_or(BridgeError::NullPointer("callback_context"))?;
        let options = unsafe { options.as_ref() }.copied().unwrap_or_default();

        let shared = shared_context(context);
        let listener = Listener::native(NativeListener::with_context(context.callback, shared.clone()));
        let added = boundary
            .target()
            .map(|target| target.add_event_listener(&event_type, Some(listener), options));

        // Nothing registered holds the context, so the plugin still owns it.
        if Rc::strong_count(&shared) == 1 {
            shared.dispose();
        }
        added.map(|_| ())
    })
}

extern "C" fn remove_event_listener(
    event_target: *const OpaqueEventTarget,
    event_name_ptr: *const c_char,
    callback_context: *const EventCallbackContext,
    options: *const NativeEventListenerOptions,
    exception_state: *const OpaqueExceptionState,
) {
    guarded(exception_state, (), || {
        let boundary = unsafe { boundary_target(event_target) }?;
        let event_type = unsafe { event_name(event_name_ptr) }?;
        let context = unsafe { callback_context.as_ref() }
            .ok_or(BridgeError::NullPointer("callback_context"))?;
        let capture = unsafe { options.as_ref() }.is_some_and(|o| o.capture);

        let key = Listener::Native(NativeListener::lookup(context.callback, context.ptr));
        boundary
            .target()?
            .remove_event_listener(&event_type, &key, EventListenerOptions { capture });
        Ok(())
    })
}

extern "C" fn dispatch_event(
    event_target: *const OpaqueEventTarget,
    event: *const OpaqueEvent,
    exception_state: *const OpaqueExceptionState,
) -> bool {
    guarded(exception_state, false, || {
        let boundary = unsafe { boundary_target(event_target) }?;
        let event = unsafe { shared_event(event) }?;
        boundary.target()?;
        Ok(boundary.document.dispatch_event(boundary.node, &event)?)
    })
}

extern "C" fn fire_listeners(
    event_target: *const OpaqueEventTarget,
    event: *const OpaqueEvent,
    capture: bool,
    exception_state: *const OpaqueExceptionState,
) -> NodeDispatchResult {
    guarded(exception_state, NodeDispatchResult::default(), || {
        let boundary = unsafe { boundary_target(event_target) }?;
        let event = unsafe { shared_event(event) }?;
        boundary.target()?;
        Ok(boundary
            .document
            .fire_listeners(boundary.node, &event, capture)?)
    })
}

extern "C" fn release(event_target: *const OpaqueEventTarget) {
    if event_target.is_null() {
        return;
    }
    drop(unsafe { Box::from_raw(event_target as *mut BoundaryTarget) });
}

/// Create an event for foreign code. Release it with [`event_release`].
#[no_mangle]
pub extern "C" fn event_create(
    event_type: *const c_char,
    init: *const NativeEventInit,
    exception_state: *const OpaqueExceptionState,
) -> NativeValue<EventMethods> {
    guarded(exception_state, NativeValue::null(), || {
        let event_type = unsafe { event_name(event_type) }?;
        let init = unsafe { init.as_ref() }.copied().unwrap_or_default();
        let event = Rc::new(Event::with_init(event_type, init.into()));
        let value = event_as_opaque(&event) as *const c_void;
        // Ownership moves to the foreign side.
        let _ = Rc::into_raw(event);
        Ok(NativeValue::new(value, &EVENT_METHODS))
    })
}

#[no_mangle]
pub extern "C" fn event_release(event: *const OpaqueEvent) {
    if event.is_null() {
        return;
    }
    drop(unsafe { Rc::from_raw(event as *const Event) });
}
