//! Native (plugin) listeners and the tables they are handed
//!
//! A plugin registers a plain function pointer plus an opaque context. On
//! every invocation it receives the event as an opaque pointer together with
//! `EventMethods`, a flat table of accessors, so it never needs to know the
//! layout of `Event`. Exceptions go into the relay through
//! `ExceptionMethods`.
//!
//! ## Memory Layout
//!
//! ```text
//! NativeInvocation
//!   event ──────────────→ Event (pinned by keep_alive)
//!   event_methods ──────→ EVENT_METHODS        (static, version-tagged)
//!   keep_alive ─────────→ Box<KeepAliveToken>   (owned by plugin)
//!   exception_state ────→ ExceptionState       (valid for the call)
//!   exception_methods ──→ EXCEPTION_METHODS    (static, version-tagged)
//! ```

use std::cell::Cell;
use std::ffi::{c_char, c_double, c_void, CStr, CString};
use std::ptr;
use std::rc::Rc;

use crate::event::Event;
use crate::exception::{ExceptionState, ScriptException};
use crate::keep_alive::{KeepAlive, KeepAliveToken};
use crate::target::TargetId;

pub const EVENT_METHODS_VERSION: c_double = 1.0;
pub const EXCEPTION_METHODS_VERSION: c_double = 1.0;

/// Opaque stand-in for `Event` on the foreign side.
#[repr(C)]
pub struct OpaqueEvent {
    _private: [u8; 0],
}

/// Opaque stand-in for `ExceptionState` on the foreign side.
#[repr(C)]
pub struct OpaqueExceptionState {
    _private: [u8; 0],
}

#[repr(C)]
pub struct EventMethods {
    pub version: c_double,
    /// Returns an owned string; free it with `free_string`.
    pub event_type: extern "C" fn(*const OpaqueEvent) -> *mut c_char,
    pub bubbles: extern "C" fn(*const OpaqueEvent) -> i32,
    pub cancelable: extern "C" fn(*const OpaqueEvent) -> i32,
    pub default_prevented: extern "C" fn(*const OpaqueEvent) -> i32,
    pub event_phase: extern "C" fn(*const OpaqueEvent) -> i32,
    pub is_trusted: extern "C" fn(*const OpaqueEvent) -> i32,
    pub time_stamp: extern "C" fn(*const OpaqueEvent) -> c_double,
    /// Current target id, or -1 outside dispatch.
    pub current_target: extern "C" fn(*const OpaqueEvent) -> i64,
    pub prevent_default: extern "C" fn(*const OpaqueEvent),
    pub stop_propagation: extern "C" fn(*const OpaqueEvent),
    pub stop_immediate_propagation: extern "C" fn(*const OpaqueEvent),
    pub free_string: extern "C" fn(*mut c_char),
    pub release_keep_alive: extern "C" fn(*mut KeepAliveToken),
}

#[repr(C)]
pub struct ExceptionMethods {
    pub version: c_double,
    pub create: extern "C" fn() -> *mut OpaqueExceptionState,
    pub has_exception: extern "C" fn(*const OpaqueExceptionState) -> i32,
    pub throw_error: extern "C" fn(*const OpaqueExceptionState, *const c_char),
    /// Returns an owned string; free it with `free_string`.
    pub stringify: extern "C" fn(*const OpaqueExceptionState) -> *mut c_char,
    pub free_string: extern "C" fn(*mut c_char),
    pub release: extern "C" fn(*mut OpaqueExceptionState),
}

/// Everything a native listener receives for one call.
#[repr(C)]
pub struct NativeInvocation {
    pub target: i64,
    pub event: *const OpaqueEvent,
    pub event_methods: *const EventMethods,
    /// Owned by the callee. Release it once the event is no longer needed.
    pub keep_alive: *mut KeepAliveToken,
    pub exception_state: *const OpaqueExceptionState,
    pub exception_methods: *const ExceptionMethods,
}

pub type NativeEventCallback = extern "C" fn(context: *mut c_void, invocation: *const NativeInvocation);
pub type NativeContextFree = extern "C" fn(context: *mut c_void);

pub static EVENT_METHODS: EventMethods = EventMethods {
    version: EVENT_METHODS_VERSION,
    event_type,
    bubbles: event_bubbles,
    cancelable: event_cancelable,
    default_prevented: event_default_prevented,
    event_phase,
    is_trusted: event_is_trusted,
    time_stamp: event_time_stamp,
    current_target: event_current_target,
    prevent_default: event_prevent_default,
    stop_propagation: event_stop_propagation,
    stop_immediate_propagation: event_stop_immediate_propagation,
    free_string,
    release_keep_alive,
};

pub static EXCEPTION_METHODS: ExceptionMethods = ExceptionMethods {
    version: EXCEPTION_METHODS_VERSION,
    create: exception_create,
    has_exception: exception_has_exception,
    throw_error: exception_throw_error,
    stringify: exception_stringify,
    free_string,
    release: exception_release,
};

pub fn event_as_opaque(event: &Event) -> *const OpaqueEvent {
    event as *const Event as *const OpaqueEvent
}

pub fn exception_state_as_opaque(state: &ExceptionState) -> *const OpaqueExceptionState {
    state as *const ExceptionState as *const OpaqueExceptionState
}

/// # Safety
///
/// `ptr` must be null or point to a live `Event`.
pub unsafe fn event_from_opaque<'a>(ptr: *const OpaqueEvent) -> Option<&'a Event> {
    (ptr as *const Event).as_ref()
}

/// # Safety
///
/// `ptr` must be null or point to a live `ExceptionState`.
pub unsafe fn exception_state_from_opaque<'a>(
    ptr: *const OpaqueExceptionState,
) -> Option<&'a ExceptionState> {
    (ptr as *const ExceptionState).as_ref()
}

fn into_c_string(value: String) -> *mut c_char {
    CString::new(value)
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

fn flag(value: bool) -> i32 {
    i32::from(value)
}

fn with_event<R>(ptr: *const OpaqueEvent, default: R, f: impl FnOnce(&Event) -> R) -> R {
    match unsafe { event_from_opaque(ptr) } {
        Some(event) => f(event),
        None => default,
    }
}

extern "C" fn event_type(ptr: *const OpaqueEvent) -> *mut c_char {
    with_event(ptr, ptr::null_mut(), |e| into_c_string(e.event_type()))
}

extern "C" fn event_bubbles(ptr: *const OpaqueEvent) -> i32 {
    with_event(ptr, 0, |e| flag(e.bubbles()))
}

extern "C" fn event_cancelable(ptr: *const OpaqueEvent) -> i32 {
    with_event(ptr, 0, |e| flag(e.cancelable()))
}

extern "C" fn event_default_prevented(ptr: *const OpaqueEvent) -> i32 {
    with_event(ptr, 0, |e| flag(e.default_prevented()))
}

extern "C" fn event_phase(ptr: *const OpaqueEvent) -> i32 {
    with_event(ptr, 0, |e| e.event_phase() as i32)
}

extern "C" fn event_is_trusted(ptr: *const OpaqueEvent) -> i32 {
    with_event(ptr, 0, |e| flag(e.is_trusted()))
}

extern "C" fn event_time_stamp(ptr: *const OpaqueEvent) -> c_double {
    with_event(ptr, 0.0, |e| e.time_stamp())
}

extern "C" fn event_current_target(ptr: *const OpaqueEvent) -> i64 {
    with_event(ptr, -1, |e| e.current_target().map_or(-1, i64::from))
}

extern "C" fn event_prevent_default(ptr: *const OpaqueEvent) {
    with_event(ptr, (), Event::prevent_default)
}

extern "C" fn event_stop_propagation(ptr: *const OpaqueEvent) {
    with_event(ptr, (), Event::stop_propagation)
}

extern "C" fn event_stop_immediate_propagation(ptr: *const OpaqueEvent) {
    with_event(ptr, (), Event::stop_immediate_propagation)
}

pub extern "C" fn free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(unsafe { CString::from_raw(ptr) });
    }
}

pub extern "C" fn release_keep_alive(token: *mut KeepAliveToken) {
    if !token.is_null() {
        drop(unsafe { KeepAliveToken::from_raw(token) });
    }
}

extern "C" fn exception_create() -> *mut OpaqueExceptionState {
    Box::into_raw(Box::new(ExceptionState::new())) as *mut OpaqueExceptionState
}

extern "C" fn exception_has_exception(ptr: *const OpaqueExceptionState) -> i32 {
    match unsafe { exception_state_from_opaque(ptr) } {
        Some(state) => flag(state.has_exception()),
        None => 0,
    }
}

extern "C" fn exception_throw_error(ptr: *const OpaqueExceptionState, message: *const c_char) {
    let Some(state) = (unsafe { exception_state_from_opaque(ptr) }) else {
        return;
    };
    let message = if message.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned()
    };
    state.throw(ScriptException::error(message));
}

extern "C" fn exception_stringify(ptr: *const OpaqueExceptionState) -> *mut c_char {
    match unsafe { exception_state_from_opaque(ptr) } {
        Some(state) => into_c_string(state.stringify()),
        None => ptr::null_mut(),
    }
}

extern "C" fn exception_release(ptr: *mut OpaqueExceptionState) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr as *mut ExceptionState) });
    }
}

/// A plugin context pointer and the destructor that releases it.
///
/// Every registration of one context shares a single `NativeContext`, so
/// `free` runs once, after the last of them is dropped.
pub struct NativeContext {
    ptr: *mut c_void,
    free: Option<NativeContextFree>,
    disposed: Cell<bool>,
}

impl NativeContext {
    /// # Safety
    ///
    /// `ptr` must stay valid until `free` is called on it (or until the
    /// context is disposed).
    pub unsafe fn new(ptr: *mut c_void, free: Option<NativeContextFree>) -> Rc<Self> {
        Rc::new(Self {
            ptr,
            free,
            disposed: Cell::new(false),
        })
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    /// The foreign side keeps (or already released) the pointer; never free it.
    pub fn dispose(&self) {
        self.disposed.set(true);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        if self.disposed.get() {
            return;
        }
        if let Some(free) = self.free {
            free(self.ptr);
        }
    }
}

/// Listener backed by a plugin function pointer.
///
/// Identity is the `(callback, context)` pair. The context destructor runs
/// once, when the last listener sharing the context is dropped, never per
/// invocation.
pub struct NativeListener {
    callback: NativeEventCallback,
    context: Rc<NativeContext>,
}

impl NativeListener {
    /// # Safety
    ///
    /// `context` must stay valid until `free` is called on it (or until the
    /// caller calls [`NativeListener::dispose`]), and `callback` must accept it.
    pub unsafe fn new(
        callback: NativeEventCallback,
        context: *mut c_void,
        free: Option<NativeContextFree>,
    ) -> Self {
        Self::with_context(callback, NativeContext::new(context, free))
    }

    /// Listener over a context that other registrations may share.
    pub fn with_context(callback: NativeEventCallback, context: Rc<NativeContext>) -> Self {
        Self { callback, context }
    }

    /// Non-owning key used to look a registration up by identity.
    pub fn lookup(callback: NativeEventCallback, context: *mut c_void) -> Self {
        // No destructor, so nothing is ever freed through a lookup key.
        Self::with_context(callback, unsafe { NativeContext::new(context, None) })
    }

    pub fn context(&self) -> *mut c_void {
        self.context.as_ptr()
    }

    pub fn shared_context(&self) -> &Rc<NativeContext> {
        &self.context
    }

    /// The foreign side released the context early; later calls throw.
    pub fn dispose(&self) {
        self.context.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.context.is_disposed()
    }

    pub(crate) fn invoke(&self, target: TargetId, event: &Rc<Event>, exception_state: &ExceptionState) {
        if self.is_disposed() {
            exception_state.throw(ScriptException::internal(
                "Native listener context has already been released",
            ));
            return;
        }

        let invocation = NativeInvocation {
            target: i64::from(target),
            event: event_as_opaque(event),
            event_methods: &EVENT_METHODS,
            keep_alive: KeepAlive::new(event).into_raw(),
            exception_state: exception_state_as_opaque(exception_state),
            exception_methods: &EXCEPTION_METHODS,
        };

        (self.callback)(self.context(), &invocation);
    }

    pub(crate) fn matches(&self, other: &NativeListener) -> bool {
        self.callback as usize == other.callback as usize && self.context() == other.context()
    }
}

impl std::fmt::Debug for NativeListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeListener")
            .field("callback", &(self.callback as usize as *const c_void))
            .field("context", &self.context())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
