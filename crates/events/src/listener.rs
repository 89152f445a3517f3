//! Listener capability
//!
//! A closed sum over the two ways a callback can get into a registry:
//! script functions owned by the embedded engine, and native plugin
//! function pointers. Both share one contract (`invoke`, `matches`,
//! `trace`), so the dispatch loop never asks which one it holds.

use std::fmt;
use std::rc::Rc;

use crate::event::Event;
use crate::exception::{ExceptionState, ScriptException};
use crate::native::NativeListener;
use crate::target::TargetId;
use crate::trace::{GcHandle, Trace, Visitor};

pub type ListenerRef = Rc<Listener>;

/// A callable owned by the script engine.
///
/// `call` runs the function with the visited node as receiver and the event
/// as sole argument; a thrown value comes back as `Err`.
pub trait ScriptFunction {
    fn call(&self, receiver: TargetId, event: &Rc<Event>) -> Result<(), ScriptException>;

    /// Heap handle the collector must keep alive, if any.
    fn handle(&self) -> Option<GcHandle> {
        None
    }
}

struct FnScript<F>(F);

impl<F> ScriptFunction for FnScript<F>
where
    F: Fn(TargetId, &Rc<Event>) -> Result<(), ScriptException>,
{
    fn call(&self, receiver: TargetId, event: &Rc<Event>) -> Result<(), ScriptException> {
        (self.0)(receiver, event)
    }
}

/// How a script listener was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// `addEventListener`
    Listener,
    /// `on<type>` attribute
    AttributeHandler,
}

#[derive(Clone)]
pub struct ScriptListener {
    function: Rc<dyn ScriptFunction>,
    kind: HandlerKind,
}

impl ScriptListener {
    pub fn function(&self) -> &Rc<dyn ScriptFunction> {
        &self.function
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    fn identity(&self) -> *const () {
        Rc::as_ptr(&self.function) as *const ()
    }
}

pub enum Listener {
    Script(ScriptListener),
    Native(NativeListener),
}

impl Listener {
    pub fn script(function: Rc<dyn ScriptFunction>) -> ListenerRef {
        Rc::new(Listener::Script(ScriptListener {
            function,
            kind: HandlerKind::Listener,
        }))
    }

    /// Wrap a Rust closure as a script function. Each call makes a new identity.
    pub fn from_fn<F>(f: F) -> ListenerRef
    where
        F: Fn(TargetId, &Rc<Event>) -> Result<(), ScriptException> + 'static,
    {
        Self::script(Rc::new(FnScript(f)))
    }

    pub fn attribute_handler(function: Rc<dyn ScriptFunction>) -> ListenerRef {
        Rc::new(Listener::Script(ScriptListener {
            function,
            kind: HandlerKind::AttributeHandler,
        }))
    }

    pub fn native(listener: NativeListener) -> ListenerRef {
        Rc::new(Listener::Native(listener))
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Listener::Script(_))
    }

    pub fn is_attribute_handler(&self) -> bool {
        matches!(self, Listener::Script(s) if s.kind == HandlerKind::AttributeHandler)
    }

    /// Run the callback for `target`. Failures land in `exception_state`.
    pub fn invoke(&self, target: TargetId, event: &Rc<Event>, exception_state: &ExceptionState) {
        match self {
            Listener::Script(script) => {
                event.set_current_target(Some(target));
                if let Err(exception) = script.function.call(target, event) {
                    exception_state.throw(exception);
                }
            }
            Listener::Native(native) => native.invoke(target, event, exception_state),
        }
    }

    /// Identity of the underlying callback. Never looks at registration flags.
    pub fn matches(&self, other: &Listener) -> bool {
        match (self, other) {
            (Listener::Script(a), Listener::Script(b)) => a.identity() == b.identity(),
            (Listener::Native(a), Listener::Native(b)) => a.matches(b),
            _ => false,
        }
    }
}

impl Trace for Listener {
    fn trace(&self, visitor: &mut dyn Visitor) {
        // Native contexts are owned by the plugin, not the collector.
        if let Listener::Script(script) = self {
            if let Some(handle) = script.function.handle() {
                visitor.trace_handle(handle);
            }
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Listener::Script(script) => f
                .debug_struct("Script")
                .field("function", &script.identity())
                .field("kind", &script.kind)
                .finish(),
            Listener::Native(native) => native.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::NativeInvocation;
    use crate::trace::EdgeCollector;
    use std::cell::Cell;
    use std::ffi::c_void;

    struct Handled(u64);

    impl ScriptFunction for Handled {
        fn call(&self, _receiver: TargetId, _event: &Rc<Event>) -> Result<(), ScriptException> {
            Ok(())
        }

        fn handle(&self) -> Option<GcHandle> {
            Some(GcHandle(self.0))
        }
    }

    extern "C" fn noop(_context: *mut c_void, invocation: *const NativeInvocation) {
        crate::native::release_keep_alive(unsafe { (*invocation).keep_alive });
    }

    #[test]
    fn test_matches_is_reflexive_and_symmetric() {
        let function: Rc<dyn ScriptFunction> = Rc::new(Handled(1));
        let a = Listener::script(function.clone());
        let b = Listener::script(function);
        let c = Listener::from_fn(|_, _| Ok(()));
        let d = Listener::native(NativeListener::lookup(noop, std::ptr::null_mut()));

        let all = [&a, &b, &c, &d];
        for x in all {
            assert!(x.matches(x));
            for y in all {
                assert_eq!(x.matches(y), y.matches(x));
            }
        }
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&d));
    }

    #[test]
    fn test_attribute_handler_matches_same_function() {
        let function: Rc<dyn ScriptFunction> = Rc::new(Handled(1));
        let handler = Listener::attribute_handler(function.clone());
        assert!(handler.is_attribute_handler());
        assert!(handler.matches(&Listener::script(function)));
    }

    #[test]
    fn test_invoke_captures_thrown_value() {
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let listener = Listener::from_fn(move |receiver, event| {
            seen.set(seen.get() + 1);
            assert_eq!(event.current_target(), Some(receiver));
            Err(ScriptException::type_error("boom"))
        });

        let state = ExceptionState::new();
        listener.invoke(4, &Rc::new(Event::new("click")), &state);

        assert_eq!(calls.get(), 1);
        assert_eq!(state.stringify(), "TypeError: boom");
    }

    #[test]
    fn test_trace_reports_script_handles_only() {
        let mut edges = EdgeCollector::default();
        Listener::script(Rc::new(Handled(9))).trace(&mut edges);
        Listener::native(NativeListener::lookup(noop, std::ptr::null_mut())).trace(&mut edges);
        assert_eq!(edges.handles, vec![GcHandle(9)]);
    }
}
