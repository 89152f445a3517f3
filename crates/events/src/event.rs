//! Event state machine
//!
//! An `Event` is shared (`Rc<Event>`) between the dispatcher and listener
//! code, so every mutable field is a `Cell`/`RefCell`. Phase and current
//! target are only written by the dispatcher; listeners flip the stop and
//! prevent flags.
//!
//! ```text
//! None → Capturing → AtTarget → Bubbling → None
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::options::EventInit;
use crate::target::TargetId;
use crate::trace::{Trace, Visitor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPhase {
    None = 0,
    Capturing = 1,
    AtTarget = 2,
    Bubbling = 3,
}

/// Whether the listener currently running was registered as passive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassiveMode {
    NotPassive,
    Passive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchEventResult {
    /// Not canceled by a listener or a default handler.
    NotCanceled,
    /// A listener called preventDefault.
    CanceledByEventHandler,
    /// The host's default action handled the event.
    CanceledByDefaultEventHandler,
    /// Suppressed before any listener could see it.
    CanceledBeforeDispatch,
}

#[derive(Debug)]
pub struct Event {
    event_type: RefCell<String>,
    bubbles: Cell<bool>,
    cancelable: Cell<bool>,
    composed: bool,
    is_trusted: Cell<bool>,
    time_stamp: f64,

    target: Cell<Option<TargetId>>,
    current_target: Cell<Option<TargetId>>,
    phase: Cell<EventPhase>,
    path: RefCell<SmallVec<[TargetId; 8]>>,

    propagation_stopped: Cell<bool>,
    immediate_propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
    default_handled: Cell<bool>,
    was_initialized: Cell<bool>,
    dispatching: Cell<bool>,

    handling_passive: Cell<PassiveMode>,
    prevent_default_blocked_by_passive: Cell<bool>,
    prevent_default_called_on_uncancelable_event: Cell<bool>,
    fire_only_capture_listeners_at_target: Cell<bool>,
    fire_only_non_capture_listeners_at_target: Cell<bool>,

    // Named custom properties, kept in insertion order
    props: RefCell<Vec<(String, Value)>>,
}

fn now_millis() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

impl Event {
    /// Non-bubbling, non-cancelable event of the given type.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self::with_init(event_type, EventInit::default())
    }

    pub fn with_init(event_type: impl Into<String>, init: EventInit) -> Self {
        let event = Self::uninitialized(init.composed);
        *event.event_type.borrow_mut() = event_type.into();
        event.bubbles.set(init.bubbles);
        event.cancelable.set(init.cancelable);
        event.was_initialized.set(true);
        event
    }

    /// Event that must go through `init_event` before it can be dispatched.
    pub fn uninitialized(composed: bool) -> Self {
        Self {
            event_type: RefCell::new(String::new()),
            bubbles: Cell::new(false),
            cancelable: Cell::new(false),
            composed,
            is_trusted: Cell::new(false),
            time_stamp: now_millis(),
            target: Cell::new(None),
            current_target: Cell::new(None),
            phase: Cell::new(EventPhase::None),
            path: RefCell::new(SmallVec::new()),
            propagation_stopped: Cell::new(false),
            immediate_propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
            default_handled: Cell::new(false),
            was_initialized: Cell::new(false),
            dispatching: Cell::new(false),
            handling_passive: Cell::new(PassiveMode::NotPassive),
            prevent_default_blocked_by_passive: Cell::new(false),
            prevent_default_called_on_uncancelable_event: Cell::new(false),
            fire_only_capture_listeners_at_target: Cell::new(false),
            fire_only_non_capture_listeners_at_target: Cell::new(false),
            props: RefCell::new(Vec::new()),
        }
    }

    /// Re-initialize type and flags. Ignored while the event is being dispatched.
    pub fn init_event(&self, event_type: impl Into<String>, bubbles: bool, cancelable: bool) {
        if self.is_being_dispatched() {
            return;
        }

        self.was_initialized.set(true);
        self.propagation_stopped.set(false);
        self.immediate_propagation_stopped.set(false);
        self.default_prevented.set(false);

        *self.event_type.borrow_mut() = event_type.into();
        self.bubbles.set(bubbles);
        self.cancelable.set(cancelable);
    }

    pub fn event_type(&self) -> String {
        self.event_type.borrow().clone()
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        *self.event_type.borrow() == event_type
    }

    pub fn bubbles(&self) -> bool {
        self.bubbles.get()
    }

    pub fn cancelable(&self) -> bool {
        self.cancelable.get()
    }

    pub fn composed(&self) -> bool {
        self.composed
    }

    pub fn is_trusted(&self) -> bool {
        self.is_trusted.get()
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.is_trusted.set(trusted);
    }

    /// Milliseconds since the Unix epoch at construction.
    pub fn time_stamp(&self) -> f64 {
        self.time_stamp
    }

    pub fn target(&self) -> Option<TargetId> {
        self.target.get()
    }

    pub fn src_element(&self) -> Option<TargetId> {
        self.target()
    }

    pub fn current_target(&self) -> Option<TargetId> {
        self.current_target.get()
    }

    pub fn event_phase(&self) -> EventPhase {
        self.phase.get()
    }

    pub fn was_initialized(&self) -> bool {
        self.was_initialized.get()
    }

    pub fn is_being_dispatched(&self) -> bool {
        self.dispatching.get()
    }

    /// Path frozen at dispatch start, target first. Empty outside dispatch.
    pub fn composed_path(&self) -> Vec<TargetId> {
        if !self.is_being_dispatched() {
            return Vec::new();
        }
        self.path.borrow().to_vec()
    }

    // Propagation

    /// Remaining listeners on the current node still run; no further node is visited.
    pub fn stop_propagation(&self) {
        self.propagation_stopped.set(true);
    }

    /// Nothing else runs, not even on the current node.
    pub fn stop_immediate_propagation(&self) {
        self.propagation_stopped.set(true);
        self.immediate_propagation_stopped.set(true);
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn immediate_propagation_stopped(&self) -> bool {
        self.immediate_propagation_stopped.get()
    }

    pub fn cancel_bubble(&self) -> bool {
        self.propagation_stopped()
    }

    /// Setting `false` is a no-op, matching the legacy attribute.
    pub fn set_cancel_bubble(&self, value: bool) {
        if value {
            self.stop_propagation();
        }
    }

    // Cancellation

    pub fn prevent_default(&self) {
        if self.handling_passive.get() == PassiveMode::Passive {
            self.prevent_default_blocked_by_passive.set(true);
            return;
        }

        if !self.cancelable() {
            self.prevent_default_called_on_uncancelable_event.set(true);
            return;
        }

        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    pub fn return_value(&self) -> bool {
        !self.default_prevented()
    }

    pub fn prevent_default_called_on_uncancelable_event(&self) -> bool {
        self.prevent_default_called_on_uncancelable_event.get()
    }

    /// The host ran the default action for this event.
    pub fn set_default_handled(&self) {
        self.default_handled.set(true);
    }

    pub fn default_handled(&self) -> bool {
        self.default_handled.get()
    }

    pub fn dispatch_result(&self) -> DispatchEventResult {
        if self.default_prevented() {
            DispatchEventResult::CanceledByEventHandler
        } else if self.default_handled() {
            DispatchEventResult::CanceledByDefaultEventHandler
        } else {
            DispatchEventResult::NotCanceled
        }
    }

    // Retargeting restrictions, decided by the event's producer

    pub fn set_fire_only_capture_listeners_at_target(&self, value: bool) {
        self.fire_only_capture_listeners_at_target.set(value);
    }

    pub fn fire_only_capture_listeners_at_target(&self) -> bool {
        self.fire_only_capture_listeners_at_target.get()
    }

    pub fn set_fire_only_non_capture_listeners_at_target(&self, value: bool) {
        self.fire_only_non_capture_listeners_at_target.set(value);
    }

    pub fn fire_only_non_capture_listeners_at_target(&self) -> bool {
        self.fire_only_non_capture_listeners_at_target.get()
    }

    // Named properties

    pub fn item(&self, key: &str) -> Option<Value> {
        self.props
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn set_item(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut props = self.props.borrow_mut();
        match props.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => props.push((key, value)),
        }
    }

    pub fn delete_item(&self, key: &str) -> bool {
        let mut props = self.props.borrow_mut();
        match props.iter().position(|(k, _)| k == key) {
            Some(index) => {
                props.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn property_names(&self) -> Vec<String> {
        self.props.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    // Dispatcher-owned transitions

    pub(crate) fn begin_dispatch(&self, target: TargetId, path: &[TargetId]) {
        self.dispatching.set(true);
        self.target.set(Some(target));
        self.current_target.set(Some(target));
        self.phase.set(EventPhase::None);
        self.propagation_stopped.set(false);
        self.immediate_propagation_stopped.set(false);
        self.default_prevented.set(false);

        let mut frozen = self.path.borrow_mut();
        frozen.clear();
        frozen.extend_from_slice(path);
    }

    /// One host-driven step at `node`. Stop and cancel flags carry over
    /// from earlier steps.
    pub(crate) fn begin_step(&self, node: TargetId) {
        self.dispatching.set(true);
        self.target.set(Some(node));
        self.current_target.set(Some(node));
        self.phase.set(EventPhase::None);

        let mut frozen = self.path.borrow_mut();
        frozen.clear();
        frozen.push(node);
    }

    pub(crate) fn set_phase(&self, phase: EventPhase) {
        self.phase.set(phase);
    }

    pub(crate) fn set_current_target(&self, target: Option<TargetId>) {
        self.current_target.set(target);
    }

    pub(crate) fn set_handling_passive(&self, mode: PassiveMode) {
        self.handling_passive.set(mode);
    }

    /// Whether the last passive listener tried to preventDefault. Clears the flag.
    pub(crate) fn take_blocked_by_passive(&self) -> bool {
        self.prevent_default_blocked_by_passive.replace(false)
    }

    pub(crate) fn end_dispatch(&self) {
        self.phase.set(EventPhase::None);
        self.current_target.set(None);
        self.handling_passive.set(PassiveMode::NotPassive);
        self.path.borrow_mut().clear();
        self.dispatching.set(false);
    }
}

/// `target` and `current_target` are ids, not owning references, and item
/// values live outside the script heap, so an event reports no edges.
impl Trace for Event {
    fn trace(&self, _visitor: &mut dyn Visitor) {}
}
