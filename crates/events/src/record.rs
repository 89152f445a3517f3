//! One registration entry

use crate::event::{Event, EventPhase};
use crate::listener::{Listener, ListenerRef};
use crate::options::AddEventListenerOptions;

/// A listener plus the flags it was registered with.
///
/// A removed record is a tombstone: it stays in its bucket so indices held
/// by an in-flight dispatch remain valid, but it never fires and never
/// matches again.
#[derive(Debug, Clone)]
pub struct ListenerRecord {
    callback: Option<ListenerRef>,
    capture: bool,
    passive: bool,
    once: bool,
    removed: bool,
    warned_blocked: bool,
}

impl ListenerRecord {
    pub fn new(callback: ListenerRef, options: &AddEventListenerOptions) -> Self {
        Self {
            callback: Some(callback),
            capture: options.capture,
            passive: options.passive,
            once: options.once,
            removed: false,
            warned_blocked: false,
        }
    }

    /// `None` only for tombstones.
    pub fn callback(&self) -> Option<&ListenerRef> {
        self.callback.as_ref()
    }

    pub fn capture(&self) -> bool {
        self.capture
    }

    pub fn passive(&self) -> bool {
        self.passive
    }

    pub fn once(&self) -> bool {
        self.once
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// W3C "identical event listener": same callback, same capture flag.
    pub fn matches(&self, listener: &Listener, capture: bool) -> bool {
        !self.removed
            && self.capture == capture
            && self.callback.as_ref().is_some_and(|cb| cb.matches(listener))
    }

    /// Phase filter. At target both subsets fire unless the event narrows it.
    pub fn should_fire(&self, event: &Event) -> bool {
        if self.removed {
            return false;
        }

        match event.event_phase() {
            EventPhase::Capturing => self.capture,
            EventPhase::Bubbling => !self.capture,
            EventPhase::AtTarget => {
                if event.fire_only_capture_listeners_at_target() {
                    self.capture
                } else if event.fire_only_non_capture_listeners_at_target() {
                    !self.capture
                } else {
                    true
                }
            }
            EventPhase::None => false,
        }
    }

    /// Tombstone the record and hand back its callback so the caller controls
    /// when it is dropped.
    pub(crate) fn mark_removed(&mut self) -> Option<ListenerRef> {
        self.removed = true;
        self.callback.take()
    }

    pub(crate) fn replace_callback(&mut self, callback: ListenerRef) -> Option<ListenerRef> {
        self.callback.replace(callback)
    }

    /// True the first time only.
    pub(crate) fn take_warning(&mut self) -> bool {
        !std::mem::replace(&mut self.warned_blocked, true)
    }
}
