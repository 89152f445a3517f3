//! Listener registration options and event init dictionaries
//!
//! All fields default to `false`, both through `Default` and when a field
//! is missing from a serialized dictionary.

use serde::{Deserialize, Serialize};

/// Options accepted by `removeEventListener`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventListenerOptions {
    pub capture: bool,
}

/// Options accepted by `addEventListener`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddEventListenerOptions {
    pub capture: bool,
    pub passive: bool,
    pub once: bool,
}

impl AddEventListenerOptions {
    pub fn capture() -> Self {
        Self {
            capture: true,
            ..Self::default()
        }
    }

    pub fn once() -> Self {
        Self {
            once: true,
            ..Self::default()
        }
    }

    pub fn passive() -> Self {
        Self {
            passive: true,
            ..Self::default()
        }
    }

    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }
}

/// Legacy `useCapture` boolean form.
impl From<bool> for EventListenerOptions {
    fn from(capture: bool) -> Self {
        Self { capture }
    }
}

impl From<bool> for AddEventListenerOptions {
    fn from(capture: bool) -> Self {
        Self {
            capture,
            ..Self::default()
        }
    }
}

impl From<AddEventListenerOptions> for EventListenerOptions {
    fn from(options: AddEventListenerOptions) -> Self {
        Self {
            capture: options.capture,
        }
    }
}

/// `EventInit` dictionary used when constructing an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventInit {
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

impl EventInit {
    pub fn bubbling() -> Self {
        Self {
            bubbles: true,
            ..Self::default()
        }
    }

    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }
}
