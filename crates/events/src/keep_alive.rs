//! Scoped keep-alive tokens
//!
//! A token is a strong reference with a narrow purpose: it is taken before
//! something crosses into code that may outlive the current call (a native
//! listener, a foreign caller) and dropped when that code says it is done.
//! While any token exists the object cannot be reclaimed.

use std::ops::Deref;
use std::rc::Rc;

use crate::event::Event;

#[derive(Debug)]
pub struct KeepAlive<T: ?Sized> {
    value: Rc<T>,
}

impl<T: ?Sized> KeepAlive<T> {
    pub fn new(value: &Rc<T>) -> Self {
        Self {
            value: Rc::clone(value),
        }
    }

    pub fn get(&self) -> &Rc<T> {
        &self.value
    }
}

impl<T: ?Sized> Clone for KeepAlive<T> {
    fn clone(&self) -> Self {
        Self::new(&self.value)
    }
}

impl<T: ?Sized> Deref for KeepAlive<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Token handed to native listeners alongside the event pointer.
pub type KeepAliveToken = KeepAlive<Event>;

impl KeepAlive<Event> {
    /// Leak the token to a foreign owner. Pair with [`KeepAliveToken::from_raw`].
    pub fn into_raw(self) -> *mut KeepAliveToken {
        Box::into_raw(Box::new(self))
    }

    /// # Safety
    ///
    /// `ptr` must come from [`KeepAliveToken::into_raw`] and must not be
    /// reclaimed twice.
    pub unsafe fn from_raw(ptr: *mut KeepAliveToken) -> Box<KeepAliveToken> {
        Box::from_raw(ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pins_event() {
        let event = Rc::new(Event::new("load"));
        let token = KeepAlive::new(&event);
        assert_eq!(Rc::strong_count(&event), 2);
        assert!(token.is_type("load"));

        drop(token);
        assert_eq!(Rc::strong_count(&event), 1);
    }

    #[test]
    fn test_raw_round_trip_releases() {
        let event = Rc::new(Event::new("load"));
        let raw = KeepAlive::new(&event).into_raw();
        assert_eq!(Rc::strong_count(&event), 2);

        // The foreign side may drop every other reference first.
        let weak = Rc::downgrade(&event);
        drop(event);
        assert!(weak.upgrade().is_some());

        drop(unsafe { KeepAliveToken::from_raw(raw) });
        assert!(weak.upgrade().is_none());
    }
}
