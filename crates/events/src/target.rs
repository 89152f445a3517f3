//! Event targets and the tree seam
//!
//! `EventTarget` is a cheap handle (`Rc` inside) around one node's listener
//! registry. Holding a clone keeps the registry alive, which is what the
//! dispatcher relies on when it freezes a propagation path.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::listener::{Listener, ListenerRef};
use crate::options::{AddEventListenerOptions, EventListenerOptions};
use crate::registry::ListenerRegistry;
use crate::trace::{Trace, Visitor};

pub type TargetId = u32;

/// Told when an event type gains its first listener on a target or loses
/// its last one. Hosts use this to start or stop producing the event.
pub trait ListenerObserver {
    fn listener_type_added(&self, target: TargetId, event_type: &str, options: &AddEventListenerOptions);

    fn listener_type_removed(&self, target: TargetId, event_type: &str);
}

/// Parent lookup used to build propagation paths.
pub trait TargetTree {
    fn event_target(&self, id: TargetId) -> Option<EventTarget>;

    /// Next node on the propagation path, `None` at the root.
    fn parent_target(&self, id: TargetId) -> Option<TargetId>;
}

#[derive(Clone)]
pub struct EventTarget {
    id: TargetId,
    registry: Rc<RefCell<ListenerRegistry>>,
    observer: Option<Rc<dyn ListenerObserver>>,
}

impl EventTarget {
    pub fn new(id: TargetId) -> Self {
        Self {
            id,
            registry: Rc::new(RefCell::new(ListenerRegistry::new())),
            observer: None,
        }
    }

    pub fn with_observer(id: TargetId, observer: Rc<dyn ListenerObserver>) -> Self {
        Self {
            observer: Some(observer),
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> TargetId {
        self.id
    }

    /// `addEventListener`. A missing callback is accepted and ignored.
    pub fn add_event_listener(
        &self,
        event_type: &str,
        listener: Option<ListenerRef>,
        options: impl Into<AddEventListenerOptions>,
    ) -> bool {
        let Some(listener) = listener else {
            return false;
        };
        let options = options.into();

        let (added, first) = {
            let mut registry = self.registry.borrow_mut();
            let had_type = registry.contains(event_type);
            let added = registry.add(event_type, listener, &options);
            (added, added && !had_type)
        };

        if first {
            if let Some(observer) = &self.observer {
                observer.listener_type_added(self.id, event_type, &options);
            }
        }
        added
    }

    /// `removeEventListener`. Unknown listeners are a silent no-op.
    pub fn remove_event_listener(
        &self,
        event_type: &str,
        listener: &Listener,
        options: impl Into<EventListenerOptions>,
    ) -> bool {
        let options = options.into();
        let (removed, emptied) = {
            let mut registry = self.registry.borrow_mut();
            let removed = registry.take(event_type, listener, &options);
            let emptied = removed.is_some() && !registry.contains(event_type);
            (removed, emptied)
        };

        if emptied {
            self.notify_removed(event_type);
        }
        // A native context destructor may call back into this target.
        removed.is_some()
    }

    /// Install, replace or clear the `on<type>` handler.
    pub fn set_attribute_listener(&self, event_type: &str, handler: Option<ListenerRef>) -> bool {
        let (installed, displaced, had_type, has_type) = {
            let mut registry = self.registry.borrow_mut();
            let had_type = registry.contains(event_type);
            let (installed, displaced) = registry.swap_attribute_listener(event_type, handler);
            (installed, displaced, had_type, registry.contains(event_type))
        };
        drop(displaced);

        match (had_type, has_type) {
            (false, true) => {
                if let Some(observer) = &self.observer {
                    observer.listener_type_added(self.id, event_type, &AddEventListenerOptions::default());
                }
            }
            (true, false) => self.notify_removed(event_type),
            _ => {}
        }
        installed
    }

    pub fn attribute_listener(&self, event_type: &str) -> Option<ListenerRef> {
        self.registry.borrow().attribute_listener(event_type).cloned()
    }

    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.registry.borrow().contains(event_type)
    }

    pub fn has_capturing_listeners(&self, event_type: &str) -> bool {
        self.registry.borrow().contains_capturing(event_type)
    }

    pub fn has_any_listeners(&self) -> bool {
        !self.registry.borrow().is_empty()
    }

    /// Live listeners for `event_type`, in firing order.
    pub fn listeners(&self, event_type: &str) -> Vec<ListenerRef> {
        self.registry
            .borrow()
            .find(event_type)
            .filter_map(|record| record.callback().cloned())
            .collect()
    }

    pub fn listener_types(&self) -> Vec<String> {
        self.registry
            .borrow()
            .event_types()
            .map(str::to_string)
            .collect()
    }

    /// Drop every listener, e.g. when the owning node is torn down.
    pub fn clear_listeners(&self) {
        let types = self.listener_types();
        let retired = self.registry.borrow_mut().take_all();
        drop(retired);
        for event_type in &types {
            self.notify_removed(event_type);
        }
        if !types.is_empty() {
            tracing::debug!("Cleared {} listener type(s) on target {}", types.len(), self.id);
        }
    }

    pub(crate) fn registry(&self) -> &Rc<RefCell<ListenerRegistry>> {
        &self.registry
    }

    /// Retire a `once` record from a firing pass.
    pub(crate) fn retire_once(&self, event_type: &str, slot: usize) {
        let (retired, emptied) = {
            let mut registry = self.registry.borrow_mut();
            let retired = registry.retire(event_type, slot);
            (retired, !registry.contains(event_type))
        };

        if retired.is_some() && emptied {
            self.notify_removed(event_type);
        }
        // Dropped here, after the registry borrow is released.
        drop(retired);
    }

    fn notify_removed(&self, event_type: &str) {
        if let Some(observer) = &self.observer {
            observer.listener_type_removed(self.id, event_type);
        }
    }
}

/// A lone target is a tree of one node.
impl TargetTree for EventTarget {
    fn event_target(&self, id: TargetId) -> Option<EventTarget> {
        (id == self.id).then(|| self.clone())
    }

    fn parent_target(&self, _id: TargetId) -> Option<TargetId> {
        None
    }
}

impl Trace for EventTarget {
    fn trace(&self, visitor: &mut dyn Visitor) {
        self.registry.borrow().trace(visitor);
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget")
            .field("id", &self.id)
            .field("registry", &self.registry)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::exception::ScriptException;
    use crate::listener::ScriptFunction;
    use std::cell::Cell;

    #[derive(Default)]
    struct Changes(RefCell<Vec<String>>);

    impl ListenerObserver for Changes {
        fn listener_type_added(&self, target: TargetId, event_type: &str, _: &AddEventListenerOptions) {
            self.0.borrow_mut().push(format!("+{}@{}", event_type, target));
        }

        fn listener_type_removed(&self, target: TargetId, event_type: &str) {
            self.0.borrow_mut().push(format!("-{}@{}", event_type, target));
        }
    }

    fn listener() -> ListenerRef {
        Listener::from_fn(|_, _| Ok(()))
    }

    #[test]
    fn test_missing_callback_is_ignored() {
        let target = EventTarget::new(1);
        assert!(!target.add_event_listener("click", None, false));
        assert!(!target.has_listeners("click"));
    }

    #[test]
    fn test_observer_sees_first_and_last() {
        let changes = Rc::new(Changes::default());
        let target = EventTarget::with_observer(3, changes.clone());
        let f = listener();
        let g = listener();

        target.add_event_listener("scroll", Some(f.clone()), false);
        target.add_event_listener("scroll", Some(g.clone()), true);
        target.remove_event_listener("scroll", &f, false);
        target.remove_event_listener("scroll", &g, true);

        assert_eq!(*changes.0.borrow(), vec!["+scroll@3", "-scroll@3"]);
    }

    #[test]
    fn test_clear_notifies_each_type() {
        let changes = Rc::new(Changes::default());
        let target = EventTarget::with_observer(1, changes.clone());
        target.add_event_listener("a", Some(listener()), false);
        target.add_event_listener("b", Some(listener()), false);
        changes.0.borrow_mut().clear();

        target.clear_listeners();
        assert!(!target.has_any_listeners());
        assert_eq!(*changes.0.borrow(), vec!["-a@1", "-b@1"]);
    }

    #[test]
    fn test_clones_share_registry() {
        let target = EventTarget::new(2);
        let alias = target.clone();
        target.add_event_listener("click", Some(listener()), AddEventListenerOptions::capture());

        assert!(alias.has_capturing_listeners("click"));
        assert_eq!(alias.listeners("click").len(), 1);
        assert_eq!(alias.listener_types(), vec!["click"]);
    }

    #[test]
    fn test_lone_target_tree() {
        let target = EventTarget::new(9);
        assert!(target.event_target(9).is_some());
        assert!(target.event_target(1).is_none());
        assert_eq!(target.parent_target(9), None);
    }

    /// Handler whose destructor reads the target it was installed on.
    struct InspectsOnDrop {
        target: EventTarget,
        seen: Rc<Cell<Option<usize>>>,
    }

    impl ScriptFunction for InspectsOnDrop {
        fn call(&self, _receiver: TargetId, _event: &Rc<Event>) -> Result<(), ScriptException> {
            Ok(())
        }
    }

    impl Drop for InspectsOnDrop {
        fn drop(&mut self) {
            self.seen.set(Some(self.target.listeners("click").len()));
        }
    }

    fn inspecting(target: &EventTarget, seen: &Rc<Cell<Option<usize>>>) -> ListenerRef {
        Listener::attribute_handler(Rc::new(InspectsOnDrop {
            target: target.clone(),
            seen: seen.clone(),
        }))
    }

    #[test]
    fn test_displaced_handler_dropped_after_borrow() {
        let target = EventTarget::new(4);
        let seen = Rc::new(Cell::new(None));

        assert!(target.set_attribute_listener("click", Some(inspecting(&target, &seen))));
        assert!(target.set_attribute_listener("click", Some(noop_handler())));
        assert_eq!(seen.get(), Some(1));

        seen.set(None);
        assert!(target.set_attribute_listener("click", Some(inspecting(&target, &seen))));
        assert!(!target.set_attribute_listener("click", None));
        assert_eq!(seen.get(), Some(0));
        assert!(!target.has_listeners("click"));
    }

    fn noop_handler() -> ListenerRef {
        Listener::attribute_handler(Rc::new(Noop))
    }

    struct Noop;

    impl ScriptFunction for Noop {
        fn call(&self, _receiver: TargetId, _event: &Rc<Event>) -> Result<(), ScriptException> {
            Ok(())
        }
    }
}
