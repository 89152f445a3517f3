//! Shared document handle
//!
//! `Document` is what listener code captures. Every method borrows the arena
//! only for its own duration, so a listener may restructure the tree, add
//! listeners or dispatch further events while a dispatch is in flight.

use events::{
    AddEventListenerOptions, DispatchEventResult, Dispatcher, Event, EventListenerOptions,
    EventTarget, Listener, ListenerObserver, ListenerRef, NodeDispatchResult, TargetId, TargetTree,
    Trace, Visitor,
};
use std::cell::RefCell;
use std::rc::Rc;

use crate::arena::DomArena;
use crate::error::Result;
use crate::types::NodeId;

struct Inner {
    arena: RefCell<DomArena>,
    dispatcher: Dispatcher,
}

#[derive(Clone)]
pub struct Document {
    inner: Rc<Inner>,
}

impl Document {
    pub fn new() -> Self {
        Self::with_parts(Dispatcher::new(), None)
    }

    pub fn with_dispatcher(dispatcher: Dispatcher) -> Self {
        Self::with_parts(dispatcher, None)
    }

    pub fn with_parts(dispatcher: Dispatcher, observer: Option<Rc<dyn ListenerObserver>>) -> Self {
        Self {
            inner: Rc::new(Inner {
                arena: RefCell::new(DomArena::with_observer(observer)),
                dispatcher,
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Run `f` against the arena. Do not dispatch from inside `f`.
    pub fn with_arena<R>(&self, f: impl FnOnce(&DomArena) -> R) -> R {
        f(&self.inner.arena.borrow())
    }

    pub fn window(&self) -> NodeId {
        self.inner.arena.borrow().window_id()
    }

    pub fn document_node(&self) -> NodeId {
        self.inner.arena.borrow().document_id()
    }

    // Tree

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.arena.borrow_mut().create_element(tag)
    }

    pub fn create_text(&self, data: &str) -> NodeId {
        self.inner.arena.borrow_mut().create_text(data)
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.inner.arena.borrow_mut().append_child(parent, child)
    }

    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.inner.arena.borrow_mut().remove_child(parent, child)
    }

    pub fn detach(&self, node: NodeId) -> Result<()> {
        self.inner.arena.borrow_mut().detach(node)
    }

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        self.inner.arena.borrow().parent(node)
    }

    pub fn children(&self, node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.inner.arena.borrow().children(node)?.to_vec())
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) -> Result<()> {
        self.inner.arena.borrow_mut().set_attribute(node, name, value)
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.inner.arena.borrow().get_element_by_id(id)
    }

    pub fn event_path(&self, node: NodeId) -> Result<Vec<NodeId>> {
        self.inner.arena.borrow().event_path(node)
    }

    /// Detach and free a subtree; its listeners are dropped.
    pub fn release_node(&self, node: NodeId) -> Result<usize> {
        let released = self.inner.arena.borrow_mut().release(node)?;
        // Observers and native context destructors may call back into the document.
        for target in &released {
            target.clear_listeners();
        }
        Ok(released.len())
    }

    // Events

    pub fn target(&self, node: NodeId) -> Result<EventTarget> {
        self.inner.arena.borrow().target(node)
    }

    pub fn add_event_listener(
        &self,
        node: NodeId,
        event_type: &str,
        listener: Option<ListenerRef>,
        options: impl Into<AddEventListenerOptions>,
    ) -> Result<bool> {
        Ok(self.target(node)?.add_event_listener(event_type, listener, options))
    }

    pub fn remove_event_listener(
        &self,
        node: NodeId,
        event_type: &str,
        listener: &Listener,
        options: impl Into<EventListenerOptions>,
    ) -> Result<bool> {
        Ok(self.target(node)?.remove_event_listener(event_type, listener, options))
    }

    pub fn set_attribute_listener(
        &self,
        node: NodeId,
        event_type: &str,
        handler: Option<ListenerRef>,
    ) -> Result<bool> {
        Ok(self.target(node)?.set_attribute_listener(event_type, handler))
    }

    pub fn attribute_listener(&self, node: NodeId, event_type: &str) -> Result<Option<ListenerRef>> {
        Ok(self.target(node)?.attribute_listener(event_type))
    }

    /// Script `dispatchEvent`: the event is marked untrusted.
    pub fn dispatch_event(&self, node: NodeId, event: &Rc<Event>) -> Result<bool> {
        if !event.is_being_dispatched() {
            event.set_trusted(false);
        }
        Ok(self.inner.dispatcher.dispatch(self, node, event)?)
    }

    /// Host-originated dispatch: the event is marked trusted.
    pub fn fire_event(&self, node: NodeId, event: &Rc<Event>) -> Result<DispatchEventResult> {
        if !event.is_being_dispatched() {
            event.set_trusted(true);
        }
        Ok(self.inner.dispatcher.dispatch_with_result(self, node, event)?)
    }

    /// One step of a host-driven walk: only `node`'s capturing (or only its
    /// non-capturing) listeners fire. The event is marked untrusted.
    pub fn fire_listeners(
        &self,
        node: NodeId,
        event: &Rc<Event>,
        capture: bool,
    ) -> Result<NodeDispatchResult> {
        let target = self.target(node)?;
        if !event.is_being_dispatched() {
            event.set_trusted(false);
        }
        Ok(self.inner.dispatcher.fire_at(&target, event, capture)?)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetTree for Document {
    fn event_target(&self, id: TargetId) -> Option<EventTarget> {
        self.inner.arena.borrow().target(id).ok()
    }

    fn parent_target(&self, id: TargetId) -> Option<TargetId> {
        self.inner.arena.borrow().event_parent(id)
    }
}

/// Reports every listener reachable from the tree's targets.
impl Trace for Document {
    fn trace(&self, visitor: &mut dyn Visitor) {
        let targets: Vec<EventTarget> = self
            .inner
            .arena
            .borrow()
            .iter()
            .map(|node| node.target.clone())
            .collect();
        for target in &targets {
            target.trace(visitor);
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("arena", &self.inner.arena)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::EventInit;
    use std::cell::Cell;

    #[test]
    fn test_dispatch_event_marks_untrusted() {
        let doc = Document::new();
        let div = doc.create_element("div");
        doc.append_child(doc.document_node(), div).unwrap();

        let trusted = Rc::new(Cell::new(None));
        let seen = trusted.clone();
        doc.add_event_listener(
            div,
            "click",
            Some(Listener::from_fn(move |_, event| {
                seen.set(Some(event.is_trusted()));
                Ok(())
            })),
            false,
        )
        .unwrap();

        let event = Rc::new(Event::new("click"));
        event.set_trusted(true);
        assert!(doc.dispatch_event(div, &event).unwrap());
        assert_eq!(trusted.get(), Some(false));

        let result = doc.fire_event(div, &Rc::new(Event::new("click"))).unwrap();
        assert_eq!(result, DispatchEventResult::NotCanceled);
        assert_eq!(trusted.get(), Some(true));
    }

    #[test]
    fn test_document_bubbles_to_window() {
        let doc = Document::new();
        let window = doc.window();
        let reached = Rc::new(Cell::new(false));
        let flag = reached.clone();
        doc.add_event_listener(
            window,
            "load",
            Some(Listener::from_fn(move |receiver, _| {
                flag.set(receiver == 0);
                Ok(())
            })),
            false,
        )
        .unwrap();

        let event = Rc::new(Event::with_init("load", EventInit::bubbling()));
        doc.dispatch_event(doc.document_node(), &event).unwrap();
        assert!(reached.get());
    }

    #[test]
    fn test_unknown_node_errors() {
        let doc = Document::new();
        let listener = Listener::from_fn(|_, _| Ok(()));
        assert!(doc.add_event_listener(42, "click", Some(listener), false).is_err());
        assert!(doc.dispatch_event(42, &Rc::new(Event::new("click"))).is_err());
    }

    #[test]
    fn test_host_driven_walk() {
        let doc = Document::new();
        let list = doc.create_element("ul");
        let item = doc.create_element("li");
        doc.append_child(doc.document_node(), list).unwrap();
        doc.append_child(list, item).unwrap();

        let log = Rc::new(RefCell::new(Vec::new()));
        for (node, name) in [(list, "ul"), (item, "li")] {
            for capture in [true, false] {
                let log = log.clone();
                let label = format!("{}:{}", name, if capture { "capture" } else { "bubble" });
                doc.add_event_listener(
                    node,
                    "tap",
                    Some(Listener::from_fn(move |_, event| {
                        assert!(!event.is_trusted());
                        log.borrow_mut().push(label.clone());
                        Ok(())
                    })),
                    capture,
                )
                .unwrap();
            }
        }

        let event = Rc::new(Event::with_init("tap", EventInit::bubbling()));
        event.set_trusted(true);
        for (node, capture) in [(list, true), (item, true), (item, false), (list, false)] {
            let result = doc.fire_listeners(node, &event, capture).unwrap();
            assert!(!result.propagation_stopped);
        }

        assert_eq!(
            *log.borrow(),
            vec!["ul:capture", "li:capture", "li:bubble", "ul:bubble"]
        );
        assert!(doc.fire_listeners(42, &event, false).is_err());
    }
}
