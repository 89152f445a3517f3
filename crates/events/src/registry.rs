//! Per-target listener registry
//!
//! ## Layout
//!
//! ```text
//! buckets: [("click", [rec0][rec1][✝][rec3]), ("focus", [rec0])]
//!            ↑ insertion order          ↑ tombstone, compacted later
//! ```
//!
//! An association list, not a map: a target rarely listens for more than a
//! handful of types, and both bucket order and record order are observable.
//!
//! Removal while any dispatch is iterating this registry only tombstones
//! the record. Indices held by the dispatcher stay valid; the last dispatch
//! to leave compacts.

use crate::listener::{Listener, ListenerRef};
use crate::options::{AddEventListenerOptions, EventListenerOptions};
use crate::record::ListenerRecord;
use crate::trace::{Trace, Visitor};

#[derive(Debug)]
struct Bucket {
    event_type: String,
    records: Vec<ListenerRecord>,
}

impl Bucket {
    fn live(&self) -> impl Iterator<Item = &ListenerRecord> {
        self.records.iter().filter(|r| !r.is_removed())
    }
}

#[derive(Debug, Default)]
pub struct ListenerRegistry {
    buckets: Vec<Bucket>,
    /// Dispatch passes currently iterating this registry.
    firing: usize,
    tombstones: usize,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn bucket(&self, event_type: &str) -> Option<&Bucket> {
        self.buckets.iter().find(|b| b.event_type == event_type)
    }

    fn bucket_mut(&mut self, event_type: &str) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.event_type == event_type)
    }

    /// Insert unless an identical listener (same callback, same capture) is live.
    pub fn add(
        &mut self,
        event_type: &str,
        listener: ListenerRef,
        options: &AddEventListenerOptions,
    ) -> bool {
        let record = ListenerRecord::new(listener, options);

        match self.bucket_mut(event_type) {
            Some(bucket) => {
                let Some(callback) = record.callback() else {
                    return false;
                };
                if bucket
                    .records
                    .iter()
                    .any(|r| r.matches(callback, options.capture))
                {
                    return false;
                }
                bucket.records.push(record);
            }
            None => self.buckets.push(Bucket {
                event_type: event_type.to_string(),
                records: vec![record],
            }),
        }

        tracing::debug!(
            "Added '{}' listener (capture={}, passive={}, once={})",
            event_type,
            options.capture,
            options.passive,
            options.once
        );
        true
    }

    /// Remove the first live record identical to `(listener, capture)`.
    pub fn remove(
        &mut self,
        event_type: &str,
        listener: &Listener,
        options: &EventListenerOptions,
    ) -> bool {
        self.take(event_type, listener, options).is_some()
    }

    /// Like [`remove`](Self::remove), handing back the callback so the caller
    /// can drop it outside any borrow of this registry.
    pub(crate) fn take(
        &mut self,
        event_type: &str,
        listener: &Listener,
        options: &EventListenerOptions,
    ) -> Option<ListenerRef> {
        let index = self.bucket(event_type).and_then(|b| {
            b.records
                .iter()
                .position(|r| r.matches(listener, options.capture))
        })?;

        let retired = self.retire(event_type, index);
        tracing::debug!("Removed '{}' listener at slot {}", event_type, index);
        retired
    }

    /// Drop the record in `slot`, tombstoning it if a dispatch is iterating.
    /// Returns the callback that was retired.
    pub(crate) fn retire(&mut self, event_type: &str, slot: usize) -> Option<ListenerRef> {
        let firing = self.firing > 0;
        let bucket_index = self
            .buckets
            .iter()
            .position(|b| b.event_type == event_type)?;
        let bucket = &mut self.buckets[bucket_index];
        if bucket.records.get(slot)?.is_removed() {
            return None;
        }

        if firing {
            self.tombstones += 1;
            return bucket.records[slot].mark_removed();
        }

        let mut record = bucket.records.remove(slot);
        if bucket.records.is_empty() {
            self.buckets.remove(bucket_index);
        }
        record.mark_removed()
    }

    /// Live records for `event_type`, in registration order.
    pub fn find<'a>(&'a self, event_type: &str) -> impl Iterator<Item = &'a ListenerRecord> + 'a {
        self.bucket(event_type).into_iter().flat_map(|b| b.live())
    }

    /// Record in `slot`, tombstones included.
    pub(crate) fn slot(&self, event_type: &str, slot: usize) -> Option<&ListenerRecord> {
        self.bucket(event_type)?.records.get(slot)
    }

    pub(crate) fn slot_mut(&mut self, event_type: &str, slot: usize) -> Option<&mut ListenerRecord> {
        self.bucket_mut(event_type)?.records.get_mut(slot)
    }

    /// Number of slots, tombstones included. Bounds one firing pass.
    pub(crate) fn slot_count(&self, event_type: &str) -> usize {
        self.bucket(event_type).map_or(0, |b| b.records.len())
    }

    pub fn live_count(&self, event_type: &str) -> usize {
        self.find(event_type).count()
    }

    pub fn contains(&self, event_type: &str) -> bool {
        self.find(event_type).next().is_some()
    }

    pub fn contains_capturing(&self, event_type: &str) -> bool {
        self.find(event_type).any(ListenerRecord::capture)
    }

    /// Event types with at least one live record, in first-registration order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.buckets
            .iter()
            .filter(|b| b.live().next().is_some())
            .map(|b| b.event_type.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.live().next().is_none())
    }

    pub fn is_firing(&self) -> bool {
        self.firing > 0
    }

    /// Drop every record. Used on target teardown.
    pub fn clear(&mut self) {
        self.take_all();
    }

    /// Retire every record and return the callbacks.
    pub(crate) fn take_all(&mut self) -> Vec<ListenerRef> {
        if self.firing == 0 {
            self.tombstones = 0;
            return self
                .buckets
                .drain(..)
                .flat_map(|b| b.records)
                .filter_map(|mut r| r.mark_removed())
                .collect();
        }

        let mut retired = Vec::new();
        for bucket in &mut self.buckets {
            for record in bucket.records.iter_mut().filter(|r| !r.is_removed()) {
                retired.extend(record.mark_removed());
                self.tombstones += 1;
            }
        }
        retired
    }

    /// The `on<type>` handler, if one is registered.
    pub fn attribute_listener(&self, event_type: &str) -> Option<&ListenerRef> {
        self.find(event_type)
            .filter_map(ListenerRecord::callback)
            .find(|cb| cb.is_attribute_handler())
    }

    /// Install, replace or (with `None`) remove the `on<type>` handler.
    /// A replacement keeps the original slot, so ordering is unchanged.
    pub fn set_attribute_listener(&mut self, event_type: &str, handler: Option<ListenerRef>) -> bool {
        self.swap_attribute_listener(event_type, handler).0
    }

    /// Like [`set_attribute_listener`](Self::set_attribute_listener), also
    /// handing back the displaced callback to be dropped outside any borrow
    /// of this registry.
    pub(crate) fn swap_attribute_listener(
        &mut self,
        event_type: &str,
        handler: Option<ListenerRef>,
    ) -> (bool, Option<ListenerRef>) {
        let slot = self.bucket(event_type).and_then(|b| {
            b.records.iter().position(|r| {
                !r.is_removed() && r.callback().is_some_and(|cb| cb.is_attribute_handler())
            })
        });

        match (slot, handler) {
            (Some(slot), None) => (false, self.retire(event_type, slot)),
            (Some(slot), Some(handler)) => {
                let displaced = self
                    .slot_mut(event_type, slot)
                    .and_then(|record| record.replace_callback(handler));
                (true, displaced)
            }
            (None, Some(handler)) => {
                // A rejected handler may be the caller's last reference.
                let kept = handler.clone();
                let added = self.add(event_type, handler, &AddEventListenerOptions::default());
                (added, Some(kept))
            }
            (None, None) => (false, None),
        }
    }

    pub(crate) fn begin_firing(&mut self) {
        self.firing += 1;
    }

    pub(crate) fn end_firing(&mut self) {
        self.firing = self.firing.saturating_sub(1);
        if self.firing == 0 && self.tombstones > 0 {
            self.compact();
        }
    }

    fn compact(&mut self) {
        for bucket in &mut self.buckets {
            bucket.records.retain(|r| !r.is_removed());
        }
        self.buckets.retain(|b| !b.records.is_empty());
        self.tombstones = 0;
    }
}

impl Trace for ListenerRegistry {
    fn trace(&self, visitor: &mut dyn Visitor) {
        for bucket in &self.buckets {
            for callback in bucket.live().filter_map(ListenerRecord::callback) {
                callback.trace(visitor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ScriptException;
    use crate::listener::ScriptFunction;
    use crate::target::TargetId;
    use crate::trace::{EdgeCollector, GcHandle};
    use std::rc::Rc;

    fn listener() -> ListenerRef {
        Listener::from_fn(|_, _| Ok(()))
    }

    fn bubble() -> AddEventListenerOptions {
        AddEventListenerOptions::default()
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let mut registry = ListenerRegistry::new();
        let f = listener();

        assert!(registry.add("click", f.clone(), &bubble()));
        assert!(!registry.add("click", f.clone(), &bubble()));
        assert_eq!(registry.live_count("click"), 1);

        // Same callback, different capture flag is a different registration.
        assert!(registry.add("click", f.clone(), &AddEventListenerOptions::capture()));
        // Once/passive do not take part in identity.
        assert!(!registry.add("click", f, &AddEventListenerOptions::once()));
        assert_eq!(registry.live_count("click"), 2);
    }

    #[test]
    fn test_find_preserves_registration_order() {
        let mut registry = ListenerRegistry::new();
        let listeners: Vec<_> = (0..5).map(|_| listener()).collect();
        for l in &listeners {
            registry.add("input", l.clone(), &bubble());
        }

        let found: Vec<_> = registry
            .find("input")
            .map(|r| r.callback().unwrap().clone())
            .collect();
        assert_eq!(found.len(), 5);
        for (a, b) in found.iter().zip(&listeners) {
            assert!(Rc::ptr_eq(a, b));
        }
        assert_eq!(registry.find("change").count(), 0);
    }

    #[test]
    fn test_bucket_order_follows_first_registration() {
        let mut registry = ListenerRegistry::new();
        registry.add("focus", listener(), &bubble());
        registry.add("blur", listener(), &bubble());
        registry.add("focus", listener(), &bubble());

        assert_eq!(registry.event_types().collect::<Vec<_>>(), vec!["focus", "blur"]);
    }

    #[test]
    fn test_remove_requires_matching_capture() {
        let mut registry = ListenerRegistry::new();
        let f = listener();
        let g = listener();
        registry.add("click", f.clone(), &AddEventListenerOptions::capture());
        registry.add("click", g.clone(), &bubble());

        assert!(!registry.remove("click", &f, &EventListenerOptions::default()));
        assert!(registry.remove("click", &f, &EventListenerOptions::from(true)));
        assert!(!registry.remove("click", &f, &EventListenerOptions::from(true)));

        let remaining: Vec<_> = registry.find("click").collect();
        assert_eq!(remaining.len(), 1);
        assert!(Rc::ptr_eq(remaining[0].callback().unwrap(), &g));
    }

    #[test]
    fn test_removing_last_listener_prunes_bucket() {
        let mut registry = ListenerRegistry::new();
        let f = listener();
        registry.add("click", f.clone(), &bubble());
        assert!(!registry.is_empty());

        registry.remove("click", &f, &EventListenerOptions::default());
        assert!(registry.is_empty());
        assert_eq!(registry.slot_count("click"), 0);
    }

    #[test]
    fn test_remove_while_firing_tombstones_then_compacts() {
        let mut registry = ListenerRegistry::new();
        let f = listener();
        let g = listener();
        registry.add("click", f.clone(), &bubble());
        registry.add("click", g.clone(), &bubble());

        registry.begin_firing();
        registry.remove("click", &f, &EventListenerOptions::default());

        // Slots are stable for the iterating dispatch.
        assert_eq!(registry.slot_count("click"), 2);
        assert!(registry.slot("click", 0).unwrap().is_removed());
        assert!(Rc::ptr_eq(registry.slot("click", 1).unwrap().callback().unwrap(), &g));
        assert_eq!(registry.live_count("click"), 1);

        // A removed listener can be added back; it lands after the tombstone.
        assert!(registry.add("click", f.clone(), &bubble()));
        assert_eq!(registry.slot_count("click"), 3);

        registry.end_firing();
        assert_eq!(registry.slot_count("click"), 2);
        assert_eq!(registry.live_count("click"), 2);
    }

    #[test]
    fn test_nested_firing_defers_compaction_to_outermost() {
        let mut registry = ListenerRegistry::new();
        let f = listener();
        registry.add("click", f.clone(), &bubble());

        registry.begin_firing();
        registry.begin_firing();
        registry.remove("click", &f, &EventListenerOptions::default());
        registry.end_firing();
        assert_eq!(registry.slot_count("click"), 1);

        registry.end_firing();
        assert_eq!(registry.slot_count("click"), 0);
    }

    #[test]
    fn test_contains_capturing() {
        let mut registry = ListenerRegistry::new();
        registry.add("click", listener(), &bubble());
        assert!(registry.contains("click"));
        assert!(!registry.contains_capturing("click"));

        registry.add("click", listener(), &AddEventListenerOptions::capture());
        assert!(registry.contains_capturing("click"));
        assert!(!registry.contains("keydown"));
    }

    #[test]
    fn test_clear_during_firing_keeps_slots() {
        let mut registry = ListenerRegistry::new();
        registry.add("click", listener(), &bubble());
        registry.add("focus", listener(), &bubble());

        registry.begin_firing();
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.slot_count("click"), 1);

        registry.end_firing();
        assert_eq!(registry.slot_count("click"), 0);
        assert_eq!(registry.event_types().count(), 0);
    }

    #[test]
    fn test_attribute_handler_replacement_keeps_slot() {
        let mut registry = ListenerRegistry::new();
        let before = listener();
        let after = listener();
        registry.add("click", before, &bubble());

        let first = Listener::attribute_handler(Rc::new(Noop));
        assert!(registry.set_attribute_listener("click", Some(first.clone())));
        registry.add("click", after.clone(), &bubble());

        let second = Listener::attribute_handler(Rc::new(Noop));
        assert!(registry.set_attribute_listener("click", Some(second.clone())));

        let order: Vec<_> = registry
            .find("click")
            .map(|r| r.callback().unwrap().clone())
            .collect();
        assert_eq!(order.len(), 3);
        assert!(Rc::ptr_eq(&order[1], &second));
        assert!(Rc::ptr_eq(&order[2], &after));
        assert!(Rc::ptr_eq(registry.attribute_listener("click").unwrap(), &second));

        assert!(!registry.set_attribute_listener("click", None));
        assert!(registry.attribute_listener("click").is_none());
        assert_eq!(registry.live_count("click"), 2);
    }

    struct Noop;

    impl ScriptFunction for Noop {
        fn call(&self, _: TargetId, _: &Rc<crate::event::Event>) -> Result<(), ScriptException> {
            Ok(())
        }

        fn handle(&self) -> Option<GcHandle> {
            Some(GcHandle(5))
        }
    }

    #[test]
    fn test_trace_skips_tombstones() {
        let mut registry = ListenerRegistry::new();
        let kept = Listener::script(Rc::new(Noop));
        let dropped: Rc<dyn ScriptFunction> = Rc::new(Noop);
        let dropped = Listener::script(dropped);
        registry.add("click", kept, &bubble());
        registry.add("click", dropped.clone(), &bubble());

        registry.begin_firing();
        registry.remove("click", &dropped, &EventListenerOptions::default());

        let mut edges = EdgeCollector::default();
        registry.trace(&mut edges);
        assert_eq!(edges.handles, vec![GcHandle(5)]);
        registry.end_firing();
    }
}
