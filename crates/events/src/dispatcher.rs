//! Capture → target → bubble dispatch
//!
//! ## Algorithm
//!
//! 1. Validate the event (initialized, typed, not mid-dispatch).
//! 2. Freeze the path `[target, parent, ..., root]` as `EventTarget`
//!    clones. Listeners may re-parent or detach nodes; the walk keeps
//!    following the frozen path.
//! 3. Capture from the root down to the parent, then the target itself,
//!    then bubble back up if the event bubbles.
//! 4. At each node, read the registry fresh. One firing pass covers the
//!    slots that existed when the pass began.
//!
//! Listener failures are reported and never end the walk. Stop flags are
//! checked between listeners and between nodes, never during a call.

use smallvec::SmallVec;
use std::cell::RefCell;
use std::rc::Rc;

use crate::config::DispatchConfig;
use crate::error::{EventError, Result};
use crate::event::{DispatchEventResult, Event, EventPhase, PassiveMode};
use crate::exception::{ErrorReporter, ExceptionState, TracingReporter};
use crate::keep_alive::KeepAlive;
use crate::listener::ListenerRef;
use crate::registry::ListenerRegistry;
use crate::target::{EventTarget, TargetId, TargetTree};

/// Host hook run after a node's listeners have fired.
pub trait MicrotaskHook {
    fn run_microtasks(&self);
}

type Path = SmallVec<[EventTarget; 8]>;

/// Outcome of one host-driven step, laid out for the boundary.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeDispatchResult {
    pub canceled: bool,
    pub propagation_stopped: bool,
    pub default_prevented: bool,
}

impl NodeDispatchResult {
    fn of(event: &Event) -> Self {
        Self {
            canceled: event.dispatch_result() == DispatchEventResult::CanceledByEventHandler,
            propagation_stopped: event.propagation_stopped(),
            default_prevented: event.default_prevented(),
        }
    }
}

/// Ends the event's dispatch even if a listener panics.
struct DispatchScope<'a> {
    event: &'a Event,
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        self.event.end_dispatch();
    }
}

/// Balances `begin_firing` on the registry being iterated.
struct FiringScope<'a> {
    registry: &'a RefCell<ListenerRegistry>,
}

impl<'a> FiringScope<'a> {
    fn enter(registry: &'a RefCell<ListenerRegistry>) -> Self {
        registry.borrow_mut().begin_firing();
        Self { registry }
    }
}

impl Drop for FiringScope<'_> {
    fn drop(&mut self) {
        if let Ok(mut registry) = self.registry.try_borrow_mut() {
            registry.end_firing();
        }
    }
}

pub struct Dispatcher {
    config: DispatchConfig,
    reporter: Rc<dyn ErrorReporter>,
    microtasks: Option<Rc<dyn MicrotaskHook>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::with_config(DispatchConfig::default())
    }

    pub fn with_config(config: DispatchConfig) -> Self {
        Self {
            config,
            reporter: Rc::new(TracingReporter),
            microtasks: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Rc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_microtask_hook(mut self, hook: Rc<dyn MicrotaskHook>) -> Self {
        self.microtasks = Some(hook);
        self
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// `dispatchEvent`: false when a listener canceled the event.
    pub fn dispatch<T>(&self, tree: &T, target: TargetId, event: &Rc<Event>) -> Result<bool>
    where
        T: TargetTree + ?Sized,
    {
        let result = self.dispatch_with_result(tree, target, event)?;
        Ok(result != DispatchEventResult::CanceledByEventHandler)
    }

    pub fn dispatch_with_result<T>(
        &self,
        tree: &T,
        target: TargetId,
        event: &Rc<Event>,
    ) -> Result<DispatchEventResult>
    where
        T: TargetTree + ?Sized,
    {
        validate(event)?;

        let path = self.build_path(tree, target)?;
        let event_type = event.event_type();

        // Path clones pin every registry on it; this pins the event.
        let _keep_alive = KeepAlive::new(event);

        let ids: SmallVec<[TargetId; 8]> = path.iter().map(EventTarget::id).collect();
        let uncancelable_before = event.prevent_default_called_on_uncancelable_event();

        {
            event.begin_dispatch(target, &ids);
            let _scope = DispatchScope { event };

            if self.config.skip_without_listeners
                && !path.iter().any(|node| node.has_listeners(&event_type))
            {
                tracing::trace!("No '{}' listeners on path of {}", event_type, target);
            } else {
                tracing::debug!(
                    "Dispatching '{}' to {} (path length {})",
                    event_type,
                    target,
                    path.len()
                );
                self.walk(&path, &event_type, event);
            }
        }

        if !uncancelable_before && event.prevent_default_called_on_uncancelable_event() {
            tracing::warn!(
                "preventDefault() called on uncancelable '{}' event",
                event_type
            );
        }

        let result = event.dispatch_result();
        tracing::debug!("Dispatched '{}' to {}: {:?}", event_type, target, result);
        Ok(result)
    }

    /// Host-driven step: fire only `node`'s capturing listeners (or only its
    /// non-capturing ones) in the at-target phase. The host walks the path
    /// itself, so stop and cancel flags accumulate across its steps.
    pub fn fire_at(
        &self,
        node: &EventTarget,
        event: &Rc<Event>,
        capture: bool,
    ) -> Result<NodeDispatchResult> {
        validate(event)?;

        let event_type = event.event_type();
        let _keep_alive = KeepAlive::new(event);
        let restrictions = (
            event.fire_only_capture_listeners_at_target(),
            event.fire_only_non_capture_listeners_at_target(),
        );

        {
            event.begin_step(node.id());
            let _scope = DispatchScope { event };
            event.set_fire_only_capture_listeners_at_target(capture);
            event.set_fire_only_non_capture_listeners_at_target(!capture);
            event.set_phase(EventPhase::AtTarget);
            tracing::debug!(
                "Firing '{}' {} listeners on {}",
                event_type,
                if capture { "capture" } else { "bubble" },
                node.id()
            );
            self.fire(node, &event_type, event);
        }

        event.set_fire_only_capture_listeners_at_target(restrictions.0);
        event.set_fire_only_non_capture_listeners_at_target(restrictions.1);
        Ok(NodeDispatchResult::of(event))
    }

    fn build_path<T>(&self, tree: &T, target: TargetId) -> Result<Path>
    where
        T: TargetTree + ?Sized,
    {
        let max = self.config.max_path_depth;
        let mut path = Path::new();
        path.push(
            tree.event_target(target)
                .ok_or(EventError::UnknownTarget(target))?,
        );

        let mut current = tree.parent_target(target);
        while let Some(id) = current {
            if path.len() >= max {
                return Err(EventError::PathTooDeep {
                    depth: path.len() + 1,
                    max,
                });
            }
            let Some(node) = tree.event_target(id) else {
                tracing::warn!("Parent {} of the path is not an event target; path ends", id);
                break;
            };
            path.push(node);
            current = tree.parent_target(id);
        }

        Ok(path)
    }

    fn walk(&self, path: &[EventTarget], event_type: &str, event: &Rc<Event>) {
        let Some((target, ancestors)) = path.split_first() else {
            return;
        };

        event.set_phase(EventPhase::Capturing);
        for node in ancestors.iter().rev() {
            if event.propagation_stopped() {
                return;
            }
            self.fire(node, event_type, event);
        }

        if event.propagation_stopped() {
            return;
        }
        event.set_phase(EventPhase::AtTarget);
        self.fire(target, event_type, event);

        if !event.bubbles() {
            return;
        }
        event.set_phase(EventPhase::Bubbling);
        for node in ancestors {
            if event.propagation_stopped() {
                return;
            }
            self.fire(node, event_type, event);
        }
    }

    /// Run one node's eligible listeners in registration order.
    fn fire(&self, node: &EventTarget, event_type: &str, event: &Rc<Event>) {
        event.set_current_target(Some(node.id()));

        let registry = node.registry();
        let end = registry.borrow().slot_count(event_type);
        if end == 0 {
            return;
        }

        let mut fired = false;
        {
            let _firing = FiringScope::enter(registry);

            for slot in 0..end {
                if event.immediate_propagation_stopped() {
                    break;
                }

                let Some((callback, passive, once)) =
                    eligible(&registry.borrow(), event_type, slot, event)
                else {
                    continue;
                };

                // Retired before the call so a re-entrant dispatch cannot fire
                // it twice and a re-add from inside the call gets a new slot.
                if once {
                    node.retire_once(event_type, slot);
                }

                event.set_handling_passive(if passive {
                    PassiveMode::Passive
                } else {
                    PassiveMode::NotPassive
                });
                let exception_state = ExceptionState::new();
                event.set_current_target(Some(node.id()));
                callback.invoke(node.id(), event, &exception_state);
                event.set_handling_passive(PassiveMode::NotPassive);
                fired = true;

                if event.take_blocked_by_passive() && self.config.warn_passive_prevent_default {
                    let first = registry
                        .borrow_mut()
                        .slot_mut(event_type, slot)
                        .is_some_and(|record| record.take_warning());
                    if first {
                        tracing::warn!(
                            "Ignored preventDefault() in passive '{}' listener on {}",
                            event_type,
                            node.id()
                        );
                    }
                }

                if let Some(exception) = exception_state.take() {
                    self.reporter.report(node.id(), event_type, &exception);
                }
            }
        }

        if fired && self.config.microtask_checkpoint {
            if let Some(hook) = &self.microtasks {
                hook.run_microtasks();
            }
        }
    }
}

fn validate(event: &Event) -> Result<()> {
    if !event.was_initialized() {
        return Err(EventError::Uninitialized);
    }
    if event.is_type("") {
        return Err(EventError::EmptyEventType);
    }
    if event.is_being_dispatched() {
        tracing::warn!(
            "Refusing to re-dispatch '{}' while it is being dispatched",
            event.event_type()
        );
        return Err(EventError::AlreadyDispatching);
    }
    Ok(())
}

/// Callback and flags of `slot` if it should fire in the event's current phase.
fn eligible(
    registry: &ListenerRegistry,
    event_type: &str,
    slot: usize,
    event: &Event,
) -> Option<(ListenerRef, bool, bool)> {
    let record = registry.slot(event_type, slot)?;
    if !record.should_fire(event) {
        return None;
    }
    let callback = record.callback()?.clone();
    Some((callback, record.passive(), record.once()))
}
