//! Reachability reporting for the host's tracing collector
//!
//! The collector owns mark/sweep. This side only enumerates edges: every
//! strong reference an object holds, and nothing else.

/// Opaque handle into the script engine's heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GcHandle(pub u64);

/// Receives edges during the collector's mark phase.
pub trait Visitor {
    fn trace_handle(&mut self, handle: GcHandle);
}

pub trait Trace {
    fn trace(&self, visitor: &mut dyn Visitor);
}

/// Visitor that records every edge it is given.
#[derive(Debug, Default)]
pub struct EdgeCollector {
    pub handles: Vec<GcHandle>,
}

impl Visitor for EdgeCollector {
    fn trace_handle(&mut self, handle: GcHandle) {
        self.handles.push(handle);
    }
}
