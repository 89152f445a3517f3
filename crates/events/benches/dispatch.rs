//! Benchmarks for event dispatch.
//!
//! Measures the hot path: freezing the propagation path, filtering records
//! by phase and invoking cheap script listeners.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use events::{Dispatcher, Event, EventInit, EventTarget, Listener, TargetId, TargetTree};
use std::hint::black_box;
use std::rc::Rc;

/// Linear ancestor chain, node 0 is the root.
struct Chain(Vec<EventTarget>);

impl TargetTree for Chain {
    fn event_target(&self, id: TargetId) -> Option<EventTarget> {
        self.0.get(id as usize).cloned()
    }

    fn parent_target(&self, id: TargetId) -> Option<TargetId> {
        id.checked_sub(1)
    }
}

fn chain(depth: u32, listeners_per_node: usize) -> Chain {
    let nodes: Vec<_> = (0..depth).map(EventTarget::new).collect();
    for node in &nodes {
        for i in 0..listeners_per_node {
            node.add_event_listener(
                "click",
                Some(Listener::from_fn(|_, event| {
                    black_box(event.event_phase());
                    Ok(())
                })),
                i % 2 == 0,
            );
        }
    }
    Chain(nodes)
}

fn bench_single_target(c: &mut Criterion) {
    let target = EventTarget::new(1);
    for _ in 0..4 {
        target.add_event_listener("click", Some(Listener::from_fn(|_, _| Ok(()))), false);
    }
    let dispatcher = Dispatcher::new();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(4));
    group.bench_function("single_target", |b| {
        b.iter(|| {
            let event = Rc::new(Event::new("click"));
            black_box(dispatcher.dispatch(&target, 1, &event).unwrap())
        });
    });
    group.finish();
}

fn bench_deep_path(c: &mut Criterion) {
    let tree = chain(32, 4);
    let dispatcher = Dispatcher::new();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(32 * 4));
    group.bench_function("deep_path_bubbling", |b| {
        b.iter(|| {
            let event = Rc::new(Event::with_init("click", EventInit::bubbling()));
            black_box(dispatcher.dispatch(&tree, 31, &event).unwrap())
        });
    });
    group.bench_function("deep_path_no_listeners", |b| {
        b.iter(|| {
            let event = Rc::new(Event::with_init("keydown", EventInit::bubbling()));
            black_box(dispatcher.dispatch(&tree, 31, &event).unwrap())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_single_target, bench_deep_path);
criterion_main!(benches);
