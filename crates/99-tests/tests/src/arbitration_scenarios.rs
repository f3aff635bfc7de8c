use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mock::MemorySurface;
use proptest::prelude::*;
use proptest::sample::Index;
use render_arbiter::{
    ArbiterConfig, ArbiterEvent, DegradedRenderer, RenderArbiter, RenderError, RootLease,
};
use runtime_native::{EventLog, VirtualTimers};

fn arbiter(ceiling: u32) -> (Rc<MemorySurface>, RenderArbiter) {
    let surface = Rc::new(MemorySurface::with_root());
    let arbiter = RenderArbiter::new(
        surface.clone(),
        DegradedRenderer::default(),
        ArbiterConfig {
            attempt_ceiling: ceiling,
        },
    );
    (surface, arbiter)
}

fn failing(_lease: RootLease) -> Result<(), RenderError> {
    Err(RenderError::failed("render failed"))
}

fn activations(events: &[ArbiterEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            ArbiterEvent::Activated { name, .. } => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Checks that no two strategies ever held the root at once and nothing ran after degraded mode.
fn assert_single_holder(events: &[ArbiterEvent]) {
    let mut holder: Option<&str> = None;
    let mut degraded = false;
    for event in events {
        match event {
            ArbiterEvent::Activated { name, .. } => {
                assert!(!degraded, "{name} activated after degraded mode");
                assert!(holder.is_none(), "{name} activated while {holder:?} held the root");
                holder = Some(name);
            }
            ArbiterEvent::Released { name } | ArbiterEvent::Failed { name, .. } => {
                assert_eq!(holder, Some(name.as_str()));
                holder = None;
            }
            ArbiterEvent::DegradedActivated { .. } => {
                degraded = true;
                holder = None;
            }
            _ => {}
        }
    }
}

#[test]
fn scenario_twenty_ten_thirty() {
    let (surface, arbiter) = arbiter(3);
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    arbiter.subscribe(move |event| sink.borrow_mut().push(event.clone()));

    {
        let _batch = arbiter.batch();
        for (name, priority) in [("p20", 20), ("p10", 10), ("p30", 30)] {
            assert!(arbiter.register(name, priority, failing));
        }
    }

    let events = log.borrow();
    assert_eq!(activations(&events), ["p10", "p20", "p30"]);
    assert!(matches!(events.last(), Some(ArbiterEvent::DegradedActivated { .. })));
    assert!(arbiter.is_degraded());
    assert!(surface.html().contains("degraded-mode"));
    assert!(!arbiter.register("p0", 0, |_lease| Ok(())));
    assert_single_holder(&events);
}

fn shuffled_names() -> impl Strategy<Value = Vec<String>> {
    (2usize..8).prop_flat_map(|count| {
        Just((0..count).map(|i| format!("r{i}")).collect::<Vec<_>>()).prop_shuffle()
    })
}

#[derive(Clone, Debug)]
enum Op {
    Register {
        priority: u32,
        fails: bool,
        wait_ms: u64,
    },
    ReleaseHolder,
    /// Late failure reported through a kept lease, current or stale.
    FailLease(Index),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        2 => (0u32..4, prop::bool::weighted(0.3), 0u64..50).prop_map(|(priority, fails, wait_ms)| {
            Op::Register { priority, fails, wait_ms }
        }),
        1 => Just(Op::ReleaseHolder),
        1 => any::<Index>().prop_map(Op::FailLease),
    ]
}

proptest! {
    /// Equal priorities are activated in registration order.
    #[test]
    fn equal_priorities_activate_fifo(names in shuffled_names()) {
        let (_surface, arbiter) = arbiter(names.len() as u32 + 1);
        let order = Rc::new(RefCell::new(Vec::new()));
        {
            let _batch = arbiter.batch();
            for name in &names {
                let order = Rc::clone(&order);
                arbiter.register(name.clone(), 5, move |lease| {
                    order.borrow_mut().push(lease.name().to_owned());
                    Err(RenderError::failed("next"))
                });
            }
        }

        let order = order.borrow().clone();
        prop_assert_eq!(order, names);
    }

    /// Any interleaving of registrations, releases and late failures keeps at most one holder.
    #[test]
    fn at_most_one_holder_over_random_operations(ops in prop::collection::vec(op(), 1..200)) {
        let clock = VirtualTimers::new();
        let log = EventLog::new(&clock);
        let (_surface, arbiter) = arbiter(12);
        let sink = log.clone();
        arbiter.subscribe(move |event| sink.record(event.clone()));
        let leases: Rc<RefCell<Vec<RootLease>>> = Rc::new(RefCell::new(Vec::new()));

        for (step, op) in ops.into_iter().enumerate() {
            match op {
                Op::Register { priority, fails, wait_ms } => {
                    clock.advance(Duration::from_millis(wait_ms));
                    let keep = Rc::clone(&leases);
                    arbiter.register(format!("s{step}"), priority, move |lease| {
                        if fails {
                            return Err(RenderError::failed("flaky"));
                        }
                        keep.borrow_mut().push(lease);
                        Ok(())
                    });
                }
                Op::ReleaseHolder => {
                    if let Some(name) = arbiter.holder() {
                        arbiter.release(&name);
                    }
                }
                Op::FailLease(index) => {
                    let lease = {
                        let leases = leases.borrow();
                        (!leases.is_empty()).then(|| leases[index.index(leases.len())].clone())
                    };
                    if let Some(lease) = lease {
                        lease.fail(RenderError::failed("async failure"));
                    }
                }
            }
            let snapshot = arbiter.snapshot();
            prop_assert!(snapshot.attempts <= snapshot.ceiling);
            if snapshot.degraded {
                prop_assert!(snapshot.holder.is_none());
                break;
            }
        }

        let entries = log.entries();
        prop_assert!(entries.windows(2).all(|pair| pair[0].at <= pair[1].at));
        assert_single_holder(&log.events());
    }
}

#[test]
fn register_after_degraded_leaves_state_unchanged() {
    let (surface, arbiter) = arbiter(1);
    arbiter.register("only", 1, failing);
    assert!(arbiter.is_degraded());
    let before = arbiter.snapshot();
    let paints = surface.paint_count();

    for priority in [0, 1, 100] {
        assert!(!arbiter.register("again", priority, |lease| {
            lease.paint("should never run")?;
            Ok(())
        }));
    }
    assert!(!arbiter.release("only"));

    assert_eq!(arbiter.snapshot(), before);
    assert_eq!(surface.paint_count(), paints);
}
