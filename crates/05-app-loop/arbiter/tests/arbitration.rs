//! Integration tests for lock ownership, promotion and degraded mode.

use std::cell::RefCell;
use std::rc::Rc;

use mock::MemorySurface;
use render_arbiter::{
    ArbiterConfig, ArbiterError, ArbiterEvent, DegradedRenderer, Refusal, RenderArbiter,
    RenderError, RootLease,
};

fn arbiter() -> (Rc<MemorySurface>, RenderArbiter) {
    let surface = Rc::new(MemorySurface::with_root());
    let arbiter = RenderArbiter::new(
        surface.clone(),
        DegradedRenderer::default(),
        ArbiterConfig::default(),
    );
    (surface, arbiter)
}

fn log_events(arbiter: &RenderArbiter) -> Rc<RefCell<Vec<ArbiterEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    arbiter.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
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

fn failing(_lease: RootLease) -> Result<(), RenderError> {
    Err(RenderError::failed("boom"))
}

#[test]
fn first_registration_activates_synchronously() {
    let (surface, arbiter) = arbiter();
    assert!(arbiter.register("spa", 10, |lease| {
        lease.paint("<main>spa</main>")?;
        Ok(())
    }));
    assert_eq!(arbiter.holder().as_deref(), Some("spa"));
    assert_eq!(surface.html(), "<main>spa</main>");
}

#[test]
fn better_ranked_holder_refuses_worse_registration() {
    let (_surface, arbiter) = arbiter();
    let events = log_events(&arbiter);
    arbiter.register("spa", 10, |_lease| Ok(()));

    assert!(!arbiter.register("lite", 20, |_lease| Ok(())));
    assert!(arbiter.snapshot().pending.is_empty());
    assert!(events.borrow().contains(&ArbiterEvent::Refused {
        name: "lite".into(),
        priority: 20,
        reason: Refusal::Outranked {
            holder: "spa".into(),
            priority: 10
        },
    }));

    // Equal or better priorities queue behind the holder.
    assert!(arbiter.register("spa-2", 10, |_lease| Ok(())));
    assert!(arbiter.register("urgent", 1, |_lease| Ok(())));
    assert_eq!(
        arbiter.snapshot().pending,
        [("urgent".to_owned(), 1), ("spa-2".to_owned(), 10)]
    );
}

#[test]
fn batch_promotes_best_first_then_falls_through_to_degraded() {
    let (surface, arbiter) = arbiter();
    let events = log_events(&arbiter);
    {
        let _batch = arbiter.batch();
        assert!(arbiter.register("twenty", 20, failing));
        assert!(arbiter.register("ten", 10, failing));
        assert!(arbiter.register("thirty", 30, failing));
        assert_eq!(arbiter.holder(), None);
    }

    assert_eq!(activations(&events.borrow()), ["ten", "twenty", "thirty"]);
    assert!(arbiter.is_degraded());
    assert!(surface.html().contains("role=\"alert\""));
    assert!(!arbiter.register("late", 0, |_lease| Ok(())));
}

#[test]
fn panicking_renderer_is_caught() {
    let (_surface, arbiter) = arbiter();
    let events = log_events(&arbiter);
    {
        let _batch = arbiter.batch();
        arbiter.register("broken", 1, |_lease| panic!("render exploded"));
        arbiter.register("backup", 2, |_lease| Ok(()));
    }

    assert_eq!(arbiter.holder().as_deref(), Some("backup"));
    assert!(events.borrow().contains(&ArbiterEvent::Failed {
        name: "broken".into(),
        error: RenderError::Panicked("render exploded".into()),
    }));
    assert_eq!(arbiter.snapshot().attempts, 1);
}

#[test]
fn failure_with_empty_queue_waits_for_the_next_registration() {
    let (surface, arbiter) = arbiter();
    assert!(arbiter.register("spa", 10, failing));
    let snapshot = arbiter.snapshot();
    assert!(!snapshot.degraded);
    assert_eq!(snapshot.holder, None);
    assert_eq!(snapshot.attempts, 1);

    // A strategy that becomes ready later still gets the root.
    assert!(arbiter.register("lite", 20, |lease| {
        lease.paint("<main>lite</main>")?;
        Ok(())
    }));
    assert_eq!(arbiter.holder().as_deref(), Some("lite"));
    assert_eq!(surface.html(), "<main>lite</main>");
}

#[test]
fn one_at_a_time_failures_reach_the_ceiling() {
    let (_surface, arbiter) = arbiter();
    assert!(arbiter.register("a", 1, failing));
    assert!(arbiter.register("b", 2, failing));
    assert!(!arbiter.is_degraded());
    assert!(arbiter.register("c", 3, failing));

    let snapshot = arbiter.snapshot();
    assert!(snapshot.degraded);
    assert_eq!(snapshot.attempts, snapshot.ceiling);
    assert!(!arbiter.register("d", 4, |_lease| Ok(())));
}

#[test]
fn stale_lease_cannot_paint() {
    let (surface, arbiter) = arbiter();
    let kept = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&kept);
    arbiter.register("first", 1, move |lease| {
        *slot.borrow_mut() = Some(lease);
        Ok(())
    });
    arbiter.register("second", 1, |lease| {
        lease.paint("second")?;
        Ok(())
    });
    let lease = kept.borrow_mut().take().expect("lease kept");
    assert!(lease.is_current());

    assert!(lease.release());
    assert!(!lease.is_current());
    assert_eq!(surface.html(), "second");
    assert_eq!(
        lease.paint("stale"),
        Err(ArbiterError::NotOwner {
            name: "first".into()
        })
    );
    assert!(!lease.release());
    assert_eq!(surface.html(), "second");
}

#[test]
fn late_failure_through_lease_promotes_next() {
    let (_surface, arbiter) = arbiter();
    let kept = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&kept);
    arbiter.register("async", 1, move |lease| {
        *slot.borrow_mut() = Some(lease);
        Ok(())
    });
    arbiter.register("fallback", 1, |_lease| Ok(()));

    let lease = kept.borrow_mut().take().expect("lease kept");
    lease.fail(RenderError::failed("chunk failed after mount"));

    assert_eq!(arbiter.holder().as_deref(), Some("fallback"));
    assert_eq!(arbiter.snapshot().attempts, 1);
}

#[test]
fn release_withdraws_a_queued_registration() {
    let (_surface, arbiter) = arbiter();
    arbiter.register("spa", 1, |_lease| Ok(()));
    arbiter.register("lite", 1, |_lease| Ok(()));

    assert!(arbiter.release("lite"));
    assert!(arbiter.snapshot().pending.is_empty());
    assert_eq!(arbiter.holder().as_deref(), Some("spa"));
    assert_eq!(arbiter.snapshot().attempts, 0);
    assert!(!arbiter.release("unknown"));
}

#[test]
fn degraded_request_is_deferred_while_a_renderer_holds_the_root() {
    let (_surface, arbiter) = arbiter();
    arbiter.register("spa", 1, |_lease| Ok(()));
    arbiter.register("lite", 1, |_lease| Ok(()));

    assert_eq!(
        arbiter.request_degraded("budget"),
        resilience_core::EscalationOutcome::Deferred
    );
    assert!(!arbiter.is_degraded());

    let events = log_events(&arbiter);
    assert!(!arbiter.register("late", 0, |_lease| Ok(())));
    assert_eq!(
        events.borrow().last(),
        Some(&ArbiterEvent::Refused {
            name: "late".into(),
            priority: 0,
            reason: Refusal::EscalationPending,
        })
    );
    assert_eq!(arbiter.snapshot().pending, [("lite".to_owned(), 1)]);

    arbiter.release("spa");
    assert!(arbiter.is_degraded());
    assert_eq!(arbiter.holder(), None);
    assert!(arbiter.snapshot().pending.is_empty());
    assert_eq!(
        arbiter.request_degraded("again"),
        resilience_core::EscalationOutcome::AlreadyDegraded
    );
}

#[test]
fn degraded_status_fires_once_and_creates_missing_root() {
    let surface = Rc::new(MemorySurface::new());
    let arbiter = RenderArbiter::new(
        surface.clone(),
        DegradedRenderer::default(),
        ArbiterConfig { attempt_ceiling: 1 },
    );
    let fired = Rc::new(RefCell::new(0));
    let count = Rc::clone(&fired);
    arbiter.on_degraded(move |_| *count.borrow_mut() += 1);

    arbiter.register("a", 1, failing);
    arbiter.request_degraded("again");

    assert_eq!(*fired.borrow(), 1);
    assert_eq!(surface.created(), 1);
    assert_eq!(surface.paint_count(), 1);
}
