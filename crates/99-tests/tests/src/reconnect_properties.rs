use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mock::{ConnectScript, MockConnector};
use proptest::prelude::*;
use reconnector::{
    ConnState, DisableReason, ReconnectPolicy, Reconnector, SessionEvent, CLOSE_ABNORMAL,
    CLOSE_FORBIDDEN, CLOSE_POLICY_VIOLATION,
};
use runtime_native::VirtualTimers;

const URL: &str = "wss://rt.example/live";

fn policy() -> impl Strategy<Value = ReconnectPolicy> {
    (0u32..9, 10u64..2_000, 1.0f64..3.5, 1u32..40).prop_map(
        |(max_attempts, base_ms, backoff_factor, cap_factor)| {
            let base_delay = Duration::from_millis(base_ms);
            ReconnectPolicy {
                max_attempts,
                base_delay,
                backoff_factor,
                cap_delay: base_delay * cap_factor,
                ..ReconnectPolicy::default()
            }
        },
    )
}

proptest! {
    /// Abnormal closes back off monotonically, never past the cap, and stop at the attempt limit.
    #[test]
    fn attempts_are_bounded_and_backoff_is_monotonic_and_capped(policy in policy()) {
        let clock = VirtualTimers::new();
        let connector = Rc::new(MockConnector::with_fallback(ConnectScript::CloseWith(
            CLOSE_ABNORMAL,
        )));
        let reconnector = Reconnector::new(connector.clone(), clock.shared());
        let handle = reconnector.session(URL, policy.clone());
        let delays = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delays);
        handle.subscribe(move |event| {
            if let SessionEvent::Reconnecting { delay, .. } = event {
                sink.borrow_mut().push(*delay);
            }
        });

        handle.start();
        while clock.fire_next() {
            prop_assert!(handle.attempts() <= policy.max_attempts);
        }

        prop_assert_eq!(
            handle.state(),
            ConnState::Disabled(DisableReason::AttemptsExhausted {
                attempts: policy.max_attempts
            })
        );
        prop_assert_eq!(connector.connect_count(), policy.max_attempts as usize + 1);
        let delays = delays.borrow();
        prop_assert_eq!(delays.len(), policy.max_attempts as usize);
        prop_assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]), "{:?}", delays);
        prop_assert!(delays.iter().all(|delay| *delay <= policy.cap_delay));
    }

    /// A rejection-class close disables the session whatever attempt it lands on.
    #[test]
    fn rejection_at_any_attempt_disables_without_further_reconnects(
        code in prop_oneof![Just(CLOSE_POLICY_VIOLATION), Just(CLOSE_FORBIDDEN)],
        k in 0..=ReconnectPolicy::default().max_attempts,
    ) {
        let clock = VirtualTimers::new();
        let connector = Rc::new(MockConnector::new());
        let reconnector = Reconnector::new(connector.clone(), clock.shared());
        let handle = reconnector.connect(URL, ReconnectPolicy::default());

        for _ in 0..k {
            connector.last().expect("live connection").close_remote(CLOSE_ABNORMAL, "");
            if handle.is_disabled() {
                return Ok(());
            }
            prop_assert!(clock.fire_next());
        }
        let connects = connector.connect_count();
        connector.last().expect("live connection").close_remote(code, "rejected");

        prop_assert_eq!(
            handle.state(),
            ConnState::Disabled(DisableReason::Rejected { code })
        );
        prop_assert_eq!(clock.pending(), 0);
        prop_assert!(!clock.fire_next());
        prop_assert_eq!(connector.connect_count(), connects);
    }
}

#[test]
fn rejection_while_a_reconnect_is_pending_cancels_it() {
    let clock = VirtualTimers::new();
    let connector = Rc::new(MockConnector::new());
    let reconnector = Reconnector::new(connector.clone(), clock.shared());
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    let conn = connector.last().expect("connection");
    conn.close_remote(CLOSE_ABNORMAL, "");
    assert_eq!(clock.pending(), 1);

    // A late rejection from the dropped connection is stale and ignored.
    conn.close_remote(CLOSE_FORBIDDEN, "");
    assert!(handle.reconnect_pending());

    assert!(clock.fire_next());
    connector.last().expect("second").close_remote(CLOSE_FORBIDDEN, "");
    assert!(handle.is_disabled());
    assert_eq!(clock.pending(), 0);
}
