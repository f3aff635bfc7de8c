//! Integration tests driving sessions over mock connections and a virtual clock.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mock::{ConnectScript, MockConnector};
use reconnector::{
    ConnState, DisableReason, Message, ReconnectPolicy, Reconnector, SessionEvent,
    TransportError, CLOSE_ABNORMAL, CLOSE_FORBIDDEN, CLOSE_NORMAL,
};
use runtime_native::VirtualTimers;

const URL: &str = "wss://realtime.example/socket";

fn rig(fallback: ConnectScript) -> (VirtualTimers, Rc<MockConnector>, Reconnector) {
    let clock = VirtualTimers::new();
    let connector = Rc::new(MockConnector::with_fallback(fallback));
    let reconnector = Reconnector::new(connector.clone(), clock.shared());
    (clock, connector, reconnector)
}

fn record(handle: &reconnector::ReconnectHandle) -> Rc<RefCell<Vec<SessionEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    handle.subscribe(move |event| sink.borrow_mut().push(event.clone()));
    events
}

#[test]
fn open_send_and_receive() {
    let (_clock, connector, reconnector) = rig(ConnectScript::Open);
    let handle = reconnector.session(URL, ReconnectPolicy::default());
    let events = record(&handle);
    handle.start();

    assert_eq!(handle.state(), ConnState::Open);
    handle.send("hello").expect("open session sends");
    let conn = connector.last().expect("one connection");
    conn.receive("welcome");

    assert_eq!(conn.sent(), [Message::Text("hello".into())]);
    assert_eq!(
        *events.borrow(),
        [
            SessionEvent::Connecting { attempt: 0 },
            SessionEvent::Open,
            SessionEvent::Message(Message::Text("welcome".into())),
        ]
    );
}

#[test]
fn abnormal_closes_back_off_until_disabled() {
    let (clock, connector, reconnector) = rig(ConnectScript::CloseWith(CLOSE_ABNORMAL));
    let policy = ReconnectPolicy::default();
    let handle = reconnector.session(URL, policy.clone());
    let events = record(&handle);
    handle.start();

    let mut delays = Vec::new();
    while clock.fire_next() {
        assert!(handle.attempts() <= policy.max_attempts);
    }
    for event in events.borrow().iter() {
        if let SessionEvent::Reconnecting { delay, .. } = event {
            delays.push(*delay);
        }
    }

    assert_eq!(
        handle.state(),
        ConnState::Disabled(DisableReason::AttemptsExhausted { attempts: 5 })
    );
    assert_eq!(connector.connect_count(), 6);
    assert_eq!(
        delays,
        [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
    );
    assert_eq!(clock.now(), Duration::from_secs(31));
    assert_eq!(clock.pending(), 0);
}

#[test]
fn rejection_close_disables_immediately() {
    let (clock, connector, reconnector) = rig(ConnectScript::Pending);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    connector.last().expect("first connection").close_remote(CLOSE_ABNORMAL, "blip");
    clock.fire_next();
    assert_eq!(handle.attempts(), 1);

    connector.last().expect("second connection").close_remote(CLOSE_FORBIDDEN, "forbidden");

    assert_eq!(
        handle.state(),
        ConnState::Disabled(DisableReason::Rejected { code: CLOSE_FORBIDDEN })
    );
    assert!(!clock.fire_next());
    assert_eq!(connector.connect_count(), 2);
    assert_eq!(handle.send("late"), Err(TransportError::Disabled));
}

#[test]
fn open_resets_the_attempt_counter() {
    let (clock, connector, reconnector) = rig(ConnectScript::Pending);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    connector.last().expect("conn").close_remote(CLOSE_ABNORMAL, "");
    clock.fire_next();
    connector.last().expect("conn").close_remote(CLOSE_ABNORMAL, "");
    clock.fire_next();
    assert_eq!(handle.attempts(), 2);

    connector.last().expect("conn").open();
    assert_eq!(handle.state(), ConnState::Open);
    assert_eq!(handle.attempts(), 0);
}

#[test]
fn second_abnormal_close_while_pending_is_ignored() {
    let (clock, connector, reconnector) = rig(ConnectScript::Pending);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    let first = connector.last().expect("conn");
    first.close_remote(CLOSE_ABNORMAL, "");
    first.close_remote(CLOSE_ABNORMAL, "again");

    assert!(handle.reconnect_pending());
    assert_eq!(clock.pending(), 1);
    assert_eq!(handle.attempts(), 1);
    assert!(!first.is_current());
}

#[test]
fn close_cancels_the_pending_reconnect() {
    let (clock, connector, reconnector) = rig(ConnectScript::Pending);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    connector.last().expect("conn").close_remote(CLOSE_ABNORMAL, "");
    assert_eq!(clock.pending(), 1);

    handle.close();

    assert_eq!(handle.state(), ConnState::ClosedClean);
    assert_eq!(clock.pending(), 0);
    assert_eq!(handle.send("x"), Err(TransportError::Closed));
}

#[test]
fn clean_remote_close_discards_the_session() {
    let (clock, connector, reconnector) = rig(ConnectScript::Open);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    connector.last().expect("conn").close_remote(CLOSE_NORMAL, "bye");

    assert_eq!(handle.state(), ConnState::ClosedClean);
    assert!(!clock.fire_next());
    assert_eq!(connector.connect_count(), 1);
}

#[test]
fn refused_connect_counts_as_abnormal_close() {
    let (clock, connector, reconnector) = rig(ConnectScript::Refuse("dns".into()));
    let handle = reconnector.session(URL, ReconnectPolicy::default());
    let events = record(&handle);
    handle.start();

    assert!(matches!(handle.state(), ConnState::Reconnecting { .. }));
    assert!(events.borrow().iter().any(|event| matches!(
        event,
        SessionEvent::Closed { code: CLOSE_ABNORMAL, clean: false, .. }
    )));
    assert_eq!(clock.next_deadline(), Some(Duration::from_secs(1)));
    assert_eq!(connector.connections().len(), 0);
}

#[test]
fn stale_connection_events_are_dropped() {
    let (clock, connector, reconnector) = rig(ConnectScript::Pending);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    let stale = connector.last().expect("conn");
    stale.close_remote(CLOSE_ABNORMAL, "");
    clock.fire_next();

    stale.open();
    assert_eq!(handle.state(), ConnState::Connecting);

    connector.last().expect("fresh conn").open();
    assert_eq!(handle.state(), ConnState::Open);
}

#[test]
fn send_before_open_reports_phase() {
    let (_clock, _connector, reconnector) = rig(ConnectScript::Pending);
    let handle = reconnector.connect(URL, ReconnectPolicy::default());
    assert_eq!(handle.send("x"), Err(TransportError::NotOpen("connecting")));
}
