use std::rc::Rc;
use std::time::Duration;

use anyhow::Result;
use mock::{ConnectScript, MemorySurface, MockAssetHost, MockConnector, Outcome};
use resilience_layer::{
    ArbiterEvent, ConnState, LoadSource, PageFault, RenderError, ResilienceConfig,
    ResilienceLayer, SessionEvent,
};
use runtime_native::{EventLog, LocalDriver};

const CONFIG: &str = r#"{
    "maxAttempts": 3,
    "baseDelayMs": 500,
    "capDelayMs": 4000,
    "errorBudgetThreshold": 3,
    "renderAttemptCeiling": 3,
    "assetTimeoutMs": 1000,
    "rootId": "app",
    "assets": [
        {"name": "payments", "sources": ["https://cdn-a/pay.js", "https://cdn-b/pay.js"], "binding": "Pay"},
        {"name": "widgets", "sources": ["https://cdn-a/w.js"], "binding": "Widgets"}
    ],
    "degraded": {
        "title": "We'll be right back",
        "contacts": [{"label": "Phone", "value": "+1 555 0100", "href": "tel:+15550100"}]
    }
}"#;

#[test]
fn a_bad_day_ends_in_a_single_degraded_page() -> Result<()> {
    let mut driver = LocalDriver::new();
    let clock = driver.timers().clone();
    let connector = Rc::new(MockConnector::with_fallback(ConnectScript::Open));
    let host = Rc::new(MockAssetHost::new(driver.shared_timers()));
    let surface = Rc::new(MemorySurface::new());
    let layer = ResilienceLayer::builder(ResilienceConfig::from_json(CONFIG)?)
        .timers(driver.shared_timers())
        .connector(connector.clone())
        .asset_host(host.clone())
        .surface(surface.clone())
        .build()?;

    let arbiter_log = EventLog::new(&clock);
    let sink = arbiter_log.clone();
    layer.arbiter().subscribe(move |event| sink.record(event.clone()));
    let session_log = EventLog::new(&clock);
    let sink = session_log.clone();

    // Bootstrap: the app strategy paints and keeps the root.
    {
        let _batch = layer.batch();
        layer.register("spa", 10, |lease| {
            lease.paint("<main>spa</main>")?;
            Ok(())
        });
        layer.register("lite", 10, |lease| {
            lease.paint("<main>lite</main>")?;
            Ok(())
        });
    }
    assert_eq!(surface.html(), "<main>spa</main>");

    // Realtime connection flaps; transport trouble never reaches the budget.
    let socket = layer.connect("wss://rt.example/live");
    socket.subscribe(move |event| sink.record(event.clone()));
    assert_eq!(socket.state(), ConnState::Open);
    connector.set_fallback(ConnectScript::CloseWith(1006));
    connector.last().expect("socket").close_remote(1006, "network blip");
    driver.advance(Duration::from_secs(60));
    assert!(socket.is_disabled());
    assert_eq!(layer.monitor().count(), 0);

    // One asset falls back, one is stubbed.
    host.set_outcome("https://cdn-a/pay.js", Outcome::Hang);
    host.set_outcome("https://cdn-b/pay.js", Outcome::LoadAfter(Duration::from_millis(100)));
    let results = driver.block_on(layer.load_assets()).expect("assets settle");
    assert!(matches!(results[0].source, LoadSource::Candidate { index: 1, .. }));
    assert_eq!(results[1].source, LoadSource::Stub);
    assert_eq!(layer.monitor().count(), 1);

    // The app crashes; the lite strategy takes over.
    layer.report_fault(&PageFault::error("TypeError: cannot read 'x'"));
    assert!(!layer.should_escalate());
    assert!(layer.arbiter().holder().is_some());
    assert!(layer.release("spa"));
    assert_eq!(surface.html(), "<main>lite</main>");

    // Third counted failure: the budget trips, lite still holds the root.
    layer.report_fault(&PageFault::rejection("Unexpected token <"));
    assert!(layer.should_escalate());
    assert!(!layer.is_degraded());

    // Lite gives up; degraded mode takes over for good.
    if let Some(name) = layer.arbiter().holder() {
        layer.arbiter().release(&name);
    }
    assert!(layer.is_degraded());
    assert!(surface.html().contains("We&#39;ll be right back"));
    assert!(surface.html().contains("tel:+15550100"));
    assert!(!layer.register("retry", 0, |_lease| Ok(())));

    let events = arbiter_log.events();
    let degraded_at = events
        .iter()
        .position(|event| matches!(event, ArbiterEvent::DegradedActivated { .. }))
        .expect("degraded activation logged");
    assert!(events[degraded_at + 1..]
        .iter()
        .all(|event| !matches!(event, ArbiterEvent::Activated { .. })));
    assert_eq!(
        events
            .iter()
            .filter(|event| matches!(event, ArbiterEvent::DegradedActivated { .. }))
            .count(),
        1
    );

    let reconnects = session_log
        .events()
        .into_iter()
        .filter(|event| matches!(event, SessionEvent::Reconnecting { .. }))
        .count();
    assert_eq!(reconnects, 3);
    Ok(())
}

#[test]
fn renderer_exceptions_share_the_budget_with_page_faults() -> Result<()> {
    let driver = LocalDriver::new();
    let surface = Rc::new(MemorySurface::with_root());
    let layer = ResilienceLayer::builder(ResilienceConfig {
        error_budget_threshold: 2,
        render_attempt_ceiling: 10,
        ..ResilienceConfig::default()
    })
    .timers(driver.shared_timers())
    .connector(Rc::new(MockConnector::new()))
    .asset_host(Rc::new(MockAssetHost::new(driver.shared_timers())))
    .surface(surface.clone())
    .build()?;

    {
        let _batch = layer.batch();
        layer.register("a", 1, |_lease| Err(RenderError::failed("a")));
        layer.register("b", 2, |_lease| Ok(()));
        layer.register("c", 3, |_lease| Ok(()));
    }
    assert_eq!(layer.arbiter().holder().as_deref(), Some("b"));

    layer.report_fault(&PageFault::error("boom"));
    assert!(layer.should_escalate());
    assert!(layer.snapshot().escalation_pending);

    // Escalation pre-empts `c` even though it is still queued.
    layer.release("b");
    assert!(layer.is_degraded());
    assert!(layer.snapshot().pending.is_empty());
    Ok(())
}
