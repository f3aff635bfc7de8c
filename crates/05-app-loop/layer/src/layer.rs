use std::future::Future;
use std::rc::Rc;

use anyhow::{anyhow, Result};
use failure_monitor::{FailureMonitor, PageFault};
use log::{debug, info};
use reconnector::{
    Connector, DisableReason, ReconnectHandle, ReconnectPolicy, Reconnector, SessionEvent,
};
use render_arbiter::{
    ArbiterEvent, ArbitrationSnapshot, BatchGuard, DegradedActivated, DegradedRenderer,
    DisplaySurface, Priority, RenderArbiter, RenderError, RootLease,
};
use resilience_core::{FailureKind, SharedTimers, Signal, SubscriptionId};
use script_loader::{AssetHost, AssetSpec, LoadEvent, LoadResult, ScriptLoader};

use crate::config::ResilienceConfig;

/// The assembled layer: loader, reconnector, monitor and arbiter wired together.
///
/// * Loader exhaustion and renderer failures are counted by the monitor.
/// * Transport trouble is reported to the monitor, which only logs it.
/// * Budget exhaustion asks the arbiter for degraded mode.
#[derive(Clone)]
pub struct ResilienceLayer {
    inner: Rc<LayerInner>,
}

struct LayerInner {
    config: ResilienceConfig,
    loader: ScriptLoader,
    reconnector: Reconnector,
    monitor: FailureMonitor,
    arbiter: RenderArbiter,
}

impl ResilienceLayer {
    pub fn builder(config: ResilienceConfig) -> LayerBuilder {
        LayerBuilder::new(config)
    }

    pub fn config(&self) -> &ResilienceConfig {
        &self.inner.config
    }

    pub fn loader(&self) -> &ScriptLoader {
        &self.inner.loader
    }

    pub fn monitor(&self) -> &FailureMonitor {
        &self.inner.monitor
    }

    pub fn arbiter(&self) -> &RenderArbiter {
        &self.inner.arbiter
    }

    /// Loads every configured asset concurrently.
    pub fn load_assets(&self) -> impl Future<Output = Vec<LoadResult>> + 'static {
        self.inner.loader.load_all(&self.inner.config.asset_specs())
    }

    pub fn load(&self, spec: &AssetSpec) -> impl Future<Output = LoadResult> + 'static {
        self.inner.loader.load(spec)
    }

    /// Opens a reconnecting session using the configured policy.
    pub fn connect(&self, url: &str) -> ReconnectHandle {
        self.connect_with(url, self.inner.config.reconnect_policy())
    }

    pub fn connect_with(&self, url: &str, policy: ReconnectPolicy) -> ReconnectHandle {
        let handle = self.inner.reconnector.session(url, policy);
        let monitor = self.inner.monitor.clone();
        let origin = url.to_owned();
        handle.subscribe(move |event| {
            if let Some(signal) = transport_signal(&origin, event) {
                monitor.observe(signal);
            }
        });
        handle.start();
        handle
    }

    pub fn register(
        &self,
        name: impl Into<String>,
        priority: Priority,
        render: impl FnOnce(RootLease) -> Result<(), RenderError> + 'static,
    ) -> bool {
        self.inner.arbiter.register(name, priority, render)
    }

    pub fn release(&self, name: &str) -> bool {
        self.inner.arbiter.release(name)
    }

    pub fn batch(&self) -> BatchGuard {
        self.inner.arbiter.batch()
    }

    pub fn snapshot(&self) -> ArbitrationSnapshot {
        self.inner.arbiter.snapshot()
    }

    /// Explicit failure report from page code.
    pub fn report(&self, signal: Signal) {
        self.inner.monitor.observe(signal);
    }

    /// Uncaught page error or unhandled rejection.
    pub fn report_fault(&self, fault: &PageFault) {
        self.inner.monitor.observe_fault(fault);
    }

    pub fn should_escalate(&self) -> bool {
        self.inner.monitor.should_escalate()
    }

    pub fn is_degraded(&self) -> bool {
        self.inner.arbiter.is_degraded()
    }

    pub fn on_degraded(&self, listener: impl Fn(&DegradedActivated) + 'static) -> SubscriptionId {
        self.inner.arbiter.on_degraded(listener)
    }
}

fn transport_signal(url: &str, event: &SessionEvent) -> Option<Signal> {
    match event {
        SessionEvent::Closed {
            code,
            reason,
            clean: false,
        } => Some(Signal::new(
            FailureKind::TransportAbnormalClose,
            url.to_owned(),
            format!("code {code}: {reason}"),
        )),
        SessionEvent::Disabled(DisableReason::Rejected { code }) => Some(Signal::new(
            FailureKind::TransportRejected,
            url.to_owned(),
            format!("rejected with code {code}"),
        )),
        _ => None,
    }
}

fn wire(loader: &ScriptLoader, arbiter: &RenderArbiter, monitor: &FailureMonitor) {
    let counted = monitor.clone();
    loader.subscribe(move |event| match event {
        LoadEvent::Exhausted { asset, attempts } => counted.observe(Signal::new(
            FailureKind::AssetExhausted,
            asset.clone(),
            format!("{attempts} candidates failed"),
        )),
        LoadEvent::AttemptFailed {
            asset, kind, detail, ..
        } => debug!("asset {asset}: {kind} ({detail}); trying next candidate"),
        LoadEvent::Loaded { .. } => {}
    });

    // The monitor already holds the arbiter; keep the reverse edge weak.
    let weak = monitor.downgrade();
    arbiter.subscribe(move |event| {
        if let ArbiterEvent::Failed { name, error } = event {
            if let Some(monitor) = weak.upgrade() {
                monitor.observe(Signal::new(
                    FailureKind::RendererException,
                    name.clone(),
                    error.to_string(),
                ));
            }
        }
    });
}

/// Assembles a [`ResilienceLayer`] from platform adapters.
pub struct LayerBuilder {
    config: ResilienceConfig,
    timers: Option<SharedTimers>,
    connector: Option<Rc<dyn Connector>>,
    asset_host: Option<Rc<dyn AssetHost>>,
    surface: Option<Rc<dyn DisplaySurface>>,
}

impl LayerBuilder {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            config,
            timers: None,
            connector: None,
            asset_host: None,
            surface: None,
        }
    }

    pub fn timers(mut self, timers: SharedTimers) -> Self {
        self.timers = Some(timers);
        self
    }

    pub fn connector(mut self, connector: Rc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn asset_host(mut self, host: Rc<dyn AssetHost>) -> Self {
        self.asset_host = Some(host);
        self
    }

    pub fn surface(mut self, surface: Rc<dyn DisplaySurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Validates the configuration and wires the components together.
    pub fn build(self) -> Result<ResilienceLayer> {
        self.config.validate()?;
        let timers = self.timers.ok_or_else(|| anyhow!("missing timers"))?;
        let connector = self
            .connector
            .ok_or_else(|| anyhow!("missing transport connector"))?;
        let asset_host = self
            .asset_host
            .ok_or_else(|| anyhow!("missing asset host"))?;
        let surface = self
            .surface
            .ok_or_else(|| anyhow!("missing display surface"))?;

        let loader =
            ScriptLoader::with_timeout(asset_host, Rc::clone(&timers), self.config.asset_timeout());
        let reconnector = Reconnector::new(connector, timers);
        let arbiter = RenderArbiter::new(
            surface,
            DegradedRenderer::new(&self.config.degraded_content()),
            self.config.arbiter_config(),
        );
        let monitor = FailureMonitor::new(
            self.config.error_budget_threshold,
            Rc::new(arbiter.clone()),
        );
        wire(&loader, &arbiter, &monitor);
        info!(
            "resilience layer ready (budget {}, ceiling {}, {} assets)",
            self.config.error_budget_threshold,
            self.config.render_attempt_ceiling,
            self.config.assets.len()
        );

        Ok(ResilienceLayer {
            inner: Rc::new(LayerInner {
                config: self.config,
                loader,
                reconnector,
                monitor,
                arbiter,
            }),
        })
    }
}
