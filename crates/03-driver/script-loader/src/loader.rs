use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};
use log::{debug, info, warn};
use resilience_core::{sleep, EventBus, FailureKind, SharedTimers, SubscriptionId};

use crate::error::LoadError;
use crate::host::{AssetHost, ElementId};
use crate::spec::AssetSpec;

/// Deadline applied to each candidate unless the asset sets its own.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Where a settled asset came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadSource {
    /// Already present before any element was inserted.
    Preexisting,
    /// Loaded from the candidate at `index`.
    Candidate { index: usize, url: String },
    /// Every candidate failed; a no-op stub now stands in for the binding.
    Stub,
    /// Every candidate failed and there was no binding to stub.
    Unavailable,
}

impl LoadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadSource::Preexisting => "preexisting",
            LoadSource::Candidate { .. } => "candidate",
            LoadSource::Stub => "stub",
            LoadSource::Unavailable => "unavailable",
        }
    }
}

/// One failed candidate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttemptRecord {
    pub index: usize,
    pub url: String,
    pub error: LoadError,
}

/// Terminal result of one `load` invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadResult {
    pub asset: String,
    pub success: bool,
    pub source: LoadSource,
    /// Failed candidates, in the order they were tried.
    pub failures: Vec<AttemptRecord>,
}

impl LoadResult {
    fn preexisting(asset: &str) -> Self {
        Self {
            asset: asset.to_owned(),
            success: true,
            source: LoadSource::Preexisting,
            failures: Vec::new(),
        }
    }

    fn abandoned(asset: &str) -> Self {
        Self {
            asset: asset.to_owned(),
            success: false,
            source: LoadSource::Unavailable,
            failures: Vec::new(),
        }
    }
}

/// Observable loader progress.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadEvent {
    AttemptFailed {
        asset: String,
        index: usize,
        url: String,
        kind: FailureKind,
        detail: String,
    },
    Loaded {
        asset: String,
        source: LoadSource,
    },
    Exhausted {
        asset: String,
        attempts: usize,
    },
}

/// Candidate currently being tried.
#[derive(Clone, Debug)]
struct LoadAttempt<'a> {
    index: usize,
    url: &'a str,
    timeout: Duration,
}

struct LoaderInner {
    host: Rc<dyn AssetHost>,
    timers: SharedTimers,
    default_timeout: Duration,
    events: EventBus<LoadEvent>,
    settled: RefCell<HashMap<String, LoadResult>>,
    in_flight: RefCell<HashSet<String>>,
    waiters: RefCell<HashMap<String, Vec<oneshot::Sender<LoadResult>>>>,
    stubbed: RefCell<HashSet<String>>,
}

/// Resilient loader of external code assets.
///
/// `load` never fails: every path resolves with a [`LoadResult`].
#[derive(Clone)]
pub struct ScriptLoader {
    inner: Rc<LoaderInner>,
}

impl ScriptLoader {
    pub fn new(host: Rc<dyn AssetHost>, timers: SharedTimers) -> Self {
        Self::with_timeout(host, timers, DEFAULT_ATTEMPT_TIMEOUT)
    }

    pub fn with_timeout(
        host: Rc<dyn AssetHost>,
        timers: SharedTimers,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Rc::new(LoaderInner {
                host,
                timers,
                default_timeout,
                events: EventBus::new(),
                settled: RefCell::new(HashMap::new()),
                in_flight: RefCell::new(HashSet::new()),
                waiters: RefCell::new(HashMap::new()),
                stubbed: RefCell::new(HashSet::new()),
            }),
        }
    }

    pub fn subscribe(&self, listener: impl Fn(&LoadEvent) + 'static) -> SubscriptionId {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Loads `spec`, falling back through its candidates and finally to a stub.
    ///
    /// A call for an asset whose load is already running waits for that load
    /// instead of inserting a second element.
    pub fn load(&self, spec: &AssetSpec) -> impl Future<Output = LoadResult> + 'static {
        let inner = Rc::clone(&self.inner);
        let spec = spec.clone();
        async move { LoaderInner::run(inner, spec).await }
    }

    /// Loads independent assets concurrently; results follow input order.
    pub fn load_all(&self, specs: &[AssetSpec]) -> impl Future<Output = Vec<LoadResult>> + 'static {
        let loads: Vec<_> = specs.iter().map(|spec| self.load(spec)).collect();
        future::join_all(loads)
    }

    /// Resolves with the asset's result once it settles.
    ///
    /// Resolves immediately when the asset already settled. A load cancelled
    /// midway resolves waiters with an `Unavailable` result. Yields `None` only
    /// if the loader is dropped first.
    pub fn settled(&self, asset: &str) -> impl Future<Output = Option<LoadResult>> + 'static {
        let ready = self.inner.settled.borrow().get(asset).cloned();
        let rx = match ready {
            Some(_) => None,
            None => Some(self.inner.wait_for(asset)),
        };
        async move {
            match (ready, rx) {
                (Some(result), _) => Some(result),
                (None, Some(rx)) => rx.await.ok(),
                (None, None) => None,
            }
        }
    }

    /// Last settled result for `asset`.
    pub fn result(&self, asset: &str) -> Option<LoadResult> {
        self.inner.settled.borrow().get(asset).cloned()
    }

    pub fn is_in_flight(&self, asset: &str) -> bool {
        self.inner.in_flight.borrow().contains(asset)
    }
}

impl LoaderInner {
    fn wait_for(&self, asset: &str) -> oneshot::Receiver<LoadResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .borrow_mut()
            .entry(asset.to_owned())
            .or_default()
            .push(tx);
        rx
    }

    async fn run(inner: Rc<Self>, spec: AssetSpec) -> LoadResult {
        let stubbed = inner.stubbed.borrow().contains(&spec.name);
        if !stubbed && spec.is_loaded(inner.host.as_ref()) {
            debug!("asset {} already present", spec.name);
            let result = LoadResult::preexisting(&spec.name);
            inner.settle(&result);
            return result;
        }

        if inner.in_flight.borrow().contains(&spec.name) {
            debug!("asset {} already loading; joining", spec.name);
            let rx = inner.wait_for(&spec.name);
            return rx
                .await
                .unwrap_or_else(|_| LoadResult::abandoned(&spec.name));
        }
        let claim = InFlight::claim(&inner, &spec.name);

        let timeout = spec.timeout.unwrap_or(inner.default_timeout);
        let mut failures = Vec::new();
        let mut loaded = None;

        for (index, url) in spec.sources.iter().enumerate() {
            let attempt = LoadAttempt {
                index,
                url,
                timeout,
            };
            match inner.try_candidate(&spec.name, &attempt, &claim.element).await {
                Ok(()) => {
                    loaded = Some(LoadSource::Candidate {
                        index,
                        url: url.clone(),
                    });
                    break;
                }
                Err(error) => {
                    debug!("asset {} candidate {index} ({url}) failed: {error}", spec.name);
                    inner.events.emit(&LoadEvent::AttemptFailed {
                        asset: spec.name.clone(),
                        index,
                        url: url.clone(),
                        kind: error.kind(),
                        detail: error.to_string(),
                    });
                    failures.push(AttemptRecord {
                        index,
                        url: url.clone(),
                        error,
                    });
                }
            }
        }

        let result = match loaded {
            Some(source) => {
                inner.stubbed.borrow_mut().remove(&spec.name);
                info!("asset {} loaded ({} failed candidates)", spec.name, failures.len());
                inner.events.emit(&LoadEvent::Loaded {
                    asset: spec.name.clone(),
                    source: source.clone(),
                });
                LoadResult {
                    asset: spec.name.clone(),
                    success: true,
                    source,
                    failures,
                }
            }
            None => {
                let source = match spec.binding() {
                    Some(binding) => {
                        inner.host.install_stub(binding);
                        inner.stubbed.borrow_mut().insert(spec.name.clone());
                        LoadSource::Stub
                    }
                    None => LoadSource::Unavailable,
                };
                warn!(
                    "asset {} exhausted {} candidates; {}",
                    spec.name,
                    failures.len(),
                    source.as_str()
                );
                inner.events.emit(&LoadEvent::Exhausted {
                    asset: spec.name.clone(),
                    attempts: failures.len(),
                });
                LoadResult {
                    asset: spec.name.clone(),
                    success: false,
                    source,
                    failures,
                }
            }
        };

        claim.finish(&result);
        result
    }

    /// Inserts one element and races it against the attempt deadline.
    ///
    /// The element is removed before returning on any failure. While the race
    /// runs it is parked in `live` so an abandoned load can remove it.
    async fn try_candidate(
        &self,
        asset: &str,
        attempt: &LoadAttempt<'_>,
        live: &Cell<Option<ElementId>>,
    ) -> Result<(), LoadError> {
        debug!("asset {asset}: trying candidate {} ({})", attempt.index, attempt.url);
        let (element, pending) = self.host.insert(asset, attempt.url)?;
        live.set(Some(element));
        let deadline = sleep(&self.timers, attempt.timeout);
        let outcome = match future::select(pending, deadline).await {
            Either::Left((outcome, _deadline)) => outcome,
            Either::Right(((), _pending)) => Err(LoadError::Timeout(attempt.timeout)),
        };
        live.set(None);
        if outcome.is_err() {
            self.host.remove(element);
        }
        outcome
    }

    fn settle(&self, result: &LoadResult) {
        self.settled
            .borrow_mut()
            .insert(result.asset.clone(), result.clone());
        let waiters = self.waiters.borrow_mut().remove(&result.asset);
        for tx in waiters.into_iter().flatten() {
            let _ = tx.send(result.clone());
        }
    }
}

/// An asset's in-flight slot, held for the duration of one attempt chain.
///
/// Dropped without [`InFlight::finish`] (the load future was cancelled), it
/// removes the element still racing, frees the slot and resolves joined
/// callers with an abandoned result.
struct InFlight {
    inner: Rc<LoaderInner>,
    asset: String,
    element: Cell<Option<ElementId>>,
    finished: bool,
}

impl InFlight {
    fn claim(inner: &Rc<LoaderInner>, asset: &str) -> Self {
        inner.in_flight.borrow_mut().insert(asset.to_owned());
        Self {
            inner: Rc::clone(inner),
            asset: asset.to_owned(),
            element: Cell::new(None),
            finished: false,
        }
    }

    fn finish(mut self, result: &LoadResult) {
        self.finished = true;
        self.inner.in_flight.borrow_mut().remove(&self.asset);
        self.inner.settle(result);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        warn!("load of asset {} abandoned mid-attempt", self.asset);
        if let Some(element) = self.element.take() {
            self.inner.host.remove(element);
        }
        self.inner.in_flight.borrow_mut().remove(&self.asset);
        let waiters = self.inner.waiters.borrow_mut().remove(&self.asset);
        for tx in waiters.into_iter().flatten() {
            let _ = tx.send(LoadResult::abandoned(&self.asset));
        }
    }
}
