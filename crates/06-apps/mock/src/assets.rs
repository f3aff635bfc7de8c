use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use futures::future::{self, FutureExt};
use resilience_core::{sleep, SharedTimers};
use script_loader::{AssetHost, AttemptFuture, ElementId, LoadError};

/// How an inserted element for a given url behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Load,
    Fail(String),
    /// Never finishes; only the attempt deadline ends it.
    Hang,
    LoadAfter(Duration),
    FailAfter(Duration, String),
}

/// One host operation, in call order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostOp {
    Insert { element: ElementId, asset: String, url: String },
    Remove { element: ElementId },
    Stub { binding: String },
}

/// Page double for the script loader.
///
/// Urls without a configured outcome fail with a network error.
pub struct MockAssetHost {
    timers: SharedTimers,
    outcomes: RefCell<HashMap<String, Outcome>>,
    bind_on_load: RefCell<HashMap<String, String>>,
    bindings: Rc<RefCell<HashSet<String>>>,
    live: RefCell<HashSet<ElementId>>,
    ops: RefCell<Vec<HostOp>>,
    next_element: Cell<u64>,
}

impl MockAssetHost {
    pub fn new(timers: SharedTimers) -> Self {
        Self {
            timers,
            outcomes: RefCell::new(HashMap::new()),
            bind_on_load: RefCell::new(HashMap::new()),
            bindings: Rc::new(RefCell::new(HashSet::new())),
            live: RefCell::new(HashSet::new()),
            ops: RefCell::new(Vec::new()),
            next_element: Cell::new(1),
        }
    }

    pub fn set_outcome(&self, url: &str, outcome: Outcome) {
        self.outcomes.borrow_mut().insert(url.to_owned(), outcome);
    }

    /// Defines `binding` whenever an element of `asset` finishes loading.
    pub fn bind_on_load(&self, asset: &str, binding: &str) {
        self.bind_on_load
            .borrow_mut()
            .insert(asset.to_owned(), binding.to_owned());
    }

    /// Defines a global binding up front, as if the asset shipped with the page.
    pub fn define(&self, binding: &str) {
        self.bindings.borrow_mut().insert(binding.to_owned());
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.ops.borrow().clone()
    }

    /// Urls inserted so far, in order.
    pub fn inserted_urls(&self) -> Vec<String> {
        self.ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                HostOp::Insert { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn removed_count(&self) -> usize {
        self.ops
            .borrow()
            .iter()
            .filter(|op| matches!(op, HostOp::Remove { .. }))
            .count()
    }

    /// Elements inserted and not removed.
    pub fn live_elements(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn stubs(&self) -> Vec<String> {
        self.ops
            .borrow()
            .iter()
            .filter_map(|op| match op {
                HostOp::Stub { binding } => Some(binding.clone()),
                _ => None,
            })
            .collect()
    }
}

impl AssetHost for MockAssetHost {
    fn binding_present(&self, binding: &str) -> bool {
        self.bindings.borrow().contains(binding)
    }

    fn insert(&self, asset: &str, url: &str) -> Result<(ElementId, AttemptFuture), LoadError> {
        let element = ElementId(self.next_element.get());
        self.next_element.set(element.0 + 1);
        self.live.borrow_mut().insert(element);
        self.ops.borrow_mut().push(HostOp::Insert {
            element,
            asset: asset.to_owned(),
            url: url.to_owned(),
        });

        let outcome = self
            .outcomes
            .borrow()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Outcome::Fail(format!("no route to {url}")));
        let binding = self.bind_on_load.borrow().get(asset).cloned();
        let bindings = Rc::clone(&self.bindings);
        let define = move || {
            if let Some(binding) = binding {
                bindings.borrow_mut().insert(binding);
            }
        };

        let pending: AttemptFuture = match outcome {
            Outcome::Load => {
                define();
                future::ready(Ok(())).boxed_local()
            }
            Outcome::Fail(detail) => future::ready(Err(LoadError::network(detail))).boxed_local(),
            Outcome::Hang => future::pending().boxed_local(),
            Outcome::LoadAfter(delay) => {
                let delay = sleep(&self.timers, delay);
                async move {
                    delay.await;
                    define();
                    Ok(())
                }
                .boxed_local()
            }
            Outcome::FailAfter(delay, detail) => {
                let delay = sleep(&self.timers, delay);
                async move {
                    delay.await;
                    Err(LoadError::network(detail))
                }
                .boxed_local()
            }
        };
        Ok((element, pending))
    }

    fn remove(&self, element: ElementId) {
        self.live.borrow_mut().remove(&element);
        self.ops.borrow_mut().push(HostOp::Remove { element });
    }

    fn install_stub(&self, binding: &str) {
        self.bindings.borrow_mut().insert(binding.to_owned());
        self.ops.borrow_mut().push(HostOp::Stub {
            binding: binding.to_owned(),
        });
    }
}
