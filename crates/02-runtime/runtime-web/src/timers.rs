use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::{self, Either};
use gloo_timers::future::TimeoutFuture;
use resilience_core::{SharedTimers, Task, TimerId, Timers};
use wasm_bindgen_futures::spawn_local;

/// [`Timers`] on top of the browser's `setTimeout`.
///
/// Each timer is a local task racing a [`TimeoutFuture`] against a cancel
/// channel; clearing a timer drops its sender.
#[derive(Default)]
pub struct BrowserTimers {
    next_id: Cell<u64>,
    armed: Rc<RefCell<HashMap<TimerId, oneshot::Sender<()>>>>,
}

impl BrowserTimers {
    /// Creates an empty timer table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a fresh instance as [`SharedTimers`].
    pub fn shared() -> SharedTimers {
        Rc::new(Self::new())
    }
}

impl Timers for BrowserTimers {
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        self.armed.borrow_mut().insert(id, cancel_tx);

        let armed = Rc::clone(&self.armed);
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        spawn_local(async move {
            if let Either::Left(_) = future::select(TimeoutFuture::new(millis), cancel_rx).await {
                let still_armed = armed.borrow_mut().remove(&id).is_some();
                if still_armed {
                    task();
                }
            }
        });
        id
    }

    fn clear_timeout(&self, id: TimerId) -> bool {
        self.armed.borrow_mut().remove(&id).is_some()
    }
}
