//! Platform-neutral one-shot timers.
//!
//! Browsers back these with `setTimeout`, tests with a virtual clock. Every
//! component that needs to wait (asset attempt deadlines, reconnect backoff)
//! goes through [`Timers`] so pending work can always be cancelled by id.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::channel::oneshot;

/// Callback run when a timer fires.
pub type Task = Box<dyn FnOnce()>;

/// Shared handle to the page's timer source.
pub type SharedTimers = Rc<dyn Timers>;

/// Identifier of a scheduled timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// One-shot timer scheduling.
pub trait Timers {
    /// Runs `task` once after `delay`.
    fn set_timeout(&self, delay: Duration, task: Task) -> TimerId;

    /// Cancels a pending timer. Returns `false` if it already fired or was unknown.
    fn clear_timeout(&self, id: TimerId) -> bool;
}

/// Future returned by [`sleep`].
///
/// Dropping it before completion clears the underlying timer.
pub struct Sleep {
    timers: SharedTimers,
    id: Option<TimerId>,
    rx: oneshot::Receiver<()>,
}

/// Completes after `delay` on the given timer source.
pub fn sleep(timers: &SharedTimers, delay: Duration) -> Sleep {
    let (tx, rx) = oneshot::channel();
    let id = timers.set_timeout(
        delay,
        Box::new(move || {
            let _ = tx.send(());
        }),
    );
    Sleep {
        timers: Rc::clone(timers),
        id: Some(id),
        rx,
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(_) => {
                // Fired, or the timer source dropped the task. Either way the wait is over.
                self.id = None;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.timers.clear_timeout(id);
        }
    }
}
