//! Single-threaded publish/subscribe.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

type Listener<E> = Rc<dyn Fn(&E)>;

struct BusInner<E> {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener<E>)>,
}

/// Fan-out of events to any number of listeners.
///
/// Emission works on a snapshot of the listener list, so listeners may
/// subscribe, unsubscribe or emit again from inside a callback.
pub struct EventBus<E> {
    inner: Rc<RefCell<BusInner<E>>>,
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }
}

impl<E> EventBus<E> {
    /// Creates a bus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for every subsequent event.
    pub fn subscribe(&self, listener: impl Fn(&E) + 'static) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.listeners.len();
        inner.listeners.retain(|(sub, _)| *sub != id);
        inner.listeners.len() != before
    }

    /// Delivers `event` to every listener registered at the time of the call.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = self
            .inner
            .borrow()
            .listeners
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        trace!("emitting to {} listener(s)", snapshot.len());
        for listener in snapshot {
            listener(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn listeners_receive_events_in_subscription_order() {
        let bus = EventBus::<u32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b"] {
            let seen = Rc::clone(&seen);
            bus.subscribe(move |ev: &u32| seen.borrow_mut().push(format!("{tag}{ev}")));
        }
        bus.emit(&1);
        bus.emit(&2);
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn unsubscribe_from_inside_callback() {
        let bus = EventBus::<()>::new();
        let hits = Rc::new(Cell::new(0));
        let slot: Rc<Cell<Option<SubscriptionId>>> = Rc::new(Cell::new(None));

        let id = {
            let bus = bus.clone();
            let hits = Rc::clone(&hits);
            let slot = Rc::clone(&slot);
            bus.clone().subscribe(move |_| {
                hits.set(hits.get() + 1);
                if let Some(id) = slot.get() {
                    bus.unsubscribe(id);
                }
            })
        };
        slot.set(Some(id));

        bus.emit(&());
        bus.emit(&());
        assert_eq!(hits.get(), 1);
        assert!(!bus.unsubscribe(id));
    }
}
