//! Change notification for stores.
//!
//! Stores do not *become* emitters; each one owns a [`ChangeEmitter`] and
//! exposes subscribe/unsubscribe through its handle. The dispatch core never
//! looks at listeners. It only asks the emitter to notify after a handler
//! flagged a change.
//!
//! # Guarantees
//!
//! - **Synchronous**: listeners run inside the dispatch cycle, right after the
//!   store's handler returned
//! - **Subscription order**: listeners are called in the order they subscribed
//! - **Stable during notify**: subscribing or unsubscribing from inside a
//!   listener takes effect after the current notification round

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;

use uuid::Uuid;

/// Identifies one listener registered on a [`ChangeEmitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Listener<S> = Box<dyn FnMut(&S)>;

/// An observer list notified with a shared reference to the store state.
///
/// # Example
///
/// ```
/// use flux_dispatch::ChangeEmitter;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let emitter = ChangeEmitter::<u32>::new();
/// let seen = Rc::new(Cell::new(0));
///
/// let sink = seen.clone();
/// let id = emitter.subscribe(move |count| sink.set(*count));
///
/// emitter.notify(&7);
/// assert_eq!(seen.get(), 7);
///
/// assert!(emitter.unsubscribe(id));
/// emitter.notify(&9);
/// assert_eq!(seen.get(), 7);
/// ```
pub struct ChangeEmitter<S> {
    listeners: RefCell<Vec<(SubscriptionId, Listener<S>)>>,
    /// Ids of listeners detached for the current notify round.
    detached: RefCell<HashSet<SubscriptionId>>,
    /// Detached ids unsubscribed during the current notify round.
    removed: RefCell<HashSet<SubscriptionId>>,
}

impl<S> ChangeEmitter<S> {
    /// Create an emitter with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(Vec::new()),
            detached: RefCell::new(HashSet::new()),
            removed: RefCell::new(HashSet::new()),
        }
    }

    /// Register a listener, returning an id for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, listener: impl FnMut(&S) + 'static) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.listeners.borrow_mut().push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(pos) = listeners.iter().position(|(lid, _)| *lid == id) {
            listeners.remove(pos);
            return true;
        }
        drop(listeners);

        if self.detached.borrow().contains(&id) {
            return self.removed.borrow_mut().insert(id);
        }
        false
    }

    /// Call every listener with `state`.
    ///
    /// Returns the number of listeners called. If a listener panics, the
    /// subscription list is restored before the panic continues.
    pub fn notify(&self, state: &S) -> usize {
        // Detach the list so listeners may subscribe/unsubscribe re-entrantly.
        let active = std::mem::take(&mut *self.listeners.borrow_mut());
        let outer_round = self
            .detached
            .replace(active.iter().map(|(id, _)| *id).collect());
        let mut round = NotifyRound {
            emitter: self,
            active,
            outer_round,
        };

        let mut called = 0;
        for (id, listener) in round.active.iter_mut() {
            if self.removed.borrow().contains(id) {
                continue;
            }
            listener(state);
            called += 1;
        }
        called
    }

    /// Returns the number of subscribed listeners.
    pub fn subscriber_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl<S> Default for ChangeEmitter<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for ChangeEmitter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeEmitter")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// One notify round's detached listeners; reattached on drop.
struct NotifyRound<'e, S> {
    emitter: &'e ChangeEmitter<S>,
    active: Vec<(SubscriptionId, Listener<S>)>,
    outer_round: HashSet<SubscriptionId>,
}

impl<S> Drop for NotifyRound<'_, S> {
    fn drop(&mut self) {
        let emitter = self.emitter;
        emitter
            .detached
            .replace(std::mem::take(&mut self.outer_round));

        let mut active = std::mem::take(&mut self.active);
        let mut removed = emitter.removed.borrow_mut();
        active.retain(|(id, _)| !removed.remove(id));
        drop(removed);

        let mut slot = emitter.listeners.borrow_mut();
        let added = std::mem::replace(&mut *slot, active);
        slot.extend(added);
    }
}
