//! The public entry point: register stores, dispatch actions.
//!
//! The `Dispatcher` is responsible for:
//! 1. Owning the store registry
//! 2. Admitting one action at a time
//! 3. Running a fresh `DispatchCycle` per action
//! 4. Holding deferred follow-up actions until the caller drains them

use std::cell::RefCell;
use std::fmt;

use tracing::{debug, debug_span, info};
use uuid::Uuid;

use crate::action::Action;
use crate::cycle::DispatchCycle;
use crate::error::{DispatchError, Result};
use crate::queue::ActionQueue;
use crate::registry::StoreRegistry;
use crate::report::DispatchReport;
use crate::store::{Store, StoreHandle};

/// Broadcasts actions to registered stores, one action at a time.
///
/// Each dispatcher owns its own registry and dispatch flag; there is no
/// global instance. The dispatcher is single-threaded (`!Send`): handlers run
/// inline on the caller's stack.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new();
///
/// let todos = dispatcher.register("todos", todo_store())?;
/// dispatcher.register("notifications", notification_store())?;
///
/// let report = dispatcher.dispatch(Action::new("ADD_TODO", json!({ "text": "x" })))?;
/// assert_eq!(todos.state()?.items.len(), 1);
/// ```
pub struct Dispatcher<P = serde_json::Value> {
    registry: RefCell<StoreRegistry<P>>,
    queue: ActionQueue<P>,
}

impl<P: 'static> Dispatcher<P> {
    /// Create a dispatcher with no stores.
    pub fn new() -> Self {
        Self {
            registry: RefCell::new(StoreRegistry::new()),
            queue: ActionQueue::new(),
        }
    }

    /// Register a store under a unique name.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::DuplicateName`] if the name is taken
    /// - [`DispatchError::RegistrationDuringDispatch`] if called from inside a
    ///   dispatch cycle
    pub fn register<S: 'static>(
        &self,
        name: impl Into<String>,
        store: Store<S, P>,
    ) -> Result<StoreHandle<S, P>> {
        let name = name.into();
        if self.queue.is_dispatching() {
            return Err(DispatchError::RegistrationDuringDispatch { name });
        }
        match self.registry.try_borrow_mut() {
            Ok(mut registry) => registry.register(name, store),
            Err(_) => Err(DispatchError::RegistrationDuringDispatch { name }),
        }
    }

    /// Dispatch one action to every registered store.
    ///
    /// Runs each store's handler for the action at most once, in registration
    /// order except where `wait_for` pulls a dependency forward. Returns when
    /// every store has handled the action.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::ReentrantDispatch`] if another dispatch is running
    ///   (for example, a handler calling `dispatch` on this dispatcher)
    /// - any error raised during the cycle; the cycle stops at the first one,
    ///   stores that already ran keep their changes, and the dispatcher is idle
    ///   again afterwards
    pub fn dispatch(&self, action: Action<P>) -> Result<DispatchReport> {
        let _admission = self.queue.admit(action.action_type())?;
        let registry = self.registry.borrow();

        let cycle_id = Uuid::new_v4();
        let span = debug_span!(
            "dispatch",
            action_type = %action.action_type(),
            %cycle_id
        );
        let _enter = span.enter();

        let report = DispatchCycle::new(&registry, &action).run(cycle_id)?;
        debug!(
            handled = report.handled_by.len(),
            stores = report.completion_order.len(),
            "dispatch complete"
        );
        if report.was_unhandled() && !registry.is_empty() {
            info!(action_type = %action.action_type(), "no store handled action");
        }

        Ok(report)
    }

    /// Returns true while a dispatch cycle is running.
    pub fn is_dispatching(&self) -> bool {
        self.queue.is_dispatching()
    }

    /// Queue a follow-up action.
    ///
    /// Safe to call from inside a handler. Nothing runs until
    /// [`drain_deferred`](Self::drain_deferred) is called after the current
    /// dispatch returns.
    pub fn defer(&self, action: Action<P>) {
        self.queue.defer(action);
    }

    /// Number of deferred actions waiting to be dispatched.
    pub fn pending_deferred(&self) -> usize {
        self.queue.pending()
    }

    /// Dispatch deferred actions in the order they were deferred.
    ///
    /// Actions deferred by handlers while draining are dispatched too. Stops
    /// at the first failing action; it is consumed, the rest stay queued.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::ReentrantDispatch`] if called while a dispatch is
    ///   running (nothing is dequeued)
    /// - the first error raised by a deferred action's cycle
    pub fn drain_deferred(&self) -> Result<Vec<DispatchReport>> {
        if self.queue.is_dispatching() {
            return Err(DispatchError::ReentrantDispatch {
                action_type: self.queue.peek_deferred_type().unwrap_or_default(),
            });
        }

        let mut reports = Vec::new();
        while let Some(action) = self.queue.next_deferred() {
            reports.push(self.dispatch(action)?);
        }
        Ok(reports)
    }

    /// Registered store names, in registration order.
    pub fn store_names(&self) -> Vec<String> {
        self.registry.borrow().names().map(str::to_string).collect()
    }
}

impl<P: 'static> Default for Dispatcher<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("stores", &self.store_names())
            .field("dispatching", &self.is_dispatching())
            .field("pending_deferred", &self.pending_deferred())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::rc::{Rc, Weak};

    #[derive(Debug, Default)]
    struct Counter {
        count: u32,
    }

    fn counter() -> Store<Counter> {
        Store::new(Counter::default()).on("INCREMENT", |counter: &mut Counter, ctx| {
            counter.count += 1;
            ctx.emit_change();
            Ok(())
        })
    }

    #[test]
    fn test_dispatch_updates_state() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.register("counter", counter()).unwrap();

        dispatcher.dispatch(Action::new("INCREMENT", Value::Null)).unwrap();
        dispatcher.dispatch(Action::new("INCREMENT", Value::Null)).unwrap();

        assert_eq!(handle.state().unwrap().count, 2);
        assert!(!dispatcher.is_dispatching());
    }

    #[test]
    fn test_unhandled_action_still_completes_every_store() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.register("counter", counter()).unwrap();

        let report = dispatcher.dispatch(Action::new("UNKNOWN", json!({}))).unwrap();

        assert_eq!(report.completion_order, vec!["counter"]);
        assert!(report.was_unhandled());
        assert_eq!(handle.state().unwrap().count, 0);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let dispatcher: Dispatcher = Dispatcher::new();
        dispatcher.register("counter", counter()).unwrap();

        let err = dispatcher.register("counter", counter()).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateName { .. }));
    }

    #[test]
    fn test_change_listeners_see_new_state() {
        let dispatcher = Dispatcher::new();
        let handle = dispatcher.register("counter", counter()).unwrap();

        let seen = Rc::new(Cell::new(0));
        let sink = seen.clone();
        handle.subscribe(move |counter: &Counter| sink.set(counter.count));

        let report = dispatcher.dispatch(Action::new("INCREMENT", Value::Null)).unwrap();

        assert_eq!(seen.get(), 1);
        assert_eq!(report.notified, vec!["counter"]);
    }

    #[test]
    fn test_register_from_handler_is_refused() {
        let dispatcher: Rc<Dispatcher> = Rc::new(Dispatcher::new());
        let weak: Weak<Dispatcher> = Rc::downgrade(&dispatcher);
        let outcome: Rc<RefCell<Option<DispatchError>>> = Rc::default();
        let sink = outcome.clone();

        dispatcher
            .register(
                "registrar",
                Store::new(()).on("SETUP", move |_: &mut (), _ctx| {
                    let dispatcher = weak.upgrade().expect("dispatcher alive");
                    if let Err(e) = dispatcher.register("late", Store::new(())) {
                        *sink.borrow_mut() = Some(e);
                    }
                    Ok(())
                }),
            )
            .unwrap();

        dispatcher.dispatch(Action::new("SETUP", Value::Null)).unwrap();

        assert!(matches!(
            outcome.borrow_mut().take(),
            Some(DispatchError::RegistrationDuringDispatch { name }) if name == "late"
        ));
        assert_eq!(dispatcher.store_names(), vec!["registrar"]);
    }

    #[test]
    fn test_deferred_actions_run_after_cycle() {
        let dispatcher: Rc<Dispatcher> = Rc::new(Dispatcher::new());
        let weak = Rc::downgrade(&dispatcher);

        let handle = dispatcher
            .register(
                "counter",
                Store::new(Counter::default())
                    .on("INCREMENT", |counter: &mut Counter, _ctx| {
                        counter.count += 1;
                        Ok(())
                    })
                    .on("INCREMENT_TWICE", move |counter: &mut Counter, _ctx| {
                        counter.count += 1;
                        let dispatcher = weak.upgrade().expect("dispatcher alive");
                        dispatcher.defer(Action::new("INCREMENT", Value::Null));
                        Ok(())
                    }),
            )
            .unwrap();

        dispatcher
            .dispatch(Action::new("INCREMENT_TWICE", Value::Null))
            .unwrap();
        assert_eq!(handle.state().unwrap().count, 1);
        assert_eq!(dispatcher.pending_deferred(), 1);

        let reports = dispatcher.drain_deferred().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].action_type, "INCREMENT");
        assert_eq!(handle.state().unwrap().count, 2);
        assert_eq!(dispatcher.pending_deferred(), 0);
    }

    #[test]
    fn test_drain_during_dispatch_is_reentrant() {
        let dispatcher: Rc<Dispatcher> = Rc::new(Dispatcher::new());
        let weak = Rc::downgrade(&dispatcher);

        dispatcher
            .register(
                "drainer",
                Store::new(()).on("GO", move |_: &mut (), _ctx| {
                    let dispatcher = weak.upgrade().expect("dispatcher alive");
                    dispatcher.defer(Action::new("LATER", Value::Null));
                    dispatcher.drain_deferred()?;
                    Ok(())
                }),
            )
            .unwrap();

        let err = dispatcher.dispatch(Action::new("GO", Value::Null)).unwrap_err();
        assert!(err.is_reentrant());
        // Nothing was dequeued by the refused drain.
        assert_eq!(dispatcher.pending_deferred(), 1);
    }

    #[test]
    fn test_debug_output() {
        let dispatcher: Dispatcher = Dispatcher::new();
        dispatcher.register("counter", counter()).unwrap();
        let debug = format!("{dispatcher:?}");
        assert!(debug.contains("counter"));
        assert!(debug.contains("dispatching: false"));
    }
}
