//! Stores, handler binding, and the type-erased runner.
//!
//! A [`Store`] owns one slice of application state plus a map from action
//! type to handler. Handlers are plain closures bound up front, so a typo in a
//! binding is a missing entry you can see in [`Store::bound_types`], not a
//! silent lookup failure at dispatch time.
//!
//! # Key Properties
//!
//! - **State is private**: only the store's own handlers get `&mut S`
//! - **One handler per action type**: binding a type twice replaces the first
//! - **Unbound types are no-ops**: the store still counts as handled
//! - **Reads go through handles**: [`StoreHandle`] outside a dispatch,
//!   [`StoreRef`] inside a `wait_for` callback

use std::any::{type_name, Any};
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{debug, error};

use crate::cycle::HandlerContext;
use crate::emitter::{ChangeEmitter, SubscriptionId};
use crate::error::{DispatchError, Result};

/// A handler bound to one action type.
///
/// Receives the store's state mutably and the [`HandlerContext`] for the
/// current cycle (payload, action type, `wait_for`, `emit_change`).
pub type Handler<S, P> = Box<dyn FnMut(&mut S, &mut HandlerContext<'_, P>) -> anyhow::Result<()>>;

/// A store: private state plus handlers keyed by action type.
///
/// # Example
///
/// ```ignore
/// use flux_dispatch::Store;
///
/// #[derive(Default)]
/// struct Todos {
///     items: Vec<String>,
/// }
///
/// let store = Store::new(Todos::default())
///     .on("ADD_TODO", |todos: &mut Todos, ctx| {
///         let text = ctx.payload()["text"].as_str().unwrap_or_default();
///         todos.items.push(text.to_string());
///         ctx.emit_change();
///         Ok(())
///     })
///     .on("CLEAR", |todos: &mut Todos, ctx| {
///         todos.items.clear();
///         ctx.emit_change();
///         Ok(())
///     });
/// ```
pub struct Store<S, P = serde_json::Value> {
    state: S,
    handlers: HashMap<String, Handler<S, P>>,
}

impl<S, P> Store<S, P> {
    /// Create a store with the given initial state and no handlers.
    pub fn new(state: S) -> Self {
        Self {
            state,
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler for `action_type` (builder form).
    ///
    /// Binding the same type twice keeps the last handler.
    pub fn on<F>(mut self, action_type: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&mut S, &mut HandlerContext<'_, P>) -> anyhow::Result<()> + 'static,
    {
        self.bind(action_type, handler);
        self
    }

    /// Bind a handler for `action_type`.
    ///
    /// Returns true if this replaced an existing binding.
    pub fn bind<F>(&mut self, action_type: impl Into<String>, handler: F) -> bool
    where
        F: FnMut(&mut S, &mut HandlerContext<'_, P>) -> anyhow::Result<()> + 'static,
    {
        let action_type = action_type.into();
        let replaced = self.handlers.contains_key(&action_type);
        if replaced {
            debug!(action_type = %action_type, "replacing existing handler binding");
        }
        self.handlers.insert(action_type, Box::new(handler));
        replaced
    }

    /// Returns true if a handler is bound for `action_type`.
    pub fn handles(&self, action_type: &str) -> bool {
        self.handlers.contains_key(action_type)
    }

    /// Action types this store has handlers for, in no particular order.
    pub fn bound_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// The store's current state.
    pub fn state(&self) -> &S {
        &self.state
    }
}

impl<S: fmt::Debug, P> fmt::Debug for Store<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.bound_types().collect();
        types.sort_unstable();
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("bound_types", &types)
            .finish()
    }
}

/// What happened when a store was run for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunOutcome {
    /// A handler was bound and ran to completion.
    pub ran: bool,
    /// The handler asked for a change notification.
    pub changed: bool,
}

/// Type-erased store trait for internal use.
///
/// Lets the registry hold stores with different state types in one list.
pub(crate) trait AnyStore<P> {
    /// The name the store was registered under.
    fn name(&self) -> &str;

    /// Run the bound handler for the context's action, if any.
    fn run(&self, ctx: &mut HandlerContext<'_, P>) -> Result<RunOutcome>;

    /// Notify change listeners with the current state.
    ///
    /// Returns how many listeners ran, or [`DispatchError::ListenerPanicked`].
    fn notify_change(&self) -> Result<usize>;

    /// Downcast support for typed reads.
    fn as_any(&self) -> &dyn Any;
}

/// A registered store: the [`Store`] behind a `RefCell` plus its emitter.
pub(crate) struct StoreCell<S, P> {
    name: String,
    inner: RefCell<Store<S, P>>,
    emitter: ChangeEmitter<S>,
}

impl<S, P> StoreCell<S, P> {
    pub(crate) fn new(name: String, store: Store<S, P>) -> Self {
        Self {
            name,
            inner: RefCell::new(store),
            emitter: ChangeEmitter::new(),
        }
    }

    fn read(&self) -> Result<Ref<'_, S>> {
        self.inner
            .try_borrow()
            .map(|store| Ref::map(store, |store| &store.state))
            .map_err(|_| DispatchError::StoreBusy {
                store: self.name.clone(),
            })
    }
}

impl<S: 'static, P: 'static> AnyStore<P> for StoreCell<S, P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &mut HandlerContext<'_, P>) -> Result<RunOutcome> {
        let mut guard = self
            .inner
            .try_borrow_mut()
            .map_err(|_| DispatchError::StoreBusy {
                store: self.name.clone(),
            })?;
        let store = &mut *guard;

        let Some(handler) = store.handlers.get_mut(ctx.action_type()) else {
            return Ok(RunOutcome {
                ran: false,
                changed: false,
            });
        };

        // The store's state may be half-updated after a panic; the cycle
        // aborts either way, and no rollback is attempted.
        let result = catch_unwind(AssertUnwindSafe(|| handler(&mut store.state, ctx)));

        match result {
            Ok(Ok(())) => Ok(RunOutcome {
                ran: true,
                changed: ctx.take_changed(),
            }),
            Ok(Err(e)) => Err(DispatchError::from_handler(&self.name, ctx.action_type(), e)),
            Err(panic_info) => {
                let message = panic_message(panic_info.as_ref());
                error!(
                    store = %self.name,
                    action_type = %ctx.action_type(),
                    panic = %message,
                    "store handler panicked"
                );
                Err(DispatchError::HandlerPanicked {
                    store: self.name.clone(),
                    message,
                })
            }
        }
    }

    fn notify_change(&self) -> Result<usize> {
        let Ok(store) = self.inner.try_borrow() else {
            return Ok(0);
        };

        catch_unwind(AssertUnwindSafe(|| self.emitter.notify(&store.state))).map_err(|panic_info| {
            let message = panic_message(panic_info.as_ref());
            error!(store = %self.name, panic = %message, "change listener panicked");
            DispatchError::ListenerPanicked {
                store: self.name.clone(),
                message,
            }
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A resolved store, handed to `wait_for` callbacks.
///
/// The store has finished handling the current action by the time the
/// callback sees it, so its state can be read.
pub struct StoreRef<'c, P> {
    store: &'c dyn AnyStore<P>,
}

impl<'c, P: 'static> StoreRef<'c, P> {
    pub(crate) fn new(store: &'c dyn AnyStore<P>) -> Self {
        Self { store }
    }

    /// The name the store was registered under.
    pub fn name(&self) -> &'c str {
        self.store.name()
    }

    /// Read the store's state as `S`.
    ///
    /// Fails with [`DispatchError::StateTypeMismatch`] if the store holds a
    /// different state type.
    pub fn state<S: 'static>(&self) -> Result<Ref<'c, S>> {
        let cell = self
            .store
            .as_any()
            .downcast_ref::<StoreCell<S, P>>()
            .ok_or_else(|| DispatchError::StateTypeMismatch {
                store: self.store.name().to_string(),
                expected: type_name::<S>(),
            })?;
        cell.read()
    }
}

impl<P> fmt::Debug for StoreRef<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRef")
            .field("name", &self.store.name())
            .finish()
    }
}

/// Typed handle to a registered store.
///
/// Returned by [`Dispatcher::register`](crate::Dispatcher::register). Use it
/// to read state between dispatches and to subscribe to change notifications.
pub struct StoreHandle<S, P = serde_json::Value> {
    cell: Rc<StoreCell<S, P>>,
}

impl<S, P> StoreHandle<S, P> {
    pub(crate) fn new(cell: Rc<StoreCell<S, P>>) -> Self {
        Self { cell }
    }

    /// The name the store was registered under.
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Borrow the store's state.
    ///
    /// Fails with [`DispatchError::StoreBusy`] while the store's own handler
    /// is running.
    pub fn state(&self) -> Result<Ref<'_, S>> {
        self.cell.read()
    }

    /// Subscribe to change notifications.
    ///
    /// The listener runs synchronously, right after a handler of this store
    /// called [`HandlerContext::emit_change`].
    pub fn subscribe(&self, listener: impl FnMut(&S) + 'static) -> SubscriptionId {
        self.cell.emitter.subscribe(listener)
    }

    /// Remove a change listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.cell.emitter.unsubscribe(id)
    }

    /// Returns the number of change listeners.
    pub fn subscriber_count(&self) -> usize {
        self.cell.emitter.subscriber_count()
    }
}

impl<S, P> Clone for StoreHandle<S, P> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<S, P> fmt::Debug for StoreHandle<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.cell.name)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
