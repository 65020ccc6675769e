//! The per-action execution context.
//!
//! A `DispatchCycle` runs every registered store exactly once for one
//! action. Stores run in registration order unless a handler pulls a
//! dependency forward with [`HandlerContext::wait_for`], which runs the
//! dependency inline. The result is a topological order computed lazily,
//! with registration order as the tie-break between independent stores.
//!
//! # Status Machine
//!
//! ```text
//! Pending ──► Handling ──► Handled
//!                │
//!                ├─ reached again while still Handling ─► CircularDependency
//!                └─ handler error, panic, or an earlier failure ─► Failed
//! ```
//!
//! The first error is sticky. Once any store fails, no further handler runs
//! in this cycle, every store still on the stack ends up Failed, and the cycle
//! returns that first error even if a handler ignored what `wait_for` gave it.
//!
//! Cycle detection needs no graph: a store that is re-entered while its own
//! handler is still on the stack can only have been reached through a loop.
//! Declared-but-unused dependencies are never checked because the graph only
//! exists as the calls that actually happen for this action.

use std::cell::{Ref, RefCell};

use smallvec::SmallVec;
use tracing::{error, trace};
use uuid::Uuid;

use crate::action::Action;
use crate::error::{DispatchError, Result};
use crate::registry::StoreRegistry;
use crate::report::DispatchReport;
use crate::store::StoreRef;

/// Where a store is in the current cycle.
///
/// Ordered: a store's status never goes backwards within one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StoreStatus {
    /// Not started for this action.
    Pending,
    /// Handler (or a `wait_for` it triggered) is on the stack.
    Handling,
    /// Done for this action.
    Handled,
    /// Stopped by an error in this cycle.
    Failed,
}

/// Execution state for one dispatched action.
pub(crate) struct DispatchCycle<'c, P> {
    registry: &'c StoreRegistry<P>,
    action: &'c Action<P>,
    /// Indexed by registration position.
    status: RefCell<Vec<StoreStatus>>,
    /// Stores currently Handling, outermost first.
    stack: RefCell<SmallVec<[usize; 8]>>,
    completed: RefCell<Vec<usize>>,
    handled_by: RefCell<Vec<usize>>,
    notified: RefCell<Vec<usize>>,
    /// First error raised in this cycle.
    failed: RefCell<Option<DispatchError>>,
}

impl<'c, P: 'static> DispatchCycle<'c, P> {
    /// Create a cycle with every registered store Pending.
    pub(crate) fn new(registry: &'c StoreRegistry<P>, action: &'c Action<P>) -> Self {
        Self {
            registry,
            action,
            status: RefCell::new(vec![StoreStatus::Pending; registry.len()]),
            stack: RefCell::new(SmallVec::new()),
            completed: RefCell::new(Vec::with_capacity(registry.len())),
            handled_by: RefCell::new(Vec::new()),
            notified: RefCell::new(Vec::new()),
            failed: RefCell::new(None),
        }
    }

    /// Run every store to Handled, in registration order.
    pub(crate) fn run(self, cycle_id: Uuid) -> Result<DispatchReport> {
        let started_at = chrono::Utc::now();

        for index in 0..self.registry.len() {
            if self.status_of(index) == StoreStatus::Pending {
                if let Err(e) = self.run_store(index) {
                    return Err(self.failed.take().unwrap_or(e));
                }
            }
        }
        if let Some(first) = self.failed.take() {
            return Err(first);
        }
        debug_assert!(
            self.status.borrow().iter().all(|s| *s == StoreStatus::Handled),
            "cycle finished with a store not Handled"
        );

        Ok(DispatchReport {
            cycle_id,
            action_type: self.action.action_type().to_string(),
            started_at,
            completion_order: self.names(&self.completed.borrow()),
            handled_by: self.names(&self.handled_by.borrow()),
            notified: self.names(&self.notified.borrow()),
        })
    }

    /// Bring one store to Handled, running its handler if it has not run yet.
    pub(crate) fn run_store(&self, index: usize) -> Result<()> {
        let store = self.registry.store_at(index);

        match self.status_of(index) {
            StoreStatus::Handled => return Ok(()),
            StoreStatus::Handling => {
                let path = self.cycle_path(index);
                error!(
                    action_type = %self.action.action_type(),
                    path = %path.join(" -> "),
                    "circular dependency detected"
                );
                return Err(self.fail(DispatchError::CircularDependency { path }));
            }
            StoreStatus::Pending | StoreStatus::Failed => {}
        }
        if let Some(first) = self.first_failure() {
            return Err(first);
        }

        self.set_status(index, StoreStatus::Handling);
        self.stack.borrow_mut().push(index);
        trace!(store = %store.name(), "handling");

        let mut ctx = HandlerContext {
            cycle: self,
            store: index,
            changed: false,
        };
        let outcome = store.run(&mut ctx);
        self.stack.borrow_mut().pop();

        let outcome = match outcome {
            // A handler that swallowed a failure still fails with it.
            Ok(outcome) => match self.first_failure() {
                None => outcome,
                Some(first) => {
                    self.set_status(index, StoreStatus::Failed);
                    trace!(store = %store.name(), "failed");
                    return Err(first);
                }
            },
            Err(e) => {
                self.set_status(index, StoreStatus::Failed);
                trace!(store = %store.name(), "failed");
                return Err(self.fail(e));
            }
        };

        self.set_status(index, StoreStatus::Handled);
        self.completed.borrow_mut().push(index);
        if outcome.ran {
            self.handled_by.borrow_mut().push(index);
        }
        trace!(store = %store.name(), ran = outcome.ran, "handled");

        if outcome.changed {
            let listeners = store.notify_change().map_err(|e| self.fail(e))?;
            trace!(store = %store.name(), listeners, "change emitted");
            self.notified.borrow_mut().push(index);
        }

        Ok(())
    }

    /// Record `error` if it is the cycle's first, and return a copy of the
    /// first error for the caller.
    pub(crate) fn fail(&self, error: DispatchError) -> DispatchError {
        let mut failed = self.failed.borrow_mut();
        match failed.as_ref() {
            Some(first) => first.duplicate(),
            None => {
                let copy = error.duplicate();
                *failed = Some(error);
                copy
            }
        }
    }

    fn first_failure(&self) -> Option<DispatchError> {
        self.failed.borrow().as_ref().map(DispatchError::duplicate)
    }

    fn status_of(&self, index: usize) -> StoreStatus {
        self.status.borrow()[index]
    }

    fn set_status(&self, index: usize, next: StoreStatus) {
        let mut status = self.status.borrow_mut();
        debug_assert!(status[index] <= next, "store status went backwards");
        status[index] = next;
    }

    /// Stores from the first visit of `index` to the top of the stack, then `index` again.
    fn cycle_path(&self, index: usize) -> Vec<String> {
        let stack = self.stack.borrow();
        let start = stack.iter().position(|&i| i == index);
        debug_assert!(start.is_some(), "Handling store missing from the stack");
        let start = start.unwrap_or(0);
        stack[start..]
            .iter()
            .chain(std::iter::once(&index))
            .map(|&i| self.registry.store_at(i).name().to_string())
            .collect()
    }

    fn names(&self, indices: &[usize]) -> Vec<String> {
        indices
            .iter()
            .map(|&i| self.registry.store_at(i).name().to_string())
            .collect()
    }
}

/// What a running handler can see and do.
///
/// Handed to every handler alongside its store's state. Scoped to one cycle
/// and one calling store.
pub struct HandlerContext<'c, P = serde_json::Value> {
    cycle: &'c DispatchCycle<'c, P>,
    store: usize,
    changed: bool,
}

impl<'c, P: 'static> HandlerContext<'c, P> {
    /// The action being dispatched.
    pub fn action(&self) -> &'c Action<P> {
        self.cycle.action
    }

    /// The current action's type.
    pub fn action_type(&self) -> &'c str {
        self.cycle.action.action_type()
    }

    /// The current action's payload.
    pub fn payload(&self) -> &'c P {
        self.cycle.action.payload()
    }

    /// Name of the store whose handler is running.
    pub fn store_name(&self) -> &'c str {
        self.cycle.registry.store_at(self.store).name()
    }

    /// Ask for this store's change listeners to be notified once the handler
    /// returns successfully.
    pub fn emit_change(&mut self) {
        self.changed = true;
    }

    pub(crate) fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Wait for other stores to finish the current action, then run `callback`.
    ///
    /// Each named store is resolved and run, in the given order, unless it is
    /// already Handled. The callback then receives the stores in that same
    /// order. Can be called any number of times from one handler.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownStore`] if a name is not registered
    /// - [`DispatchError::CircularDependency`] if a named store (directly or
    ///   through its own waits) leads back to a store still handling
    /// - any error raised by a dependency's handler
    ///
    /// Ignoring the error does not rescue the cycle: `dispatch` still fails
    /// with the first error raised.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count = ctx.wait_for(&["todos"], |stores| {
    ///     stores[0].state::<Todos>().map(|todos| todos.items.len())
    /// })??;
    /// ```
    pub fn wait_for<R>(
        &self,
        names: &[&str],
        callback: impl FnOnce(&[StoreRef<'c, P>]) -> R,
    ) -> Result<R> {
        let mut resolved: SmallVec<[StoreRef<'c, P>; 4]> = SmallVec::with_capacity(names.len());

        for name in names {
            let index = self
                .cycle
                .registry
                .index_of(name)
                .map_err(|e| self.cycle.fail(e))?;
            trace!(store = %self.store_name(), waiting_on = %name, "wait_for");
            self.cycle.run_store(index)?;
            resolved.push(StoreRef::new(self.cycle.registry.store_at(index)));
        }

        Ok(callback(&resolved))
    }

    /// Wait for one store and borrow its state as `S`.
    ///
    /// Shorthand for a single-store [`wait_for`](Self::wait_for) whose
    /// callback reads the state.
    pub fn wait_for_state<S: 'static>(&self, name: &str) -> Result<Ref<'c, S>> {
        self.wait_for(&[name], |stores| stores[0].state::<S>())?
    }
}
