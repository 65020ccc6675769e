//! Admission control for dispatch.
//!
//! One action at a time: [`ActionQueue::admit`] hands out a guard while the
//! dispatcher is idle and refuses while a cycle is running. Follow-up actions
//! raised during a cycle go through [`ActionQueue::defer`] and are dispatched
//! later, each in a cycle of its own.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::action::Action;
use crate::error::{DispatchError, Result};

/// Serializes dispatch requests and holds deferred actions.
pub(crate) struct ActionQueue<P> {
    dispatching: Cell<bool>,
    deferred: RefCell<VecDeque<Action<P>>>,
}

impl<P> ActionQueue<P> {
    pub(crate) fn new() -> Self {
        Self {
            dispatching: Cell::new(false),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    /// Claim the dispatcher for one cycle.
    ///
    /// Fails with [`DispatchError::ReentrantDispatch`] if a cycle is running.
    pub(crate) fn admit(&self, action_type: &str) -> Result<AdmissionGuard<'_>> {
        if self.dispatching.replace(true) {
            warn!(action_type = %action_type, "dispatch attempted during dispatch");
            return Err(DispatchError::ReentrantDispatch {
                action_type: action_type.to_string(),
            });
        }
        Ok(AdmissionGuard {
            dispatching: &self.dispatching,
        })
    }

    pub(crate) fn is_dispatching(&self) -> bool {
        self.dispatching.get()
    }

    /// Queue an action for a later cycle.
    pub(crate) fn defer(&self, action: Action<P>) {
        debug!(action_type = %action.action_type(), "action deferred");
        self.deferred.borrow_mut().push_back(action);
    }

    pub(crate) fn next_deferred(&self) -> Option<Action<P>> {
        self.deferred.borrow_mut().pop_front()
    }

    pub(crate) fn peek_deferred_type(&self) -> Option<String> {
        self.deferred
            .borrow()
            .front()
            .map(|action| action.action_type().to_string())
    }

    pub(crate) fn pending(&self) -> usize {
        self.deferred.borrow().len()
    }
}

/// Receipt for an admitted dispatch.
///
/// Releases the dispatcher on drop, so an error or a panic escaping the cycle
/// still leaves it idle.
pub(crate) struct AdmissionGuard<'q> {
    dispatching: &'q Cell<bool>,
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        self.dispatching.set(false);
    }
}
