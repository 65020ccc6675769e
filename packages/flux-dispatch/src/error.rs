//! Structured error types for flux-dispatch.
//!
//! `DispatchError` provides pattern-matchable errors instead of generic
//! `anyhow::Error`. Every variant is fatal for the cycle that raised it:
//! nothing is retried, stores that already completed keep their mutations,
//! and the dispatcher returns to idle.
//!
//! # The Error Boundary Rule
//!
//! > **Handlers speak `anyhow`, callers of `dispatch()` get `DispatchError`.**
//!
//! - `anyhow` is handler-side transport (ergonomic `?` inside handlers)
//! - `DispatchError` is the only error that leaves `dispatch()`
//!
//! A handler that propagates a `DispatchError` with `?` (for example from
//! `wait_for`) has it surfaced unchanged; any other handler error is wrapped
//! in [`DispatchError::HandlerFailed`].
//!
//! # Example
//!
//! ```ignore
//! use flux_dispatch::{Action, DispatchError};
//!
//! match dispatcher.dispatch(Action::new("ADD_TODO", payload)) {
//!     Ok(report) => tracing::info!(%report, "dispatched"),
//!     Err(DispatchError::CircularDependency { path }) => {
//!         eprintln!("stores wait on each other: {}", path.join(" -> "));
//!     }
//!     Err(e) => eprintln!("dispatch failed: {e}"),
//! }
//! ```

use thiserror::Error;

/// Structured error type for registry and dispatch operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A store with this name is already registered.
    #[error("store {name:?} is already registered")]
    DuplicateName {
        /// The conflicting store name.
        name: String,
    },

    /// `wait_for` (or a lookup) referenced a store that was never registered.
    #[error("no store registered under {name:?}")]
    UnknownStore {
        /// The missing store name.
        name: String,
    },

    /// A store transitively waited on itself within one action's cycle.
    #[error("circular dependency between stores: {}", path.join(" -> "))]
    CircularDependency {
        /// Stores in the order they were entered, ending with the repeated one.
        path: Vec<String>,
    },

    /// `dispatch()` was called while another dispatch was in progress.
    #[error("cannot dispatch {action_type:?} in the middle of a dispatch")]
    ReentrantDispatch {
        /// Type of the rejected action.
        action_type: String,
    },

    /// A store was registered while a dispatch cycle was running.
    #[error("cannot register store {name:?} in the middle of a dispatch")]
    RegistrationDuringDispatch {
        /// The store that was being registered.
        name: String,
    },

    /// A store's state was read with the wrong type.
    #[error("store {store:?} does not hold state of type {expected}")]
    StateTypeMismatch {
        /// The store that was read.
        store: String,
        /// Type name the caller asked for.
        expected: &'static str,
    },

    /// A store's state was read while its handler was still mutating it.
    #[error("store {store:?} is busy handling the current action")]
    StoreBusy {
        /// The store that was read.
        store: String,
    },

    /// A handler returned an error.
    #[error("store {store:?} failed handling {action_type:?}: {source}")]
    HandlerFailed {
        /// The store whose handler failed.
        store: String,
        /// Type of the action being handled.
        action_type: String,
        /// The error returned by the handler.
        source: anyhow::Error,
    },

    /// A handler panicked.
    #[error("store {store:?} panicked: {message}")]
    HandlerPanicked {
        /// The store whose handler panicked.
        store: String,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A change listener panicked while being notified.
    #[error("change listener of store {store:?} panicked: {message}")]
    ListenerPanicked {
        /// The store whose listener panicked.
        store: String,
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl DispatchError {
    /// Returns true for [`DispatchError::CircularDependency`].
    pub fn is_circular(&self) -> bool {
        matches!(self, DispatchError::CircularDependency { .. })
    }

    /// Returns true for [`DispatchError::ReentrantDispatch`].
    pub fn is_reentrant(&self) -> bool {
        matches!(self, DispatchError::ReentrantDispatch { .. })
    }

    /// Turn an error returned by a handler into a `DispatchError`.
    ///
    /// Errors that already are a `DispatchError` pass through unchanged so the
    /// caller of `dispatch()` sees the original failure (a cycle detected three
    /// stores deep is still a `CircularDependency` at the top).
    pub(crate) fn from_handler(store: &str, action_type: &str, error: anyhow::Error) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(dispatch_err) => dispatch_err,
            Err(source) => DispatchError::HandlerFailed {
                store: store.to_string(),
                action_type: action_type.to_string(),
                source,
            },
        }
    }

    /// A copy of this error for a handler waiting on the failed store.
    ///
    /// The cycle keeps the original. A handler failure's source is carried
    /// over as its rendered message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            DispatchError::DuplicateName { name } => DispatchError::DuplicateName { name: name.clone() },
            DispatchError::UnknownStore { name } => DispatchError::UnknownStore { name: name.clone() },
            DispatchError::CircularDependency { path } => {
                DispatchError::CircularDependency { path: path.clone() }
            }
            DispatchError::ReentrantDispatch { action_type } => DispatchError::ReentrantDispatch {
                action_type: action_type.clone(),
            },
            DispatchError::RegistrationDuringDispatch { name } => {
                DispatchError::RegistrationDuringDispatch { name: name.clone() }
            }
            DispatchError::StateTypeMismatch { store, expected } => DispatchError::StateTypeMismatch {
                store: store.clone(),
                expected: *expected,
            },
            DispatchError::StoreBusy { store } => DispatchError::StoreBusy { store: store.clone() },
            DispatchError::HandlerFailed {
                store,
                action_type,
                source,
            } => DispatchError::HandlerFailed {
                store: store.clone(),
                action_type: action_type.clone(),
                source: anyhow::anyhow!("{source:#}"),
            },
            DispatchError::HandlerPanicked { store, message } => DispatchError::HandlerPanicked {
                store: store.clone(),
                message: message.clone(),
            },
            DispatchError::ListenerPanicked { store, message } => DispatchError::ListenerPanicked {
                store: store.clone(),
                message: message.clone(),
            },
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = DispatchError> = std::result::Result<T, E>;
