//! # flux-dispatch
//!
//! A synchronous action dispatcher: one action at a time is broadcast to every
//! registered store, and each store handles it exactly once. A store that needs
//! another store's result first says so with `wait_for`, which runs the
//! dependency inline.
//!
//! ## Core Concepts
//!
//! - [`Action`] = what happened (`type` + opaque payload)
//! - [`Store`] = a slice of state plus handlers keyed by action type
//! - [`Dispatcher`] = owns the stores, runs one dispatch cycle per action
//!
//! ## Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼ dispatch(action)
//! Dispatcher ── ActionQueue::admit() ──► ReentrantDispatch if busy
//!   │
//!   ▼ DispatchCycle over StoreRegistry (all stores Pending)
//!   │
//!   ├─► run_store(todos) ─────────────► handler ─► Handled
//!   │
//!   ├─► run_store(notifications) ─────► handler
//!   │                                     │
//!   │                                     └─► wait_for(["stats"])
//!   │                                            └─► run_store(stats) ─► Handled
//!   │                                     ◄── callback(stats) ─┘
//!   │                                   Handled
//!   │
//!   └─► run_store(stats) ─────────────► already Handled, skipped
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One action at a time** - `dispatch` during a dispatch is an error, not queued
//! 2. **Once per action** - a store's handler runs at most once per cycle
//! 3. **Dependencies first** - after `wait_for(["b"], ..)`, b has finished this action
//! 4. **No cycles** - a store waiting (transitively) on itself fails the dispatch
//! 5. **Fail whole** - the first error aborts the cycle, even if a handler ignores it; completed stores keep their changes
//!
//! ## Example
//!
//! ```
//! use flux_dispatch::{Action, Dispatcher, HandlerContext, Store};
//! use serde_json::json;
//!
//! #[derive(Default)]
//! struct Todos {
//!     items: Vec<String>,
//! }
//!
//! #[derive(Default)]
//! struct Notifications {
//!     messages: Vec<String>,
//! }
//!
//! let dispatcher: Dispatcher = Dispatcher::new();
//!
//! // Registered first, but depends on `todos`.
//! let notifications = dispatcher
//!     .register(
//!         "notifications",
//!         Store::new(Notifications::default()).on("ADD_TODO", |state: &mut Notifications, ctx| {
//!             let count = ctx.wait_for_state::<Todos>("todos")?.items.len();
//!             state.messages.push(format!("{count} todo(s)"));
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//!
//! let todos = dispatcher
//!     .register(
//!         "todos",
//!         Store::new(Todos::default()).on("ADD_TODO", |state: &mut Todos, ctx: &mut HandlerContext<'_>| {
//!             let text = ctx.payload()["text"].as_str().unwrap_or_default();
//!             state.items.push(text.to_string());
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//!
//! let report = dispatcher
//!     .dispatch(Action::new("ADD_TODO", json!({ "text": "x" })))
//!     .unwrap();
//!
//! assert_eq!(report.completion_order, vec!["todos", "notifications"]);
//! assert_eq!(todos.state().unwrap().items, vec!["x"]);
//! assert_eq!(notifications.state().unwrap().messages, vec!["1 todo(s)"]);
//! ```
//!
//! ## What This Is Not
//!
//! - Not thread-safe: everything runs on the caller's stack
//! - Not persistent: state lives in the stores, in memory
//! - Not transactional: there is no rollback of stores that already ran

mod action;
mod cycle;
mod dispatcher;
mod emitter;
mod error;
mod queue;
mod registry;
mod report;
mod store;

// Testing utilities (feature-gated)
#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use crate::action::Action;
pub use crate::cycle::{HandlerContext, StoreStatus};
pub use crate::dispatcher::Dispatcher;
pub use crate::emitter::{ChangeEmitter, SubscriptionId};
pub use crate::error::{DispatchError, Result};
pub use crate::registry::StoreRegistry;
pub use crate::report::DispatchReport;
pub use crate::store::{Handler, Store, StoreHandle, StoreRef};
