//! Testing utilities for flux-dispatch stores and dispatch order.
//!
//! # Feature Flag
//!
//! This module is only available with the `testing` feature:
//!
//! ```toml
//! [dev-dependencies]
//! flux-dispatch = { version = "0.1", features = ["testing"] }
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use flux_dispatch::testing::CallLog;
//!
//! let log = CallLog::new();
//!
//! dispatcher.register("todos", log.recording_store("todos", "ADD_TODO"))?;
//! dispatcher.register("stats", log.recording_store("stats", "ADD_TODO"))?;
//!
//! dispatcher.dispatch(Action::new("ADD_TODO", json!({})))?;
//!
//! log.assert_order(&["todos", "stats"]);
//! assert_eq!(log.count("todos"), 1);
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use crate::cycle::HandlerContext;
use crate::store::Store;

/// A shared, append-only record of handler invocations.
///
/// Cloning a `CallLog` yields another handle to the same record, so clones can
/// be moved into handler closures.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Rc<RefCell<Vec<String>>>,
}

impl CallLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.borrow_mut().push(entry.into());
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<String> {
        self.entries.borrow().clone()
    }

    /// How many times `entry` was recorded.
    pub fn count(&self, entry: &str) -> usize {
        self.entries.borrow().iter().filter(|e| *e == entry).count()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Forget all entries.
    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    /// Position of the first occurrence of `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.borrow().iter().position(|e| e == entry)
    }

    /// Assert the log holds exactly `expected`, in order.
    ///
    /// # Panics
    ///
    /// Panics with both sequences if they differ.
    #[track_caller]
    pub fn assert_order(&self, expected: &[&str]) {
        let actual = self.entries();
        assert_eq!(
            actual, expected,
            "handler order mismatch: expected {expected:?}, got {actual:?}"
        );
    }

    /// Assert `before` was recorded ahead of `after`.
    ///
    /// # Panics
    ///
    /// Panics if either entry is missing or the order is reversed.
    #[track_caller]
    pub fn assert_before(&self, before: &str, after: &str) {
        let entries = self.entries();
        let b = self
            .position(before)
            .unwrap_or_else(|| panic!("{before:?} was never recorded in {entries:?}"));
        let a = self
            .position(after)
            .unwrap_or_else(|| panic!("{after:?} was never recorded in {entries:?}"));
        assert!(b < a, "expected {before:?} before {after:?}, got {entries:?}");
    }

    /// A stateless store that records `name` each time it handles `action_type`.
    pub fn recording_store<P: 'static>(&self, name: &str, action_type: &str) -> Store<(), P> {
        let log = self.clone();
        let name = name.to_string();
        Store::new(()).on(action_type, move |_: &mut (), _ctx: &mut HandlerContext<'_, P>| {
            log.record(name.clone());
            Ok(())
        })
    }

    /// A stateless store that waits for `deps` (in order), then records `name`.
    pub fn dependent_store<P: 'static>(
        &self,
        name: &str,
        action_type: &str,
        deps: &[&str],
    ) -> Store<(), P> {
        let log = self.clone();
        let name = name.to_string();
        let deps: Vec<String> = deps.iter().map(|d| d.to_string()).collect();
        Store::new(()).on(action_type, move |_: &mut (), ctx: &mut HandlerContext<'_, P>| {
            let dep_refs: Vec<&str> = deps.iter().map(String::as_str).collect();
            ctx.wait_for(&dep_refs, |_| ())?;
            log.record(name.clone());
            Ok(())
        })
    }
}
