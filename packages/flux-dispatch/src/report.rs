//! What actually happened during one dispatch cycle.
//!
//! Reports catch wiring mistakes: an action no store handled, a store that
//! ran earlier than its registration position because someone waited on it,
//! or a handler that ran without emitting a change.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Summary of one completed dispatch cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    /// Unique id of this cycle (also recorded on the tracing span).
    pub cycle_id: Uuid,
    /// Type of the dispatched action.
    pub action_type: String,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Every registered store, in the order it reached Handled.
    pub completion_order: Vec<String>,
    /// Stores that had a handler bound for the action, in the order they finished.
    pub handled_by: Vec<String>,
    /// Stores whose handler emitted a change, in the order they finished.
    pub notified: Vec<String>,
}

impl DispatchReport {
    /// Returns true if `store` had a handler bound and it ran.
    pub fn was_handled_by(&self, store: &str) -> bool {
        self.handled_by.iter().any(|name| name == store)
    }

    /// Position of `store` in the completion order.
    pub fn position_of(&self, store: &str) -> Option<usize> {
        self.completion_order.iter().position(|name| name == store)
    }

    /// Returns true if no store had a handler for the action.
    pub fn was_unhandled(&self) -> bool {
        self.handled_by.is_empty()
    }
}

impl fmt::Display for DispatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} handled by [{}] ({} of {} stores, {} notified)",
            self.action_type,
            self.handled_by.join(", "),
            self.handled_by.len(),
            self.completion_order.len(),
            self.notified.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> DispatchReport {
        DispatchReport {
            cycle_id: Uuid::new_v4(),
            action_type: "ADD_TODO".into(),
            started_at: Utc::now(),
            completion_order: vec!["todos".into(), "notifications".into(), "audit".into()],
            handled_by: vec!["todos".into(), "notifications".into()],
            notified: vec!["todos".into()],
        }
    }

    #[test]
    fn test_queries() {
        let report = report();
        assert!(report.was_handled_by("todos"));
        assert!(!report.was_handled_by("audit"));
        assert_eq!(report.position_of("notifications"), Some(1));
        assert_eq!(report.position_of("ghost"), None);
        assert!(!report.was_unhandled());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            report().to_string(),
            "ADD_TODO handled by [todos, notifications] (2 of 3 stores, 1 notified)"
        );
    }
}
