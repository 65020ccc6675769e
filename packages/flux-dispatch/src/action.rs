//! Actions: the unit of work broadcast to every store in one dispatch cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An immutable `(type, payload)` pair.
///
/// The payload is opaque to the dispatcher. It defaults to
/// [`serde_json::Value`] so untyped applications can pass arbitrary JSON, but
/// any type works.
///
/// # Example
///
/// ```
/// use flux_dispatch::Action;
/// use serde_json::json;
///
/// let action = Action::new("ADD_TODO", json!({ "text": "buy milk" }));
/// assert_eq!(action.action_type(), "ADD_TODO");
/// assert_eq!(action.payload()["text"], "buy milk");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action<P = serde_json::Value> {
    #[serde(rename = "type")]
    action_type: String,
    payload: P,
}

impl<P> Action<P> {
    /// Create an action of the given type carrying `payload`.
    pub fn new(action_type: impl Into<String>, payload: P) -> Self {
        Self {
            action_type: action_type.into(),
            payload,
        }
    }

    /// The action type handlers are bound to.
    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    /// The action's payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consume the action, returning its payload.
    pub fn into_payload(self) -> P {
        self.payload
    }
}

impl<P: Default> Action<P> {
    /// Create an action with a default (empty) payload.
    pub fn bare(action_type: impl Into<String>) -> Self {
        Self::new(action_type, P::default())
    }
}

impl<P> fmt::Display for Action<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.action_type)
    }
}
