//! Command contract and registry
//!
//! Every remotely invokable operation implements [`Command`] and is added to
//! the [`CommandRegistry`] at startup. The registry is read-only once the
//! server starts serving; handlers live for the process lifetime.
//!
//! The contract is a fixed four-stage pipeline driven by the dispatcher:
//! validate, execute, optional post-validate, conditional persist. Handlers
//! only see the stages they implement; ordering and fault containment are
//! the dispatcher's job.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::owner::OwnerState;

/// A named unit of editor work.
///
/// `validate` must be side-effect free; it may read the session context and
/// arena to check preconditions ("the referenced blueprint exists"). All
/// stages run on the owner domain.
pub trait Command: Send + Sync {
    /// Identifier used in error messages and logs.
    fn name(&self) -> &str;

    /// Check parameters and preconditions. A failure stops the pipeline
    /// before any mutation.
    fn validate(&self, params: &Value, state: &OwnerState) -> Result<(), String>;

    /// Perform the mutation and produce the `result` object.
    fn execute(&self, params: &Value, state: &mut OwnerState) -> Result<Value, String>;

    /// Verify consistency after a successful execute. Failures surface to
    /// the client but do not roll the mutation back.
    fn post_validate(&self, state: &OwnerState) -> Result<(), String> {
        let _ = state;
        Ok(())
    }

    /// Whether a successful run should flush the dirty set.
    fn requires_persist(&self) -> bool {
        true
    }
}

/// Name-keyed table of command handlers.
///
/// Duplicate registrations overwrite: last one wins, no error.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Command>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ============================================================================
// Parameter helpers
// ============================================================================

/// Get a required string parameter, or a ready-to-send error message.
pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Required parameter '{}' is missing or empty", key))
}

/// Get an optional string parameter with a default.
pub fn optional_str<'a>(params: &'a Value, key: &str, default: &'a str) -> &'a str {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
}

/// Get an optional boolean parameter with a default.
pub fn optional_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}
