//! Session context
//!
//! Tracks the current editing context across commands so a stateless request
//! can say "the blueprint I'm working on" or "the node I just created"
//! without repeating identifiers. One context exists per server instance; it
//! outlives any single connection and is only ever touched from the owner
//! domain, so no synchronization lives here.

use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use crate::object::{ObjectArena, ObjectHandle, ObjectIndex};

/// Sentinel alias resolving to the most recently registered object.
pub const LAST_ALIAS: &str = "$last";

/// Long form of [`LAST_ALIAS`], kept for graph-command compatibility.
pub const LAST_NODE_ALIAS: &str = "$last_node";

/// Graph name reported when no sub-resource focus is set.
pub const DEFAULT_GRAPH: &str = "EventGraph";

/// Mutable per-session state shared by all commands.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Currently focused document. May go stale if the object is destroyed
    /// elsewhere; readers must check liveness, never assume it.
    focus: Option<ObjectHandle>,

    /// Name of the focused sub-resource (graph) inside the document.
    current_graph: Option<String>,

    /// Aliases from short names to objects created by earlier commands.
    /// Scoped to the focused document.
    aliases: HashMap<String, ObjectHandle>,

    /// Most recently registered alias target, for `$last`.
    last_registered: Option<ObjectHandle>,

    /// Objects modified since the last persistence flush.
    dirty: HashSet<ObjectHandle>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Focus
    // ========================================================================

    pub fn focus(&self) -> Option<ObjectHandle> {
        self.focus
    }

    /// Replace the focused document.
    ///
    /// Moving focus to a different document clears the alias map and the
    /// graph focus: aliases name things inside "the document being edited"
    /// and mean nothing once that changes.
    pub fn set_focus(&mut self, handle: ObjectHandle) {
        if self.focus != Some(handle) {
            self.aliases.clear();
            self.last_registered = None;
        }
        self.focus = Some(handle);
        self.current_graph = None;
    }

    pub fn set_current_graph(&mut self, graph: impl Into<String>) {
        self.current_graph = Some(graph.into());
    }

    pub fn current_graph(&self) -> &str {
        self.current_graph.as_deref().unwrap_or(DEFAULT_GRAPH)
    }

    /// Resolve a target: empty name means the current focus (None when no
    /// focus is set or the focused object has been destroyed), anything else
    /// goes through the name index.
    pub fn resolve_focus_or_named(
        &self,
        name: &str,
        index: &dyn ObjectIndex,
    ) -> Option<ObjectHandle> {
        if name.is_empty() {
            self.focus.filter(|&h| index.is_alive(h))
        } else {
            index.find_by_name(name)
        }
    }

    // ========================================================================
    // Aliases
    // ========================================================================

    /// Bind `name` to an object and make it the `$last` target.
    pub fn register_alias(&mut self, name: impl Into<String>, handle: ObjectHandle) {
        self.aliases.insert(name.into(), handle);
        self.last_registered = Some(handle);
    }

    /// Look up an alias. `$last` / `$last_node` resolve to the most recent
    /// registration.
    pub fn alias(&self, name: &str) -> Option<ObjectHandle> {
        if name == LAST_ALIAS || name == LAST_NODE_ALIAS {
            return self.last_registered;
        }
        self.aliases.get(name).copied()
    }

    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    pub fn mark_dirty(&mut self, handle: ObjectHandle) {
        self.dirty.insert(handle);
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Drain the dirty set for a persistence flush.
    pub fn take_dirty(&mut self) -> Vec<ObjectHandle> {
        self.dirty.drain().collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Clear focus, aliases, and the dirty set.
    pub fn reset(&mut self) {
        self.focus = None;
        self.current_graph = None;
        self.aliases.clear();
        self.last_registered = None;
        self.dirty.clear();
    }

    /// Serialize the context for client inspection. Must be called on the
    /// owner domain since it reads the arena.
    pub fn snapshot(&self, arena: &ObjectArena) -> Value {
        let current_blueprint = self
            .focus
            .and_then(|h| arena.get(h))
            .map(|obj| Value::from(obj.name.clone()))
            .unwrap_or(Value::Null);

        let mut doc = json!({
            "current_blueprint": current_blueprint,
            "current_graph": self.current_graph(),
            "alias_count": self.aliases.len(),
            "dirty_count": self.dirty.len(),
        });

        if let Some(last) = self.last_registered {
            doc["last_node_id"] = Value::from(last.to_string());
        }

        doc
    }
}
