//! Object store for the editor domain
//!
//! The host editor owns the real objects (documents, graph nodes, widgets);
//! the bridge refers to them through generational handles so that a focus
//! pointer or alias left behind after an object is destroyed reads as dead
//! instead of dangling. Destroying a slot bumps its generation, which
//! invalidates every handle minted for the previous occupant.

use std::fmt;

use serde_json::Value;

/// Handle to an object in an [`ObjectArena`].
///
/// Copyable and cheap; validity is checked on every dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    index: u32,
    generation: u32,
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

/// An object tracked by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    /// Asset or node name, unique enough for lookup by the tooling side.
    pub name: String,
    /// Editor class, e.g. "Blueprint" or "MaterialExpressionMultiply".
    pub class: String,
    /// Arbitrary object state; opaque to the core.
    pub payload: Value,
}

impl StoredObject {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            payload: Value::Null,
        }
    }
}

/// Name lookup collaborator used when a command names its target instead of
/// relying on the current focus.
pub trait ObjectIndex {
    fn find_by_name(&self, name: &str) -> Option<ObjectHandle>;
    fn is_alive(&self, handle: ObjectHandle) -> bool;
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<StoredObject>,
}

/// Owning arena of editor objects with generational liveness.
#[derive(Debug, Default)]
pub struct ObjectArena {
    slots: Vec<Slot>,
}

impl ObjectArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object, reusing the first free slot.
    pub fn insert(&mut self, object: StoredObject) -> ObjectHandle {
        if let Some(index) = self.slots.iter().position(|s| s.entry.is_none()) {
            let slot = &mut self.slots[index];
            slot.entry = Some(object);
            return ObjectHandle {
                index: index as u32,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            entry: Some(object),
        });
        ObjectHandle {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&StoredObject> {
        self.slots
            .get(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_ref())
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut StoredObject> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.entry.as_mut())
    }

    /// Destroy an object. Returns false if the handle was already stale.
    ///
    /// The slot's generation is bumped so outstanding handles go dead.
    pub fn destroy(&mut self, handle: ObjectHandle) -> bool {
        match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.entry.is_some() => {
                slot.entry = None;
                slot.generation += 1;
                true
            }
            _ => false,
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectIndex for ObjectArena {
    fn find_by_name(&self, name: &str) -> Option<ObjectHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            slot.entry
                .as_ref()
                .filter(|obj| obj.name == name)
                .map(|_| ObjectHandle {
                    index: index as u32,
                    generation: slot.generation,
                })
        })
    }

    fn is_alive(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }
}
