//! Persistence collaborator
//!
//! The dispatch pipeline flushes the session's dirty set through a
//! [`Persister`] after a successful command that asks for it. Persist
//! failures are logged and never surfaced to the client that triggered the
//! flush.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde_json::json;

use crate::object::{ObjectHandle, StoredObject};

/// Durable storage for modified objects.
pub trait Persister: Send {
    fn persist(&mut self, handle: ObjectHandle, object: &StoredObject) -> Result<(), String>;
}

/// Discards everything. Default when no data dir is configured.
#[derive(Debug, Default)]
pub struct NullPersister;

impl Persister for NullPersister {
    fn persist(&mut self, _handle: ObjectHandle, _object: &StoredObject) -> Result<(), String> {
        Ok(())
    }
}

/// Writes each dirty object as a JSON document under a data directory.
#[derive(Debug)]
pub struct JsonFilePersister {
    dir: PathBuf,
}

impl JsonFilePersister {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

impl Persister for JsonFilePersister {
    fn persist(&mut self, handle: ObjectHandle, object: &StoredObject) -> Result<(), String> {
        let doc = json!({
            "name": object.name,
            "class": object.class,
            "payload": object.payload,
        });
        let path = self.dir.join(format!("{}.json", object.name));
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| format!("serialize {}: {}", handle, e))?;
        fs::write(&path, bytes).map_err(|e| format!("write {}: {}", path.display(), e))
    }
}
