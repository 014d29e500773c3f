//! Owner domain: the single-writer executor
//!
//! All session state and editor objects belong to one logical thread, the
//! mutation owner. Transport threads never touch that state directly: they
//! post a closure over a bounded channel and block until the owner has run
//! it and sent the result back. Single-writer access is structural, so the
//! state itself needs no locks.
//!
//! Every job runs inside a panic boundary. A panicking command becomes a
//! typed error for the caller; the owner thread and its state survive. With
//! `panic = "abort"` this containment is unavailable, a documented degraded
//! mode, not a silent one.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use thiserror::Error;
use tracing::{debug, warn};

use crate::context::SessionContext;
use crate::object::ObjectArena;
use crate::persist::{NullPersister, Persister};

/// Capacity of the owner job queue. Small on purpose: the transport is
/// single-flight, so depth beyond a handful means something is wrong.
const JOB_QUEUE_CAPACITY: usize = 32;

/// State owned exclusively by the owner thread.
pub struct OwnerState {
    pub arena: ObjectArena,
    pub context: SessionContext,
    pub persister: Box<dyn Persister>,
}

impl OwnerState {
    pub fn new(persister: Box<dyn Persister>) -> Self {
        Self {
            arena: ObjectArena::new(),
            context: SessionContext::new(),
            persister,
        }
    }

    /// Persist every object in the dirty set, then clear it.
    ///
    /// Failures are logged and swallowed: the command that triggered the
    /// flush already has its response. Handles whose object has since been
    /// destroyed are skipped.
    pub fn flush_dirty(&mut self) {
        for handle in self.context.take_dirty() {
            match self.arena.get(handle) {
                Some(object) => {
                    if let Err(e) = self.persister.persist(handle, object) {
                        warn!(object = %object.name, "persist failed: {}", e);
                    }
                }
                None => debug!(%handle, "skipping persist of destroyed object"),
            }
        }
    }
}

impl Default for OwnerState {
    fn default() -> Self {
        Self::new(Box::new(NullPersister))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OwnerError {
    /// The job panicked; the panic was contained on the owner thread.
    #[error("job panicked: {0}")]
    JobPanicked(String),

    /// The owner thread has shut down.
    #[error("owner domain stopped")]
    Stopped,
}

type Job = Box<dyn FnOnce(&mut OwnerState) + Send>;

enum Msg {
    Job(Job),
    Shutdown,
}

/// Handle to the owner thread.
pub struct OwnerDomain {
    tx: Sender<Msg>,
    handle: Option<JoinHandle<()>>,
}

impl OwnerDomain {
    /// Spawn the owner thread around the given state.
    pub fn spawn(mut state: OwnerState) -> Self {
        let (tx, rx) = bounded::<Msg>(JOB_QUEUE_CAPACITY);

        let handle = thread::Builder::new()
            .name("edbridge-owner".into())
            .spawn(move || {
                for msg in rx {
                    match msg {
                        Msg::Job(job) => job(&mut state),
                        Msg::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn owner thread");

        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Run a closure on the owner domain, blocking until it completes.
    ///
    /// The closure's panics are contained and reported as
    /// [`OwnerError::JobPanicked`].
    pub fn run<R, F>(&self, f: F) -> Result<R, OwnerError>
    where
        R: Send + 'static,
        F: FnOnce(&mut OwnerState) -> R + Send + 'static,
    {
        let (result_tx, result_rx) = bounded(1);
        let job: Job = Box::new(move |state: &mut OwnerState| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(state)))
                .map_err(|payload| panic_message(payload.as_ref()));
            let _ = result_tx.send(outcome);
        });

        self.tx
            .send(Msg::Job(job))
            .map_err(|_| OwnerError::Stopped)?;

        match result_rx.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(OwnerError::JobPanicked(message)),
            Err(_) => Err(OwnerError::Stopped),
        }
    }

    /// Stop the owner thread and wait for it. Idempotent.
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OwnerDomain {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectHandle, StoredObject};

    #[test]
    fn test_run_returns_value() {
        let owner = OwnerDomain::spawn(OwnerState::default());
        let count = owner.run(|state| state.arena.len()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_state_persists_across_jobs() {
        let owner = OwnerDomain::spawn(OwnerState::default());

        let handle = owner
            .run(|state| state.arena.insert(StoredObject::new("BP_Door", "Blueprint")))
            .unwrap();
        let name = owner
            .run(move |state| state.arena.get(handle).map(|o| o.name.clone()))
            .unwrap();
        assert_eq!(name.as_deref(), Some("BP_Door"));
    }

    #[test]
    fn test_jobs_run_in_submission_order() {
        let owner = OwnerDomain::spawn(OwnerState::default());

        for i in 0..10u32 {
            let obj = StoredObject::new(format!("obj_{}", i), "Node");
            owner.run(move |state| state.arena.insert(obj)).unwrap();
        }
        let len = owner.run(|state| state.arena.len()).unwrap();
        assert_eq!(len, 10);
    }

    #[test]
    fn test_panic_is_contained() {
        let owner = OwnerDomain::spawn(OwnerState::default());

        let err = owner
            .run(|_state| -> u32 { panic!("boom in handler") })
            .unwrap_err();
        assert_eq!(err, OwnerError::JobPanicked("boom in handler".into()));

        // Owner thread survived and still serves jobs.
        assert_eq!(owner.run(|state| state.arena.len()).unwrap(), 0);
    }

    #[test]
    fn test_run_after_shutdown() {
        let mut owner = OwnerDomain::spawn(OwnerState::default());
        owner.shutdown();
        owner.shutdown(); // idempotent

        let err = owner.run(|state| state.arena.len()).unwrap_err();
        assert_eq!(err, OwnerError::Stopped);
    }

    #[test]
    fn test_flush_dirty_skips_destroyed_objects() {
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct Recording(Arc<Mutex<Vec<String>>>);

        impl Persister for Recording {
            fn persist(&mut self, _h: ObjectHandle, o: &StoredObject) -> Result<(), String> {
                self.0.lock().unwrap().push(o.name.clone());
                Ok(())
            }
        }

        let saved = Arc::new(Mutex::new(Vec::new()));
        let mut state = OwnerState::new(Box::new(Recording(Arc::clone(&saved))));

        let keep = state.arena.insert(StoredObject::new("keep", "Blueprint"));
        let gone = state.arena.insert(StoredObject::new("gone", "Blueprint"));
        state.context.mark_dirty(keep);
        state.context.mark_dirty(gone);
        state.arena.destroy(gone);

        state.flush_dirty();

        assert_eq!(&*saved.lock().unwrap(), &["keep".to_string()]);
        assert_eq!(state.context.dirty_count(), 0);
    }
}
