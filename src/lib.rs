//! Edbridge - remote command bridge for a blueprint editor
//!
//! A long-lived TCP bridge that lets external tooling drive a stateful,
//! non-reentrant editor application over length-prefixed JSON frames. The
//! crate provides the transport, the command dispatch pipeline with fault
//! containment, and the session context that lets stateless requests refer
//! to objects created by earlier requests ("current blueprint", "$last").
//!
//! What a command *does* is supplied by the embedding application through
//! [`command::CommandRegistry`]; this crate only guarantees how and when it
//! runs and what happens on failure:
//!
//! - all state mutation happens on one owner thread ([`owner::OwnerDomain`]),
//!   reached by message passing, so no two commands ever run concurrently;
//! - a panicking handler degrades to an error response, never a dead server;
//! - one response per request, in receipt order, on the same connection.

pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod object;
pub mod owner;
pub mod persist;
pub mod protocol;
pub mod server;

pub use command::{Command, CommandRegistry};
pub use config::BridgeConfig;
pub use context::SessionContext;
pub use dispatch::Dispatcher;
pub use error::{BridgeError, Result};
pub use object::{ObjectArena, ObjectHandle, StoredObject};
pub use owner::{OwnerDomain, OwnerState};
pub use persist::{JsonFilePersister, NullPersister, Persister};
pub use protocol::{Request, Response};
pub use server::BridgeServer;
