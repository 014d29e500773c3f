//! Command dispatch pipeline
//!
//! One entry point, [`Dispatcher::dispatch`], invoked by the transport once
//! per decoded request. The pipeline is fixed:
//!
//! 1. lookup: unknown names fail fast, nothing else runs
//! 2. validate: handler precondition check, side-effect free
//! 3. execute: the mutation, on the owner domain, inside the panic boundary
//! 4. post-validate: optional consistency check; failures do NOT roll back
//!    the mutation (at-least-applied, not atomic)
//! 5. conditional persist: flush the dirty set; failures are logged only
//!
//! Each failing stage short-circuits the rest; no stage is ever retried.
//! Whatever happens, the caller gets exactly one well-formed [`Response`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::command::{Command, CommandRegistry};
use crate::error::BridgeError;
use crate::owner::{OwnerDomain, OwnerError, OwnerState};
use crate::protocol::Response;

/// Reserved command that snapshots the session context.
pub const GET_CONTEXT: &str = "get_context";

/// Reserved command that resets the session context.
pub const CLEAR_CONTEXT: &str = "clear_context";

pub struct Dispatcher {
    registry: CommandRegistry,
    owner: OwnerDomain,
}

impl Dispatcher {
    pub fn new(registry: CommandRegistry, owner: OwnerDomain) -> Self {
        Self { registry, owner }
    }

    /// Run one request through the pipeline and produce its response.
    pub fn dispatch(&self, command: &str, params: Value) -> Response {
        // Context introspection is reserved, not registered: the snapshot
        // must be computed on the owner domain like any other state read.
        match command {
            GET_CONTEXT => {
                return self.on_owner(command, |state| {
                    Ok(state.context.snapshot(&state.arena))
                });
            }
            CLEAR_CONTEXT => {
                return self.on_owner(command, |state| {
                    state.context.reset();
                    Ok(Value::Object(Default::default()))
                });
            }
            _ => {}
        }

        let handler = match self.registry.get(command) {
            Some(handler) => Arc::clone(handler),
            None => {
                debug!(command, "unknown command");
                return Response::from(&BridgeError::UnknownCommand(command.to_string()));
            }
        };

        self.on_owner(command, move |state| run_pipeline(handler.as_ref(), &params, state))
    }

    /// Post a pipeline step to the owner domain and map owner-level failures
    /// onto the wire taxonomy.
    fn on_owner<F>(&self, command: &str, f: F) -> Response
    where
        F: FnOnce(&mut OwnerState) -> Result<Value, BridgeError> + Send + 'static,
    {
        match self.owner.run(f) {
            Ok(Ok(result)) => Response::success(result),
            Ok(Err(err)) => Response::from(&err),
            Err(OwnerError::JobPanicked(message)) => {
                warn!(command, %message, "panic contained in command handler");
                Response::from(&BridgeError::CrashPrevented {
                    command: command.to_string(),
                    message,
                })
            }
            Err(OwnerError::Stopped) => {
                Response::from(&BridgeError::ExecutionFailed("owner domain unavailable".into()))
            }
        }
    }
}

/// Stages 2–5, run as one owner-domain job.
fn run_pipeline(
    handler: &dyn Command,
    params: &Value,
    state: &mut OwnerState,
) -> Result<Value, BridgeError> {
    handler
        .validate(params, state)
        .map_err(BridgeError::ValidationFailed)?;

    let result = handler
        .execute(params, state)
        .map_err(BridgeError::ExecutionFailed)?;

    handler
        .post_validate(state)
        .map_err(BridgeError::PostValidationFailed)?;

    if handler.requires_persist() {
        state.flush_dirty();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::required_str;
    use crate::object::{ObjectHandle, StoredObject};
    use crate::persist::Persister;
    use serde_json::json;
    use std::sync::Mutex;

    /// Creates an object, aliases it, marks it dirty.
    struct CreateNode;

    impl Command for CreateNode {
        fn name(&self) -> &str {
            "create_node"
        }
        fn validate(&self, params: &Value, _state: &OwnerState) -> Result<(), String> {
            required_str(params, "name").map(|_| ())
        }
        fn execute(&self, params: &Value, state: &mut OwnerState) -> Result<Value, String> {
            let name = required_str(params, "name")?;
            let handle = state.arena.insert(StoredObject::new(name, "Node"));
            state.context.register_alias(name, handle);
            state.context.mark_dirty(handle);
            Ok(json!({ "node_id": handle.to_string() }))
        }
    }

    /// Mutates, then fails post-validation.
    struct BrokenPostValidate;

    impl Command for BrokenPostValidate {
        fn name(&self) -> &str {
            "broken_post_validate"
        }
        fn validate(&self, _params: &Value, _state: &OwnerState) -> Result<(), String> {
            Ok(())
        }
        fn execute(&self, _params: &Value, state: &mut OwnerState) -> Result<Value, String> {
            let handle = state.arena.insert(StoredObject::new("orphan", "Node"));
            state.context.register_alias("orphan", handle);
            Ok(json!({}))
        }
        fn post_validate(&self, _state: &OwnerState) -> Result<(), String> {
            Err("graph has dangling pins".into())
        }
    }

    /// Panics mid-execute.
    struct Crasher;

    impl Command for Crasher {
        fn name(&self) -> &str {
            "crasher"
        }
        fn validate(&self, _params: &Value, _state: &OwnerState) -> Result<(), String> {
            Ok(())
        }
        fn execute(&self, _params: &Value, _state: &mut OwnerState) -> Result<Value, String> {
            panic!("simulated access violation");
        }
    }

    #[derive(Default)]
    struct RecordingPersister(Arc<Mutex<Vec<String>>>);

    impl Persister for RecordingPersister {
        fn persist(&mut self, _h: ObjectHandle, o: &StoredObject) -> Result<(), String> {
            self.0.lock().unwrap().push(o.name.clone());
            Ok(())
        }
    }

    struct FailingPersister;

    impl Persister for FailingPersister {
        fn persist(&mut self, _h: ObjectHandle, _o: &StoredObject) -> Result<(), String> {
            Err("disk full".into())
        }
    }

    fn dispatcher_with(
        persister: Box<dyn Persister>,
        setup: impl FnOnce(&mut CommandRegistry),
    ) -> Dispatcher {
        let mut registry = CommandRegistry::new();
        setup(&mut registry);
        Dispatcher::new(registry, OwnerDomain::spawn(OwnerState::new(persister)))
    }

    #[test]
    fn test_unknown_command() {
        let dispatcher = dispatcher_with(Box::new(crate::persist::NullPersister), |_| {});

        let resp = dispatcher.dispatch("does_not_exist", json!({}));
        match resp {
            Response::Error { error_type, .. } => assert_eq!(error_type, "unknown_command"),
            _ => panic!("expected error response"),
        }

        // Registry miss must not touch session state.
        let snap = dispatcher.dispatch(GET_CONTEXT, json!({}));
        match snap {
            Response::Success { result } => {
                assert_eq!(result["alias_count"], 0);
                assert_eq!(result["dirty_count"], 0);
            }
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn test_validation_failure_skips_execute() {
        let dispatcher = dispatcher_with(Box::new(crate::persist::NullPersister), |r| {
            r.register("create_node", Arc::new(CreateNode));
        });

        let resp = dispatcher.dispatch("create_node", json!({}));
        match resp {
            Response::Error { error, error_type } => {
                assert_eq!(error_type, "validation_failed");
                assert!(error.contains("'name'"));
            }
            _ => panic!("expected error response"),
        }

        // Execute never ran: nothing created.
        match dispatcher.dispatch(GET_CONTEXT, json!({})) {
            Response::Success { result } => assert_eq!(result["alias_count"], 0),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn test_successful_dispatch_persists_dirty_set() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let recorder = RecordingPersister(Arc::clone(&saved));
        let dispatcher = dispatcher_with(Box::new(recorder), |r| {
            r.register("create_node", Arc::new(CreateNode));
        });

        let resp = dispatcher.dispatch("create_node", json!({"name": "Branch_1"}));
        assert!(resp.is_success());

        assert_eq!(&*saved.lock().unwrap(), &["Branch_1".to_string()]);
        // Dirty set was drained by the flush.
        match dispatcher.dispatch(GET_CONTEXT, json!({})) {
            Response::Success { result } => {
                assert_eq!(result["dirty_count"], 0);
                assert_eq!(result["alias_count"], 1);
            }
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn test_persist_failure_does_not_change_response() {
        let dispatcher = dispatcher_with(Box::new(FailingPersister), |r| {
            r.register("create_node", Arc::new(CreateNode));
        });

        let resp = dispatcher.dispatch("create_node", json!({"name": "Branch_1"}));
        assert!(resp.is_success(), "persist failures are logged, not surfaced");
    }

    #[test]
    fn test_crash_prevented() {
        let dispatcher = dispatcher_with(Box::new(crate::persist::NullPersister), |r| {
            r.register("crasher", Arc::new(Crasher));
            r.register("create_node", Arc::new(CreateNode));
        });

        let resp = dispatcher.dispatch("crasher", json!({}));
        match resp {
            Response::Error { error, error_type } => {
                assert_eq!(error_type, "crash_prevented");
                assert!(error.contains("crasher"));
            }
            _ => panic!("expected error response"),
        }

        // The owner domain survived; later commands still work.
        let resp = dispatcher.dispatch("create_node", json!({"name": "after_crash"}));
        assert!(resp.is_success());
    }

    #[test]
    fn test_post_validate_failure_keeps_mutation() {
        let dispatcher = dispatcher_with(Box::new(crate::persist::NullPersister), |r| {
            r.register("broken_post_validate", Arc::new(BrokenPostValidate));
        });

        let resp = dispatcher.dispatch("broken_post_validate", json!({}));
        match resp {
            Response::Error { error_type, .. } => {
                assert_eq!(error_type, "post_validation_failed")
            }
            _ => panic!("expected error response"),
        }

        // The execute-stage mutation is still applied.
        match dispatcher.dispatch(GET_CONTEXT, json!({})) {
            Response::Success { result } => assert_eq!(result["alias_count"], 1),
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn test_effects_visible_to_next_command() {
        let dispatcher = dispatcher_with(Box::new(crate::persist::NullPersister), |r| {
            r.register("create_node", Arc::new(CreateNode));
        });

        dispatcher.dispatch("create_node", json!({"name": "n1"}));
        dispatcher.dispatch("create_node", json!({"name": "n2"}));

        match dispatcher.dispatch(GET_CONTEXT, json!({})) {
            Response::Success { result } => {
                assert_eq!(result["alias_count"], 2);
                // $last points at n2's handle, which the snapshot reports.
                assert!(result.get("last_node_id").is_some());
            }
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn test_clear_context() {
        let dispatcher = dispatcher_with(Box::new(crate::persist::NullPersister), |r| {
            r.register("create_node", Arc::new(CreateNode));
        });

        dispatcher.dispatch("create_node", json!({"name": "n1"}));
        assert!(dispatcher.dispatch(CLEAR_CONTEXT, json!({})).is_success());

        match dispatcher.dispatch(GET_CONTEXT, json!({})) {
            Response::Success { result } => {
                assert_eq!(result["alias_count"], 0);
                assert_eq!(result["dirty_count"], 0);
                assert_eq!(result["current_blueprint"], Value::Null);
            }
            _ => panic!("expected success"),
        }
    }
}
