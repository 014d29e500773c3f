//! Error types for the bridge

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Missing 'type' field")]
    MissingType,

    #[error("Unknown command type: {0}")]
    UnknownCommand(String),

    #[error("{0}")]
    ValidationFailed(String),

    #[error("{0}")]
    ExecutionFailed(String),

    #[error("CRASH PREVENTED: panic in '{command}': {message}. Operation aborted safely.")]
    CrashPrevented { command: String, message: String },

    #[error("{0}")]
    PostValidationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Get the `error_type` code for the wire protocol.
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::Bind { .. } => "bind_error",
            BridgeError::InvalidJson(_) | BridgeError::MissingType => "invalid_request",
            BridgeError::UnknownCommand(_) => "unknown_command",
            BridgeError::ValidationFailed(_) => "validation_failed",
            BridgeError::CrashPrevented { .. } => "crash_prevented",
            BridgeError::PostValidationFailed(_) => "post_validation_failed",
            // Handler-reported execute failures keep the generic code; the
            // handler's message carries the detail.
            BridgeError::ExecutionFailed(_) => "error",
            BridgeError::Io(_) => "error",
        }
    }
}
