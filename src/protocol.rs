//! Wire protocol for the bridge
//!
//! One logical message per frame, client-initiated request/response, no
//! pipelining:
//!
//! ```text
//! Frame    := [4-byte length BE] [UTF-8 JSON payload]
//! Request  := { "type": string, "params": object? }
//! Response := { "status": "success", "result": object }
//!           | { "status": "error", "error": string, "error_type": string }
//! ```
//!
//! The frame length must be in `(0, max_frame_size]`; a violating prefix is
//! not recoverable mid-stream and terminates the connection.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde_json::Value;

use crate::error::BridgeError;

// ============================================================================
// Envelopes
// ============================================================================

/// A decoded request envelope.
///
/// `params` is opaque to the core and handed to the command verbatim;
/// a request without `params` gets an empty object.
#[derive(Debug, Clone)]
pub struct Request {
    pub command: String,
    pub params: Value,
}

impl Request {
    /// Parse a request from raw frame bytes.
    ///
    /// Distinguishes malformed JSON from a structurally valid document that
    /// lacks the `type` field, so the two produce different error messages.
    pub fn parse(bytes: &[u8]) -> Result<Self, BridgeError> {
        let doc: Value = serde_json::from_slice(bytes)
            .map_err(|e| BridgeError::InvalidJson(e.to_string()))?;

        let command = doc
            .get("type")
            .and_then(Value::as_str)
            .ok_or(BridgeError::MissingType)?
            .to_string();

        let params = doc.get("params").cloned().unwrap_or_else(|| Value::Object(Default::default()));

        Ok(Request { command, params })
    }
}

/// Response to a client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    Success {
        result: Value,
    },
    Error {
        error: String,
        error_type: String,
    },
}

impl Response {
    pub fn success(result: Value) -> Self {
        Response::Success { result }
    }

    pub fn error(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Response::Error {
            error: message.into(),
            error_type: error_type.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}

impl From<&BridgeError> for Response {
    fn from(err: &BridgeError) -> Self {
        Response::Error {
            error: err.to_string(),
            error_type: err.code().to_string(),
        }
    }
}

// ============================================================================
// Frame I/O
// ============================================================================

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` on a clean disconnect (EOF before the length prefix).
/// EOF mid-payload, a zero length, or a length above `max_frame_size` are
/// errors; the caller must drop the connection.
pub fn read_frame(stream: &mut impl Read, max_frame_size: usize) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > max_frame_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid frame length: {} bytes (max {})", len, max_frame_size),
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;

    Ok(Some(buf))
}

/// Write one length-prefixed frame.
pub fn write_frame(stream: &mut impl Write, payload: &[u8]) -> io::Result<()> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(payload)?;
    stream.flush()?;
    Ok(())
}

/// Serialize a response and write it as one frame.
pub fn write_response(stream: &mut impl Write, response: &Response) -> io::Result<()> {
    let payload = serde_json::to_vec(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    write_frame(stream, &payload)
}

// ============================================================================
// Tests
// ============================================================================
