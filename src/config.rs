//! Server configuration
//!
//! Defaults match the editor plugin this bridge fronts: one well-known port,
//! a 60 second idle timeout for stale clients, and a 1 MiB frame cap.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 55558;

/// Idle connections are dropped after this long without a complete frame.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum accepted frame payload size.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Sleep between data-availability polls on an open connection.
pub const DATA_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sleep between accept polls, and the bound on how long `stop()` can go
/// unobserved by the acceptor loop.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a [`BridgeServer`](crate::server::BridgeServer).
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address to bind.
    pub host: IpAddr,
    /// Port to bind. Use 0 to let the OS pick (tests).
    pub port: u16,
    /// How long a connection may sit idle before the server closes it.
    pub idle_timeout: Duration,
    /// Frames longer than this terminate the connection.
    pub max_frame_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Config bound to an ephemeral port, for tests.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            ..Self::default()
        }
    }
}
