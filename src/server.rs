//! TCP transport
//!
//! Accepts one client at a time and runs a blocking receive/dispatch/send
//! loop for the lifetime of that connection. Deliberately single-flight: a
//! second client is not refused, it simply waits in the backlog until the
//! acceptor polls again after the first disconnects. Command ordering across
//! the whole server is therefore exactly receipt order.
//!
//! Transport failures (bad frame length, socket errors) end the affected
//! connection and nothing else. Failures inside command handling belong to
//! the dispatcher and never surface as transport failures.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, ACCEPT_POLL_INTERVAL, DATA_POLL_INTERVAL};
use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, Result};
use crate::metrics::{Metrics, SLOW_COMMAND_THRESHOLD_MS};
use crate::protocol::{self, Request, Response};

/// Liveness probe, answered on the transport thread.
pub const PING: &str = "ping";

/// Explicit disconnect: one reply, then the server closes the socket.
pub const CLOSE: &str = "close";

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// The running server. Dropping it stops the acceptor.
pub struct BridgeServer {
    stop: Arc<AtomicBool>,
    local_addr: SocketAddr,
    handle: Option<JoinHandle<()>>,
}

impl BridgeServer {
    /// Bind and start the acceptor thread.
    pub fn start(
        config: BridgeConfig,
        dispatcher: Arc<Dispatcher>,
        metrics: Option<Arc<Metrics>>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((config.host, config.port)).map_err(|source| {
            BridgeError::Bind {
                port: config.port,
                source,
            }
        })?;
        // Non-blocking accept so the loop can observe the stop flag within
        // one poll interval.
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("edbridge-acceptor".into())
            .spawn(move || accept_loop(listener, config, dispatcher, metrics, stop_flag))?;

        info!(%local_addr, "bridge listening");
        Ok(Self {
            stop,
            local_addr,
            handle: Some(handle),
        })
    }

    /// Address actually bound; useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Signal the acceptor to exit and wait for it. Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for BridgeServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    config: BridgeConfig,
    dispatcher: Arc<Dispatcher>,
    metrics: Option<Arc<Metrics>>,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst);
                info!(client_id, %peer, "client connected");
                // Serviced synchronously: this thread does nothing else
                // until the client disconnects.
                if let Err(e) = handle_client(stream, &config, &dispatcher, metrics.as_deref(), &stop)
                {
                    warn!(client_id, "connection error: {}", e);
                }
                info!(client_id, "client disconnected");
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                warn!("accept error: {}", e);
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
}

fn handle_client(
    mut stream: TcpStream,
    config: &BridgeConfig,
    dispatcher: &Dispatcher,
    metrics: Option<&Metrics>,
    stop: &AtomicBool,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let mut last_activity = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        if last_activity.elapsed() > config.idle_timeout {
            warn!("client connection timed out");
            return Ok(());
        }

        // Check for available data without committing to a blocking read,
        // so the idle deadline and stop flag stay live.
        stream.set_nonblocking(true)?;
        let mut probe = [0u8; 1];
        match stream.peek(&mut probe) {
            Ok(0) => return Ok(()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(DATA_POLL_INTERVAL);
                continue;
            }
            Err(e) => return Err(e),
        }
        stream.set_nonblocking(false)?;

        let frame = match protocol::read_frame(&mut stream, config.max_frame_size)? {
            Some(frame) => frame,
            None => return Ok(()),
        };
        last_activity = Instant::now();

        // Malformed JSON or a missing type never reaches the registry.
        let request = match Request::parse(&frame) {
            Ok(request) => request,
            Err(e) => {
                protocol::write_response(&mut stream, &Response::from(&e))?;
                continue;
            }
        };

        // Fast paths answered without engaging the pipeline.
        match request.command.as_str() {
            PING => {
                protocol::write_response(&mut stream, &Response::success(json!({"pong": true})))?;
                continue;
            }
            CLOSE => {
                debug!("client requested disconnect");
                protocol::write_response(&mut stream, &Response::success(json!({"closed": true})))?;
                return Ok(());
            }
            _ => {}
        }

        let started = Instant::now();
        let response = dispatcher.dispatch(&request.command, request.params);
        let duration_ms = started.elapsed().as_millis() as u64;

        if let Some(metrics) = metrics {
            metrics.record_command(&request.command, duration_ms, !response.is_success());
        }
        if duration_ms >= SLOW_COMMAND_THRESHOLD_MS {
            warn!(command = %request.command, duration_ms, "slow command");
        }

        protocol::write_response(&mut stream, &response)?;
    }

    Ok(())
}
