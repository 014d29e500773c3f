//! Edbridge server binary
//!
//! Starts the bridge with the built-in commands only; domain command packs
//! register themselves through `CommandRegistry` when this crate is embedded
//! in the editor process.
//!
//! Usage:
//!   edbridge-server [--port N] [--timeout SECS] [--max-frame BYTES]
//!                   [--data-dir DIR] [--metrics]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;
use tracing_subscriber::EnvFilter;

use edbridge::command::CommandRegistry;
use edbridge::config::BridgeConfig;
use edbridge::dispatch::Dispatcher;
use edbridge::metrics::Metrics;
use edbridge::owner::{OwnerDomain, OwnerState};
use edbridge::persist::{JsonFilePersister, NullPersister, Persister};
use edbridge::server::BridgeServer;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("edbridge-server {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("edbridge-server {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Persistent TCP command bridge for driving a blueprint editor");
        println!();
        println!("Usage: edbridge-server [options]");
        println!();
        println!("Options:");
        println!("  --port N          Listening port (default: 55558)");
        println!("  --timeout SECS    Idle connection timeout (default: 60)");
        println!("  --max-frame BYTES Maximum frame size (default: 1048576)");
        println!("  --data-dir DIR    Persist dirty objects as JSON under DIR");
        println!("  --metrics         Enable command metrics collection");
        println!("  -V, --version     Print version information");
        println!("  -h, --help        Print this help message");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = BridgeConfig::default();
    if let Some(value) = flag_value(&args, "--port") {
        config.port = value.parse().context("invalid --port")?;
    }
    if let Some(value) = flag_value(&args, "--timeout") {
        config.idle_timeout = Duration::from_secs(value.parse().context("invalid --timeout")?);
    }
    if let Some(value) = flag_value(&args, "--max-frame") {
        config.max_frame_size = value.parse().context("invalid --max-frame")?;
        if config.max_frame_size == 0 {
            bail!("--max-frame must be positive");
        }
    }

    let persister: Box<dyn Persister> = match flag_value(&args, "--data-dir") {
        Some(dir) => {
            info!(%dir, "persisting dirty objects to disk");
            Box::new(JsonFilePersister::new(dir).context("failed to create data dir")?)
        }
        None => Box::new(NullPersister),
    };

    let metrics = if args.iter().any(|a| a == "--metrics") {
        info!("metrics collection enabled");
        Some(Arc::new(Metrics::new()))
    } else {
        None
    };

    // Domain command packs plug in here before the server starts serving.
    let registry = CommandRegistry::new();
    info!(commands = registry.len(), "command registry ready");

    let owner = OwnerDomain::spawn(OwnerState::new(persister));
    let dispatcher = Arc::new(Dispatcher::new(registry, owner));

    let mut server = BridgeServer::start(config, dispatcher, metrics.clone())?;

    let mut signals = Signals::new([SIGINT, SIGTERM]).context("failed to register signals")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal, "shutting down");
    }

    server.stop();
    if let Some(metrics) = metrics {
        let snap = metrics.snapshot();
        info!(
            commands = snap.command_count,
            errors = snap.error_count,
            p95_ms = snap.latency_p95_ms,
            "final metrics"
        );
    }

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1))
}
