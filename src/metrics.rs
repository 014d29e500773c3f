//! Command latency metrics
//!
//! Lightweight, thread-safe collection for the bridge: latency percentiles
//! over a rolling window, error counts, and a ring of recent slow commands.
//! Collection is optional; the server carries an `Option<Arc<Metrics>>` and
//! skips recording when disabled.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Rolling window of recent command latencies for percentile calculation.
const LATENCY_WINDOW_SIZE: usize = 1000;

/// Only the most recent slow commands are retained.
const MAX_SLOW_COMMANDS: usize = 10;

/// Commands taking at least this long are tracked as slow.
pub const SLOW_COMMAND_THRESHOLD_MS: u64 = 100;

/// Thread-safe command metrics collector.
pub struct Metrics {
    command_count: AtomicU64,
    error_count: AtomicU64,
    slow_command_count: AtomicU64,

    /// Rolling latency window; mutex-protected since VecDeque isn't atomic.
    latencies_ms: Mutex<VecDeque<u64>>,
    latency_sum_ms: AtomicU64,

    slow_commands: Mutex<VecDeque<SlowCommand>>,

    started_at: Instant,
}

/// A recorded slow command.
#[derive(Clone, Debug, PartialEq)]
pub struct SlowCommand {
    pub command: String,
    pub duration_ms: u64,
    /// Milliseconds since metrics collection started.
    pub timestamp_ms: u64,
}

/// Point-in-time copy of all metrics, safe to serialize or log.
#[derive(Clone, Debug, Default)]
pub struct MetricsSnapshot {
    pub command_count: u64,
    pub error_count: u64,
    pub slow_command_count: u64,
    pub latency_p50_ms: u64,
    pub latency_p95_ms: u64,
    pub latency_p99_ms: u64,
    pub latency_avg_ms: u64,
    pub top_slow_commands: Vec<SlowCommand>,
    pub uptime_secs: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            command_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            slow_command_count: AtomicU64::new(0),
            latencies_ms: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            latency_sum_ms: AtomicU64::new(0),
            slow_commands: Mutex::new(VecDeque::with_capacity(MAX_SLOW_COMMANDS)),
            started_at: Instant::now(),
        }
    }

    /// Record one completed command.
    pub fn record_command(&self, command: &str, duration_ms: u64, is_error: bool) {
        self.command_count.fetch_add(1, Ordering::Relaxed);
        if is_error {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }

        {
            let mut latencies = self.latencies_ms.lock().unwrap();
            if latencies.len() >= LATENCY_WINDOW_SIZE {
                if let Some(old) = latencies.pop_front() {
                    self.latency_sum_ms.fetch_sub(old, Ordering::Relaxed);
                }
            }
            latencies.push_back(duration_ms);
            self.latency_sum_ms.fetch_add(duration_ms, Ordering::Relaxed);
        }

        if duration_ms >= SLOW_COMMAND_THRESHOLD_MS {
            self.slow_command_count.fetch_add(1, Ordering::Relaxed);

            let slow = SlowCommand {
                command: command.to_string(),
                duration_ms,
                timestamp_ms: self.started_at.elapsed().as_millis() as u64,
            };
            let mut slow_commands = self.slow_commands.lock().unwrap();
            if slow_commands.len() >= MAX_SLOW_COMMANDS {
                slow_commands.pop_front();
            }
            slow_commands.push_back(slow);
        }
    }

    /// Get a snapshot of current metrics.
    ///
    /// O(window size) for the percentile sort; done on demand, not per
    /// command.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let (p50, p95, p99, avg) = {
            let latencies = self.latencies_ms.lock().unwrap();
            if latencies.is_empty() {
                (0, 0, 0, 0)
            } else {
                let mut sorted: Vec<u64> = latencies.iter().copied().collect();
                sorted.sort_unstable();

                let len = sorted.len();
                let p50 = sorted[len * 50 / 100];
                let p95 = sorted[len * 95 / 100];
                let p99 = sorted.get(len * 99 / 100).copied().unwrap_or(sorted[len - 1]);
                let avg = self.latency_sum_ms.load(Ordering::Relaxed) / len as u64;
                (p50, p95, p99, avg)
            }
        };

        let top_slow = {
            let slow = self.slow_commands.lock().unwrap();
            slow.iter().cloned().collect()
        };

        MetricsSnapshot {
            command_count: self.command_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            slow_command_count: self.slow_command_count.load(Ordering::Relaxed),
            latency_p50_ms: p50,
            latency_p95_ms: p95,
            latency_p99_ms: p99,
            latency_avg_ms: avg,
            top_slow_commands: top_slow,
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
