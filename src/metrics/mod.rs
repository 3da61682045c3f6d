//! Metrics collection and monitoring module
//!
//! Counters go through the `metrics` facade so an embedding process can install
//! any recorder. [`RelayStats`] keeps the same numbers locally for the shutdown summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub const COMMANDS_TOTAL: &str = "craftrelay_commands_total";
pub const UNAUTHORIZED_TOTAL: &str = "craftrelay_unauthorized_total";
pub const RELAY_FAILURES_TOTAL: &str = "craftrelay_relay_failures_total";
pub const SESSIONS_STARTED_TOTAL: &str = "craftrelay_sessions_started_total";
pub const SESSIONS_FAILED_TOTAL: &str = "craftrelay_sessions_failed_total";

/// Count one dispatched command
pub fn record_command(command: &'static str) {
    ::metrics::counter!(COMMANDS_TOTAL, "command" => command).increment(1);
}

/// Count one refused sender
pub fn record_unauthorized() {
    ::metrics::counter!(UNAUTHORIZED_TOTAL).increment(1);
}

/// Count one outward send that failed
pub fn record_relay_failure() {
    ::metrics::counter!(RELAY_FAILURES_TOTAL).increment(1);
}

/// Count one bring-up attempt
pub fn record_session_start(success: bool) {
    if success {
        ::metrics::counter!(SESSIONS_STARTED_TOTAL).increment(1);
    } else {
        ::metrics::counter!(SESSIONS_FAILED_TOTAL).increment(1);
    }
}

/// In-process relay statistics
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    commands_processed: AtomicU64,
    commands_refused: AtomicU64,
    events_relayed: AtomicU64,
    relay_failures: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`]
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub commands_processed: u64,
    pub commands_refused: u64,
    pub events_relayed: u64,
    pub relay_failures: u64,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            commands_processed: AtomicU64::new(0),
            commands_refused: AtomicU64::new(0),
            events_relayed: AtomicU64::new(0),
            relay_failures: AtomicU64::new(0),
        }
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_refused(&self) {
        self.commands_refused.fetch_add(1, Ordering::Relaxed);
        record_unauthorized();
    }

    pub fn event_relayed(&self) {
        self.events_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn relay_failed(&self) {
        self.relay_failures.fetch_add(1, Ordering::Relaxed);
        record_relay_failure();
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            commands_refused: self.commands_refused.load(Ordering::Relaxed),
            events_relayed: self.events_relayed.load(Ordering::Relaxed),
            relay_failures: self.relay_failures.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}
