//! Process-wide supervisor counters, logged on shutdown.
use std::sync::atomic::{AtomicU64, Ordering};

static LINES_DISPATCHED: AtomicU64 = AtomicU64::new(0);
static HANDLER_ERRORS: AtomicU64 = AtomicU64::new(0);
static COMMANDS_RUN: AtomicU64 = AtomicU64::new(0);
static COMMAND_ERRORS: AtomicU64 = AtomicU64::new(0);
static RESTARTS: AtomicU64 = AtomicU64::new(0);
static PAUSE_TRANSITIONS: AtomicU64 = AtomicU64::new(0);

pub fn inc_lines_dispatched() {
    LINES_DISPATCHED.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_handler_errors() {
    HANDLER_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_commands_run() {
    COMMANDS_RUN.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_command_errors() {
    COMMAND_ERRORS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_restarts() {
    RESTARTS.fetch_add(1, Ordering::Relaxed);
}
pub fn inc_pause_transitions() {
    PAUSE_TRANSITIONS.fetch_add(1, Ordering::Relaxed);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub lines_dispatched: u64,
    pub handler_errors: u64,
    pub commands_run: u64,
    pub command_errors: u64,
    pub restarts: u64,
    pub pause_transitions: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        lines_dispatched: LINES_DISPATCHED.load(Ordering::Relaxed),
        handler_errors: HANDLER_ERRORS.load(Ordering::Relaxed),
        commands_run: COMMANDS_RUN.load(Ordering::Relaxed),
        command_errors: COMMAND_ERRORS.load(Ordering::Relaxed),
        restarts: RESTARTS.load(Ordering::Relaxed),
        pause_transitions: PAUSE_TRANSITIONS.load(Ordering::Relaxed),
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lines={} handler_errors={} commands={} command_errors={} restarts={} pause_transitions={}",
            self.lines_dispatched,
            self.handler_errors,
            self.commands_run,
            self.command_errors,
            self.restarts,
            self.pause_transitions
        )
    }
}
