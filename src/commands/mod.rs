//! Built-in chat commands.
//!
//! - [`server`] - `!restart`, `!stop` / `!quit`
//! - [`saves`] - `!savelist`, `!saveload <name>`
//!
//! Commands run inside the dispatch loop, so anything that waits on the
//! server (stopping, restarting, copying saves) is pushed onto its own task
//! and the command returns right away.

pub mod saves;
pub mod server;

use std::sync::Arc;

use crate::errors::CommandError;
use crate::handlers::ChatPlayer;

pub use saves::{ListSavesCommand, LoadSaveCommand};
pub use server::{RestartCommand, StopCommand};

pub trait ChatCommand: Send + Sync {
    /// Names this command answers to; the first is the primary one.
    fn names(&self) -> &[&'static str];

    fn run(&self, player: &ChatPlayer, args: &[&str]) -> Result<(), CommandError>;
}

/// Every built-in command, ready to register.
pub fn builtin() -> Vec<Arc<dyn ChatCommand>> {
    vec![
        Arc::new(RestartCommand),
        Arc::new(StopCommand),
        Arc::new(ListSavesCommand),
        Arc::new(LoadSaveCommand),
    ]
}
