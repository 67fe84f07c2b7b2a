//! Server lifecycle commands.

use log::error;

use super::ChatCommand;
use crate::errors::CommandError;
use crate::handlers::ChatPlayer;

/// `!restart` - stop the server and start it again.
pub struct RestartCommand;

impl ChatCommand for RestartCommand {
    fn names(&self) -> &[&'static str] {
        &["restart"]
    }

    fn run(&self, player: &ChatPlayer, _args: &[&str]) -> Result<(), CommandError> {
        let supervisor = player.supervisor().clone();
        tokio::spawn(async move {
            if let Err(e) = supervisor.restart().await {
                error!("Server restart failed: {}", e);
            }
        });
        Ok(())
    }
}

/// `!stop` / `!quit` - stop the server; the supervisor exits with it.
pub struct StopCommand;

impl ChatCommand for StopCommand {
    fn names(&self) -> &[&'static str] {
        &["stop", "quit"]
    }

    fn run(&self, player: &ChatPlayer, _args: &[&str]) -> Result<(), CommandError> {
        let supervisor = player.supervisor().clone();
        tokio::spawn(async move { supervisor.stop() });
        Ok(())
    }
}
