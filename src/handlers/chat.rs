//! Chat command dispatcher.
//!
//! Players type `!command arg1 arg2` in the in-game chat. The first token is
//! matched case-insensitively against the registered command names; aliases
//! are just extra names pointing at the same command. Everything the
//! dispatcher says goes back to the sender as a whisper, never to the whole
//! server.

use log::{error, info, trace};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{ChatHandler, ChatPlayer};
use crate::commands::{self, ChatCommand};
use crate::errors::HandlerError;
use crate::metrics;

/// Marks a chat message as a command.
pub const COMMAND_PREFIX: char = '!';

/// A chat message split into command name and arguments.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandInvocation<'a> {
    /// Lowercased command name (may be empty for a bare `!`).
    pub name: String,
    pub args: Vec<&'a str>,
}

impl<'a> CommandInvocation<'a> {
    /// `None` unless the message starts with [`COMMAND_PREFIX`]. Splits on
    /// single spaces, so repeated spaces yield empty arguments.
    pub fn parse(message: &'a str) -> Option<Self> {
        let body = message.strip_prefix(COMMAND_PREFIX)?;
        let mut tokens = body.split(' ');
        let name = tokens.next().unwrap_or_default().to_lowercase();
        trace!("Parsed command '{}' from '{}'", name, message);
        Some(Self {
            name,
            args: tokens.collect(),
        })
    }
}

#[derive(Default)]
pub struct ChatCommandDispatcher {
    commands: BTreeMap<String, Arc<dyn ChatCommand>>,
}

impl ChatCommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatcher with restart, stop/quit, savelist and saveload registered.
    pub fn with_builtin_commands() -> Self {
        let mut dispatcher = Self::new();
        for command in commands::builtin() {
            dispatcher.register(command);
        }
        dispatcher
    }

    /// Register `command` under each of its names. A later registration
    /// replaces an earlier one with the same name.
    pub fn register(&mut self, command: Arc<dyn ChatCommand>) {
        for name in command.names() {
            self.commands.insert(name.to_lowercase(), command.clone());
        }
    }

    pub fn command_names(&self) -> Vec<&str> {
        self.commands.keys().map(String::as_str).collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<dyn ChatCommand>> {
        self.commands.get(&name.to_lowercase())
    }
}

impl ChatHandler for ChatCommandDispatcher {
    fn name(&self) -> &'static str {
        "chat-commands"
    }

    fn handle_chat(&mut self, player: &ChatPlayer, message: &str) -> Result<(), HandlerError> {
        let Some(invocation) = CommandInvocation::parse(message) else {
            return Ok(());
        };

        let Some(command) = self.commands.get(&invocation.name) else {
            player.send_message(&format!("Unknown command: {}", invocation.name));
            return Ok(());
        };

        info!("{} ran !{} {:?}", player.name(), invocation.name, invocation.args);
        metrics::inc_commands_run();
        if let Err(e) = command.run(player, &invocation.args) {
            metrics::inc_command_errors();
            error!("!{} from {} failed: {}", invocation.name, player.name(), e);
            player.send_message(&format!("Error during command: {}", e));
        }
        Ok(())
    }
}
