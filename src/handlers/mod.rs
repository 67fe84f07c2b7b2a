//! # Console Handlers
//!
//! Consumers of the server's console output. Two capabilities exist:
//!
//! - [`LineHandler`] sees every non-chat line (e.g. [`autopause`])
//! - [`ChatHandler`] sees parsed `[CHAT] name: message` lines (e.g. [`chat`])
//!
//! Handlers run synchronously inside the dispatch loop, in registration
//! order. An error (or panic) from one handler is logged and the next
//! handler still sees the line.

pub mod autopause;
pub mod chat;

use regex::Regex;
use std::sync::LazyLock;

use crate::config::Config;
use crate::errors::HandlerError;
use crate::supervisor::Supervisor;

pub use autopause::AutoPauseHandler;
pub use chat::ChatCommandDispatcher;

/// What a handler may do to the server while handling a line.
pub trait GameConsole {
    /// Queue a command or message for the server console.
    fn send_console(&self, line: &str);
    /// Write a notice to the supervisor's own stderr.
    fn write_stderr(&self, text: &str);
}

pub trait LineHandler: Send {
    fn name(&self) -> &'static str;

    /// Handle one console line (line ending already stripped).
    fn handle_line(&mut self, line: &str, console: &dyn GameConsole) -> Result<(), HandlerError>;

    /// Called before the first line of every newly started server process.
    fn server_started(&mut self) {}
}

pub trait ChatHandler: Send {
    fn name(&self) -> &'static str;

    fn handle_chat(&mut self, player: &ChatPlayer, message: &str) -> Result<(), HandlerError>;
}

/// The handlers driven by the dispatch loop.
#[derive(Default)]
pub struct HandlerSet {
    pub(crate) line: Vec<Box<dyn LineHandler>>,
    pub(crate) chat: Vec<Box<dyn ChatHandler>>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Auto-pause (when enabled) plus the chat command dispatcher with all
    /// built-in commands.
    pub fn standard(config: &Config) -> Self {
        let mut set = Self::new();
        if config.autopause.enabled {
            set.add_line_handler(Box::new(AutoPauseHandler::new()));
        }
        set.add_chat_handler(Box::new(ChatCommandDispatcher::with_builtin_commands()));
        set
    }

    pub fn add_line_handler(&mut self, handler: Box<dyn LineHandler>) {
        self.line.push(handler);
    }

    pub fn add_chat_handler(&mut self, handler: Box<dyn ChatHandler>) {
        self.chat.push(handler);
    }

    pub fn line_handler_names(&self) -> Vec<&'static str> {
        self.line.iter().map(|h| h.name()).collect()
    }

    pub fn chat_handler_names(&self) -> Vec<&'static str> {
        self.chat.iter().map(|h| h.name()).collect()
    }

    pub(crate) fn server_started(&mut self) {
        for handler in self.line.iter_mut() {
            handler.server_started();
        }
    }
}

static CHAT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[CHAT\] ([^:]+): (.*)$").expect("valid regex"));

/// A `[CHAT] name: message` console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine<'a> {
    pub player: &'a str,
    pub message: &'a str,
}

impl<'a> ChatLine<'a> {
    /// Extract player and message; `None` when the line has no chat entry.
    pub fn parse(line: &'a str) -> Option<Self> {
        let caps = CHAT_LINE.captures(line)?;
        let player = caps.get(1)?.as_str();
        let message = caps.get(2)?.as_str().trim();
        Some(Self { player, message })
    }
}

/// The sender of a chat message, able to be answered privately.
#[derive(Debug, Clone)]
pub struct ChatPlayer {
    name: String,
    supervisor: Supervisor,
}

impl ChatPlayer {
    pub fn new(name: impl Into<String>, supervisor: Supervisor) -> Self {
        Self {
            name: name.into(),
            supervisor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Whisper `message` to this player only.
    pub fn send_message(&self, message: &str) {
        self.supervisor
            .send_console(&format!("/whisper {} {}", self.name, message));
    }
}
