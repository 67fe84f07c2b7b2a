//! # factorio-supervisor - Container entrypoint for a headless Factorio server
//!
//! Launches the server as a child process, relays its console, and reacts to
//! a handful of log lines.
//!
//! ## Features
//!
//! - **Console relay**: server stdout/stderr are echoed unchanged; the
//!   container's stdin is forwarded to the server console.
//! - **Auto-pause**: optionally pauses the game while a player is joining.
//! - **Chat commands**: `!restart`, `!stop`/`!quit`, `!savelist`,
//!   `!saveload <name>`, answered privately to the player.
//! - **Graceful stop**: SIGINT/SIGHUP/SIGTERM interrupt the server and wait
//!   for it to save and exit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use factorio_supervisor::config::Config;
//! use factorio_supervisor::handlers::HandlerSet;
//! use factorio_supervisor::supervisor::Supervisor;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let argv = vec!["/opt/factorio/bin/x64/factorio".to_string(), "--start-server-load-latest".to_string()];
//!     let supervisor = Supervisor::new(&config, argv);
//!     supervisor.run(HandlerSet::standard(&config), None).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`supervisor`] - child process, line readers, dispatch loop, signals
//! - [`handlers`] - line/chat handler traits, auto-pause, chat dispatcher
//! - [`commands`] - built-in chat commands
//! - [`config`] - TOML configuration and environment overrides
//! - [`errors`] - error types
//! - [`metrics`] - process-wide counters

pub mod commands;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod logutil;
pub mod metrics;
pub mod supervisor;
