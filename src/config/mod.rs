//! # Configuration Management Module
//!
//! Settings for the supervisor, the auto-pause handler, the save directory
//! used by the save commands, and logging.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [supervisor]
//! poll_interval_ms = 100
//! forward_stdin = true
//! run_as_user = "factorio"
//!
//! [autopause]
//! enabled = false
//!
//! [saves]
//! dir = "/factorio/saves"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! ## Environment Integration
//!
//! The container image configures the entrypoint through environment
//! variables, which override the file after it is loaded:
//!
//! - `PAUSE_DURING_JOIN` - enables auto-pause unless empty or `false`
//! - `SAVES` - save directory
//!
//! Precedence: Environment > Config file > Defaults

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub autopause: AutoPauseConfig,
    #[serde(default)]
    pub saves: SavesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Delay between dispatch loop polls (ms). Must be > 0.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Relay the supervisor's own stdin to the server console.
    #[serde(default = "default_forward_stdin")]
    pub forward_stdin: bool,
    /// Account to switch to before spawning the server when started as root.
    #[serde(default = "default_run_as_user")]
    pub run_as_user: String,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_forward_stdin() -> bool {
    true
}

fn default_run_as_user() -> String {
    "factorio".to_string()
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            forward_stdin: default_forward_stdin(),
            run_as_user: default_run_as_user(),
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AutoPauseConfig {
    /// Pause the game while a player is joining.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavesConfig {
    #[serde(default = "default_saves_dir")]
    pub dir: PathBuf,
}

fn default_saves_dir() -> PathBuf {
    PathBuf::from("/factorio/saves")
}

impl Default for SavesConfig {
    fn default() -> Self {
        Self {
            dir: default_saves_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parse `level`, falling back to `Info` for unknown names.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            supervisor: SupervisorConfig::default(),
            autopause: AutoPauseConfig::default(),
            saves: SavesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Interpret a `PAUSE_DURING_JOIN`-style flag: anything except an empty
/// string or `false` (any case) turns it on. Whitespace counts as a value.
pub fn env_flag_enabled(value: &str) -> bool {
    !value.is_empty() && !value.eq_ignore_ascii_case("false")
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; `apply_env` passes the process
    /// environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(flag) = lookup("PAUSE_DURING_JOIN") {
            self.autopause.enabled = env_flag_enabled(&flag);
        }
        if let Some(dir) = lookup("SAVES") {
            if !dir.trim().is_empty() {
                self.saves.dir = PathBuf::from(dir);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.supervisor.poll_interval_ms == 0 {
            return Err(anyhow!("supervisor.poll_interval_ms must be greater than 0"));
        }
        if self.saves.dir.as_os_str().is_empty() {
            return Err(anyhow!("saves.dir must not be empty"));
        }
        Ok(())
    }
}
