use thiserror::Error;

/// Errors raised by the process supervisor itself.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The child could not be launched (bad argv, missing executable, ...).
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// Wrapper around IO errors on the child's pipes.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Switching to the unprivileged account failed.
    #[error("privilege drop failed: {0}")]
    Privileges(String),

    /// `run` was entered a second time on the same supervisor.
    #[error("dispatch loop already running")]
    AlreadyRunning,

    /// The dispatch loop has returned, so a new server would go unrelayed.
    #[error("dispatch loop has finished; not starting the server")]
    RelayClosed,
}

/// Failure inside a console line or chat handler. Logged by the dispatch
/// loop, never fatal.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{handler} failed: {reason}")]
    Failed {
        handler: &'static str,
        reason: String,
    },
}

/// Failure inside a chat command. The message is shown to the invoking player.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("save not found: {0}")]
    SaveNotFound(String),

    #[error("invalid save name: {0}")]
    InvalidSaveName(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}
