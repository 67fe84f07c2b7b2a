//! Termination signals.
//!
//! SIGINT, SIGHUP and SIGTERM all mean the same thing: ask the server to
//! stop and let the dispatch loop finish once its output ends. Container
//! runtimes deliver these to PID 1, which is us, not the server.

use log::info;

use super::Supervisor;

/// Install the handlers and forward every signal to
/// [`Supervisor::shutdown`] on a background task.
pub fn spawn_signal_listener(supervisor: Supervisor) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sighup.recv() => "SIGHUP",
                    _ = sigterm.recv() => "SIGTERM",
                };
                info!("Received {}; stopping server", name);
                supervisor.shutdown();
            }
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C; stopping server");
                supervisor.shutdown();
            }
        });
    }

    Ok(())
}
