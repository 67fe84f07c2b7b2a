//! Test utilities & fixtures.
//! Builds supervisors over a throwaway save directory, and `/bin/sh` children
//! standing in for the game server.

use std::path::Path;
use std::time::Duration;

use factorio_supervisor::config::Config;
use factorio_supervisor::supervisor::Supervisor;

/// Config with a fast poll interval and saves under `saves`.
pub fn test_config(saves: &Path) -> Config {
    let mut config = Config::default();
    config.supervisor.poll_interval_ms = 10;
    config.supervisor.forward_stdin = false;
    config.saves.dir = saves.to_path_buf();
    config
}

/// Supervisor that never gets started; for dispatch-only tests.
#[allow(dead_code)]
pub fn idle_supervisor(config: &Config) -> Supervisor {
    Supervisor::new(config, vec!["true".to_string()])
}

/// Supervisor running `script` under `/bin/sh -c`, with `$1` set to `dir`.
#[allow(dead_code)]
pub fn sh_supervisor(config: &Config, script: &str, dir: &Path) -> Supervisor {
    let argv = vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        script.to_string(),
        "sh".to_string(),
        dir.display().to_string(),
    ];
    Supervisor::new(config, argv)
}

/// Upper bound for anything involving a real child process.
#[allow(dead_code)]
pub const CHILD_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `cond` until it holds or `CHILD_TIMEOUT` passes.
#[allow(dead_code)]
pub async fn eventually<F: Fn() -> bool>(cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + CHILD_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
