//! # Process Supervisor
//!
//! Owns the game server child process and the dispatch loop that relays its
//! console.
//!
//! ## Components
//!
//! - [`reader`] - background line readers, one per piped stream
//! - [`signals`] - SIGINT/SIGHUP/SIGTERM mapped to a graceful stop
//! - [`privileges`] - switch away from root before the server is spawned
//!
//! ## Dispatch loop
//!
//! ```text
//!  server stdout ─┐
//!  server stderr ─┼─► LineReader queues ─► run() tick ─► line / chat handlers
//!  operator stdin ┘                            │
//!                                              └─► console queue ─► server stdin
//! ```
//!
//! Every tick drains stdout, then stderr (echoing each line and handing it to
//! the handlers), forwards operator input, and writes queued console lines to
//! the server. The loop is the only writer of the server's stdin, so
//! [`Supervisor::send_console`] just queues.
//!
//! ## Restarts
//!
//! A restart launches a new child (a "generation"). [`Supervisor::restart`]
//! blocks on stop + wait, so it must run on a detached task: called from the
//! dispatch loop it would wait on itself. Two restarts in flight at once are
//! not guarded against; callers must avoid issuing them.

pub mod privileges;
pub mod reader;
pub mod signals;

pub use reader::LineReader;

use log::{debug, error, info, warn};
use std::future::Future;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::config::Config;
use crate::errors::SupervisorError;
use crate::handlers::{ChatLine, ChatPlayer, GameConsole, HandlerSet};
use crate::logutil::{escape_log, strip_line_ending};
use crate::metrics;

/// Substring that routes a console line to the chat handlers instead of the
/// line handlers.
pub const CHAT_MARKER: &str = "[CHAT]";

/// Lifecycle of one child process. A restart starts a fresh child, which
/// begins again at `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running,
    Stopped,
}

/// Streams of a freshly spawned child, handed from `start` to the loop.
struct Launch {
    generation: u64,
    stdout: LineReader,
    stderr: LineReader,
    stdin: ChildStdin,
    exited: watch::Receiver<bool>,
}

enum LaunchEvent {
    Started(Launch),
    /// A pending restart gave up before spawning.
    Aborted,
}

struct ProcessSlot {
    state: ProcessState,
    generation: u64,
    pid: Option<u32>,
    exited: Option<watch::Receiver<bool>>,
    /// Set once `run` stops accepting launches; `start` refuses afterwards.
    relay_closed: bool,
}

struct Shared {
    argv: Vec<String>,
    poll_interval: Duration,
    saves_dir: std::path::PathBuf,
    slot: Mutex<ProcessSlot>,
    console_tx: mpsc::UnboundedSender<String>,
    console_rx: Mutex<mpsc::UnboundedReceiver<String>>,
    launch_tx: mpsc::UnboundedSender<LaunchEvent>,
    launch_rx: Mutex<Option<mpsc::UnboundedReceiver<LaunchEvent>>>,
    restart_pending: AtomicBool,
    should_stop: AtomicBool,
}

/// Cheap, cloneable handle to the supervised server.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("argv", &self.shared.argv)
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Console commands are single lines: trim the ends and flatten any
/// embedded line breaks so a message cannot smuggle in a second command.
fn sanitize_console_line(line: &str) -> String {
    line.trim()
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

#[derive(Clone, Copy)]
enum EchoTarget {
    Stdout,
    Stderr,
}

fn echo(target: EchoTarget, text: &str) {
    let result = match target {
        EchoTarget::Stdout => {
            let mut out = std::io::stdout().lock();
            out.write_all(text.as_bytes()).and_then(|_| out.flush())
        }
        EchoTarget::Stderr => {
            let mut err = std::io::stderr().lock();
            err.write_all(text.as_bytes()).and_then(|_| err.flush())
        }
    };
    if let Err(e) = result {
        debug!("echo failed: {}", e);
    }
}

async fn write_console_line(pipe: &mut ChildStdin, line: &str) -> std::io::Result<()> {
    pipe.write_all(line.as_bytes()).await?;
    pipe.write_all(b"\n").await?;
    pipe.flush().await
}

#[cfg(unix)]
fn interrupt(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        warn!("pid {} out of range; cannot signal server", pid);
        return;
    };
    match kill(Pid::from_raw(raw), Signal::SIGINT) {
        Ok(()) => info!("Sent SIGINT to server (pid {})", pid),
        Err(e) => warn!("Failed to signal server (pid {}): {}", pid, e),
    }
}

#[cfg(not(unix))]
fn interrupt(pid: u32) {
    warn!("Interrupting the server (pid {}) is only supported on Unix", pid);
}

impl Supervisor {
    /// Build a supervisor for `argv`. Nothing is spawned until [`run`] or
    /// [`start`].
    ///
    /// [`run`]: Supervisor::run
    /// [`start`]: Supervisor::start
    pub fn new(config: &Config, argv: Vec<String>) -> Self {
        let (console_tx, console_rx) = mpsc::unbounded_channel();
        let (launch_tx, launch_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                argv,
                poll_interval: config.supervisor.poll_interval(),
                saves_dir: config.saves.dir.clone(),
                slot: Mutex::new(ProcessSlot {
                    state: ProcessState::NotStarted,
                    generation: 0,
                    pid: None,
                    exited: None,
                    relay_closed: false,
                }),
                console_tx,
                console_rx: Mutex::new(console_rx),
                launch_tx,
                launch_rx: Mutex::new(Some(launch_rx)),
                restart_pending: AtomicBool::new(false),
                should_stop: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.shared.slot).state
    }

    /// Directory holding the server's save files.
    pub fn saves_dir(&self) -> &std::path::Path {
        &self.shared.saves_dir
    }

    pub fn should_stop(&self) -> bool {
        self.shared.should_stop.load(Ordering::SeqCst)
    }

    /// Spawn the server with piped stdio and hand its streams to the
    /// dispatch loop.
    pub fn start(&self) -> Result<(), SupervisorError> {
        let (program, args) =
            self.shared
                .argv
                .split_first()
                .ok_or_else(|| SupervisorError::Spawn {
                    program: String::new(),
                    reason: "empty command line".to_string(),
                })?;

        let mut slot = lock(&self.shared.slot);
        if slot.relay_closed {
            return Err(SupervisorError::RelayClosed);
        }
        if slot.state == ProcessState::Running {
            return Err(SupervisorError::Spawn {
                program: program.clone(),
                reason: "server already running".to_string(),
            });
        }

        let spawn_error = |reason: String| SupervisorError::Spawn {
            program: program.clone(),
            reason,
        };
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_error("stdout not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| spawn_error("stderr not piped".to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_error("stdin not piped".to_string()))?;

        slot.generation += 1;
        let generation = slot.generation;
        let pid = child.id();
        let (exit_tx, exited) = watch::channel(false);
        slot.state = ProcessState::Running;
        slot.pid = pid;
        slot.exited = Some(exited.clone());

        // Sent while the slot is held so `run` cannot close the relay
        // between this launch and its own last look at the queue.
        let launch = Launch {
            generation,
            stdout: LineReader::spawn("stdout", stdout),
            stderr: LineReader::spawn("stderr", stderr),
            stdin,
            exited,
        };
        if self
            .shared
            .launch_tx
            .send(LaunchEvent::Started(launch))
            .is_err()
        {
            warn!("Dispatch loop is gone; server output will not be relayed");
        }
        drop(slot);

        info!(
            "Started {} (pid {}, generation {})",
            program,
            pid.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
            generation
        );

        let shared = self.shared.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Server exited with {}", status),
                Err(e) => warn!("Failed to wait for server: {}", e),
            }
            {
                let mut slot = lock(&shared.slot);
                if slot.generation == generation {
                    slot.state = ProcessState::Stopped;
                    slot.pid = None;
                }
            }
            let _ = exit_tx.send(true);
        });
        Ok(())
    }

    /// Queue a line for the server console. Written with a trailing newline
    /// and flushed by the dispatch loop on its next tick.
    pub fn send_console(&self, line: &str) {
        let line = sanitize_console_line(line);
        debug!("console <- {}", escape_log(&line));
        let _ = self.shared.console_tx.send(line);
    }

    /// Take every console line queued so far.
    pub fn drain_console(&self) -> Vec<String> {
        let mut rx = lock(&self.shared.console_rx);
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Interrupt the server if it is running; no-op otherwise.
    pub fn stop(&self) {
        let slot = lock(&self.shared.slot);
        if slot.state != ProcessState::Running {
            debug!("stop requested but server is {:?}", slot.state);
            return;
        }
        if let Some(pid) = slot.pid {
            interrupt(pid);
        }
    }

    /// Resolve once the current server process has exited. Returns
    /// immediately if nothing was ever started.
    pub async fn wait(&self) {
        let exited = lock(&self.shared.slot).exited.clone();
        if let Some(mut exited) = exited {
            // A dropped sender means the reaper is gone, which only happens
            // after the child exited.
            let _ = exited.wait_for(|done| *done).await;
        }
    }

    /// Graceful stop requested by a termination signal: cancels any pending
    /// restart and interrupts the server.
    pub fn shutdown(&self) {
        self.shared.should_stop.store(true, Ordering::SeqCst);
        self.stop();
    }

    /// Stop, wait, then start a new server process.
    pub async fn restart(&self) -> Result<(), SupervisorError> {
        self.restart_with(|| async { Ok(()) }).await
    }

    /// Like [`restart`](Supervisor::restart), running `step` after the old
    /// server has exited and before the new one is spawned. The server is
    /// started again even if `step` fails; the step's error is returned.
    pub async fn restart_with<F, Fut>(&self, step: F) -> Result<(), SupervisorError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SupervisorError>>,
    {
        info!("Restarting server");
        metrics::inc_restarts();
        // Set before stopping so the loop never sees the old server end
        // without knowing a new one is coming.
        self.shared.restart_pending.store(true, Ordering::SeqCst);
        self.stop();
        self.wait().await;

        let step_result = step().await;
        if let Err(e) = &step_result {
            warn!("Restart step failed: {}", e);
        }

        if self.should_stop() {
            info!("Shutdown requested; not starting the server again");
            self.abort_restart();
            return step_result;
        }
        if let Err(e) = self.start() {
            match e {
                SupervisorError::RelayClosed => info!("Supervisor is finishing; not restarting"),
                _ => error!("Restart failed: {}", e),
            }
            self.abort_restart();
            return Err(e);
        }
        step_result
    }

    fn abort_restart(&self) {
        self.shared.restart_pending.store(false, Ordering::SeqCst);
        let _ = self.shared.launch_tx.send(LaunchEvent::Aborted);
    }

    /// Start the server (unless already started) and relay its console until
    /// it exits for good. Restarts requested meanwhile are followed; once
    /// this returns, further starts fail with
    /// [`SupervisorError::RelayClosed`].
    ///
    /// `operator` is an optional reader whose lines are forwarded verbatim
    /// to the server console.
    pub async fn run(
        &self,
        handlers: HandlerSet,
        operator: Option<LineReader>,
    ) -> Result<(), SupervisorError> {
        let mut launches = lock(&self.shared.launch_rx)
            .take()
            .ok_or(SupervisorError::AlreadyRunning)?;

        let result = self.relay(&mut launches, handlers, operator).await;
        lock(&self.shared.slot).relay_closed = true;
        info!("Supervisor finished: {}", metrics::snapshot());
        result
    }

    async fn relay(
        &self,
        launches: &mut mpsc::UnboundedReceiver<LaunchEvent>,
        mut handlers: HandlerSet,
        mut operator: Option<LineReader>,
    ) -> Result<(), SupervisorError> {
        if self.state() != ProcessState::Running {
            if self.should_stop() {
                info!("Stop requested before launch; not starting the server");
                return Ok(());
            }
            // Leftovers from restarts attempted before the loop existed.
            while launches.try_recv().is_ok() {}
            self.start()?;
        }

        let mut ticker = interval(self.shared.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while let Some(event) = launches.recv().await {
            if let LaunchEvent::Started(launch) = event {
                self.shared.restart_pending.store(false, Ordering::SeqCst);
                handlers.server_started();

                let mut exited = launch.exited.clone();
                self.pump(launch, &mut handlers, operator.as_mut(), &mut ticker)
                    .await;
                let _ = exited.wait_for(|done| *done).await;
            }

            if self.close_relay(launches) {
                break;
            }
            info!("Waiting for the server to come back");
        }
        Ok(())
    }

    /// Stop accepting launches unless a restart is pending or a new server
    /// is already queued. Decided under the slot lock, which `start` holds
    /// while queueing a launch.
    fn close_relay(&self, launches: &mpsc::UnboundedReceiver<LaunchEvent>) -> bool {
        let mut slot = lock(&self.shared.slot);
        if self.shared.restart_pending.load(Ordering::SeqCst) || !launches.is_empty() {
            return false;
        }
        slot.relay_closed = true;
        true
    }

    /// Relay one server generation until both of its output streams end.
    async fn pump(
        &self,
        launch: Launch,
        handlers: &mut HandlerSet,
        mut operator: Option<&mut LineReader>,
        ticker: &mut Interval,
    ) {
        let Launch {
            generation,
            mut stdout,
            mut stderr,
            stdin,
            ..
        } = launch;
        debug!("Relaying console of generation {}", generation);
        let mut stdin = Some(stdin);

        loop {
            for line in stdout.drain() {
                echo(EchoTarget::Stdout, &line);
                self.dispatch(&line, handlers);
            }
            for line in stderr.drain() {
                echo(EchoTarget::Stderr, &line);
                self.dispatch(&line, handlers);
            }
            if let Some(reader) = operator.as_deref_mut() {
                for line in reader.drain() {
                    self.send_console(&line);
                }
            }
            self.flush_console(&mut stdin).await;

            // Pending operator input does not keep a finished server alive.
            if stdout.is_exhausted() && stderr.is_exhausted() {
                break;
            }
            ticker.tick().await;
        }
        debug!(
            "Console of generation {} closed ({} and {} exhausted)",
            generation,
            stdout.label(),
            stderr.label()
        );
    }

    async fn flush_console(&self, stdin: &mut Option<ChildStdin>) {
        if stdin.is_none() {
            // Keep the queue for the next server generation.
            return;
        }
        let lines = self.drain_console();
        let mut failed = None;
        if let Some(pipe) = stdin.as_mut() {
            for line in &lines {
                if let Err(e) = write_console_line(pipe, line).await {
                    failed = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failed {
            warn!("Server console closed: {}", e);
            *stdin = None;
        }
    }

    /// Route one console line: chat lines to the chat handlers, everything
    /// else to the line handlers in registration order.
    pub fn dispatch(&self, line: &str, handlers: &mut HandlerSet) {
        metrics::inc_lines_dispatched();
        let text = strip_line_ending(line);

        if text.contains(CHAT_MARKER) {
            let Some(chat) = ChatLine::parse(text) else {
                return;
            };
            let player = ChatPlayer::new(chat.player, self.clone());
            for handler in handlers.chat.iter_mut() {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    handler.handle_chat(&player, &chat.message)
                }));
                report_handler_outcome(handler.name(), text, outcome);
            }
            return;
        }

        for handler in handlers.line.iter_mut() {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle_line(text, self)));
            report_handler_outcome(handler.name(), text, outcome);
        }
    }
}

fn report_handler_outcome(
    name: &str,
    line: &str,
    outcome: std::thread::Result<Result<(), crate::errors::HandlerError>>,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            metrics::inc_handler_errors();
            error!("{} handler error on '{}': {}", name, escape_log(line), e);
        }
        Err(_) => {
            metrics::inc_handler_errors();
            error!("{} handler panicked on '{}'", name, escape_log(line));
        }
    }
}

impl GameConsole for Supervisor {
    fn send_console(&self, line: &str) {
        Supervisor::send_console(self, line);
    }

    fn write_stderr(&self, text: &str) {
        echo(EchoTarget::Stderr, text);
    }
}
