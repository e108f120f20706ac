//! Spawning and supervising the sandbox helper process.
//!
//! # Notes on stdout/stderr capture and timeouts
//!
//! Output is drained by reader threads while the child runs: reading only after
//! exit can deadlock once the child fills a pipe.
//!
//! Timeouts are enforced here with millisecond precision by polling
//! `try_wait` and hard-killing (SIGKILL) the helper when the deadline passes.
//!
//! The helper runs as the leader of its own process group. Whenever it exits
//! or is killed, the whole group is sent SIGKILL, so a background job that
//! inherited the output pipes cannot keep them open. Collecting output after
//! that is still bounded by [`OUTPUT_GRACE`] in case a descendant left the
//! group.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, instrument, trace, warn};

use crate::error::{ExecutionError, Result};

/// How often a running child is polled while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long to wait for each output stream once the process group is gone.
pub const OUTPUT_GRACE: Duration = Duration::from_millis(250);

/// Lifecycle state of a sandbox process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Created but not yet spawned.
    Ready,
    /// Spawned and not yet reaped.
    Running,
    /// Exited normally with the given code.
    Exited(i32),
    /// Killed by a signal (including [`ProcessControl::terminate`]).
    Signaled,
    /// Killed after exceeding its timeout.
    TimedOut,
}

impl ProcessStatus {
    /// Returns `true` once the process can no longer change state.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Exited(_) | Self::Signaled | Self::TimedOut)
    }
}

/// Operations a caller may perform on a sandbox process.
///
/// Implemented by [`SandboxProcess`] and by the
/// [`SecureProcess`](crate::process::SecureProcess) wrapper, so either can be
/// used wherever a process handle is expected.
pub trait ProcessControl {
    /// Spawns the process.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::AlreadyStarted` on a second call, or
    /// `ExecutionError::Spawn` if the OS refuses to start it.
    fn start(&mut self) -> Result<()>;

    /// Blocks until the process finishes or its timeout elapses.
    ///
    /// Waiting on a finished process returns its final status again.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::NotStarted` before `start`,
    /// `ExecutionError::Timeout` when the deadline passes, or an output error.
    fn wait(&mut self) -> Result<ProcessStatus>;

    /// Current lifecycle state, without blocking.
    fn status(&self) -> ProcessStatus;

    /// Exit code, once the process exited normally.
    fn exit_code(&self) -> Option<i32>;

    /// Captured standard output (empty until finished).
    fn stdout(&self) -> &str;

    /// Captured standard error (empty until finished).
    fn stderr(&self) -> &str;

    /// Kills a running process. A no-op in any other state.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Wait` if the killed child cannot be reaped.
    fn terminate(&mut self) -> Result<()>;

    /// The argv the process runs with.
    fn argv(&self) -> &[String];

    /// The configured timeout, if any.
    fn timeout(&self) -> Option<Duration>;

    /// Returns `true` while the process is running.
    fn is_running(&self) -> bool {
        self.status() == ProcessStatus::Running
    }

    /// Returns `true` if the process exited with code 0.
    fn is_successful(&self) -> bool {
        self.exit_code() == Some(0)
    }
}

struct Running {
    child: Child,
    started: Instant,
    stdout: Option<Receiver<Vec<u8>>>,
    stderr: Option<Receiver<Vec<u8>>>,
}

impl Running {
    /// Sends SIGKILL to the helper's process group. The leader may already be
    /// reaped; stragglers in the group are what this is for.
    fn kill_group(&self) {
        let Ok(pgid) = i32::try_from(self.child.id()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
            Ok(()) => trace!(pgid, "Killed sandbox process group"),
            Err(errno) => trace!(pgid, %errno, "Process group already gone"),
        }
    }

    /// Kills the whole group and reaps the leader.
    fn kill_and_reap(&mut self) -> std::io::Result<ExitStatus> {
        self.kill_group();
        let _ = self.child.kill();
        self.child.wait()
    }
}

enum State {
    Ready,
    Running(Running),
    Finished {
        status: ProcessStatus,
        stdout: String,
        stderr: String,
    },
}

/// A sandbox helper process, spawned from a finished argv.
///
/// The argv is passed to the OS as program plus arguments; no shell is
/// involved. The environment mapping is overlaid on the inherited environment.
/// Dropping a running process kills it.
pub struct SandboxProcess {
    argv: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
    state: State,
}

impl SandboxProcess {
    /// Creates a process that has not been spawned yet.
    #[must_use]
    pub fn new(
        argv: Vec<String>,
        working_dir: Option<PathBuf>,
        env: HashMap<String, String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            argv,
            working_dir,
            env,
            timeout,
            state: State::Ready,
        }
    }

    /// Working directory the process is spawned in.
    #[must_use]
    pub fn working_dir(&self) -> Option<&std::path::Path> {
        self.working_dir.as_deref()
    }

    fn command(&self) -> Result<Command> {
        let (program, args) = self.argv.split_first().ok_or_else(|| {
            ExecutionError::Spawn(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty argv",
            ))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        Ok(cmd)
    }

    fn finish(&mut self, status: ProcessStatus) -> Result<ProcessStatus> {
        let running = match std::mem::replace(&mut self.state, State::Ready) {
            State::Running(running) => running,
            other => {
                self.state = other;
                return Ok(self.status());
            }
        };

        running.kill_group();
        let stdout_bytes = collect(running.stdout, "stdout");
        let stderr_bytes = collect(running.stderr, "stderr");
        debug!(?status, elapsed_ms = %running.started.elapsed().as_millis(), "Sandbox process finished");

        let stdout = String::from_utf8(stdout_bytes);
        let stderr = String::from_utf8(stderr_bytes);
        let (stdout, stderr) = match (stdout, stderr) {
            (Ok(stdout), Ok(stderr)) => (stdout, stderr),
            (Err(_), _) => {
                self.state = finished_empty(status);
                return Err(ExecutionError::OutputEncoding { stream: "stdout" }.into());
            }
            (_, Err(_)) => {
                self.state = finished_empty(status);
                return Err(ExecutionError::OutputEncoding { stream: "stderr" }.into());
            }
        };

        self.state = State::Finished {
            status,
            stdout,
            stderr,
        };
        Ok(status)
    }
}

fn finished_empty(status: ProcessStatus) -> State {
    State::Finished {
        status,
        stdout: String::new(),
        stderr: String::new(),
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> Option<Receiver<Vec<u8>>> {
    let mut reader = reader?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    Some(rx)
}

fn collect(rx: Option<Receiver<Vec<u8>>>, stream: &'static str) -> Vec<u8> {
    let Some(rx) = rx else {
        return Vec::new();
    };
    rx.recv_timeout(OUTPUT_GRACE).unwrap_or_else(|_| {
        warn!(stream, "Output still held open after exit, discarding it");
        Vec::new()
    })
}

fn classify(status: ExitStatus) -> ProcessStatus {
    match status.code() {
        Some(code) => ProcessStatus::Exited(code),
        None => {
            trace!(signal = ?status.signal(), "Process terminated by signal");
            ProcessStatus::Signaled
        }
    }
}

impl ProcessControl for SandboxProcess {
    #[instrument(skip(self), fields(program = ?self.argv.first(), argc = self.argv.len()))]
    fn start(&mut self) -> Result<()> {
        if !matches!(self.state, State::Ready) {
            return Err(ExecutionError::AlreadyStarted.into());
        }

        let mut child = self.command()?.spawn().map_err(ExecutionError::Spawn)?;
        debug!(pid = child.id(), "Spawned sandbox process");

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        self.state = State::Running(Running {
            child,
            started: Instant::now(),
            stdout,
            stderr,
        });
        Ok(())
    }

    fn wait(&mut self) -> Result<ProcessStatus> {
        let status = {
            let running = match &mut self.state {
                State::Ready => return Err(ExecutionError::NotStarted.into()),
                State::Finished { status, .. } => return Ok(*status),
                State::Running(running) => running,
            };

            loop {
                match running.child.try_wait() {
                    Ok(Some(status)) => break classify(status),
                    Ok(None) => {
                        if let Some(timeout) = self.timeout {
                            if running.started.elapsed() > timeout {
                                debug!(elapsed_ms = %running.started.elapsed().as_millis(), "Sandbox process timed out, sending SIGKILL");
                                let _ = running.kill_and_reap();
                                break ProcessStatus::TimedOut;
                            }
                        }
                        thread::sleep(POLL_INTERVAL);
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to poll sandbox process");
                        let _ = running.kill_and_reap();
                        self.finish(ProcessStatus::Signaled)?;
                        return Err(ExecutionError::Wait(e).into());
                    }
                }
            }
        };

        self.finish(status)?;
        if status == ProcessStatus::TimedOut {
            let timeout_ms = self.timeout.map_or(0, |t| t.as_millis());
            return Err(ExecutionError::Timeout { timeout_ms }.into());
        }
        Ok(status)
    }

    fn status(&self) -> ProcessStatus {
        match &self.state {
            State::Ready => ProcessStatus::Ready,
            State::Running(_) => ProcessStatus::Running,
            State::Finished { status, .. } => *status,
        }
    }

    fn exit_code(&self) -> Option<i32> {
        match self.status() {
            ProcessStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    fn stdout(&self) -> &str {
        match &self.state {
            State::Finished { stdout, .. } => stdout,
            _ => "",
        }
    }

    fn stderr(&self) -> &str {
        match &self.state {
            State::Finished { stderr, .. } => stderr,
            _ => "",
        }
    }

    fn terminate(&mut self) -> Result<()> {
        let State::Running(running) = &mut self.state else {
            return Ok(());
        };

        debug!(pid = running.child.id(), "Terminating sandbox process");
        let status = running.kill_and_reap().map_err(ExecutionError::Wait)?;
        self.finish(classify(status))?;
        Ok(())
    }

    fn argv(&self) -> &[String] {
        &self.argv
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl Drop for SandboxProcess {
    fn drop(&mut self) {
        if let State::Running(running) = &mut self.state {
            let _ = running.kill_and_reap();
        }
    }
}

impl fmt::Debug for SandboxProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxProcess")
            .field("argv", &self.argv)
            .field("working_dir", &self.working_dir)
            .field("env_vars", &self.env.len())
            .field("timeout", &self.timeout)
            .field("status", &self.status())
            .finish()
    }
}
