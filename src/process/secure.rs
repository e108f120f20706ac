//! Process wrapper that gates access to the captured environment.
//!
//! The environment handed to a sandboxed command often carries secrets. A
//! [`SecureProcess`] keeps it only when exposure was requested explicitly at
//! construction; otherwise the mapping is dropped on the spot and [`env`]
//! always fails with `AccessDenied`.
//!
//! Everything else is forwarded to the wrapped handle through
//! [`ProcessControl`]. The handle itself is never handed out, and the `Debug`
//! output does not include the environment, so neither route leaks it.
//!
//! [`env`]: SecureProcess::env

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use super::handle::{ProcessControl, ProcessStatus, SandboxProcess};
use crate::error::{Error, Result};

/// A process handle whose captured environment is opt-in.
pub struct SecureProcess<P: ProcessControl = SandboxProcess> {
    process: P,
    env: Option<HashMap<String, String>>,
}

impl<P: ProcessControl> SecureProcess<P> {
    /// Wraps `process`.
    ///
    /// With `expose_environment == false`, `captured_env` is discarded
    /// immediately. With `true`, a missing mapping becomes an empty one.
    #[must_use]
    pub fn new(
        process: P,
        captured_env: Option<HashMap<String, String>>,
        expose_environment: bool,
    ) -> Self {
        let env = if expose_environment {
            warn!("Environment exposure enabled for sandbox process");
            Some(captured_env.unwrap_or_default())
        } else {
            if captured_env.is_some() {
                debug!("Discarding captured environment");
            }
            None
        };

        Self { process, env }
    }

    /// The environment the process was started with.
    ///
    /// # Errors
    ///
    /// Returns `Error::AccessDenied` unless exposure was enabled when the
    /// wrapper was created.
    pub fn env(&self) -> Result<&HashMap<String, String>> {
        self.env.as_ref().ok_or_else(|| {
            Error::AccessDenied(
                "environment access is not enabled for this process; \
                 pass expose_environment = true in the run options to enable it"
                    .to_string(),
            )
        })
    }

    /// Whether [`Self::env`] is permitted.
    #[must_use]
    pub fn is_env_exposed(&self) -> bool {
        self.env.is_some()
    }
}

impl<P: ProcessControl> ProcessControl for SecureProcess<P> {
    fn start(&mut self) -> Result<()> {
        self.process.start()
    }

    fn wait(&mut self) -> Result<ProcessStatus> {
        self.process.wait()
    }

    fn status(&self) -> ProcessStatus {
        self.process.status()
    }

    fn exit_code(&self) -> Option<i32> {
        self.process.exit_code()
    }

    fn stdout(&self) -> &str {
        self.process.stdout()
    }

    fn stderr(&self) -> &str {
        self.process.stderr()
    }

    fn terminate(&mut self) -> Result<()> {
        self.process.terminate()
    }

    fn argv(&self) -> &[String] {
        self.process.argv()
    }

    fn timeout(&self) -> Option<Duration> {
        self.process.timeout()
    }

    fn is_running(&self) -> bool {
        self.process.is_running()
    }

    fn is_successful(&self) -> bool {
        self.process.is_successful()
    }
}

impl<P: ProcessControl> fmt::Debug for SecureProcess<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureProcess")
            .field("argv", &self.process.argv())
            .field("status", &self.process.status())
            .field("env_exposed", &self.is_env_exposed())
            .finish_non_exhaustive()
    }
}
