//! Entry point tying validation, argv assembly and execution together.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use super::SandboxConfig;
use super::builder::build_argv;
use super::mounts::RawBind;
use super::security::validate_path;
use crate::error::{ExecutionError, InvalidArgumentError, Result};
use crate::options::RunOptions;
use crate::process::{ProcessControl, ProcessStatus, SandboxProcess, SecureProcess};

/// Timeout applied when a request does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A single command to run inside the sandbox.
///
/// # Example
///
/// ```
/// use bwrap_sandbox::sandbox::{RawBind, RunRequest};
/// use std::time::Duration;
///
/// let request = RunRequest::new(["/usr/bin/python3", "script.py"])
///     .with_bind(RawBind::spec("/srv/job", "/job", false))
///     .with_working_dir("/job")
///     .with_env("LANG", "C.UTF-8")
///     .with_timeout(Some(Duration::from_secs(5)));
/// assert_eq!(request.command.len(), 2);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Program and arguments run by the helper.
    pub command: Vec<String>,

    /// Binds added after the configured ones.
    pub extra_binds: Vec<RawBind>,

    /// Working directory for the helper process.
    pub working_dir: Option<String>,

    /// Environment overlay for the helper process.
    pub env: Option<HashMap<String, String>>,

    /// Kill the process after this long. `None` disables the timeout.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("command", &self.command)
            .field("extra_binds", &self.extra_binds)
            .field("working_dir", &self.working_dir)
            .field("env_vars", &self.env.as_ref().map(HashMap::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RunRequest {
    /// Creates a request for `command` with the default timeout.
    #[must_use]
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            extra_binds: Vec::new(),
            working_dir: None,
            env: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Adds one extra bind.
    #[must_use]
    pub fn with_bind(mut self, bind: impl Into<RawBind>) -> Self {
        self.extra_binds.push(bind.into());
        self
    }

    /// Adds several extra binds.
    #[must_use]
    pub fn with_binds<I>(mut self, binds: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<RawBind>,
    {
        self.extra_binds.extend(binds.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Adds multiple environment variables from an iterator.
    #[must_use]
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (k, v) in vars {
            env.insert(k.into(), v.into());
        }
        self
    }

    /// Sets or clears the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Converts a caller-supplied number of seconds into a timeout.
///
/// Zero means "no timeout".
///
/// # Errors
///
/// Returns `InvalidArgumentError::InvalidTimeout` for negative or non-finite
/// values.
pub fn timeout_from_secs(secs: f64) -> Result<Option<Duration>> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(InvalidArgumentError::InvalidTimeout(format!(
            "timeout must be a non-negative number of seconds, got {secs}"
        ))
        .into());
    }

    if secs == 0.0 {
        return Ok(None);
    }

    Ok(Some(Duration::from_secs_f64(secs)))
}

/// Runs commands under the bubblewrap helper.
///
/// Holds the shared configuration; each call validates its own input and
/// creates a fresh process.
///
/// # Example
///
/// ```no_run
/// use bwrap_sandbox::process::ProcessControl;
/// use bwrap_sandbox::sandbox::{BubblewrapSandbox, RunRequest, SandboxConfig};
///
/// let sandbox = BubblewrapSandbox::new(SandboxConfig::default());
/// let process = sandbox.run(&RunRequest::new(["/bin/echo", "hello"]))?;
/// assert_eq!(process.stdout().trim(), "hello");
/// # Ok::<(), bwrap_sandbox::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct BubblewrapSandbox {
    config: Arc<SandboxConfig>,
}

impl Default for BubblewrapSandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl BubblewrapSandbox {
    /// Creates a sandbox runner with the given configuration.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Creates a runner sharing an existing configuration.
    #[must_use]
    pub fn with_shared_config(config: Arc<SandboxConfig>) -> Self {
        Self { config }
    }

    /// Returns a reference to the sandbox configuration.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Builds the helper argv for `command` without running anything.
    ///
    /// # Errors
    ///
    /// See [`build_argv`].
    pub fn build<S: AsRef<str>>(&self, command: &[S], extra_binds: &[RawBind]) -> Result<Vec<String>> {
        build_argv(&self.config, extra_binds, command)
    }

    /// Validates `request` and returns a process that has not been started.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgumentError::InvalidPath` for a bad working directory,
    /// or any error of [`Self::build`].
    #[instrument(skip(self, request), fields(command = ?request.command.first()))]
    pub fn prepare(&self, request: &RunRequest) -> Result<SandboxProcess> {
        if let Some(dir) = &request.working_dir {
            validate_path(dir, "working directory")?;
        }

        let argv = self.build(request.command.as_slice(), &request.extra_binds)?;
        debug!(argc = argv.len(), timeout = ?request.timeout, "Prepared sandbox process");

        Ok(SandboxProcess::new(
            argv,
            request.working_dir.as_ref().map(PathBuf::from),
            request.env.clone().unwrap_or_default(),
            request.timeout,
        ))
    }

    /// Runs `request` to completion with default options.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_options`].
    pub fn run(&self, request: &RunRequest) -> Result<SecureProcess> {
        self.run_with_options(request, RunOptions::default())
    }

    /// Runs `request` to completion and wraps the finished process.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::prepare`], the execution errors of the
    /// process, and `ExecutionError::ProcessFailed` if it did not exit with 0.
    #[instrument(skip(self, request), fields(command = ?request.command.first(), expose_env = options.expose_environment))]
    pub fn run_with_options(&self, request: &RunRequest, options: RunOptions) -> Result<SecureProcess> {
        let mut process = self.prepare(request)?;
        process.start()?;
        let status = process.wait()?;

        if status != ProcessStatus::Exited(0) {
            debug!(?status, "Sandboxed command failed");
            return Err(ExecutionError::ProcessFailed {
                exit_code: process.exit_code(),
                stderr: process.stderr().to_string(),
            }
            .into());
        }

        info!("Sandboxed command completed");
        Ok(SecureProcess::new(
            process,
            request.env.clone(),
            options.expose_environment,
        ))
    }

    /// Like [`Self::run_with_options`], validating a raw option map first.
    ///
    /// # Errors
    ///
    /// Returns an options error before anything is built or spawned.
    pub fn run_with_option_map(
        &self,
        request: &RunRequest,
        options: &Map<String, Value>,
    ) -> Result<SecureProcess> {
        let options = RunOptions::validate(options)?;
        self.run_with_options(request, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn sandbox() -> BubblewrapSandbox {
        BubblewrapSandbox::new(
            SandboxConfig::default()
                .with_binary("/usr/bin/bwrap")
                .with_binary_validator(|_: &str| true),
        )
    }

    #[test]
    fn test_request_defaults() {
        let request = RunRequest::new(["/bin/true"]);
        assert_eq!(request.command, ["/bin/true"]);
        assert!(request.extra_binds.is_empty());
        assert!(request.working_dir.is_none());
        assert!(request.env.is_none());
        assert_eq!(request.timeout, Some(DEFAULT_TIMEOUT));
    }

    #[test]
    fn test_request_builder_chain() {
        let request = RunRequest::new(["/bin/true"])
            .with_bind("/data")
            .with_binds([RawBind::spec("/a", "/b", false)])
            .with_working_dir("/tmp")
            .with_env("FOO", "bar")
            .with_envs([("BAZ", "qux")])
            .with_timeout(None);

        assert_eq!(request.extra_binds.len(), 2);
        assert_eq!(request.working_dir.as_deref(), Some("/tmp"));
        let env = request.env.as_ref().unwrap();
        assert_eq!(env.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(env.get("BAZ").map(String::as_str), Some("qux"));
        assert_eq!(request.timeout, None);
    }

    #[test]
    fn test_request_debug_hides_env_values() {
        let request = RunRequest::new(["/bin/true"]).with_env("TOKEN", "hunter2");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("hunter2"), "{rendered}");
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(0.0).unwrap(), None);
        assert_eq!(timeout_from_secs(1.5).unwrap(), Some(Duration::from_millis(1500)));
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                timeout_from_secs(bad),
                Err(Error::InvalidArgument(InvalidArgumentError::InvalidTimeout(_)))
            ));
        }
    }

    #[test]
    fn test_prepare_rejects_bad_working_dir() {
        for dir in ["relative", "/tmp/../etc"] {
            let request = RunRequest::new(["/bin/true"]).with_working_dir(dir);
            let err = sandbox().prepare(&request).unwrap_err();
            assert!(err.to_string().contains("working directory"), "{err}");
        }
    }

    #[test]
    fn test_prepare_does_not_spawn() {
        let request = RunRequest::new(["/bin/echo", "hi"])
            .with_working_dir("/tmp")
            .with_timeout(Some(Duration::from_secs(3)));
        let process = sandbox().prepare(&request).unwrap();

        assert_eq!(process.status(), ProcessStatus::Ready);
        assert_eq!(process.argv().first().map(String::as_str), Some("/usr/bin/bwrap"));
        assert_eq!(process.timeout(), Some(Duration::from_secs(3)));
        assert_eq!(process.working_dir(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn test_config_is_shared_between_clones() {
        let sandbox = sandbox();
        let clone = sandbox.clone();
        assert!(std::ptr::eq(sandbox.config(), clone.config()));
    }
}
