//! Error types for the bubblewrap sandbox.
//!
//! Uses thiserror for deriving std::error::Error and miette for rich diagnostics.
//!
//! Every variant is raised synchronously at the point of violation. Nothing in
//! this crate retries: argument errors are caller bugs, an unavailable helper is
//! a deployment problem, and execution failures come from the process itself.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Malformed command, path, bind, timeout or configuration.
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidArgument(#[from] InvalidArgumentError),

    /// The sandbox helper binary is missing or cannot be executed.
    #[error("Sandbox helper unavailable: {0}")]
    #[diagnostic(
        code(bwrap::unavailable),
        help("Install bubblewrap (e.g. `apt install bubblewrap`) or point `binary` at an executable")
    )]
    SandboxUnavailable(String),

    /// Policy violation, e.g. reading an environment that was not exposed.
    #[error("Access denied: {0}")]
    #[diagnostic(code(bwrap::access_denied))]
    AccessDenied(String),

    /// Run options failed validation.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Options(#[from] OptionsError),

    /// The sandboxed process could not be run to completion.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),

    /// I/O error while reading configuration.
    #[error("I/O error: {0}")]
    #[diagnostic(code(bwrap::io))]
    Io(#[from] std::io::Error),

    /// Configuration document is not valid JSON.
    #[error("Malformed configuration: {0}")]
    #[diagnostic(code(bwrap::config::parse))]
    Config(#[from] serde_json::Error),
}

/// Errors caused by malformed caller input. Never retried.
#[derive(Error, Debug, Diagnostic, PartialEq, Eq)]
pub enum InvalidArgumentError {
    /// A bind or working-directory path failed validation.
    #[error("Invalid {context}: {reason}")]
    #[diagnostic(
        code(bwrap::invalid::path),
        help("Paths must be absolute and must not contain '..' or null bytes")
    )]
    InvalidPath { context: String, reason: String },

    /// A bind entry had neither the bare-path nor the `{from, to}` shape.
    #[error("Invalid bind mount format: {0}")]
    #[diagnostic(
        code(bwrap::invalid::bind_format),
        help(r#"Use "/path" or {{"from": "/src", "to": "/dst", "read_only": true}}"#)
    )]
    InvalidBindFormat(String),

    /// The command to run inside the sandbox is empty or malformed.
    #[error("Invalid command: {0}")]
    #[diagnostic(code(bwrap::invalid::command))]
    InvalidCommand(String),

    /// The timeout is negative or not a finite number.
    #[error("Invalid timeout: {0}")]
    #[diagnostic(code(bwrap::invalid::timeout))]
    InvalidTimeout(String),

    /// A safety-relevant configuration value is missing or empty.
    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(bwrap::invalid::config))]
    InvalidConfig(String),
}

/// Errors raised while validating run options.
#[derive(Error, Debug, Diagnostic, PartialEq, Eq)]
pub enum OptionsError {
    /// The key is not part of the recognized option set.
    #[error("Unknown option key: {key}. Valid options are: {valid}")]
    #[diagnostic(code(bwrap::options::unknown))]
    UnknownOption { key: String, valid: String },

    /// A recognized key carries a value of the wrong type.
    #[error("Option {key} must be a {expected}, got {found}")]
    #[diagnostic(code(bwrap::options::invalid_type))]
    InvalidOptionType {
        key: String,
        expected: &'static str,
        found: String,
    },
}

/// Errors reported by the process execution layer.
#[derive(Error, Debug, Diagnostic)]
pub enum ExecutionError {
    /// The helper process could not be spawned.
    #[error("Failed to spawn sandbox process: {0}")]
    #[diagnostic(code(bwrap::exec::spawn))]
    Spawn(#[source] std::io::Error),

    /// Waiting on the child failed.
    #[error("Failed to wait for sandbox process: {0}")]
    #[diagnostic(code(bwrap::exec::wait))]
    Wait(#[source] std::io::Error),

    /// The process exceeded its timeout and was killed.
    #[error("Sandbox process timed out after {timeout_ms}ms")]
    #[diagnostic(code(bwrap::exec::timeout))]
    Timeout { timeout_ms: u128 },

    /// The process finished unsuccessfully.
    #[error("Sandbox process failed with {}: {stderr}", describe_exit(.exit_code))]
    #[diagnostic(code(bwrap::exec::failed))]
    ProcessFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Captured output was not valid UTF-8.
    #[error("{stream} contains invalid UTF-8")]
    #[diagnostic(code(bwrap::exec::encoding))]
    OutputEncoding { stream: &'static str },

    /// An operation that needs a started process was called too early.
    #[error("Sandbox process has not been started")]
    #[diagnostic(code(bwrap::exec::not_started))]
    NotStarted,

    /// `start()` was called on a process that already ran.
    #[error("Sandbox process was already started")]
    #[diagnostic(code(bwrap::exec::already_started))]
    AlreadyStarted,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_message_names_context() {
        let err = Error::from(InvalidArgumentError::InvalidPath {
            context: "bind source path".to_string(),
            reason: "path must be absolute (start with /), got: etc".to_string(),
        });
        let msg = err.to_string();
        assert!(msg.contains("bind source path"), "{msg}");
        assert!(msg.contains("absolute"), "{msg}");
    }

    #[test]
    fn test_process_failed_describes_signal() {
        let err = ExecutionError::ProcessFailed {
            exit_code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("a signal"));

        let err = ExecutionError::ProcessFailed {
            exit_code: Some(3),
            stderr: "boom".to_string(),
        };
        assert!(err.to_string().contains("exit code 3"));
    }
}
