//! Bubblewrap Sandbox - validated invocations of the `bwrap` namespace helper.
//!
//! This crate turns untrusted input (a command, extra bind mounts, a working
//! directory, an environment, a timeout) into a deterministic argument vector
//! for bubblewrap, rejecting anything that could defeat the isolation:
//! relative or traversing paths, null bytes, a missing or non-executable
//! helper binary.
//!
//! The sandboxing itself is done by bubblewrap. This crate owns the trust
//! boundary around invoking it.
//!
//! # Platform Requirements
//!
//! - Linux with bubblewrap installed (`/usr/bin/bwrap` by default)
//! - Unprivileged user namespaces enabled, or a setuid `bwrap`
//!
//! # Example
//!
//! ```no_run
//! use bwrap_sandbox::process::ProcessControl;
//! use bwrap_sandbox::{BubblewrapSandbox, RunOptions, RunRequest, SandboxConfig};
//!
//! fn main() -> miette::Result<()> {
//!     let sandbox = BubblewrapSandbox::new(SandboxConfig::default());
//!     let request = RunRequest::new(["/bin/sh", "-c", "echo $GREETING"])
//!         .with_env("GREETING", "hello");
//!
//!     let process = sandbox.run_with_options(&request, RunOptions::default())?;
//!     println!("{}", process.stdout());
//!
//!     // The environment was not exposed, so this is denied.
//!     assert!(process.env().is_err());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod options;
pub mod process;
pub mod sandbox;
pub mod system;

// Re-export commonly used types
pub use error::{Error, Result};
pub use options::RunOptions;
pub use process::{ProcessControl, SandboxProcess, SecureProcess};
pub use sandbox::{BubblewrapSandbox, RawBind, RunRequest, SandboxConfig};
