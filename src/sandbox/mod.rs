//! Building and running bubblewrap invocations.
//!
//! The helper is invoked as:
//!
//! ```text
//! <binary> <base_args...> [--ro-bind SRC DST]* [--bind SRC DST]* COMMAND...
//! ```
//!
//! Every path that ends up after a bind flag, and the working directory, is
//! validated first (see [`validate_path`]); the helper binary is checked for
//! availability before anything else.
//!
//! # Example
//!
//! ```no_run
//! use bwrap_sandbox::sandbox::{BubblewrapSandbox, RawBind, SandboxConfig};
//!
//! let sandbox = BubblewrapSandbox::new(SandboxConfig::default());
//! let argv = sandbox
//!     .build(&["/bin/echo", "hi"], &[RawBind::spec("/srv/in", "/in", true)])
//!     .unwrap();
//!
//! assert_eq!(argv.last().map(String::as_str), Some("hi"));
//! ```

mod builder;
mod config;
mod mounts;
mod runner;
mod security;

pub use builder::{build_argv, build_argv_with_mounts};
pub use config::{
    SandboxConfig, default_base_args, default_binary, default_read_only_binds,
    default_write_binds,
};
pub use mounts::{
    BIND_FLAG, BindMount, RO_BIND_FLAG, RawBind, normalize_bind_values, normalize_binds,
};
pub use runner::{BubblewrapSandbox, DEFAULT_TIMEOUT, RunRequest, timeout_from_secs};
pub use security::{is_valid_path, validate_command, validate_path};
