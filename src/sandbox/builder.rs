//! Assembly of the helper's argument vector.
//!
//! The layout is fixed:
//!
//! ```text
//! <binary> <base_args...>
//!     [--ro-bind P P]*     configured read-only binds
//!     [--bind P P]*        configured writable binds
//!     [--ro-bind|--bind SRC DST]*   per-call binds, in caller order
//!     COMMAND...
//! ```
//!
//! Building never spawns anything. Preconditions are checked in order: helper
//! availability, then the command, then every bind path.

use tracing::{debug, instrument};

use super::SandboxConfig;
use super::mounts::{BIND_FLAG, BindMount, RO_BIND_FLAG, RawBind, normalize_binds};
use super::security::{validate_command, validate_path};
use crate::error::Result;
use crate::system::ensure_executable;

/// Builds the full argv for running `command` under the configured helper.
///
/// # Errors
///
/// - `Error::SandboxUnavailable` if the helper cannot be executed
/// - `InvalidArgumentError::InvalidCommand` if the command is empty or has a
///   token with a null byte
/// - `InvalidArgumentError::InvalidPath` / `InvalidBindFormat` for bad binds
#[instrument(skip_all, fields(binary = %config.binary, extra_binds = extra_binds.len()))]
pub fn build_argv<S: AsRef<str>>(
    config: &SandboxConfig,
    extra_binds: &[RawBind],
    command: &[S],
) -> Result<Vec<String>> {
    ensure_executable(&config.binary, config.binary_validator.as_deref())?;
    validate_command(command)?;
    let binds = normalize_binds(extra_binds)?;

    assemble(config, &binds, command)
}

/// Like [`build_argv`] for binds that are already normalized.
///
/// # Errors
///
/// Same as [`build_argv`].
pub fn build_argv_with_mounts<S: AsRef<str>>(
    config: &SandboxConfig,
    binds: &[BindMount],
    command: &[S],
) -> Result<Vec<String>> {
    ensure_executable(&config.binary, config.binary_validator.as_deref())?;
    validate_command(command)?;
    for bind in binds {
        validate_path(&bind.source, "bind source path")?;
        validate_path(&bind.target, "bind target path")?;
    }

    assemble(config, binds, command)
}

fn assemble<S: AsRef<str>>(
    config: &SandboxConfig,
    binds: &[BindMount],
    command: &[S],
) -> Result<Vec<String>> {
    for path in config.read_only_binds.iter().chain(&config.write_binds) {
        validate_path(path, "configured bind path")?;
    }

    let mut argv = Vec::with_capacity(
        1 + config.base_args.len()
            + 3 * (config.read_only_binds.len() + config.write_binds.len() + binds.len())
            + command.len(),
    );

    argv.push(config.binary.clone());
    argv.extend(config.base_args.iter().cloned());

    for path in &config.read_only_binds {
        argv.extend([RO_BIND_FLAG.to_string(), path.clone(), path.clone()]);
    }

    for path in &config.write_binds {
        argv.extend([BIND_FLAG.to_string(), path.clone(), path.clone()]);
    }

    for bind in binds {
        argv.extend(bind.to_args());
    }

    argv.extend(command.iter().map(|part| part.as_ref().to_string()));

    debug!(argc = argv.len(), "Built sandbox argv");
    Ok(argv)
}
