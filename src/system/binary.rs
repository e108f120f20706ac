//! Availability checks for the sandbox helper binary.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

use nix::unistd::{AccessFlags, access};
use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};

/// Strategy that decides whether a helper binary may be invoked.
///
/// When one is configured its answer is authoritative and no filesystem check
/// is made. Any `Fn(&str) -> bool` closure is a validator.
pub trait BinaryValidator: Send + Sync {
    /// Returns `true` if `binary` is usable.
    fn is_available(&self, binary: &str) -> bool;
}

impl<F> BinaryValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_available(&self, binary: &str) -> bool {
        self(binary)
    }
}

impl fmt::Debug for dyn BinaryValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<binary validator>")
    }
}

/// Ensures the helper binary can be executed, consulting the process `PATH`
/// for bare names.
///
/// # Errors
///
/// Returns `Error::SandboxUnavailable` if the binary is empty, fails the
/// custom validator, or cannot be found as an executable file.
pub fn ensure_executable(binary: &str, validator: Option<&dyn BinaryValidator>) -> Result<()> {
    let path_var = std::env::var_os("PATH");
    ensure_executable_in(binary, validator, path_var.as_deref())
}

/// Like [`ensure_executable`], but searches the given `PATH`-style value.
///
/// # Errors
///
/// See [`ensure_executable`].
#[instrument(skip(validator, path_var), fields(custom = validator.is_some()))]
pub fn ensure_executable_in(
    binary: &str,
    validator: Option<&dyn BinaryValidator>,
    path_var: Option<&OsStr>,
) -> Result<()> {
    if binary.is_empty() {
        return Err(unavailable("binary path must be a non-empty string"));
    }

    if let Some(validator) = validator {
        if !validator.is_available(binary) {
            return Err(unavailable(format!(
                "binary failed custom validation: {binary}"
            )));
        }
        trace!("Custom validator accepted binary");
        return Ok(());
    }

    // An explicit path is checked as-is. Falling back to PATH here would let a
    // same-named binary elsewhere stand in for a broken configured one.
    if binary.contains('/') {
        let path = Path::new(binary);
        if !path.exists() {
            return Err(unavailable(format!("binary not found: {binary}")));
        }
        if !is_executable(path) {
            return Err(unavailable(format!("binary is not executable: {binary}")));
        }
        debug!("Helper binary is executable");
        return Ok(());
    }

    match find_in_path(binary, path_var) {
        Some(found) => {
            debug!(resolved = %found.display(), "Helper binary found in PATH");
            Ok(())
        }
        None => Err(unavailable(format!("binary not found in PATH: {binary}"))),
    }
}

/// Searches each directory of a `PATH`-style value for an executable `name`.
///
/// Returns `None` when the value is unset or empty, or nothing matches.
#[must_use]
pub fn find_in_path(name: &str, path_var: Option<&OsStr>) -> Option<std::path::PathBuf> {
    let path_var = path_var.filter(|value| !value.is_empty())?;

    std::env::split_paths(path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Returns `true` if `path` is a regular file the current user may execute.
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    path.is_file() && access(path, AccessFlags::X_OK).is_ok()
}

fn unavailable(reason: impl Into<String>) -> Error {
    Error::SandboxUnavailable(reason.into())
}
