//! Input validation for everything that reaches the helper's argument vector.
//!
//! # Security Model
//!
//! Validation is purely syntactic and fail-closed. No path is resolved against
//! the filesystem: a path is accepted only when it is non-empty, absolute,
//! free of the `..` substring and free of null bytes.
//!
//! The `..` check is a substring match, not a segment match, so a legitimate
//! name such as `/data/a..b` is rejected as well. This is deliberate: the
//! helper receives the path verbatim, and a conservative rule is easier to
//! audit than a normalizer.
//!
//! Command tokens are checked for null bytes, which would otherwise truncate
//! the argument at the exec boundary.

use tracing::{trace, warn};

use crate::error::{InvalidArgumentError, Result};

/// Validates that `path` is safe to hand to the sandbox helper.
///
/// `context` names the role of the path (e.g. `"bind source path"`) and is
/// carried into the error message.
///
/// # Errors
///
/// Returns `InvalidArgumentError::InvalidPath` if the path is empty, relative,
/// contains `..`, or contains a null byte.
pub fn validate_path(path: &str, context: &str) -> Result<()> {
    if let Some(reason) = rejection_reason(path) {
        warn!(context, path = %path.escape_debug(), %reason, "Rejected path");
        return Err(InvalidArgumentError::InvalidPath {
            context: context.to_string(),
            reason,
        }
        .into());
    }

    trace!(context, path, "Path accepted");
    Ok(())
}

/// Returns `true` if [`validate_path`] would accept `path`.
#[must_use]
pub fn is_valid_path(path: &str) -> bool {
    rejection_reason(path).is_none()
}

/// Why `path` is rejected, checked in order: empty, relative, `..`, null byte.
fn rejection_reason(path: &str) -> Option<String> {
    if path.is_empty() {
        return Some("path must be a non-empty string".to_string());
    }

    if !path.starts_with('/') {
        return Some(format!("path must be absolute (start with /), got: {path}"));
    }

    if path.contains("..") {
        return Some(format!("path contains '..' which is not allowed, got: {path}"));
    }

    if path.contains('\0') {
        return Some(format!(
            "path contains null bytes, got: {}",
            path.escape_debug()
        ));
    }

    None
}

/// Validates the command that will run inside the sandbox.
///
/// # Errors
///
/// Returns `InvalidArgumentError::InvalidCommand` if the command is empty or
/// any token contains a null byte.
pub fn validate_command<S: AsRef<str>>(command: &[S]) -> Result<()> {
    if command.is_empty() {
        return Err(InvalidArgumentError::InvalidCommand(
            "you must provide a command to run inside the sandbox".to_string(),
        )
        .into());
    }

    for (index, part) in command.iter().enumerate() {
        if part.as_ref().contains('\0') {
            return Err(InvalidArgumentError::InvalidCommand(format!(
                "command part at index {index} contains null bytes"
            ))
            .into());
        }
    }

    Ok(())
}
