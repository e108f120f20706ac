//! Bind mount specifications and their normalization.
//!
//! Callers describe extra mounts in one of two shapes:
//!
//! - a bare path, which becomes a read-only self-bind (`/data` -> `/data`)
//! - a structured entry `{from, to, read_only?}`, where `read_only` defaults
//!   to `true`
//!
//! Normalization turns either shape into a [`BindMount`] whose paths have
//! passed [`validate_path`]. Output preserves input order and length. Entries
//! of any other shape are rejected, never skipped.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::{InvalidArgumentError, Result};
use crate::sandbox::security::validate_path;

/// Flag the helper uses for a read-only bind.
pub const RO_BIND_FLAG: &str = "--ro-bind";

/// Flag the helper uses for a writable bind.
pub const BIND_FLAG: &str = "--bind";

/// A validated host-to-sandbox bind mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindMount {
    /// Host path.
    pub source: String,
    /// Path inside the sandbox.
    pub target: String,
    /// Whether the mount is read-only.
    pub read_only: bool,
}

impl BindMount {
    /// Creates a validated bind mount.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgumentError::InvalidPath` if either path is invalid.
    pub fn new(source: impl Into<String>, target: impl Into<String>, read_only: bool) -> Result<Self> {
        let source = source.into();
        let target = target.into();
        validate_path(&source, "bind source path")?;
        validate_path(&target, "bind target path")?;
        Ok(Self {
            source,
            target,
            read_only,
        })
    }

    /// The helper flag matching this mount's access mode.
    #[must_use]
    pub fn flag(&self) -> &'static str {
        if self.read_only { RO_BIND_FLAG } else { BIND_FLAG }
    }

    /// The three argv tokens for this mount: flag, source, target.
    #[must_use]
    pub fn to_args(&self) -> [String; 3] {
        [
            self.flag().to_string(),
            self.source.clone(),
            self.target.clone(),
        ]
    }
}

/// A caller-supplied bind specification, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawBind {
    /// Read-only self-bind of a single path.
    Path(String),
    /// Explicit source and target.
    Spec {
        from: String,
        to: String,
        #[serde(default = "default_read_only")]
        read_only: bool,
    },
}

fn default_read_only() -> bool {
    true
}

impl RawBind {
    /// Shorthand for a structured entry.
    #[must_use]
    pub fn spec(from: impl Into<String>, to: impl Into<String>, read_only: bool) -> Self {
        Self::Spec {
            from: from.into(),
            to: to.into(),
            read_only,
        }
    }

    /// Interprets a dynamic JSON value as a bind entry.
    ///
    /// Accepts a string, or an object with `from` and `to` and an optional
    /// boolean `read_only`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgumentError::InvalidBindFormat` when `from` or `to` is
    /// missing or the entry has any other shape, and
    /// `InvalidArgumentError::InvalidPath` when `from` or `to` is present but
    /// not a string.
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = || InvalidArgumentError::InvalidBindFormat(value.to_string());

        match value {
            Value::String(path) => Ok(Self::Path(path.clone())),
            Value::Object(map) => {
                if ["from", "to"]
                    .iter()
                    .any(|key| matches!(map.get(*key), None | Some(Value::Null)))
                {
                    return Err(invalid().into());
                }
                let from = path_field(map, "from", "bind source path")?;
                let to = path_field(map, "to", "bind target path")?;
                let read_only = match map.get("read_only") {
                    None | Some(Value::Null) => true,
                    Some(Value::Bool(flag)) => *flag,
                    Some(_) => return Err(invalid().into()),
                };
                Ok(Self::spec(from, to, read_only))
            }
            _ => Err(invalid().into()),
        }
    }

    /// Validates this entry and converts it into a [`BindMount`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgumentError::InvalidPath` if a path is invalid.
    pub fn normalize(&self) -> Result<BindMount> {
        match self {
            Self::Path(path) => {
                validate_path(path, "bind path")?;
                Ok(BindMount {
                    source: path.clone(),
                    target: path.clone(),
                    read_only: true,
                })
            }
            Self::Spec {
                from,
                to,
                read_only,
            } => BindMount::new(from.clone(), to.clone(), *read_only),
        }
    }
}

fn path_field<'a>(map: &'a Map<String, Value>, key: &str, context: &str) -> Result<&'a str> {
    match map.get(key) {
        Some(Value::String(path)) => Ok(path),
        _ => Err(InvalidArgumentError::InvalidPath {
            context: context.to_string(),
            reason: "path must be a non-empty string".to_string(),
        }
        .into()),
    }
}

impl From<&str> for RawBind {
    fn from(path: &str) -> Self {
        Self::Path(path.to_string())
    }
}

impl From<String> for RawBind {
    fn from(path: String) -> Self {
        Self::Path(path)
    }
}

/// Normalizes typed bind entries, preserving order.
///
/// # Errors
///
/// Fails on the first entry with an invalid path.
#[instrument(skip_all, fields(count = binds.len()))]
pub fn normalize_binds(binds: &[RawBind]) -> Result<Vec<BindMount>> {
    let normalized = binds
        .iter()
        .map(RawBind::normalize)
        .collect::<Result<Vec<_>>>()?;
    debug!(count = normalized.len(), "Normalized extra binds");
    Ok(normalized)
}

/// Normalizes dynamically-typed bind entries, preserving order.
///
/// # Errors
///
/// Fails with `InvalidBindFormat` on a malformed entry, or `InvalidPath` on an
/// invalid path.
pub fn normalize_bind_values(binds: &[Value]) -> Result<Vec<BindMount>> {
    binds
        .iter()
        .map(|value| RawBind::from_value(value)?.normalize())
        .collect()
}
