//! Configuration for the sandbox helper invocation.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{InvalidArgumentError, Result};
use crate::system::BinaryValidator;

/// Configuration shared by every invocation of the sandbox helper.
///
/// Built once and reused; nothing mutates it after construction, so it can be
/// cloned or shared across threads freely.
///
/// # Example
///
/// ```
/// use bwrap_sandbox::sandbox::SandboxConfig;
///
/// let config = SandboxConfig::default()
///     .with_binary("bwrap")
///     .with_write_binds(["/srv/output"]);
/// assert_eq!(config.binary, "bwrap");
/// ```
#[derive(Clone)]
pub struct SandboxConfig {
    /// Helper binary: an absolute path, or a bare name looked up in `PATH`.
    pub binary: String,

    /// Arguments passed to the helper before any bind mounts.
    pub base_args: Vec<String>,

    /// Host paths bound read-only at the same location.
    pub read_only_binds: Vec<String>,

    /// Host paths bound writable at the same location.
    pub write_binds: Vec<String>,

    /// Replaces the filesystem availability check when set.
    pub binary_validator: Option<Arc<dyn BinaryValidator>>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            base_args: default_base_args(),
            read_only_binds: default_read_only_binds(),
            write_binds: default_write_binds(),
            binary_validator: None,
        }
    }
}

impl fmt::Debug for SandboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxConfig")
            .field("binary", &self.binary)
            .field("base_args", &self.base_args)
            .field("read_only_binds", &self.read_only_binds)
            .field("write_binds", &self.write_binds)
            .field("binary_validator", &self.binary_validator)
            .finish()
    }
}

impl SandboxConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a configuration from a loosely-typed JSON document.
    ///
    /// Recognized keys are `binary`, `base_args`, `read_only_binds` and
    /// `write_binds`. Each one falls back to its default when missing or of the
    /// wrong type; a list with any non-string element counts as wrongly typed.
    /// A non-object document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgumentError::InvalidConfig` if `binary` is present but
    /// empty.
    pub fn from_value(value: &Value) -> Result<Self> {
        let defaults = Self::default();
        let Some(map) = value.as_object() else {
            warn!("Sandbox configuration is not an object, using defaults");
            return Ok(defaults);
        };

        let binary = match map.get("binary") {
            Some(Value::String(binary)) if binary.is_empty() => {
                return Err(InvalidArgumentError::InvalidConfig(
                    "binary path must be a non-empty string".to_string(),
                )
                .into());
            }
            Some(Value::String(binary)) => binary.clone(),
            other => {
                fallback("binary", other);
                defaults.binary
            }
        };

        let list = |key: &str, default: Vec<String>| match map.get(key).and_then(string_list) {
            Some(list) => list,
            None => {
                fallback(key, map.get(key));
                default
            }
        };

        let config = Self {
            binary,
            base_args: list("base_args", defaults.base_args),
            read_only_binds: list("read_only_binds", defaults.read_only_binds),
            write_binds: list("write_binds", defaults.write_binds),
            binary_validator: None,
        };
        debug!(binary = %config.binary, "Loaded sandbox configuration");
        Ok(config)
    }

    /// Reads a JSON configuration file and applies [`Self::from_value`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read, `Error::Config` if it is
    /// not valid JSON, or the errors of [`Self::from_value`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(&value)
    }

    /// Sets the helper binary path or name.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Replaces the base arguments.
    #[must_use]
    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the read-only bind list.
    #[must_use]
    pub fn with_read_only_binds<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_only_binds = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the writable bind list.
    #[must_use]
    pub fn with_write_binds<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write_binds = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Installs a custom availability check for the helper binary.
    #[must_use]
    pub fn with_binary_validator(mut self, validator: impl BinaryValidator + 'static) -> Self {
        self.binary_validator = Some(Arc::new(validator));
        self
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn fallback(key: &str, found: Option<&Value>) {
    if let Some(found) = found {
        warn!(key, %found, "Ignoring wrongly-typed configuration value, using default");
    }
}

/// Default helper binary.
#[must_use]
pub fn default_binary() -> String {
    "/usr/bin/bwrap".to_string()
}

/// Default helper arguments: unshare every namespace, die with the parent,
/// fresh `/proc` and `/dev`, private `/tmp` and `/run`, a minimal `PATH`, and
/// `/tmp` as working directory.
#[must_use]
pub fn default_base_args() -> Vec<String> {
    [
        "--unshare-all",
        "--die-with-parent",
        "--new-session",
        "--proc",
        "/proc",
        "--dev",
        "/dev",
        "--tmpfs",
        "/tmp",
        "--tmpfs",
        "/run",
        "--setenv",
        "PATH",
        "/usr/bin:/bin:/usr/sbin:/sbin",
        "--chdir",
        "/tmp",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Default read-only binds. `/lib64` is included only when the host has it.
#[must_use]
pub fn default_read_only_binds() -> Vec<String> {
    let mut paths: Vec<String> = ["/usr", "/bin", "/lib", "/sbin", "/etc/resolv.conf", "/etc/ssl"]
        .into_iter()
        .map(String::from)
        .collect();

    if Path::new("/lib64").is_dir() {
        paths.push("/lib64".to_string());
    }

    paths
}

/// Default writable binds: none. `/tmp` is already a tmpfs via the base args.
#[must_use]
pub fn default_write_binds() -> Vec<String> {
    Vec::new()
}
