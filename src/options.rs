//! Run-time options accepted by [`BubblewrapSandbox::run_with_option_map`].
//!
//! Options arrive as a loosely-typed map (from a CLI, a config file, an RPC
//! payload). Only a fixed set of keys is recognized, each with one accepted
//! type. Unknown keys and wrongly-typed values are rejected, never dropped.
//!
//! | Key | Type | Default |
//! |---|---|---|
//! | `expose_environment` | bool | `false` |
//!
//! [`BubblewrapSandbox::run_with_option_map`]: crate::sandbox::BubblewrapSandbox::run_with_option_map

use serde_json::{Map, Value};

use crate::error::{OptionsError, Result};

/// Makes the captured environment readable through
/// [`SecureProcess::env`](crate::process::SecureProcess::env).
pub const EXPOSE_ENVIRONMENT: &str = "expose_environment";

const VALID_KEYS: &[&str] = &[EXPOSE_ENVIRONMENT];

/// Validated run options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Whether the returned process exposes its captured environment.
    pub expose_environment: bool,
}

impl RunOptions {
    /// Options with environment exposure turned on.
    #[must_use]
    pub fn exposing_environment() -> Self {
        Self {
            expose_environment: true,
        }
    }

    /// All recognized option keys.
    #[must_use]
    pub fn valid_keys() -> &'static [&'static str] {
        VALID_KEYS
    }

    /// Returns `true` if `key` is a recognized option.
    #[must_use]
    pub fn is_valid_key(key: &str) -> bool {
        VALID_KEYS.contains(&key)
    }

    /// Default value of every option.
    #[must_use]
    pub fn defaults() -> Map<String, Value> {
        Self::default().to_map()
    }

    /// Validates `options` and merges them over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `OptionsError::UnknownOption` for an unrecognized key, or
    /// `OptionsError::InvalidOptionType` for a value of the wrong type.
    pub fn validate(options: &Map<String, Value>) -> Result<Self> {
        if let Some(key) = options.keys().find(|key| !Self::is_valid_key(key)) {
            return Err(unknown(key).into());
        }

        let mut normalized = Self::default();
        if let Some(value) = options.get(EXPOSE_ENVIRONMENT) {
            normalized.expose_environment = expect_bool(EXPOSE_ENVIRONMENT, value)?;
        }

        Ok(normalized)
    }

    /// Reads one option from a raw map, falling back to its default.
    ///
    /// The value is returned as supplied; use [`Self::validate`] for type
    /// checking.
    ///
    /// # Errors
    ///
    /// Returns `OptionsError::UnknownOption` if `key` is not recognized.
    pub fn get(options: &Map<String, Value>, key: &str) -> Result<Value> {
        if !Self::is_valid_key(key) {
            return Err(unknown(key).into());
        }

        Ok(options
            .get(key)
            .cloned()
            .or_else(|| Self::defaults().remove(key))
            .unwrap_or(Value::Null))
    }

    /// The normalized map form, with every key present.
    #[must_use]
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert(
            EXPOSE_ENVIRONMENT.to_string(),
            Value::Bool(self.expose_environment),
        );
        map
    }
}

impl TryFrom<&Map<String, Value>> for RunOptions {
    type Error = crate::error::Error;

    fn try_from(options: &Map<String, Value>) -> Result<Self> {
        Self::validate(options)
    }
}

fn unknown(key: &str) -> OptionsError {
    OptionsError::UnknownOption {
        key: key.to_string(),
        valid: VALID_KEYS.join(", "),
    }
}

fn expect_bool(key: &str, value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        OptionsError::InvalidOptionType {
            key: key.to_string(),
            expected: "boolean",
            found: format!("{} (value: {value})", json_type(value)),
        }
        .into()
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
