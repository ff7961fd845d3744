//! Configuration keys.
//!
//! A key is a dot-separated identifier such as `app.http.port`. Providers
//! are free to interpret the segments; the remote provider maps them onto
//! a hierarchical path while the environment provider flattens them.

use std::fmt;

use crate::error::ConfigError;

/// Validated, immutable configuration key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl Key {
    /// Builds a key, rejecting blank input and keys without any segment.
    pub fn new(raw: impl Into<String>) -> Result<Self, ConfigError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ConfigError::InvalidArgument(
                "key must not be empty".to_string(),
            ));
        }
        let key = Self(raw);
        if key.segments().next().is_none() {
            return Err(ConfigError::InvalidArgument(format!(
                "key {:?} has no path segments",
                key.0
            )));
        }
        Ok(key)
    }

    /// Returns the key exactly as supplied.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterates the non-empty dot-separated segments.
    ///
    /// Consecutive dots collapse, so `a..b` yields `a` and `b`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Key {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for Key {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
