//! Read-only provider over environment variables.

use std::collections::HashMap;
use std::env;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::key::Key;
use crate::property::Property;
use crate::provider::{Capabilities, Observable, Provider};

#[derive(Debug, Clone)]
enum Source {
    /// Live process environment, consulted on every read.
    Process,
    /// Fixed snapshot, used by hosts that pre-filter variables and by tests.
    Fixed(HashMap<String, String>),
}

/// Looks keys up as environment variables.
///
/// `app.port` is tried verbatim first, then as `APP_PORT`. With a prefix
/// of `MYAPP_` the candidates become `MYAPP_app.port` and `MYAPP_APP_PORT`.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    source: Source,
    prefix: Option<String>,
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvProvider {
    /// Reads from the process environment.
    pub fn new() -> Self {
        Self {
            source: Source::Process,
            prefix: None,
        }
    }

    /// Reads from a fixed set of variables.
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            source: Source::Fixed(vars),
            prefix: None,
        }
    }

    /// Prepends `prefix` to every variable name looked up.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    fn candidates(&self, key: &Key) -> [String; 2] {
        let prefix = self.prefix.as_deref().unwrap_or_default();
        let flattened = key
            .segments()
            .map(str::to_ascii_uppercase)
            .collect::<Vec<_>>()
            .join("_");
        [
            format!("{prefix}{}", key.as_str()),
            format!("{prefix}{flattened}"),
        ]
    }

    fn lookup(&self, name: &str) -> Option<String> {
        match &self.source {
            Source::Process => env::var(name).ok(),
            Source::Fixed(vars) => vars.get(name).cloned(),
        }
    }
}

impl Provider for EnvProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities::none().observable(self)
    }
}

#[async_trait]
impl Observable for EnvProvider {
    async fn read(&self, key: &Key) -> Result<Option<Property>, ProviderError> {
        Ok(self
            .candidates(key)
            .iter()
            .find_map(|name| self.lookup(name))
            .map(Property::new))
    }
}
