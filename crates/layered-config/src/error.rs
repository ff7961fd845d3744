//! Error taxonomy shared by the provider chain and the value engine.

use std::sync::Arc;

use thiserror::Error;

use crate::http::HttpError;
use crate::key::Key;
use crate::typecast::ConversionError;

/// Failure reported by a provider while reading, writing, or watching.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The HTTP exchange with a remote backend failed.
    #[error("http error: {0}")]
    Http(#[from] HttpError),
    /// Any other backend-specific failure.
    #[error("provider {provider} failed: {message}")]
    Backend { provider: String, message: String },
}

impl ProviderError {
    /// Convenience constructor for non-HTTP backends.
    pub fn backend(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Returns true when the failure is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Http(HttpError::Timeout))
    }
}

/// Error surfaced to callers of [`crate::Config`] and [`crate::Value`].
///
/// The type is cheap to clone so a single watch outcome can be handed to
/// every caller sharing the same [`crate::Watch`].
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Malformed construction input (empty key, empty provider list).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A provider failed while reading or writing the key.
    #[error("[{key}] provider error: {source}")]
    Provider {
        key: Key,
        #[source]
        source: Arc<ProviderError>,
    },
    /// The value could not be converted to or from its external form.
    #[error("[{key}] {source}")]
    TypeConversion {
        key: Key,
        #[source]
        source: ConversionError,
    },
    /// A watch failed with something other than a long-poll timeout.
    #[error("[{key}] watch failed: {source}")]
    Watch {
        key: Key,
        #[source]
        source: Arc<ProviderError>,
    },
    /// The watched key was removed and no default is configured.
    #[error("[{key}] key was removed")]
    Removed { key: Key },
    /// The watch was stopped before it produced a value.
    #[error("[{key}] watch stopped")]
    WatchStopped { key: Key },
    /// A watch was requested outside a Tokio runtime.
    #[error("[{key}] watch requires a Tokio runtime")]
    NoRuntime { key: Key },
}

impl ConfigError {
    pub(crate) fn provider(key: &Key, source: ProviderError) -> Self {
        Self::Provider {
            key: key.clone(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn conversion(key: &Key, source: ConversionError) -> Self {
        Self::TypeConversion {
            key: key.clone(),
            source,
        }
    }

    pub(crate) fn watch(key: &Key, source: ProviderError) -> Self {
        Self::Watch {
            key: key.clone(),
            source: Arc::new(source),
        }
    }

    /// Returns the key the error relates to, if any.
    pub fn key(&self) -> Option<&Key> {
        match self {
            Self::InvalidArgument(_) => None,
            Self::Provider { key, .. }
            | Self::TypeConversion { key, .. }
            | Self::Watch { key, .. }
            | Self::Removed { key }
            | Self::WatchStopped { key }
            | Self::NoRuntime { key } => Some(key),
        }
    }
}
