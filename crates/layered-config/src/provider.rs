//! Provider contract.
//!
//! A provider advertises what it can do through a [`Capabilities`]
//! descriptor instead of being probed for trait implementations at
//! dispatch time. Each capability is a separate trait so a backend only
//! implements what it supports; watching always implies writing.

use std::fmt;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use serde_json::Value as External;

use crate::error::ProviderError;
use crate::key::Key;
use crate::property::Property;

/// Pending result of a provider watch request.
pub type WatchFuture = BoxFuture<'static, Result<Property, ProviderError>>;

/// Read capability.
#[async_trait]
pub trait Observable: Send + Sync {
    /// Returns the property for `key`, or `None` when the provider does not
    /// define it.
    async fn read(&self, key: &Key) -> Result<Option<Property>, ProviderError>;
}

/// Write capability.
#[async_trait]
pub trait Mutable: Send + Sync {
    /// Stores `value` and returns the property as the provider now holds it.
    async fn write(&self, key: &Key, value: &External) -> Result<Property, ProviderError>;
}

/// Watch capability.
pub trait Monitorable: Mutable {
    /// Waits for the next change of `key` after `previous`.
    ///
    /// Without a previous property the provider waits for the next change,
    /// whatever it is. The returned future owns everything it needs so it
    /// can be driven on a background task; timeouts of the underlying
    /// transport must be retried inside the future, never reported.
    fn watch(&self, key: &Key, previous: Option<&Property>) -> WatchFuture;
}

/// Capability descriptor returned by [`Provider::capabilities`].
#[derive(Clone, Copy, Default)]
pub struct Capabilities<'a> {
    read: Option<&'a dyn Observable>,
    write: Option<&'a dyn Mutable>,
    watch: Option<&'a dyn Monitorable>,
}

impl<'a> Capabilities<'a> {
    /// Descriptor with no capabilities.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn observable(mut self, provider: &'a dyn Observable) -> Self {
        self.read = Some(provider);
        self
    }

    pub fn mutable(mut self, provider: &'a dyn Mutable) -> Self {
        self.write = Some(provider);
        self
    }

    /// Registers the watch capability together with the write capability
    /// it implies.
    pub fn monitorable<P>(mut self, provider: &'a P) -> Self
    where
        P: Monitorable + 'a,
    {
        self.write = Some(provider);
        self.watch = Some(provider);
        self
    }

    pub fn read(&self) -> Option<&'a dyn Observable> {
        self.read
    }

    pub fn write(&self) -> Option<&'a dyn Mutable> {
        self.write
    }

    pub fn watch(&self) -> Option<&'a dyn Monitorable> {
        self.watch
    }
}

impl fmt::Debug for Capabilities<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities")
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .field("watch", &self.watch.is_some())
            .finish()
    }
}

/// A configuration backend.
pub trait Provider: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities<'_>;
}
