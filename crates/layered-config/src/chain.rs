//! Ordered provider chain and the [`Config`] entry point.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value as External;
use tracing::debug;

use crate::error::{ConfigError, ProviderError};
use crate::key::Key;
use crate::marshal::{Marshaler, PrimitiveMarshaler};
use crate::property::Property;
use crate::provider::{Provider, WatchFuture};
use crate::sequencer::{Job, Sequencer};
use crate::typecast::Primitive;
use crate::value::Value;

/// Dispatches reads, writes, and watches to providers in construction order.
#[derive(Clone)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderChain {
    /// Fails with [`ConfigError::InvalidArgument`] when `providers` is empty.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Result<Self, ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::InvalidArgument(
                "at least one provider is required".to_string(),
            ));
        }
        Ok(Self { providers })
    }

    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|provider| provider.name())
    }

    /// Returns the first property found by a readable provider.
    ///
    /// A provider failure ends the lookup; providers later in the chain are
    /// not consulted.
    pub async fn get(&self, key: &Key) -> Result<Option<Property>, ProviderError> {
        for provider in &self.providers {
            let Some(reader) = provider.capabilities().read() else {
                continue;
            };
            if let Some(property) = reader.read(key).await? {
                debug!(key = %key, provider = provider.name(), "property found");
                return Ok(Some(property));
            }
        }
        debug!(key = %key, "no provider defines the key");
        Ok(None)
    }

    /// Writes through the first writable provider.
    ///
    /// Returns `None` when no provider accepts writes.
    pub async fn set(
        &self,
        key: &Key,
        value: &External,
    ) -> Result<Option<Property>, ProviderError> {
        for provider in &self.providers {
            if let Some(writer) = provider.capabilities().write() {
                debug!(key = %key, provider = provider.name(), "writing property");
                return writer.write(key, value).await.map(Some);
            }
        }
        debug!(key = %key, "no writable provider, keeping the value locally");
        Ok(None)
    }

    /// Starts a watch on the first watchable provider.
    pub fn watch(&self, key: &Key, previous: Option<&Property>) -> Option<WatchFuture> {
        self.providers.iter().find_map(|provider| {
            let watcher = provider.capabilities().watch()?;
            debug!(
                key = %key,
                provider = provider.name(),
                wait_index = previous.and_then(Property::next_index),
                "arming watch"
            );
            Some(watcher.watch(key, previous))
        })
    }
}

impl fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.provider_names()).finish()
    }
}

struct ConfigInner {
    chain: ProviderChain,
    /// Started on first use so construction works outside a runtime;
    /// replaced when its worker is gone.
    sequencer: Mutex<Option<Sequencer>>,
}

/// Entry point: hands out [`Value`] handles backed by a provider chain.
///
/// Cloning is cheap; clones share the chain and the completion sequencer.
///
/// ```no_run
/// use std::sync::Arc;
/// use layered_config::providers::{EnvProvider, EtcdProvider};
/// use layered_config::{Config, EtcdEnv};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let etcd = EtcdProvider::from_env(&EtcdEnv::from_os_env())?;
/// let config = Config::new(vec![Arc::new(EnvProvider::new()), Arc::new(etcd)])?;
/// let port = config.get_as::<u16>("app.port")?;
/// println!("port = {:?}", port.get().await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Config {
    inner: Arc<ConfigInner>,
}

impl Config {
    /// Fails with [`ConfigError::InvalidArgument`] when `providers` is empty.
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Result<Self, ConfigError> {
        Ok(Self {
            inner: Arc::new(ConfigInner {
                chain: ProviderChain::new(providers)?,
                sequencer: Mutex::new(None),
            }),
        })
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.inner.chain
    }

    /// Names of the providers in dispatch order.
    pub fn provider_names(&self) -> Vec<&str> {
        self.inner.chain.provider_names().collect()
    }

    /// String-typed handle for `key`. Performs no I/O.
    pub fn get(&self, key: impl AsRef<str>) -> Result<Value<String>, ConfigError> {
        self.get_as(key)
    }

    /// Handle converting the external value to `V`.
    pub fn get_as<V: Primitive>(&self, key: impl AsRef<str>) -> Result<Value<V>, ConfigError> {
        let marshaler: Arc<dyn Marshaler<V>> = Arc::new(PrimitiveMarshaler::new());
        self.get_with(key, marshaler, None)
    }

    /// Like [`Config::get_as`] with a default used when no provider defines
    /// the key.
    pub fn get_or<V: Primitive>(
        &self,
        key: impl AsRef<str>,
        default: V,
    ) -> Result<Value<V>, ConfigError> {
        let marshaler: Arc<dyn Marshaler<V>> = Arc::new(PrimitiveMarshaler::new());
        self.get_with(key, marshaler, Some(default))
    }

    /// Handle using a custom marshaler.
    pub fn get_with<V>(
        &self,
        key: impl AsRef<str>,
        marshaler: Arc<dyn Marshaler<V>>,
        default: Option<V>,
    ) -> Result<Value<V>, ConfigError>
    where
        V: Clone + Send + Sync + 'static,
    {
        let key = Key::new(key.as_ref())?;
        Ok(Value::new(key, self.clone(), marshaler, default))
    }

    /// Queues `job` on the sequencer shared by every value of this config.
    ///
    /// The sequencer is started on the current runtime on first use, and
    /// again when the runtime that ran it has shut down. Hands the job back
    /// when even a fresh worker cannot take it.
    pub(crate) fn submit(&self, job: Job) -> Result<(), Job> {
        let mut slot = self
            .inner
            .sequencer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let job = match slot.as_ref() {
            Some(sequencer) => match sequencer.submit(job) {
                Ok(()) => return Ok(()),
                Err(job) => {
                    debug!("completion sequencer stopped, restarting it");
                    job
                }
            },
            None => job,
        };
        let sequencer = Sequencer::start();
        let submitted = sequencer.submit(job);
        *slot = Some(sequencer);
        submitted
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("providers", &self.inner.chain)
            .finish_non_exhaustive()
    }
}
