//! In-process property table.
//!
//! Serves as the local override layer placed in front of remote providers.
//! Every mutation bumps a table-wide revision that doubles as the change
//! index, so watches resume exactly like they do against the remote
//! backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value as External;
use tokio::sync::watch;

use crate::error::ProviderError;
use crate::key::Key;
use crate::property::Property;
use crate::provider::{Capabilities, Monitorable, Mutable, Observable, Provider, WatchFuture};

#[derive(Debug, Default)]
struct Table {
    revision: u64,
    entries: HashMap<String, Property>,
}

#[derive(Debug)]
struct Shared {
    table: Mutex<Table>,
    /// Publishes the latest revision.
    changes: watch::Sender<u64>,
}

/// Read/write/watch provider backed by a shared in-memory table.
///
/// Clones share the same table.
#[derive(Debug, Clone)]
pub struct MemoryProvider {
    shared: Arc<Shared>,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(Table::default()),
                changes,
            }),
        }
    }

    /// Builds a table pre-populated with `values`.
    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<External>,
    {
        let provider = Self::new();
        for (key, value) in values {
            provider.store(key.into(), value.into());
        }
        provider
    }

    /// Sets `key` and returns the stored property.
    pub fn insert(&self, key: &Key, value: impl Into<External>) -> Property {
        self.store(key.as_str().to_string(), value.into())
    }

    /// Removes `key`, leaving a tombstone that wakes watchers.
    ///
    /// Returns `None` when the key was not defined.
    pub fn remove(&self, key: &Key) -> Option<Property> {
        let defined = self
            .table()
            .entries
            .get(key.as_str())
            .is_some_and(|property| !property.is_tombstone());
        defined.then(|| self.store(key.as_str().to_string(), External::Null))
    }

    /// Current table revision.
    pub fn revision(&self) -> u64 {
        self.table().revision
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.shared
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self, key: String, value: External) -> Property {
        let property = {
            let mut table = self.table();
            table.revision += 1;
            let property = Property::indexed(value, table.revision);
            table.entries.insert(key, property.clone());
            property
        };
        self.shared.changes.send_replace(property.change_index().unwrap_or_default());
        property
    }

    fn entry(&self, key: &str) -> Option<Property> {
        self.table().entries.get(key).cloned()
    }
}

impl Provider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities::none().observable(self).monitorable(self)
    }
}

#[async_trait]
impl Observable for MemoryProvider {
    async fn read(&self, key: &Key) -> Result<Option<Property>, ProviderError> {
        Ok(self
            .entry(key.as_str())
            .filter(|property| !property.is_tombstone()))
    }
}

#[async_trait]
impl Mutable for MemoryProvider {
    async fn write(&self, key: &Key, value: &External) -> Result<Property, ProviderError> {
        if value.is_null() {
            return Err(ProviderError::backend(
                self.name(),
                format!("refusing to store null for {key}"),
            ));
        }
        Ok(self.insert(key, value.clone()))
    }
}

impl Monitorable for MemoryProvider {
    fn watch(&self, key: &Key, previous: Option<&Property>) -> WatchFuture {
        let provider = self.clone();
        let key = key.as_str().to_string();
        // Without a baseline only changes made after this call count.
        let wait_index = previous
            .and_then(Property::next_index)
            .unwrap_or_else(|| provider.revision() + 1);
        Box::pin(async move {
            let mut changes = provider.shared.changes.subscribe();
            loop {
                if let Some(property) = provider.entry(&key) {
                    if property.change_index().is_some_and(|index| index >= wait_index) {
                        return Ok(property);
                    }
                }
                changes.changed().await.map_err(|_| {
                    ProviderError::backend("memory", "change notifications closed")
                })?;
            }
        })
    }
}
