//! Scripted provider for engine and chain tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as External;
use tokio::sync::{oneshot, Notify};

use crate::error::ProviderError;
use crate::key::Key;
use crate::property::Property;
use crate::provider::{Capabilities, Monitorable, Mutable, Observable, Provider, WatchFuture};

type WatchOutcome = Result<Property, ProviderError>;

/// Provider whose reads, writes, and watches are driven by the test.
///
/// Watches stay pending until [`ScriptedProvider::resolve_watch`] is called;
/// they resolve in the order they were issued.
pub(crate) struct ScriptedProvider {
    name: &'static str,
    watchable: bool,
    values: Mutex<HashMap<String, Property>>,
    read_failure: Mutex<Option<String>>,
    held_reads: Mutex<HashMap<String, Arc<Notify>>>,
    echo: Mutex<Option<External>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    watch_requests: Mutex<Vec<Option<u64>>>,
    pending: Mutex<VecDeque<oneshot::Sender<WatchOutcome>>>,
}

impl ScriptedProvider {
    pub(crate) fn read_only(name: &'static str) -> Self {
        Self::build(name, false)
    }

    /// Read, write, and watch.
    pub(crate) fn watchable(name: &'static str) -> Self {
        Self::build(name, true)
    }

    fn build(name: &'static str, watchable: bool) -> Self {
        Self {
            name,
            watchable,
            values: Mutex::default(),
            read_failure: Mutex::default(),
            held_reads: Mutex::default(),
            echo: Mutex::default(),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            watch_requests: Mutex::default(),
            pending: Mutex::default(),
        }
    }

    pub(crate) fn define(&self, key: &str, value: impl Into<External>) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), Property::new(value));
    }

    pub(crate) fn define_indexed(&self, key: &str, value: impl Into<External>, index: u64) {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), Property::indexed(value, index));
    }

    /// Makes every subsequent read fail.
    pub(crate) fn fail_reads(&self, message: &str) {
        *self.read_failure.lock().unwrap() = Some(message.to_string());
    }

    /// Makes reads of `key` wait until the returned notify is signalled.
    pub(crate) fn hold_reads(&self, key: &str) -> Arc<Notify> {
        let release = Arc::new(Notify::new());
        self.held_reads
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::clone(&release));
        release
    }

    /// Makes writes report `value` instead of what was written.
    pub(crate) fn echo_writes_as(&self, value: impl Into<External>) {
        *self.echo.lock().unwrap() = Some(value.into());
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Wait index carried by every watch issued so far.
    pub(crate) fn watch_requests(&self) -> Vec<Option<u64>> {
        self.watch_requests.lock().unwrap().clone()
    }

    /// Completes the oldest outstanding watch. Returns false when none is
    /// outstanding or its receiver is gone.
    pub(crate) fn resolve_watch(&self, outcome: WatchOutcome) -> bool {
        let sender = self.pending.lock().unwrap().pop_front();
        sender.is_some_and(|sender| sender.send(outcome).is_ok())
    }
}

impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn capabilities(&self) -> Capabilities<'_> {
        let caps = Capabilities::none().observable(self);
        if self.watchable {
            caps.monitorable(self)
        } else {
            caps
        }
    }
}

#[async_trait]
impl Observable for ScriptedProvider {
    async fn read(&self, key: &Key) -> Result<Option<Property>, ProviderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let held = self.held_reads.lock().unwrap().get(key.as_str()).cloned();
        if let Some(release) = held {
            release.notified().await;
        }
        if let Some(message) = self.read_failure.lock().unwrap().clone() {
            return Err(ProviderError::backend(self.name, message));
        }
        Ok(self.values.lock().unwrap().get(key.as_str()).cloned())
    }
}

#[async_trait]
impl Mutable for ScriptedProvider {
    async fn write(&self, key: &Key, value: &External) -> Result<Property, ProviderError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let stored = self.echo.lock().unwrap().clone().unwrap_or_else(|| value.clone());
        let property = Property::new(stored);
        self.values
            .lock()
            .unwrap()
            .insert(key.as_str().to_string(), property.clone());
        Ok(property)
    }
}

impl Monitorable for ScriptedProvider {
    fn watch(&self, _key: &Key, previous: Option<&Property>) -> WatchFuture {
        self.watch_requests
            .lock()
            .unwrap()
            .push(previous.and_then(Property::next_index));
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().unwrap().push_back(sender);
        Box::pin(async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(ProviderError::backend("scripted", "watch abandoned")))
        })
    }
}
