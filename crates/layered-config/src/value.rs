//! Lazy, cached value handles and their watch state machine.
//!
//! A [`Value`] performs no I/O until it is read. Reads go through the
//! provider chain once and are then served from the cache until a write or
//! watch completion replaces it. Watches are single-flight: at most one
//! provider watch is outstanding per value, and every caller asking for a
//! watch before it completes shares one [`Watch`] handle.
//!
//! Locking: `gate` is an async mutex held across provider I/O so that reads
//! and writes of one value are totally ordered. `state` is a plain mutex
//! never held across an await; the synchronous entry points (`watch`,
//! `auto`, `stop`) and watch completions only take `state`. A read that
//! overlaps a completion keeps the completion's result.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::chain::Config;
use crate::error::{ConfigError, ProviderError};
use crate::key::Key;
use crate::marshal::Marshaler;
use crate::property::Property;
use crate::watch::{Resolver, Watch};

/// Cached state of a value.
#[derive(Debug, Clone)]
enum Cached<V> {
    /// Not read yet, or invalidated by a failed watch.
    Unknown,
    /// Defined by a provider (or set locally).
    Present(V),
    /// No provider defines the key; holds the default in effect.
    Absent(V),
}

impl<V> Cached<V> {
    fn get(&self) -> Option<&V> {
        match self {
            Self::Unknown => None,
            Self::Present(value) | Self::Absent(value) => Some(value),
        }
    }
}

/// Outstanding provider watch.
struct InFlight {
    seq: u64,
    task: JoinHandle<()>,
}

/// Caller-facing watcher waiting for the next completion.
struct Pending<V> {
    handle: Watch<V>,
    resolver: Resolver<V>,
}

struct State<V> {
    cached: Cached<V>,
    /// Last property observed; its next index seeds the next watch.
    baseline: Option<Property>,
    autoupdate: bool,
    in_flight: Option<InFlight>,
    watcher: Option<Pending<V>>,
    next_seq: u64,
    /// Bumped by every applied watch completion.
    version: u64,
}

struct Inner<V> {
    key: Key,
    config: Config,
    marshaler: Arc<dyn Marshaler<V>>,
    default: Option<V>,
    gate: tokio::sync::Mutex<()>,
    state: Mutex<State<V>>,
}

impl<V> Inner<V> {
    fn state(&self) -> MutexGuard<'_, State<V>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V> Drop for Inner<V> {
    /// Cancels the provider watch once no handle can observe it.
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(in_flight) = state.in_flight.take() {
            in_flight.task.abort();
        }
    }
}

/// Handle to one configuration key.
///
/// Cloning is cheap; clones share the cache and the watch state.
pub struct Value<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for Value<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Value<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state();
        f.debug_struct("Value")
            .field("key", &self.inner.key)
            .field("autoupdate", &state.autoupdate)
            .field("watching", &state.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

impl<V> Value<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        key: Key,
        config: Config,
        marshaler: Arc<dyn Marshaler<V>>,
        default: Option<V>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                key,
                config,
                marshaler,
                default,
                gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(State {
                    cached: Cached::Unknown,
                    baseline: None,
                    autoupdate: false,
                    in_flight: None,
                    watcher: None,
                    next_seq: 0,
                    version: 0,
                }),
            }),
        }
    }

    pub fn key(&self) -> &Key {
        &self.inner.key
    }

    /// True while the value re-arms its watch after every completion.
    pub fn is_auto(&self) -> bool {
        self.inner.state().autoupdate
    }

    /// Returns the current value, reading through the chain when nothing is
    /// cached.
    ///
    /// When no provider defines the key the configured default is returned;
    /// without one the result is `None`.
    pub async fn get(&self) -> Result<Option<V>, ConfigError> {
        self.resolve(None).await
    }

    /// Like [`Value::get`], falling back to `fallback` when the key is
    /// undefined and no default was configured.
    pub async fn get_or(&self, fallback: V) -> Result<V, ConfigError> {
        let resolved = self.resolve(Some(fallback.clone())).await?;
        Ok(resolved.unwrap_or(fallback))
    }

    async fn resolve(&self, fallback: Option<V>) -> Result<Option<V>, ConfigError> {
        let inner = &self.inner;
        let _gate = inner.gate.lock().await;
        let version = {
            let state = inner.state();
            if let Some(cached) = state.cached.get() {
                return Ok(Some(cached.clone()));
            }
            state.version
        };

        let read = inner
            .config
            .chain()
            .get(&inner.key)
            .await
            .map_err(|err| ConfigError::provider(&inner.key, err))?;

        let mut state = inner.state();
        if state.version != version {
            if let Some(current) = state.cached.get() {
                debug!(key = %inner.key, "watch completed during read, keeping its value");
                return Ok(Some(current.clone()));
            }
        }
        match read {
            Some(property) => {
                let value = inner
                    .marshaler
                    .unmarshal(property.value())
                    .map_err(|err| ConfigError::conversion(&inner.key, err))?;
                state.cached = Cached::Present(value.clone());
                state.baseline = Some(property);
                Ok(Some(value))
            }
            None => {
                let Some(value) = inner.default.clone().or(fallback) else {
                    return Ok(None);
                };
                state.cached = Cached::Absent(value.clone());
                Ok(Some(value))
            }
        }
    }

    /// Writes `value` through the first writable provider.
    ///
    /// Returns the provider's echo of the write, or `value` itself when no
    /// provider accepts writes. The echo is cached unless a watch already
    /// observed a newer change.
    pub async fn set(&self, value: V) -> Result<V, ConfigError> {
        let inner = &self.inner;
        let _gate = inner.gate.lock().await;
        let external = inner
            .marshaler
            .marshal(&value)
            .map_err(|err| ConfigError::conversion(&inner.key, err))?;
        let written = inner
            .config
            .chain()
            .set(&inner.key, &external)
            .await
            .map_err(|err| ConfigError::provider(&inner.key, err))?;

        let Some(property) = written else {
            inner.state().cached = Cached::Present(value.clone());
            return Ok(value);
        };
        let echoed = inner
            .marshaler
            .unmarshal(property.value())
            .map_err(|err| ConfigError::conversion(&inner.key, err))?;
        let mut state = inner.state();
        if !supersedes(&property, state.baseline.as_ref()) {
            debug!(key = %inner.key, "newer change already observed, write echo not cached");
            return Ok(echoed);
        }
        state.cached = Cached::Present(echoed.clone());
        state.baseline = Some(property);
        Ok(echoed)
    }

    /// Returns a handle resolving on the next change of the value.
    ///
    /// Callers share the pending handle until it resolves. Without a
    /// watchable provider the handle never resolves. Outside a Tokio runtime
    /// it fails with [`ConfigError::NoRuntime`].
    pub fn watch(&self) -> Watch<V> {
        let mut state = self.inner.state();
        if let Some(pending) = &state.watcher {
            return pending.handle.clone();
        }
        let (handle, resolver) = Watch::pending(&self.inner.key);
        state.watcher = Some(Pending {
            handle: handle.clone(),
            resolver,
        });
        arm(&self.inner, &mut state);
        handle
    }

    /// Keeps the value current by re-arming the watch after every
    /// completion until [`Value::stop`] is called. Idempotent.
    ///
    /// Outside a Tokio runtime only the flag is set; the watch starts with
    /// the next call made from within one.
    pub fn auto(&self) -> &Self {
        let mut state = self.inner.state();
        if !state.autoupdate {
            debug!(key = %self.inner.key, "auto-update enabled");
            state.autoupdate = true;
        }
        arm(&self.inner, &mut state);
        self
    }

    /// Ends auto-update, cancels the outstanding watch, and fails a pending
    /// watcher with [`ConfigError::WatchStopped`].
    pub fn stop(&self) {
        let mut state = self.inner.state();
        state.autoupdate = false;
        if let Some(in_flight) = state.in_flight.take() {
            debug!(key = %self.inner.key, seq = in_flight.seq, "cancelling watch");
            in_flight.task.abort();
        }
        if let Some(pending) = state.watcher.take() {
            let _ = pending.resolver.send(Err(ConfigError::WatchStopped {
                key: self.inner.key.clone(),
            }));
        }
    }
}

/// Issues a provider watch unless one is already outstanding.
fn arm<V>(inner: &Arc<Inner<V>>, state: &mut State<V>)
where
    V: Clone + Send + Sync + 'static,
{
    if state.in_flight.is_some() {
        return;
    }
    let Ok(runtime) = Handle::try_current() else {
        warn!(key = %inner.key, "no Tokio runtime, watch not started");
        if let Some(pending) = state.watcher.take() {
            let _ = pending.resolver.send(Err(ConfigError::NoRuntime {
                key: inner.key.clone(),
            }));
        }
        return;
    };
    let Some(future) = inner.config.chain().watch(&inner.key, state.baseline.as_ref()) else {
        debug!(key = %inner.key, "no watchable provider, watch stays pending");
        return;
    };
    let seq = state.next_seq;
    state.next_seq += 1;

    let weak: Weak<Inner<V>> = Arc::downgrade(inner);
    let task = runtime.spawn(async move {
        let outcome = future.await;
        let Some(inner) = weak.upgrade() else {
            debug!("value dropped before its watch completed");
            return;
        };
        let job = {
            let inner = Arc::clone(&inner);
            async move { complete(&inner, seq, outcome) }.boxed()
        };
        if inner.config.submit(job).is_err() {
            warn!(key = %inner.key, "completion sequencer unavailable, dropping watch result");
            abandon(&inner, seq);
        }
    });
    state.in_flight = Some(InFlight { seq, task });
}

/// Applies a watch outcome; runs on the sequencer.
fn complete<V>(inner: &Arc<Inner<V>>, seq: u64, outcome: Result<Property, ProviderError>)
where
    V: Clone + Send + Sync + 'static,
{
    let mut state = inner.state();
    if state.in_flight.as_ref().map(|in_flight| in_flight.seq) != Some(seq) {
        debug!(key = %inner.key, seq, "ignoring stale watch completion");
        return;
    }
    state.in_flight = None;
    state.version += 1;

    let resolution = match outcome {
        Ok(property) => apply_change(inner, &mut state, property),
        Err(err) => {
            warn!(key = %inner.key, error = %err, "watch failed");
            state.cached = Cached::Unknown;
            Err(ConfigError::watch(&inner.key, err))
        }
    };
    if let Some(pending) = state.watcher.take() {
        let _ = pending.resolver.send(resolution);
    }
    if state.autoupdate {
        arm(inner, &mut state);
    }
}

/// Releases watch `seq` without a result so the next `watch()` can re-arm.
fn abandon<V>(inner: &Inner<V>, seq: u64) {
    let mut state = inner.state();
    if state.in_flight.as_ref().map(|in_flight| in_flight.seq) != Some(seq) {
        return;
    }
    state.in_flight = None;
    if let Some(pending) = state.watcher.take() {
        let _ = pending.resolver.send(Err(ConfigError::WatchStopped {
            key: inner.key.clone(),
        }));
    }
}

/// True unless `current` carries a newer change index than `candidate`.
fn supersedes(candidate: &Property, current: Option<&Property>) -> bool {
    match (candidate.change_index(), current.and_then(Property::change_index)) {
        (Some(candidate), Some(current)) => candidate >= current,
        _ => true,
    }
}

/// Caches the value carried by a watch completion.
///
/// The baseline advances even when the payload cannot be converted, so the
/// next watch does not observe the same change again.
fn apply_change<V>(inner: &Inner<V>, state: &mut State<V>, property: Property) -> Result<V, ConfigError>
where
    V: Clone,
{
    let change_index = property.change_index();
    if property.is_tombstone() {
        state.baseline = Some(property);
        debug!(key = %inner.key, change_index, "key removed");
        return match &inner.default {
            Some(default) => {
                state.cached = Cached::Absent(default.clone());
                Ok(default.clone())
            }
            None => {
                state.cached = Cached::Unknown;
                Err(ConfigError::Removed {
                    key: inner.key.clone(),
                })
            }
        };
    }

    let converted = inner.marshaler.unmarshal(property.value());
    state.baseline = Some(property);
    match converted {
        Ok(value) => {
            debug!(key = %inner.key, change_index, "value changed");
            state.cached = Cached::Present(value.clone());
            Ok(value)
        }
        Err(err) => {
            warn!(key = %inner.key, change_index, error = %err, "changed value could not be converted");
            state.cached = Cached::Unknown;
            Err(ConfigError::conversion(&inner.key, err))
        }
    }
}
