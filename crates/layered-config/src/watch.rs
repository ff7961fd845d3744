//! Caller-facing handle for the next change of a value.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::oneshot;

use crate::error::ConfigError;
use crate::key::Key;

static NEXT_WATCH_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type Resolver<V> = oneshot::Sender<Result<V, ConfigError>>;

/// Resolves with the value produced by the next watch completion.
///
/// Every caller that asks for a watch before it completes receives a clone
/// of the same handle, and every clone observes the same outcome. Use
/// [`Watch::same_as`] to tell handles apart.
pub struct Watch<V> {
    id: u64,
    outcome: Shared<BoxFuture<'static, Result<V, ConfigError>>>,
}

impl<V> Watch<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Creates a pending handle together with the sender that resolves it.
    ///
    /// Dropping the sender resolves the handle with
    /// [`ConfigError::WatchStopped`].
    pub(crate) fn pending(key: &Key) -> (Self, Resolver<V>) {
        let (resolver, receiver) = oneshot::channel();
        let key = key.clone();
        let outcome = async move {
            receiver
                .await
                .unwrap_or_else(|_| Err(ConfigError::WatchStopped { key }))
        }
        .boxed()
        .shared();
        let id = NEXT_WATCH_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, outcome }, resolver)
    }

    /// True when both handles wait on the same watch.
    pub fn same_as(&self, other: &Self) -> bool {
        self.id == other.id
    }

    /// Outcome of the watch if it has already completed.
    pub fn peek(&self) -> Option<&Result<V, ConfigError>> {
        self.outcome.peek()
    }
}

impl<V> Clone for Watch<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            outcome: self.outcome.clone(),
        }
    }
}

impl<V> fmt::Debug for Watch<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<V> Future for Watch<V>
where
    V: Clone,
{
    type Output = Result<V, ConfigError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx)
    }
}
