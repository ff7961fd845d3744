//! Layered configuration values.
//!
//! A [`Config`] dispatches reads, writes, and watches to an ordered list of
//! providers: the process environment, an in-memory override table, or a
//! remote etcd v2 service watched through HTTP long-polling. It hands out
//! lazy [`Value`] handles that cache what they read, share a single
//! outstanding watch per key, and can keep themselves current with
//! [`Value::auto`].

mod chain;
pub mod config;
mod error;
pub mod http;
mod key;
mod long_poll;
pub mod marshal;
mod property;
pub mod provider;
pub mod providers;
mod sequencer;
#[cfg(test)]
mod test_support;
pub mod typecast;
mod value;
mod watch;

pub use chain::{Config, ProviderChain};
pub use config::EtcdEnv;
pub use error::{ConfigError, ProviderError};
pub use http::{BasicAuth, HttpClientOptions, HttpError};
pub use key::Key;
pub use marshal::{JsonMarshaler, Marshaler, PrimitiveMarshaler};
pub use property::Property;
pub use provider::{Capabilities, Monitorable, Mutable, Observable, Provider, WatchFuture};
pub use typecast::{ConversionError, Primitive};
pub use value::Value;
pub use watch::Watch;
