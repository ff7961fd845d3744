//! Remote provider backed by the etcd v2 keys API.
//!
//! Keys map onto `/v2/keys/<segment>/<segment>/...`. Reads and writes
//! return the node's `modifiedIndex`, which becomes the change index of the
//! resulting [`Property`]; watches long-poll with `wait=true` and resume
//! from the baseline's next index through `waitIndex`.

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value as External;
use tracing::debug;

use crate::config::EtcdEnv;
use crate::error::ProviderError;
use crate::http::{status_error, HttpClient, HttpClientOptions, HttpError};
use crate::key::Key;
use crate::long_poll::long_poll;
use crate::property::Property;
use crate::provider::{Capabilities, Monitorable, Mutable, Observable, Provider, WatchFuture};

/// Path prefix of the keys API.
const KEYS_PREFIX: [&str; 2] = ["v2", "keys"];

#[derive(Debug, Deserialize)]
struct NodeResponse {
    node: Option<Node>,
}

#[derive(Debug, Deserialize)]
struct Node {
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(rename = "modifiedIndex")]
    modified_index: Option<u64>,
}

/// Read/write/watch provider for an etcd v2 compatible service.
#[derive(Debug, Clone)]
pub struct EtcdProvider {
    client: HttpClient,
}

impl EtcdProvider {
    /// Builds a provider for `endpoint` (scheme, host, and port).
    pub fn new(endpoint: &str, options: HttpClientOptions) -> Result<Self, HttpError> {
        Ok(Self {
            client: HttpClient::new(endpoint, options)?,
        })
    }

    /// Builds a provider from environment-derived settings.
    pub fn from_env(env: &EtcdEnv) -> Result<Self, HttpError> {
        Self::new(&env.endpoint, env.to_options())
    }

    pub fn endpoint(&self) -> &Url {
        self.client.base_url()
    }

    fn key_url(&self, key: &Key) -> Result<Url, HttpError> {
        self.client
            .url_for(KEYS_PREFIX.into_iter().chain(key.segments()))
    }
}

impl Provider for EtcdProvider {
    fn name(&self) -> &str {
        "etcd"
    }

    fn capabilities(&self) -> Capabilities<'_> {
        Capabilities::none().observable(self).monitorable(self)
    }
}

#[async_trait]
impl Observable for EtcdProvider {
    async fn read(&self, key: &Key) -> Result<Option<Property>, ProviderError> {
        let url = self.key_url(key)?;
        let timeout = self.client.options().request_timeout;
        let response = self
            .client
            .send(self.client.request(Method::GET, url, timeout))
            .await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                debug!(key = %key, "etcd key not found");
                return Ok(None);
            }
            _ => return Err(status_error(key.as_str(), response).await.into()),
        }
        let body = response.bytes().await.map_err(HttpError::from)?;
        let property = property_from_body(&body)?;
        Ok((!property.is_tombstone()).then_some(property))
    }
}

#[async_trait]
impl Mutable for EtcdProvider {
    async fn write(&self, key: &Key, value: &External) -> Result<Property, ProviderError> {
        let url = self.key_url(key)?;
        let text = match value {
            External::String(text) => text.clone(),
            other => other.to_string(),
        };
        let timeout = self.client.options().request_timeout;
        let builder = self
            .client
            .request(Method::PUT, url, timeout)
            .form(&[("value", text.as_str())]);
        let response = self.client.send(builder).await?;
        if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
            return Err(status_error(key.as_str(), response).await.into());
        }
        let body = response.bytes().await.map_err(HttpError::from)?;
        Ok(property_from_body(&body)?)
    }
}

impl Monitorable for EtcdProvider {
    fn watch(&self, key: &Key, previous: Option<&Property>) -> WatchFuture {
        let client = self.client.clone();
        let url = self.key_url(key);
        let key = key.clone();
        let wait_index = previous.and_then(Property::next_index);
        Box::pin(async move {
            let url = url?;
            let property = long_poll(key.as_str(), || {
                watch_once(&client, &key, url.clone(), wait_index)
            })
            .await?;
            Ok::<_, ProviderError>(property)
        })
    }
}

/// Issues one long-poll request.
async fn watch_once(
    client: &HttpClient,
    key: &Key,
    url: Url,
    wait_index: Option<u64>,
) -> Result<Property, HttpError> {
    let mut query = vec![("wait", "true".to_string())];
    if let Some(index) = wait_index {
        query.push(("waitIndex", index.to_string()));
    }
    let timeout = client.options().watch_timeout;
    let response = client
        .send(client.request(Method::GET, url, timeout).query(&query))
        .await?;
    if response.status() != StatusCode::OK {
        return Err(status_error(key.as_str(), response).await);
    }
    let body = response.bytes().await?;
    property_from_body(&body)
}

/// Decodes a keys API response into a property.
///
/// Nodes without a value (delete and expire events) become tombstones.
fn property_from_body(body: &[u8]) -> Result<Property, HttpError> {
    let response: NodeResponse = serde_json::from_slice(body)?;
    let node = response.node.ok_or(HttpError::MissingNode)?;
    if node.dir {
        return Err(HttpError::Directory);
    }
    let value = node.value.map(External::String).unwrap_or(External::Null);
    Ok(match node.modified_index {
        Some(index) => Property::indexed(value, index),
        None => Property::new(value),
    })
}
