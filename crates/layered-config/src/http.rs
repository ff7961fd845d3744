//! HTTP client utilities for remote providers.
//!
//! Wraps a shared `reqwest::Client` with the base URL, credentials, and
//! timeouts of one backend. Requests and responses are logged at debug
//! level with credentials redacted; request timeouts are reported as a
//! dedicated [`HttpError::Timeout`] so long-poll loops can reissue them.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

/// Default timeout for reads and writes.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// Default lifetime of a single long-poll request before it is reissued.
pub const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(60);
/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Options governing how the HTTP client is constructed.
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// Timeout applied to reads and writes.
    pub request_timeout: Duration,
    /// Timeout applied to each long-poll request.
    pub watch_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Whether TLS certificate validation should be skipped.
    pub accept_invalid_certs: bool,
    /// Optional credentials sent with every request.
    pub basic_auth: Option<BasicAuth>,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            watch_timeout: DEFAULT_WATCH_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            accept_invalid_certs: false,
            basic_auth: None,
        }
    }
}

/// Transport and protocol failures.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The configured endpoint is not a usable base URL.
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(String),
    /// The request did not complete within its timeout.
    #[error("request timed out")]
    Timeout,
    /// Transport-level issue (DNS, TLS, socket, etc.).
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// The server answered with an unexpected status.
    #[error("[{key}] {status}: {message}")]
    Status {
        key: String,
        status: StatusCode,
        message: String,
    },
    /// Response payload could not be decoded as JSON.
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The key addresses a directory rather than a value.
    #[error("directory nodes are not supported")]
    Directory,
    /// The response carried no node.
    #[error("response contains no node")]
    MissingNode,
    /// The underlying client could not be built.
    #[error("failed to build http client: {0}")]
    Client(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

/// HTTP client bound to one backend.
#[derive(Debug, Clone)]
pub struct HttpClient {
    /// Underlying HTTP client (shared connection pool).
    client: Client,
    /// Backend base URL.
    base_url: Url,
    /// Headers attached to every request.
    headers: HeaderMap,
    options: HttpClientOptions,
}

impl HttpClient {
    /// Builds a client for `base_url`.
    pub fn new(base_url: &str, options: HttpClientOptions) -> Result<Self, HttpError> {
        let base_url =
            Url::parse(base_url).map_err(|err| HttpError::InvalidUrl(format!("{base_url}: {err}")))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(HttpError::InvalidUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        let user_agent = format!("layered-config/{}", env!("CARGO_PKG_VERSION"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(|err| HttpError::Client(err.to_string()))?,
        );

        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()
            .map_err(|err| HttpError::Client(err.to_string()))?;

        Ok(Self {
            client,
            base_url,
            headers,
            options,
        })
    }

    /// Returns the base URL the client targets.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn options(&self) -> &HttpClientOptions {
        &self.options
    }

    /// Appends `segments` to the base path, percent-encoding each one.
    pub fn url_for<'a, I>(&self, segments: I) -> Result<Url, HttpError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Starts a request carrying the default headers, credentials, and the
    /// given timeout.
    pub fn request(&self, method: Method, url: Url, timeout: Duration) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .headers(self.headers.clone())
            .timeout(timeout);
        match &self.options.basic_auth {
            Some(auth) => builder.basic_auth(&auth.username, Some(&auth.password)),
            None => builder,
        }
    }

    /// Sends a request, logging both sides of the exchange.
    ///
    /// The status is not interpreted here; callers decide which statuses
    /// are meaningful for their protocol.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, HttpError> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        let body_len = request
            .body()
            .and_then(|body| body.as_bytes())
            .map(|bytes| bytes.len())
            .unwrap_or(0);
        tracing::debug!(
            method = %method,
            url = %url,
            headers = ?redact_headers(request.headers()),
            body_len = body_len,
            "layered-config HTTP request"
        );

        let response = self.client.execute(request).await?;

        let content_length = response
            .content_length()
            .map_or_else(|| "unknown".to_string(), |len| len.to_string());
        tracing::debug!(
            method = %method,
            url = %url,
            status = %response.status(),
            content_length = %content_length,
            "layered-config HTTP response"
        );
        Ok(response)
    }
}

/// Error payload shape used by key/value backends (`message` + `cause`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    cause: Option<String>,
}

/// Consumes an unexpected response and turns it into [`HttpError::Status`].
pub async fn status_error(key: &str, response: Response) -> HttpError {
    let status = response.status();
    let body = response.bytes().await.unwrap_or_default();
    HttpError::Status {
        key: key.to_string(),
        status,
        message: error_message(&body),
    }
}

/// Extracts a readable message from an error body.
fn error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            cause,
        }) => match cause {
            Some(cause) => format!("{message} ({cause})"),
            None => message,
        },
        _ if body.is_empty() => "no response body".to_string(),
        _ => truncate_preview_text(String::from_utf8_lossy(body)),
    }
}

/// Returns a redacted view of request headers suitable for debug logging.
fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "proxy-authorization"];

    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}

fn truncate_preview_text(text: Cow<'_, str>) -> String {
    const MAX_CHARS: usize = 512;
    let mut chars = text.chars();
    let mut preview = String::new();
    for _ in 0..MAX_CHARS {
        match chars.next() {
            Some(ch) => preview.push(ch),
            None => return preview,
        }
    }
    if chars.next().is_some() {
        preview.push('…');
    }
    preview
}
