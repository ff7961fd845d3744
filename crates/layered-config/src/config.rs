//! Environment-driven settings for the remote provider.
//!
//! Mirrors how hosts usually configure the client: every option has a
//! default and can be overridden through `ETCD_*` variables. Settings can
//! also be built from any key/value iterator so tests never touch the
//! process environment.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::http::{
    BasicAuth, HttpClientOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_WATCH_TIMEOUT,
};

/// Base URL of the key/value service.
const ENV_ENDPOINT: &str = "ETCD_ENDPOINT";
/// Timeout in seconds for reads and writes.
const ENV_REQUEST_TIMEOUT: &str = "ETCD_REQUEST_TIMEOUT_SECS";
/// Lifetime in seconds of one long-poll request.
const ENV_WATCH_TIMEOUT: &str = "ETCD_WATCH_TIMEOUT_SECS";
/// TCP connect timeout in seconds.
const ENV_CONNECT_TIMEOUT: &str = "ETCD_CONNECT_TIMEOUT_SECS";
const ENV_USERNAME: &str = "ETCD_USERNAME";
const ENV_PASSWORD: &str = "ETCD_PASSWORD";
/// Skips TLS certificate validation when truthy.
const ENV_NO_TLS_VALIDATION: &str = "ETCD_NO_TLS_VALIDATION";

/// Endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4001";

/// Captures environment-derived options for [`crate::providers::EtcdProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdEnv {
    /// Base URL of the service (scheme, host, port).
    pub endpoint: String,
    pub request_timeout: Duration,
    pub watch_timeout: Duration,
    pub connect_timeout: Duration,
    /// Credentials; only used when both username and password are set.
    pub basic_auth: Option<BasicAuth>,
    /// When `true`, TLS certificate validation is skipped.
    pub no_tls_validation: bool,
}

impl Default for EtcdEnv {
    fn default() -> Self {
        Self::from_env_iter(std::iter::empty::<(String, String)>())
    }
}

impl EtcdEnv {
    /// Builds settings from the current process environment.
    pub fn from_os_env() -> Self {
        Self::from_env_iter(env::vars())
    }

    /// Builds settings from an iterator of key/value pairs.
    pub fn from_env_iter<I, K, V>(iter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let endpoint = map
            .get(ENV_ENDPOINT)
            .and_then(|value| sanitize_non_empty(value))
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let request_timeout =
            parse_secs(map.get(ENV_REQUEST_TIMEOUT).map(String::as_str), DEFAULT_REQUEST_TIMEOUT);
        let watch_timeout =
            parse_secs(map.get(ENV_WATCH_TIMEOUT).map(String::as_str), DEFAULT_WATCH_TIMEOUT);
        let connect_timeout =
            parse_secs(map.get(ENV_CONNECT_TIMEOUT).map(String::as_str), DEFAULT_CONNECT_TIMEOUT);
        let username = map.get(ENV_USERNAME).and_then(|value| sanitize_non_empty(value));
        // Passwords are taken verbatim; surrounding whitespace may be significant.
        let password = map.get(ENV_PASSWORD).filter(|value| !value.is_empty()).cloned();
        let basic_auth = match (username, password) {
            (Some(username), Some(password)) => Some(BasicAuth { username, password }),
            _ => None,
        };
        let no_tls_validation =
            parse_bool(map.get(ENV_NO_TLS_VALIDATION).map(String::as_str), false);

        Self {
            endpoint,
            request_timeout,
            watch_timeout,
            connect_timeout,
            basic_auth,
            no_tls_validation,
        }
    }

    /// Converts the settings into HTTP client options.
    pub fn to_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            request_timeout: self.request_timeout,
            watch_timeout: self.watch_timeout,
            connect_timeout: self.connect_timeout,
            accept_invalid_certs: self.no_tls_validation,
            basic_auth: self.basic_auth.clone(),
        }
    }
}

/// Helper trimming whitespace and discarding empty values.
fn sanitize_non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a positive number of seconds, falling back to `default`.
fn parse_secs(value: Option<&str>, default: Duration) -> Duration {
    match value.map(str::trim).map(str::parse::<u64>) {
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        _ => default,
    }
}

/// Parses boolean values from strings, falling back to the provided default.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(|s| s.trim().to_ascii_lowercase()) {
        Some(ref v) if ["1", "true", "t", "yes", "y"].contains(&v.as_str()) => true,
        Some(ref v) if ["0", "false", "f", "no", "n"].contains(&v.as_str()) => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_a_local_service() {
        let env = EtcdEnv::default();
        assert_eq!(env.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(env.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(env.watch_timeout, DEFAULT_WATCH_TIMEOUT);
        assert_eq!(env.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert!(env.basic_auth.is_none());
        assert!(!env.no_tls_validation);
    }

    #[test]
    fn overrides_are_honoured() {
        let env = EtcdEnv::from_env_iter([
            (ENV_ENDPOINT, " https://kv.internal:2379/ "),
            (ENV_REQUEST_TIMEOUT, "5"),
            (ENV_WATCH_TIMEOUT, "300"),
            (ENV_CONNECT_TIMEOUT, "2"),
            (ENV_USERNAME, "root"),
            (ENV_PASSWORD, "s3cret"),
            (ENV_NO_TLS_VALIDATION, "yes"),
        ]);
        assert_eq!(env.endpoint, "https://kv.internal:2379");
        assert_eq!(env.request_timeout, Duration::from_secs(5));
        assert_eq!(env.watch_timeout, Duration::from_secs(300));
        assert_eq!(env.connect_timeout, Duration::from_secs(2));
        assert_eq!(
            env.basic_auth,
            Some(BasicAuth {
                username: "root".into(),
                password: "s3cret".into(),
            })
        );
        assert!(env.no_tls_validation);

        let options = env.to_options();
        assert_eq!(options.watch_timeout, Duration::from_secs(300));
        assert!(options.accept_invalid_certs);
        assert!(options.basic_auth.is_some());
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let env = EtcdEnv::from_env_iter([
            (ENV_REQUEST_TIMEOUT, "soon"),
            (ENV_WATCH_TIMEOUT, "0"),
        ]);
        assert_eq!(env.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(env.watch_timeout, DEFAULT_WATCH_TIMEOUT);
    }

    #[test]
    fn credentials_require_both_halves() {
        let env = EtcdEnv::from_env_iter([(ENV_USERNAME, "root")]);
        assert!(env.basic_auth.is_none());
    }

    #[test]
    fn parse_bool_permits_common_variants() {
        assert!(parse_bool(Some("true"), false));
        assert!(parse_bool(Some("Yes"), false));
        assert!(!parse_bool(Some("0"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }
}
