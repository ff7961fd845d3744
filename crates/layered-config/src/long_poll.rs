//! Long-poll reconnect loop.
//!
//! A long-poll request is held open by the server until the watched key
//! changes or the request times out. An expired request carries no
//! information, so it is reissued unchanged; every other outcome ends the
//! loop.

use std::future::Future;

use tracing::debug;

use crate::http::HttpError;

/// Drives `attempt` until it produces anything other than a timeout.
///
/// `attempt` must build an identical request each time it is called.
pub async fn long_poll<F, Fut, T>(key: &str, mut attempt: F) -> Result<T, HttpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HttpError>>,
{
    let mut expired = 0u64;
    loop {
        match attempt().await {
            Err(HttpError::Timeout) => {
                expired += 1;
                debug!(key, expired, "long-poll expired without a change, reissuing");
            }
            outcome => return outcome,
        }
    }
}
