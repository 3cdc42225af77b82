//! Blocking HTTP client with bounded retries and exponential backoff.
//!
//! Transient failures (statuses in the configured retry set, connect errors,
//! timeouts) are retried up to `max_retries` times, sleeping
//! `backoff_factor * 2^(n-1)` seconds before retry `n`. Everything else fails
//! on the first attempt. Malformed bodies are never retried.

use super::ExchangeError;
use crate::config::HttpConfig;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Outcome of a single attempt inside the retry loop.
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    /// Transient failure; try again if budget remains.
    Retry(ExchangeError),
    /// Permanent failure; stop immediately.
    Fail(ExchangeError),
}

/// Retrying JSON-over-HTTP client.
pub struct RetryingClient {
    client: reqwest::blocking::Client,
    policy: HttpConfig,
}

impl RetryingClient {
    pub fn new(policy: HttpConfig) -> Result<Self, ExchangeError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(policy.timeout())
            .user_agent(concat!("cryptovault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExchangeError::ClientBuild(e.to_string()))?;
        Ok(Self { client, policy })
    }

    pub fn policy(&self) -> &HttpConfig {
        &self.policy
    }

    /// GET `url` with `query` and decode the JSON body into `T`.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        run_with_retries(&self.policy, url, || self.attempt(url, query))
    }

    fn attempt<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Attempt<T> {
        let resp = match self.client.get(url).query(query).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Retry(ExchangeError::NetworkUnreachable(e.to_string()))
            }
            Err(e) => return Attempt::Fail(ExchangeError::NetworkUnreachable(e.to_string())),
        };

        let status = resp.status();
        if !status.is_success() {
            let err = ExchangeError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            };
            return if self.policy.is_retryable(status.as_u16()) {
                Attempt::Retry(err)
            } else {
                Attempt::Fail(err)
            };
        }

        let body = match resp.text() {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return Attempt::Retry(ExchangeError::NetworkUnreachable(e.to_string()))
            }
            Err(e) => return Attempt::Fail(ExchangeError::NetworkUnreachable(e.to_string())),
        };

        match serde_json::from_str(&body) {
            Ok(value) => Attempt::Done(value),
            Err(e) => Attempt::Fail(ExchangeError::ResponseFormatChanged(format!(
                "failed to parse response from {url}: {e}"
            ))),
        }
    }
}

/// Drive `attempt` until it succeeds, fails permanently, or the retry budget runs out.
pub fn run_with_retries<T>(
    policy: &HttpConfig,
    what: &str,
    mut attempt: impl FnMut() -> Attempt<T>,
) -> Result<T, ExchangeError> {
    let attempts = policy.max_retries + 1;
    let mut last_error = None;

    for n in 0..attempts {
        if n > 0 {
            let delay = policy.backoff_delay(n);
            debug!(target: "cryptovault::http", retry = n, delay_ms = delay.as_millis() as u64, "backing off");
            std::thread::sleep(delay);
        }

        match attempt() {
            Attempt::Done(value) => return Ok(value),
            Attempt::Fail(e) => return Err(e),
            Attempt::Retry(e) => {
                warn!(target: "cryptovault::http", attempt = n + 1, of = attempts, error = %e, "transient failure for {what}");
                last_error = Some(e);
            }
        }
    }

    Err(ExchangeError::RetriesExhausted {
        attempts,
        last: last_error.map_or_else(|| "no attempt made".to_string(), |e| e.to_string()),
    })
}
