//! Blocking HTTP client with retry, backoff, and transport-error classification.
//!
//! Every catalog request passes a [`RateGate`] so that each attempt, retries
//! included, is spaced by the configured interval. Image downloads go to a
//! different host and pass `None`.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Error;
use crate::ratelimit::RateGate;

/// A failed request, classified so callers can tell "try again later" from "no such thing".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Delay requested by a `Retry-After` header, if any.
        retry_after: Option<Duration>,
        /// Response status code.
        status: u16,
        /// Requested URL.
        url: String,
    },
    /// No usable response: connect failure, timeout, or truncated body.
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// Description of the failure.
        reason: String,
        /// False only for requests that could never succeed (malformed URL).
        retryable: bool,
        /// Requested URL.
        url: String,
    },
}

impl HttpError {
    /// Whether the failure is transport-class: timeouts, rate limiting, 5xx,
    /// and BGG's `202 Accepted` ("queued, ask again").
    pub const fn is_transient(&self) -> bool {
        return match self {
            Self::Status { status, .. } => *status == 202 || *status == 429 || *status >= 500,
            Self::Transport { retryable, .. } => *retryable,
        };
    }

    /// Classify a reqwest failure.
    fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        return Self::Transport {
            reason: error.to_string(),
            retryable: !error.is_builder(),
            url: url.to_string(),
        };
    }
}

/// Shared HTTP client. Cheap to share by reference across worker threads.
pub struct HttpClient {
    /// The underlying reqwest client.
    inner: reqwest::blocking::Client,
    /// Retries after the first attempt.
    max_retries: u32,
    /// Longest `Retry-After` honored; longer requests are cut to this.
    max_retry_after: Duration,
    /// First retry delay; doubled after each retry.
    retry_backoff: Duration,
}

impl HttpClient {
    /// Build a client from run settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::HttpClient` if the TLS backend cannot be initialised.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let inner = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| return Error::HttpClient { reason: e.to_string() })?;
        return Ok(Self {
            inner,
            max_retries: config.max_retries,
            max_retry_after: config.timeout.max(config.retry_backoff),
            retry_backoff: config.retry_backoff,
        });
    }

    /// GET `url` with `query` parameters and return the body bytes.
    ///
    /// Transient failures are retried with exponential backoff (or the
    /// server's `Retry-After`). When `gate` is given, every attempt waits
    /// for a permit first.
    ///
    /// # Errors
    ///
    /// Returns the last `HttpError` once retries are exhausted, or the first
    /// non-transient one.
    pub fn get(&self, url: &str, query: &[(&str, &str)], gate: Option<&RateGate>) -> Result<Vec<u8>, HttpError> {
        let mut backoff = self.retry_backoff;
        let mut attempt = 0_u32;

        loop {
            if let Some(gate) = gate {
                gate.acquire();
            }
            debug!(url, ?query, attempt, "GET");

            let error = match self.get_once(url, query) {
                Ok(body) => return Ok(body),
                Err(e) => e,
            };
            if !error.is_transient() || attempt >= self.max_retries {
                return Err(error);
            }

            attempt = attempt.saturating_add(1);
            let wait = self.retry_wait(&error, backoff);
            warn!(url, attempt, max = self.max_retries, ?wait, %error, "retrying");
            std::thread::sleep(wait);
            backoff = backoff.saturating_mul(2);
        }
    }

    /// Delay before the next attempt: the server's `Retry-After`, capped at
    /// the request timeout, or the current backoff.
    fn retry_wait(&self, error: &HttpError, backoff: Duration) -> Duration {
        return match error {
            HttpError::Status { retry_after: Some(after), .. } => (*after).min(self.max_retry_after),
            HttpError::Status { retry_after: None, .. } | HttpError::Transport { .. } => backoff,
        };
    }

    /// Single attempt, no retry.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Status` for any status other than 2xx (and for 202),
    /// `HttpError::Transport` if the request or body read fails.
    fn get_once(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, HttpError> {
        let response = self
            .inner
            .get(url)
            .query(query)
            .send()
            .map_err(|e| return HttpError::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() || status.as_u16() == 202 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| return v.to_str().ok())
                .and_then(|v| return v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(HttpError::Status {
                retry_after,
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.bytes().map_err(|e| return HttpError::from_reqwest(url, &e))?;
        return Ok(body.to_vec());
    }
}
