//! Manifest downloads from the key-authenticated manifest service
//!
//! Each attempt is a single `GET {base}?apikey=..&depotid=..&manifestid=..`. Attempts
//! are driven by [`retry_with_budget`]: a 429 waits and retries for free, anything
//! else (transport error, timeout, other non-2xx status, unreadable body) spends one
//! unit of the budget.

use crate::config::{RetryConfig, ServiceConfig};
use crate::error::{Error, Result};
use crate::retry::{IsRateLimited, RetryError, RetryNotice, retry_with_budget};
use crate::types::{DepotId, Event, ManifestId};
use crate::utils::truncate_body;
use reqwest::{StatusCode, Url};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A single failed attempt
#[derive(Debug, thiserror::Error)]
pub(crate) enum AttemptFailure {
    /// HTTP 429
    #[error("HTTP 429 Too Many Requests")]
    RateLimited,
    /// Any other non-success status
    #[error("HTTP {status}{}", body_suffix(body))]
    Status {
        /// Response status
        status: StatusCode,
        /// Start of the response body
        body: String,
    },
    /// Connect, timeout or body read failure
    #[error("{} {0}", if .0.is_timeout() { "request timed out:" } else { "request failed:" })]
    Transport(reqwest::Error),
}

fn body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(": {body}")
    }
}

impl IsRateLimited for AttemptFailure {
    fn is_rate_limited(&self) -> bool {
        matches!(self, AttemptFailure::RateLimited)
    }
}

/// Client for the manifest service
#[derive(Clone, Debug)]
pub struct ManifestFetcher {
    client: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl ManifestFetcher {
    /// Create a fetcher with the configured endpoint, timeout and retry budget
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(services: &ServiceConfig, retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(services.request_timeout)
            .user_agent(services.user_agent.as_str())
            .build()?;
        Ok(Self {
            client,
            base_url: services.manifest_base_url.clone(),
            retry,
        })
    }

    /// Download the manifest for one (depot, manifest) pair
    ///
    /// Backoffs are reported on `events` as [`Event::RateLimited`] and
    /// [`Event::RetryScheduled`].
    ///
    /// # Errors
    /// - [`Error::RetrievalExhausted`] once the retry budget is spent
    /// - [`Error::Cancelled`] if `cancel` fires during a request or backoff
    pub async fn fetch(
        &self,
        depot: DepotId,
        manifest: &ManifestId,
        api_key: &str,
        cancel: &CancellationToken,
        events: &broadcast::Sender<Event>,
    ) -> Result<Vec<u8>> {
        let url = self.manifest_url(depot, manifest, api_key)?;
        debug!(depot = %depot, manifest = %manifest, "fetching manifest");

        let notify = |notice: RetryNotice| {
            let event = match notice {
                RetryNotice::RateLimited { delay } => Event::RateLimited {
                    depot,
                    delay_ms: delay.as_millis() as u64,
                },
                RetryNotice::Retrying {
                    attempt,
                    remaining,
                    delay,
                    error,
                } => Event::RetryScheduled {
                    depot,
                    attempt,
                    remaining,
                    delay_ms: delay.as_millis() as u64,
                    error,
                },
            };
            events.send(event).ok();
        };

        let result = retry_with_budget(&self.retry, cancel, notify, || self.attempt(&url)).await;

        match result {
            Ok(bytes) => {
                info!(depot = %depot, manifest = %manifest, bytes = bytes.len(), "manifest downloaded");
                Ok(bytes)
            }
            Err(RetryError::Cancelled) => Err(Error::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => Err(Error::RetrievalExhausted {
                depot,
                manifest: manifest.clone(),
                attempts,
                last_error: last.to_string(),
            }),
        }
    }

    /// Request URL for one (depot, manifest) pair
    ///
    /// The URL carries the API key; never log it.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the configured base URL does not parse
    pub fn manifest_url(
        &self,
        depot: DepotId,
        manifest: &ManifestId,
        api_key: &str,
    ) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            Error::config(
                format!("invalid manifest service URL {}: {e}", self.base_url),
                "services.manifest_base_url",
            )
        })?;
        url.query_pairs_mut()
            .append_pair("apikey", api_key)
            .append_pair("depotid", &depot.to_string())
            .append_pair("manifestid", manifest.as_str());
        Ok(url)
    }

    async fn attempt(&self, url: &Url) -> std::result::Result<Vec<u8>, AttemptFailure> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(AttemptFailure::Transport)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptFailure::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptFailure::Status {
                status,
                body: truncate_body(&body, 200),
            });
        }

        let bytes = response.bytes().await.map_err(AttemptFailure::Transport)?;
        Ok(bytes.to_vec())
    }
}
