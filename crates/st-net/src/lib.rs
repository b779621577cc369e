//! Delivery of daily sleep totals to the remote collector.
//!
//! The collector accepts `POST {endpoint}/ingest-sleep?token=...` with a JSON
//! body in the [`QueuedUpload`] wire shape. Only a 2xx response counts as
//! delivered; everything else, including timeouts and connection errors,
//! is a plain `false` so the queue keeps the record and retries later.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use st_core::QueuedUpload;
use thiserror::Error;

/// Default request timeout for collector calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const INGEST_PATH: &str = "ingest-sleep";

/// Delivery client errors.
#[derive(Debug, Error)]
pub enum NetError {
    /// The collector endpoint is not a usable URL.
    #[error("invalid endpoint '{value}': {reason}")]
    InvalidEndpoint { value: String, reason: String },
    /// The provided token was invalid.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Something that can hand a record to the collector.
///
/// Returns `true` only on a definitive positive acknowledgement. Failures
/// are reported as `false`, never as panics or errors.
pub trait Deliver: Send + Sync {
    fn deliver(&self, record: &QueuedUpload) -> impl Future<Output = bool> + Send;
}

impl<T: Deliver> Deliver for Arc<T> {
    fn deliver(&self, record: &QueuedUpload) -> impl Future<Output = bool> + Send {
        (**self).deliver(record)
    }
}

/// HTTP delivery to the collector.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpDelivery {
    http: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl fmt::Debug for HttpDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpDelivery")
            .field("url", &self.url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpDelivery {
    /// Creates a client for the collector at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an http(s) URL, if the token
    /// is blank, or if the HTTP client fails to build.
    pub fn new(endpoint: &str, token: Option<String>, timeout: Duration) -> Result<Self, NetError> {
        let url = ingest_url(endpoint)?;

        if let Some(token) = &token {
            if token.trim().is_empty() {
                return Err(NetError::InvalidToken {
                    reason: "token cannot be empty or whitespace-only",
                });
            }
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(NetError::ClientBuild)?;

        Ok(Self { http, url, token })
    }

    /// The full ingest URL, without the token.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Posts one record and returns the response status.
    pub async fn post(&self, record: &QueuedUpload) -> Result<StatusCode, NetError> {
        let mut request = self.http.post(self.url.clone()).json(record);
        if let Some(token) = &self.token {
            request = request.query(&[("token", token)]);
        }
        let response = request.send().await?;
        Ok(response.status())
    }
}

impl Deliver for HttpDelivery {
    async fn deliver(&self, record: &QueuedUpload) -> bool {
        match self.post(record).await {
            Ok(status) if status.is_success() => {
                tracing::info!(date = %record.date, minutes = record.sleep_minutes, "upload delivered");
                true
            }
            Ok(status) => {
                tracing::warn!(date = %record.date, %status, "collector rejected upload");
                false
            }
            Err(err) => {
                tracing::warn!(date = %record.date, error = %err, "upload request failed");
                false
            }
        }
    }
}

fn ingest_url(endpoint: &str) -> Result<Url, NetError> {
    let invalid = |reason: String| NetError::InvalidEndpoint {
        value: endpoint.to_string(),
        reason,
    };

    let base = endpoint.trim().trim_end_matches('/');
    if base.is_empty() {
        return Err(invalid("endpoint cannot be empty".to_string()));
    }

    let url = Url::parse(&format!("{base}/{INGEST_PATH}")).map_err(|err| invalid(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.query().is_some() {
        return Err(invalid("endpoint must not carry a query string".to_string()));
    }
    Ok(url)
}
