//! Fetching an interchange document straight from a source installation.

use crate::config::FetchConfig;
use crate::document::{Document, PageId};
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("Source returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Source returned an invalid document: {0}")]
    InvalidResponse(String),

    #[error("Source reported an error: {0}")]
    Remote(String),
}

impl FetchError {
    /// Whether another attempt could succeed. Client errors are final,
    /// except for rate limiting.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => {
                *status >= 500 || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            FetchError::InvalidResponse(_) | FetchError::Remote(_) => false,
        }
    }
}

/// Export URL for `page_id`: the base URL without its trailing slash,
/// followed by the configured export path.
pub fn export_url(base_url: &str, export_path: &str, page_id: PageId) -> String {
    let path = export_path.replace("{page_id}", &page_id.to_string());
    let base = base_url.trim_end_matches('/');
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

/// Turn a response body into a document; `{"error": ...}` bodies are errors.
pub fn parse_body(body: Value) -> Result<Document, FetchError> {
    if let Some(error) = body.get("error") {
        let message = match error {
            Value::String(message) => message.clone(),
            other => other.to_string(),
        };
        return Err(FetchError::Remote(message));
    }
    Document::from_value(body).map_err(|err| FetchError::InvalidResponse(err.to_string()))
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<Document, FetchError> {
    let response = client.get(url).send().await.map_err(|err| {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|err| FetchError::InvalidResponse(err.to_string()))?;
    parse_body(body)
}

/// Fetch the export of `page_id` from the installation at `base_url`.
///
/// Retries timeouts, connection errors and server errors up to
/// `max_attempts` times in total, sleeping with exponential backoff between
/// attempts.
pub async fn fetch_document(
    config: &FetchConfig,
    base_url: &str,
    page_id: PageId,
) -> Result<Document, FetchError> {
    let url = export_url(base_url, &config.export_path, page_id);
    let client = reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|err| FetchError::Network {
            url: url.clone(),
            message: err.to_string(),
        })?;

    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        debug!(url = %url, attempt, "Fetching source document");
        match fetch_once(&client, &url).await {
            Ok(document) => return Ok(document),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = config.backoff(attempt);
                warn!(
                    url = %url,
                    attempt,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Fetch failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
