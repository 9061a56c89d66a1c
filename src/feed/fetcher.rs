use crate::feed::parser::{parse_bytes, Article};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while downloading or parsing a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body was not a parseable RSS document
    #[error("Parse error: {0}")]
    Parse(#[from] crate::feed::ParseError),
}

/// Limits applied to a single feed download.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Retries for 429, 5xx and truncated bodies
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    pub base_delay: Duration,
    /// Largest accepted body
    pub max_body_bytes: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

impl FetchOptions {
    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Downloads a feed and parses its items.
///
/// # Errors
///
/// Any [`FetchError`] from [`fetch_feed`], or [`FetchError::Parse`] when the
/// body is not a well-formed XML document.
pub async fn fetch_articles(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<Article>, FetchError> {
    let bytes = fetch_feed(client, url, options).await?;
    let articles = parse_bytes(&bytes)?;
    tracing::debug!(feed = %url, items = articles.len(), "Fetched feed");
    Ok(articles)
}

/// Downloads a feed body.
///
/// - 429 and 5xx responses are retried with exponential backoff
///   (`base_delay`, doubling) up to `max_retries` times
/// - other non-2xx responses fail immediately
/// - bodies larger than `max_body_bytes` are rejected, both from the
///   Content-Length header and while streaming
/// - bodies shorter than their Content-Length are retried like 5xx
///
/// # Errors
///
/// Returns [`FetchError`] describing the last failure.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let url = url::Url::parse(url)?;
    let mut retry_count = 0;

    loop {
        let response = tokio::time::timeout(options.timeout, client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            if retry_count >= options.max_retries {
                return Err(FetchError::RateLimited(options.max_retries));
            }

            let delay = options.backoff(retry_count);
            tracing::warn!(
                feed = %url,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if status.is_server_error() {
            if retry_count >= options.max_retries {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let delay = options.backoff(retry_count);
            tracing::warn!(
                feed = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Server error, retrying after delay"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, options.max_body_bytes).await {
            Ok(bytes) => return Ok(bytes),
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= options.max_retries {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }

                let delay = options.backoff(retry_count);
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
