use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default cap on a buffered feed document
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default budget for one transfer, connect to last byte
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while downloading one feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Transfer exceeded its time budget
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Could not grow the response buffer
    #[error("Out of memory while buffering response")]
    OutOfMemory,
}

/// Limits applied to every transfer.
#[derive(Debug, Clone, Copy)]
pub struct TransferLimits {
    pub timeout: Duration,
    pub max_size: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_size: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Build the HTTP client shared by every transfer and the notification sink.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
}

/// Download a feed document into memory.
///
/// One unauthenticated GET, no retries. The whole transfer, including the
/// body, must finish within `limits.timeout`.
///
/// # Errors
///
/// - [`FetchError::Network`] - Connection or TLS errors
/// - [`FetchError::Timeout`] - Transfer exceeded its budget
/// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
/// - [`FetchError::ResponseTooLarge`] - Body exceeded `limits.max_size`
/// - [`FetchError::IncompleteResponse`] - Connection closed early
/// - [`FetchError::OutOfMemory`] - Buffer could not grow
pub async fn fetch_document(
    client: &reqwest::Client,
    url: &str,
    limits: TransferLimits,
) -> Result<Vec<u8>, FetchError> {
    tokio::time::timeout(limits.timeout, async {
        let response = client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, limits.max_size).await
    })
    .await
    .map_err(|_| FetchError::Timeout)?
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    if let Some(len) = expected_length {
        bytes
            .try_reserve(len as usize)
            .map_err(|_| FetchError::OutOfMemory)?;
    }

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes
            .try_reserve(chunk.len())
            .map_err(|_| FetchError::OutOfMemory)?;
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
