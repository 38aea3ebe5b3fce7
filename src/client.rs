//! PhantomDB client handle.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use reqwest::StatusCode;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;
use url::Url;

use crate::http_client::{HttpClientConfig, HttpClientError};

/// Source of unique handle identifiers.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Error type used when opening or using PhantomDB handles.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Base URL could not be parsed.
    #[error("Invalid PhantomDB base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// HTTP client could not be built.
    #[error(transparent)]
    Http(#[from] HttpClientError),
    /// Request could not be sent, or response could not be read.
    #[error("PhantomDB request error: {0}")]
    Request(#[from] reqwest_middleware::Error),
    /// Server responded with non-success status.
    #[error("PhantomDB responded with {0}")]
    Status(StatusCode),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request(err.into())
    }
}

/// Handle to a PhantomDB REST API server.
///
/// This is the resource managed by [`PhantomDbPool`](crate::PhantomDbPool).
pub struct PhantomDb {
    /// Unique handle identifier.
    id: u64,
    /// Base URL, always ending with a slash.
    base_url: Url,
    /// Instrumented HTTP client.
    http: ClientWithMiddleware,
}

impl fmt::Debug for PhantomDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhantomDb")
            .field("id", &self.id)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl PhantomDb {
    /// Open a new handle to the server at `base_url`.
    ///
    /// No requests are sent to the server.
    ///
    /// # Errors
    ///
    /// Returns `Err` if base URL is invalid, or HTTP client could not be built.
    pub async fn open(base_url: &str, http: &HttpClientConfig) -> Result<Self, ClientError> {
        let base_url = parse_base_url(base_url)?;
        let http = http.to_client().await?;
        Ok(Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            base_url,
            http,
        })
    }

    /// Unique handle identifier.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Base URL of the server.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build full URL of an API endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `path` cannot be joined with base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Underlying HTTP client, for issuing API requests.
    #[must_use]
    pub fn http(&self) -> &ClientWithMiddleware {
        &self.http
    }

    /// Query server health endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Err` if request fails, server responds with non-success status, or response is not
    /// valid JSON.
    pub async fn health_check(&self) -> Result<serde_json::Value, ClientError> {
        let resp = self.http.get(self.endpoint("health")?).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }
        Ok(resp.json().await?)
    }
}

/// Parse base URL, making sure relative endpoints are joined below its path.
fn parse_base_url(base_url: &str) -> Result<Url, ClientError> {
    let mut url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
