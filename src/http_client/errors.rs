//! HTTP client - error type.

use std::io;

use thiserror::Error;

/// Error type used when building HTTP clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HttpClientError {
    /// HTTP client error.
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),
    /// Error loading TLS identity.
    #[error("Error loading TLS identity: {0}")]
    IdentityLoad(io::Error),
}

impl HttpClientError {
    /// Generate new [`HttpClientError::IdentityLoad`] error.
    pub fn identity_load(err: impl Into<io::Error>) -> Self {
        Self::IdentityLoad(err.into())
    }
}
