//! Error types and error support code.

/// Boxed error returned by a connection manager.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type returned when acquiring connections from a [`Pool`](crate::Pool).
///
/// None of these errors are retried inside the pool, retry policy is left to the caller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Pool was closed, no connections can be acquired from it anymore.
    #[error("connection pool is closed")]
    PoolClosed,
    /// No connection became available before acquisition timeout ran out.
    #[error("connection acquisition timeout")]
    AcquireTimeout,
    /// Pool is configured with zero capacity, so acquisition can never succeed.
    #[error("pool is exhausted")]
    PoolExhausted,
    /// Call would block execution, and non-blocking operation was requested.
    #[error("acquisition from pool would block execution")]
    WouldBlock,
    /// Connection manager was unable to open a new connection.
    #[error("unable to create connection: {0}")]
    ConnectionCreation(#[source] BoxError),
}

impl Error {
    /// Generate new [`Error::ConnectionCreation`] error.
    pub fn connection_creation(err: impl Into<BoxError>) -> Self {
        Self::ConnectionCreation(err.into())
    }

    /// Whether this error was caused by acquisition running out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AcquireTimeout)
    }
}
