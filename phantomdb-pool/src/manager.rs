//! Connection factory used by the pool.

/// Pool objects use this trait to open and close connections.
///
/// The pool never inspects connections, it only moves them between its idle queue and its
/// checked-out set.
#[async_trait::async_trait]
pub trait ManageConnection: Send + Sync + 'static {
    /// Connection type managed by the pool.
    type Connection: Send + 'static;
    /// Error type returned when a connection cannot be opened.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    ///
    /// Called outside of pool locks, after a slot for the new connection is reserved.
    ///
    /// # Errors
    ///
    /// Returns `Err` if connection could not be opened. The pool does not retry.
    async fn connect(&self) -> Result<Self::Connection, Self::Error>;

    /// Close a connection that the pool is discarding.
    ///
    /// Default implementation simply drops the connection.
    fn disconnect(&self, conn: Self::Connection) {
        drop(conn);
    }
}
