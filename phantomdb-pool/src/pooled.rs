//! Checked out connection guard.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    time::Instant,
};

use crate::{manager::ManageConnection, pool::Pool};

/// Connection checked out from a [`Pool`].
///
/// Dereferences to the underlying connection. Dropping the guard returns the connection to the
/// pool it came from, or closes it if that pool was closed in the meantime.
pub struct Pooled<M: ManageConnection> {
    /// Originating pool.
    pool: Pool<M>,
    /// Connection identifier within the originating pool.
    id: u64,
    /// Checkout time.
    checked_out_at: Instant,
    /// Connection itself, only taken out on drop or detach.
    conn: Option<M::Connection>,
}

impl<M: ManageConnection> Pooled<M> {
    pub(crate) fn new(pool: Pool<M>, id: u64, conn: M::Connection) -> Self {
        Self {
            pool,
            id,
            // This is different from time used in wait_time metric.
            checked_out_at: Instant::now(),
            conn: Some(conn),
        }
    }

    /// Pool this connection was acquired from.
    #[must_use]
    pub fn pool(&self) -> &Pool<M> {
        &self.pool
    }

    /// Connection identifier, unique within the originating pool.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Take the connection out of the pool for good.
    ///
    /// The pool frees the slot, and may open a replacement connection later.
    #[must_use]
    pub fn detach(mut self) -> M::Connection {
        self.pool.inner.forget(self.id);
        match self.conn.take() {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop or detach"),
        }
    }
}

impl<M: ManageConnection> Deref for Pooled<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop or detach"),
        }
    }
}

impl<M: ManageConnection> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection is only taken on drop or detach"),
        }
    }
}

impl<M: ManageConnection> AsRef<M::Connection> for Pooled<M> {
    fn as_ref(&self) -> &M::Connection {
        self
    }
}

impl<M: ManageConnection> AsMut<M::Connection> for Pooled<M> {
    fn as_mut(&mut self) -> &mut M::Connection {
        self
    }
}

impl<M> fmt::Debug for Pooled<M>
where
    M: ManageConnection,
    M::Connection: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled")
            .field("id", &self.id)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl<M: ManageConnection> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.inner.check_in(self.id, conn, self.checked_out_at);
        }
    }
}
