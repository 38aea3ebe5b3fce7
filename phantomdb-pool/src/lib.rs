//! Bounded, instrumented connection pool used by PhantomDB clients.
//!
//! Connections are opened through a [`ManageConnection`] implementation, lazily on demand or
//! eagerly using [`Pool::warm_up`]. The pool never holds more than
//! [`PoolConfig::max_connections`] connections, callers that find it saturated wait in FIFO
//! order for up to [`PoolConfig::acquire_timeout`].
//!
//! Pool metrics follow OpenTelemetry semantic conventions for database client connection pools.
//!
//! # Example
//!
//! ```no_run
//! use std::convert::Infallible;
//!
//! use phantomdb_pool::{ManageConnection, Pool, PoolConfig};
//!
//! struct Counter;
//!
//! #[async_trait::async_trait]
//! impl ManageConnection for Counter {
//!     type Connection = u32;
//!     type Error = Infallible;
//!
//!     async fn connect(&self) -> Result<u32, Infallible> {
//!         Ok(42)
//!     }
//! }
//!
//! # async fn run() -> Result<(), phantomdb_pool::Error> {
//! let pool = Pool::new(Counter, PoolConfig::default().with_max_connections(4));
//! pool.warm_up().await?;
//! let conn = pool.get().await?;
//! assert_eq!(*conn, 42);
//! pool.release(conn);
//! pool.close();
//! # Ok(())
//! # }
//! ```
#![forbid(unsafe_code)]
#![deny(elided_lifetimes_in_paths, unreachable_pub)]
#![warn(
    missing_docs,
    clippy::doc_link_with_quotes,
    clippy::doc_markdown,
    clippy::missing_errors_doc
)]

mod config;
pub mod error;
mod manager;
mod metrics;
#[cfg(test)]
pub(crate) mod mock;
mod pool;
mod pooled;
mod status;

pub use crate::{
    config::PoolConfig,
    error::{BoxError, Error},
    manager::ManageConnection,
    pool::Pool,
    pooled::Pooled,
    status::PoolStatus,
};
