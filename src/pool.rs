//! Pool of PhantomDB handles.

use phantomdb_pool::{Error, Pool};
use tracing::{debug, info, warn};

use crate::{config::PhantomDbConfig, manager::PhantomDbManager};

/// Connection pool of [`PhantomDb`](crate::PhantomDb) handles.
pub type PhantomDbPool = Pool<PhantomDbManager>;

/// Create a pool from configuration and warm it up.
///
/// Warm-up failure does not prevent the pool from being returned, as a partially warmed pool
/// opens missing handles on demand. Warm-up outcome is returned alongside the pool: either the
/// number of handles opened, or the first error encountered.
///
/// This is the only constructor that opens handles eagerly, [`create_pool`] and
/// [`create_pool_with_config`] return an empty pool.
///
/// Starts a background idle reaper if [`PoolConfig::reap_interval`] is set. The pool owns the
/// reaper task, [`Pool::close`] stops it.
///
/// [`PoolConfig::reap_interval`]: phantomdb_pool::PoolConfig::reap_interval
pub async fn connect(config: PhantomDbConfig) -> (PhantomDbPool, Result<usize, Error>) {
    let pool = create_pool_with_config(config);
    let warm_up = pool.warm_up().await;
    match &warm_up {
        Ok(opened) => info!(
            base_url = pool.manager().base_url(),
            opened, "PhantomDB pool ready"
        ),
        Err(err) => warn!(
            base_url = pool.manager().base_url(),
            status = ?pool.status(),
            "PhantomDB pool warm-up failed: {err}"
        ),
    }
    if pool.spawn_reaper().is_some() {
        debug!(base_url = pool.manager().base_url(), "PhantomDB pool idle reaper started");
    }
    (pool, warm_up)
}

/// Create an empty pool for a server at `http://localhost:8080`, with default settings.
///
/// Handles are opened on demand. Use [`connect`] to get a pool warmed up to
/// `min_connections`.
#[must_use]
pub fn create_pool() -> PhantomDbPool {
    create_pool_with_config(PhantomDbConfig::default())
}

/// Create an empty pool from configuration.
///
/// Handles are opened on demand, call [`Pool::warm_up`] to open them eagerly, or use
/// [`connect`] instead. No idle reaper is started.
#[must_use]
pub fn create_pool_with_config(config: PhantomDbConfig) -> PhantomDbPool {
    let manager = PhantomDbManager::new(config.base_url, config.http);
    Pool::new(manager, config.pool)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use phantomdb_pool::PoolConfig;

    use super::*;

    #[tokio::test]
    async fn connect_warms_up() {
        let config = PhantomDbConfig::new("http://db.local:8080").with_pool(
            PoolConfig::default()
                .with_min_connections(2)
                .with_max_connections(3),
        );
        let (pool, warm_up) = connect(config).await;
        assert_eq!(warm_up.unwrap(), 2);
        let status = pool.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.max, 3);
        let db = pool.get().await.unwrap();
        assert_eq!(db.base_url().as_str(), "http://db.local:8080/");
        pool.release(db);
        pool.close();
        assert!(matches!(pool.get().await, Err(Error::PoolClosed)));
    }

    #[tokio::test]
    async fn connect_reports_failure() {
        let (pool, warm_up) = connect(PhantomDbConfig::new("no scheme")).await;
        assert!(matches!(warm_up, Err(Error::ConnectionCreation(_))));
        assert_eq!(pool.status().size(), 0);
        let err = pool
            .get_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionCreation(_)));
    }

    #[tokio::test]
    async fn connect_owns_reaper() {
        let config = PhantomDbConfig::new("http://db.local:8080").with_pool(
            PoolConfig::default()
                .with_min_connections(1)
                .with_reap_interval(Duration::from_secs(30)),
        );
        let (pool, warm_up) = connect(config).await;
        assert_eq!(warm_up.unwrap(), 1);
        assert!(pool.has_reaper());
        pool.close();
        assert!(!pool.has_reaper());
    }

    #[tokio::test]
    async fn lazy_pool() {
        let pool = create_pool();
        assert_eq!(pool.manager().base_url(), "http://localhost:8080");
        assert_eq!(pool.status().size(), 0);
        assert!(!pool.has_reaper());
        let db = pool.get().await.unwrap();
        assert_eq!(pool.status().in_use, 1);
        drop(db);
        assert_eq!(pool.status().available, 1);
    }
}
