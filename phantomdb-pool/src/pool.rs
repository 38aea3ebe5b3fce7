use std::{
    borrow::Cow,
    collections::{HashSet, VecDeque},
    fmt,
    ops::Deref,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tokio::{
    sync::{Semaphore, SemaphorePermit},
    task::{AbortHandle, JoinHandle},
    time::MissedTickBehavior,
};
use tracing::{debug, debug_span, info, warn, Instrument};

use crate::{
    config::PoolConfig,
    error::Error,
    manager::ManageConnection,
    metrics::{pool_kv, Metrics, POOL_METRICS},
    pooled::Pooled,
    status::PoolStatus,
};

/// How often acquisition refreshes pool state gauges.
// TODO: make probe interval part of PoolConfig
const PROBE_INTERVAL: Duration = Duration::from_secs(15);

/// Connection sitting in the idle queue.
struct IdleConn<C> {
    /// Pool-unique connection identifier.
    id: u64,
    /// When the connection was put into the idle queue.
    idle_since: tokio::time::Instant,
    /// Connection itself.
    conn: C,
}

/// Mutable pool state, always accessed under a single lock.
struct PoolState<C> {
    /// Idle connections, least recently used at the front.
    available: VecDeque<IdleConn<C>>,
    /// Identifiers of checked out connections.
    in_use: HashSet<u64>,
    /// Slots reserved for connections being opened right now.
    pending: usize,
    /// Pool was closed.
    closed: bool,
    /// Next connection identifier.
    next_id: u64,
}

impl<C> PoolState<C> {
    /// Create empty state.
    ///
    /// Nothing is preallocated, as maximum pool size may be arbitrarily large.
    fn new() -> Self {
        Self {
            available: VecDeque::new(),
            in_use: HashSet::new(),
            pending: 0,
            closed: false,
            next_id: 1,
        }
    }

    /// Connections accounted for, including reserved slots.
    fn occupied(&self) -> usize {
        self.available.len() + self.in_use.len() + self.pending
    }

    fn issue_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Shared pool internals.
pub(crate) struct PoolInner<M: ManageConnection> {
    /// Connection factory.
    manager: M,
    /// Normalized pool configuration.
    config: PoolConfig,
    /// Pool label.
    label: [KeyValue; 1],
    /// Linked metrics storage.
    metrics: Arc<Metrics>,
    /// Time of last gathering of pool state gauges.
    last_gathered_at: Mutex<Instant>,
    /// Fair wait queue for acquisition.
    ///
    /// Every checked out connection and every reserved slot holds one permit.
    permits: Semaphore,
    /// Pool state.
    state: Mutex<PoolState<M::Connection>>,
    /// Running idle reaper task.
    reaper: Mutex<Option<AbortHandle>>,
}

impl<M: ManageConnection> PoolInner<M> {
    fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("default")
    }

    fn status(&self) -> PoolStatus {
        let state = self.state.lock();
        PoolStatus {
            available: state.available.len(),
            in_use: state.in_use.len(),
            min: self.config.min_connections,
            max: self.config.max_connections,
        }
    }

    /// Refresh pool state gauges, at most once per [`PROBE_INTERVAL`].
    fn update_metrics(&self) {
        let mut last_gathered_at = self.last_gathered_at.lock();
        if last_gathered_at.elapsed() > PROBE_INTERVAL {
            *last_gathered_at = Instant::now();
            drop(last_gathered_at);
            self.metrics.record_status(&self.label, self.status());
        }
    }

    /// Open a connection, recording creation time.
    async fn open(&self) -> Result<M::Connection, Error> {
        let started = Instant::now();
        let conn = self
            .manager
            .connect()
            .await
            .map_err(Error::connection_creation)?;
        self.metrics
            .create_time
            .record(started.elapsed().as_secs_f64(), &self.label);
        Ok(conn)
    }

    /// Return a checked out connection to the pool.
    pub(crate) fn check_in(&self, id: u64, conn: M::Connection, checked_out_at: Instant) {
        self.metrics
            .use_time
            .record(checked_out_at.elapsed().as_secs_f64(), &self.label);
        let mut state = self.state.lock();
        if state.closed {
            state.in_use.remove(&id);
            drop(state);
            debug!(pool = self.name(), id, "closing connection released into closed pool");
            self.manager.disconnect(conn);
            return;
        }
        // Checked out set is only cleared on close.
        let checked_out = state.in_use.remove(&id);
        debug_assert!(checked_out, "released connection {id} is not checked out");
        state.available.push_back(IdleConn {
            id,
            idle_since: tokio::time::Instant::now(),
            conn,
        });
        drop(state);
        // Wakes up the first waiter, if any.
        self.permits.add_permits(1);
    }

    /// Forget about a checked out connection, freeing its slot.
    pub(crate) fn forget(&self, id: u64) {
        let mut state = self.state.lock();
        if state.in_use.remove(&id) && !state.closed {
            drop(state);
            self.permits.add_permits(1);
        }
    }
}

impl<M: ManageConnection> Drop for PoolInner<M> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        for idle in state.available.drain(..) {
            self.manager.disconnect(idle.conn);
        }
    }
}

/// Slot reserved for a connection being opened.
///
/// Dropping the reservation gives the slot back and wakes up a waiter.
struct Reservation<'a, M: ManageConnection> {
    inner: &'a PoolInner<M>,
    permit: Option<SemaphorePermit<'a>>,
}

impl<'a, M: ManageConnection> Reservation<'a, M> {
    /// Reserve a slot. Must be called with pool state locked.
    fn new(
        inner: &'a PoolInner<M>,
        state: &mut PoolState<M::Connection>,
        permit: SemaphorePermit<'a>,
    ) -> Self {
        state.pending += 1;
        Self {
            inner,
            permit: Some(permit),
        }
    }

    /// Register opened connection as checked out.
    ///
    /// Returns connection back if the pool was closed in the meantime.
    fn check_out(mut self, conn: M::Connection) -> Result<(u64, M::Connection), M::Connection> {
        let permit = self.permit.take();
        let mut state = self.inner.state.lock();
        state.pending -= 1;
        if state.closed {
            return Err(conn);
        }
        let id = state.issue_id();
        state.in_use.insert(id);
        // Permit stays taken until the connection is checked in.
        if let Some(permit) = permit {
            permit.forget();
        }
        Ok((id, conn))
    }

    /// Put opened connection into the idle queue.
    ///
    /// Returns connection back if the pool was closed in the meantime.
    fn make_idle(mut self, conn: M::Connection) -> Result<(), M::Connection> {
        let permit = self.permit.take();
        let mut state = self.inner.state.lock();
        state.pending -= 1;
        if state.closed {
            return Err(conn);
        }
        let id = state.issue_id();
        state.available.push_back(IdleConn {
            id,
            idle_since: tokio::time::Instant::now(),
            conn,
        });
        drop(state);
        drop(permit);
        Ok(())
    }
}

impl<M: ManageConnection> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.inner.state.lock().pending -= 1;
            drop(permit);
        }
    }
}

/// Bounded connection pool.
///
/// Keeps up to [`PoolConfig::max_connections`] connections, opened lazily through a
/// [`ManageConnection`] implementation. Callers waiting for a connection are served in FIFO order.
///
/// Cloning a pool is cheap, all clones share the same connections.
pub struct Pool<M: ManageConnection> {
    pub(crate) inner: Arc<PoolInner<M>>,
}

impl<M: ManageConnection> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ManageConnection> fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name())
            .field("status", &self.inner.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<M: ManageConnection> Pool<M> {
    /// Create new empty pool.
    ///
    /// Configuration is normalized first, see [`PoolConfig::normalized`]. No connections are
    /// opened until [`Self::warm_up`] or [`Self::get`] is called.
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let config = config.normalized();
        let label = pool_kv(config.name.clone().map(Cow::Owned));
        let metrics = POOL_METRICS.deref().clone();
        let inner = PoolInner {
            manager,
            label,
            metrics,
            last_gathered_at: Mutex::new(Instant::now()),
            permits: Semaphore::new(config.max_connections),
            state: Mutex::new(PoolState::new()),
            reaper: Mutex::new(None),
            config,
        };
        inner.metrics.record_status(&inner.label, inner.status());
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Effective pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Connection manager used by this pool.
    #[must_use]
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Open connections until the pool holds [`PoolConfig::min_connections`] of them.
    ///
    /// Returns number of connections opened. Connections opened before a failure are kept, and
    /// the pool stays usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionCreation`] on the first connection that could not be opened,
    /// or [`Error::PoolClosed`] if the pool was closed.
    pub async fn warm_up(&self) -> Result<usize, Error> {
        let inner = &*self.inner;
        let min = inner.config.min_connections;
        let mut opened = 0;
        loop {
            let reservation = {
                let mut state = inner.state.lock();
                if state.closed {
                    return Err(Error::PoolClosed);
                }
                if state.occupied() >= min {
                    break;
                }
                match inner.permits.try_acquire() {
                    Ok(permit) => Reservation::new(inner, &mut state, permit),
                    // Pool is busy serving callers, nothing to warm up.
                    Err(_) => break,
                }
            };
            let conn = inner.open().await?;
            if let Err(conn) = reservation.make_idle(conn) {
                inner.manager.disconnect(conn);
                return Err(Error::PoolClosed);
            }
            opened += 1;
        }
        debug!(pool = inner.name(), opened, "pool warmed up");
        inner.metrics.record_status(&inner.label, inner.status());
        Ok(opened)
    }

    /// Acquire a connection, waiting for at most [`PoolConfig::acquire_timeout`].
    ///
    /// # Errors
    ///
    /// See [`Self::get_timeout`].
    pub async fn get(&self) -> Result<Pooled<M>, Error> {
        self.get_timeout(self.inner.config.acquire_timeout).await
    }

    /// Acquire a connection, waiting for at most `timeout`.
    ///
    /// Idle connections are reused first. If there are none, and the pool is not full, a new
    /// connection is opened. Otherwise the call waits until some other caller releases a
    /// connection.
    ///
    /// Timeout only bounds waiting for a free slot, not opening the connection itself.
    ///
    /// # Errors
    ///
    /// * [`Error::PoolClosed`] if the pool is closed, or gets closed while waiting.
    /// * [`Error::AcquireTimeout`] if no connection became available in time.
    /// * [`Error::PoolExhausted`] if the pool has zero capacity.
    /// * [`Error::ConnectionCreation`] if a new connection could not be opened.
    pub async fn get_timeout(&self, timeout: Duration) -> Result<Pooled<M>, Error> {
        let before = Instant::now();
        let span = debug_span!("pool_acquire", name = self.inner.name());
        let res = self.acquire(timeout).instrument(span).await;
        match res {
            Ok(conn) => {
                self.measure_acquire(before);
                Ok(conn)
            }
            Err(Error::AcquireTimeout) => {
                self.inner.metrics.timeouts.add(1, &self.inner.label);
                Err(Error::AcquireTimeout)
            }
            Err(err) => Err(err),
        }
    }

    /// Instantly acquire an idle connection.
    ///
    /// Never opens new connections and never waits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WouldBlock`] if there are no idle connections, or
    /// [`Error::PoolClosed`] if the pool is closed.
    pub fn try_get(&self) -> Result<Pooled<M>, Error> {
        let before = Instant::now();
        let _span = debug_span!("pool_try_acquire", name = self.inner.name()).entered();
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        if state.closed {
            return Err(Error::PoolClosed);
        }
        if state.available.is_empty() {
            return Err(Error::WouldBlock);
        }
        let permit = inner.permits.try_acquire().map_err(|_| Error::WouldBlock)?;
        let Some(idle) = state.available.pop_back() else {
            return Err(Error::WouldBlock);
        };
        state.in_use.insert(idle.id);
        permit.forget();
        drop(state);
        self.measure_acquire(before);
        Ok(Pooled::new(self.clone(), idle.id, idle.conn))
    }

    /// Return a connection to the pool.
    ///
    /// Same as dropping the connection. Connections acquired from some other pool are ignored by
    /// this one, and go back to where they came from.
    pub fn release(&self, conn: Pooled<M>) {
        if !Arc::ptr_eq(&self.inner, &conn.pool().inner) {
            warn!(
                pool = self.inner.name(),
                id = conn.id(),
                "released connection does not belong to this pool"
            );
        }
        drop(conn);
    }

    /// Close the pool.
    ///
    /// Idle connections are closed immediately, waiting callers fail with [`Error::PoolClosed`].
    /// Connections that are checked out at this moment are closed as soon as they get released.
    /// Background idle reaper, if any, is stopped. Closing a pool twice does nothing.
    pub fn close(&self) {
        let inner = &*self.inner;
        let (idle, outstanding) = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            let outstanding = state.in_use.len();
            state.in_use.clear();
            (state.available.drain(..).collect::<Vec<_>>(), outstanding)
        };
        inner.permits.close();
        if let Some(reaper) = inner.reaper.lock().take() {
            reaper.abort();
        }
        let closed = idle.len();
        for conn in idle {
            inner.manager.disconnect(conn.conn);
        }
        info!(pool = inner.name(), closed, outstanding, "connection pool closed");
        inner.metrics.record_status(&inner.label, inner.status());
    }

    /// Whether the pool was closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get consistent snapshot of pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        self.inner.status()
    }

    /// Close connections that have been idle for longer than [`PoolConfig::idle_timeout`].
    ///
    /// Least recently used connections go first. Never shrinks the pool below
    /// [`PoolConfig::min_connections`]. Returns number of connections closed.
    pub fn reap_idle(&self) -> usize {
        let inner = &*self.inner;
        let idle_timeout = inner.config.idle_timeout;
        let min = inner.config.min_connections;
        let expired = {
            let mut state = inner.state.lock();
            let mut expired = Vec::new();
            while !state.closed && state.available.len() + state.in_use.len() > min {
                let stale = state
                    .available
                    .front()
                    .is_some_and(|idle| idle.idle_since.elapsed() >= idle_timeout);
                if !stale {
                    break;
                }
                expired.extend(state.available.pop_front());
            }
            expired
        };
        let reaped = expired.len();
        for idle in expired {
            inner.manager.disconnect(idle.conn);
        }
        if reaped > 0 {
            debug!(pool = inner.name(), reaped, "closed idle connections");
            inner.metrics.record_status(&inner.label, inner.status());
        }
        reaped
    }

    /// Start a background task which periodically calls [`Self::reap_idle`].
    ///
    /// Returns `None` if [`PoolConfig::reap_interval`] is not set, or the pool is closed.
    /// The pool keeps track of its reaper: spawning a new one replaces the previous task, and
    /// [`Self::close`] aborts it. The task also stops by itself once the pool is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_reaper(&self) -> Option<JoinHandle<()>> {
        let period = self.inner.config.reap_interval?;
        if self.is_closed() {
            return None;
        }
        let weak = Arc::downgrade(&self.inner);
        let span = debug_span!("pool_reaper", name = self.inner.name());
        let handle = tokio::spawn(reap_loop(weak, period).instrument(span));
        if let Some(previous) = self.inner.reaper.lock().replace(handle.abort_handle()) {
            previous.abort();
        }
        Some(handle)
    }

    /// Whether a background idle reaper is running.
    #[must_use]
    pub fn has_reaper(&self) -> bool {
        self.inner
            .reaper
            .lock()
            .as_ref()
            .is_some_and(|reaper| !reaper.is_finished())
    }

    /// Record metrics after connection acquisition.
    #[inline]
    fn measure_acquire(&self, before: Instant) {
        self.inner
            .metrics
            .wait_time
            .record(before.elapsed().as_secs_f64(), &self.inner.label);
        self.inner.update_metrics();
    }

    /// Acquisition algorithm.
    async fn acquire(&self, timeout: Duration) -> Result<Pooled<M>, Error> {
        let inner = &*self.inner;
        if inner.state.lock().closed {
            return Err(Error::PoolClosed);
        }
        if inner.config.max_connections == 0 {
            return Err(Error::PoolExhausted);
        }
        let permit = match tokio::time::timeout(timeout, inner.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            // Semaphore is only closed when the pool is.
            Ok(Err(_)) => return Err(Error::PoolClosed),
            Err(_) => return Err(Error::AcquireTimeout),
        };
        let reservation = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(idle) = state.available.pop_back() {
                state.in_use.insert(idle.id);
                drop(state);
                permit.forget();
                debug!(id = idle.id, "reusing idle connection");
                return Ok(Pooled::new(self.clone(), idle.id, idle.conn));
            }
            Reservation::new(inner, &mut state, permit)
        };
        let conn = inner.open().await?;
        match reservation.check_out(conn) {
            Ok((id, conn)) => {
                debug!(id, "opened new connection");
                Ok(Pooled::new(self.clone(), id, conn))
            }
            Err(conn) => {
                inner.manager.disconnect(conn);
                Err(Error::PoolClosed)
            }
        }
    }
}

/// Background idle reaper loop.
async fn reap_loop<M: ManageConnection>(weak: Weak<PoolInner<M>>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        let pool = Pool { inner };
        if pool.is_closed() {
            break;
        }
        pool.reap_idle();
    }
    debug!("idle reaper stopped");
}

#[cfg(test)]
mod tests {
    use tokio::time::{sleep, Instant};

    use super::*;
    use crate::mock::MockManager;

    fn config(min: usize, max: usize) -> PoolConfig {
        PoolConfig::default()
            .with_min_connections(min)
            .with_max_connections(max)
            .with_acquire_timeout(Duration::from_millis(50))
    }

    async fn warm_pool(min: usize, max: usize) -> (Pool<MockManager>, MockManager) {
        let manager = MockManager::default();
        let pool = Pool::new(manager.clone(), config(min, max));
        pool.warm_up().await.unwrap();
        (pool, manager)
    }

    /// Warm-up opens minimum number of connections.
    #[tokio::test(start_paused = true)]
    async fn warm_up_opens_min_connections() {
        let manager = MockManager::default();
        let pool = Pool::new(manager.clone(), PoolConfig::default());
        assert_eq!(pool.warm_up().await.unwrap(), 2);
        let status = pool.status();
        assert_eq!(status.available, 2);
        assert_eq!(status.in_use, 0);
        assert_eq!(status.min, 2);
        assert_eq!(status.max, 10);
        assert_eq!(manager.created(), 2);
        // Already warm.
        assert_eq!(pool.warm_up().await.unwrap(), 0);
        assert_eq!(manager.created(), 2);
    }

    /// Failed warm-up keeps what was opened, and the pool stays usable.
    #[tokio::test(start_paused = true)]
    async fn partial_warm_up() {
        let manager = MockManager::default();
        manager.plan([true, false]);
        let pool = Pool::new(manager.clone(), config(3, 5));
        let err = pool.warm_up().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionCreation(_)));
        assert_eq!(pool.status().available, 1);
        let first = pool.get().await.unwrap();
        let second = pool.get().await.unwrap();
        assert_eq!(pool.status().in_use, 2);
        assert_eq!(manager.created(), 2);
        drop((first, second));
        assert_eq!(pool.status().available, 2);
    }

    /// Zero-capacity pool never opens connections.
    #[tokio::test(start_paused = true)]
    async fn zero_capacity_never_creates() {
        let (pool, manager) = warm_pool(0, 0).await;
        assert!(matches!(pool.get().await, Err(Error::PoolExhausted)));
        assert!(matches!(pool.try_get(), Err(Error::WouldBlock)));
        assert_eq!(manager.created(), 0);
        assert_eq!(pool.status(), PoolStatus::default());
    }

    /// Saturated pool makes callers wait for the whole timeout.
    #[tokio::test(start_paused = true)]
    async fn saturated_acquire_times_out() {
        let (pool, manager) = warm_pool(0, 2).await;
        let _first = pool.get().await.unwrap();
        let _second = pool.get().await.unwrap();
        assert_eq!(manager.created(), 2);
        let started = Instant::now();
        let err = pool.get().await.unwrap_err();
        let waited = started.elapsed();
        assert!(err.is_timeout());
        assert!(waited >= Duration::from_millis(50));
        assert!(waited < Duration::from_millis(100));
        assert_eq!(manager.created(), 2);
        let status = pool.status();
        assert_eq!(status.in_use, 2);
        assert_eq!(status.available, 0);
        assert!(status.is_saturated());
    }

    /// Caller-supplied timeout overrides configured one.
    #[tokio::test(start_paused = true)]
    async fn caller_timeout() {
        let (pool, _) = warm_pool(0, 1).await;
        let _held = pool.get().await.unwrap();
        let started = Instant::now();
        let err = pool
            .get_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    /// Released connection gets reused.
    #[tokio::test(start_paused = true)]
    async fn release_then_acquire_reuses() {
        let (pool, manager) = warm_pool(2, 10).await;
        let conn = pool.get().await.unwrap();
        let serial = conn.serial;
        assert_eq!(pool.status().available, 1);
        assert_eq!(pool.status().in_use, 1);
        pool.release(conn);
        assert_eq!(pool.status().available, 2);
        assert_eq!(pool.status().in_use, 0);
        let conn = pool.get().await.unwrap();
        assert_eq!(conn.serial, serial);
        assert_eq!(manager.created(), 2);
        assert_eq!(pool.status().available, 1);
    }

    /// Non-blocking acquisition only hands out idle connections.
    #[tokio::test(start_paused = true)]
    async fn try_get_uses_idle_only() {
        let (pool, manager) = warm_pool(1, 2).await;
        let conn = pool.try_get().unwrap();
        assert!(matches!(pool.try_get(), Err(Error::WouldBlock)));
        assert_eq!(manager.created(), 1);
        drop(conn);
        assert!(pool.try_get().is_ok());
    }

    /// Closed pool rejects acquisition and closes idle connections.
    #[tokio::test(start_paused = true)]
    async fn closed_pool_rejects() {
        let (pool, manager) = warm_pool(2, 10).await;
        pool.close();
        assert!(pool.is_closed());
        let started = Instant::now();
        assert!(matches!(pool.get().await, Err(Error::PoolClosed)));
        assert!(matches!(pool.try_get(), Err(Error::PoolClosed)));
        assert!(matches!(pool.warm_up().await, Err(Error::PoolClosed)));
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(manager.destroyed(), 2);
        assert_eq!(pool.status().size(), 0);
        // Second close is a no-op.
        pool.close();
        assert_eq!(manager.destroyed(), 2);
    }

    /// Connections released after close are closed, not pooled.
    #[tokio::test(start_paused = true)]
    async fn release_after_close_destroys() {
        let (pool, manager) = warm_pool(1, 4).await;
        let first = pool.get().await.unwrap();
        let second = pool.get().await.unwrap();
        pool.close();
        assert_eq!(pool.status().in_use, 0);
        pool.release(first);
        drop(second);
        assert_eq!(manager.destroyed(), 2);
        assert_eq!(pool.status().available, 0);
    }

    /// Releasing connection from some other pool does not touch this one.
    #[tokio::test(start_paused = true)]
    async fn foreign_release_ignored() {
        let (pool, _) = warm_pool(2, 4).await;
        let (other, _) = warm_pool(1, 4).await;
        let held = pool.get().await.unwrap();
        let before = pool.status();
        let foreign = other.get().await.unwrap();
        assert_eq!(other.status().in_use, 1);
        pool.release(foreign);
        assert_eq!(pool.status(), before);
        assert_eq!(other.status().in_use, 0);
        assert_eq!(other.status().available, 1);
        drop(held);
    }

    /// Failed connection attempt is reported and frees its slot.
    #[tokio::test(start_paused = true)]
    async fn creation_failure_frees_slot() {
        let (pool, manager) = warm_pool(0, 1).await;
        manager.fail_next();
        let err = pool.get().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionCreation(_)));
        assert_eq!(pool.status().size(), 0);
        let conn = pool.get().await.unwrap();
        assert_eq!(pool.status().in_use, 1);
        assert_eq!(manager.created(), 1);
        drop(conn);
    }

    /// Waiting caller gets connection released by another caller.
    #[tokio::test(start_paused = true)]
    async fn waiter_woken_by_release() {
        let (pool, _) = warm_pool(0, 1).await;
        let held = pool.get().await.unwrap();
        let serial = held.serial;
        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.get().await.map(|conn| conn.serial) }
        });
        sleep(Duration::from_millis(20)).await;
        drop(held);
        assert_eq!(waiter.await.unwrap().unwrap(), serial);
    }

    /// Waiting caller takes the slot freed by a failed connection attempt.
    #[tokio::test(start_paused = true)]
    async fn waiter_woken_by_failed_creation() {
        let manager = MockManager::with_delay(Duration::from_millis(20));
        manager.fail_next();
        let pool = Pool::new(manager.clone(), config(0, 1));
        let failing = tokio::spawn({
            let pool = pool.clone();
            async move { pool.get().await.map(|_| ()) }
        });
        sleep(Duration::from_millis(5)).await;
        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.get().await.map(|conn| conn.serial) }
        });
        assert!(matches!(
            failing.await.unwrap(),
            Err(Error::ConnectionCreation(_))
        ));
        assert!(waiter.await.unwrap().is_ok());
        assert_eq!(manager.created(), 1);
    }

    /// Waiting callers are served in arrival order.
    #[tokio::test(start_paused = true)]
    async fn waiters_served_fifo() {
        let pool = Pool::new(
            MockManager::default(),
            config(0, 1).with_acquire_timeout(Duration::from_secs(5)),
        );
        let held = pool.get().await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for n in 0..4 {
            let pool = pool.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let conn = pool.get().await.unwrap();
                order.lock().push(n);
                sleep(Duration::from_millis(1)).await;
                drop(conn);
            }));
            sleep(Duration::from_millis(1)).await;
        }
        drop(held);
        for waiter in waiters {
            waiter.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
    }

    /// Closing the pool wakes up waiting callers.
    #[tokio::test(start_paused = true)]
    async fn close_wakes_waiters() {
        let pool = Pool::new(
            MockManager::default(),
            config(0, 1).with_acquire_timeout(Duration::from_secs(30)),
        );
        let held = pool.get().await.unwrap();
        let waiter = tokio::spawn({
            let pool = pool.clone();
            async move { pool.get().await.map(|_| ()) }
        });
        sleep(Duration::from_millis(10)).await;
        let started = Instant::now();
        pool.close();
        assert!(matches!(waiter.await.unwrap(), Err(Error::PoolClosed)));
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(held);
    }

    /// Connection opened while the pool was being closed is discarded.
    #[tokio::test(start_paused = true)]
    async fn close_during_creation() {
        let manager = MockManager::with_delay(Duration::from_millis(20));
        let pool = Pool::new(manager.clone(), config(0, 2));
        let opening = tokio::spawn({
            let pool = pool.clone();
            async move { pool.get().await.map(|_| ()) }
        });
        sleep(Duration::from_millis(5)).await;
        pool.close();
        assert!(matches!(opening.await.unwrap(), Err(Error::PoolClosed)));
        assert_eq!(manager.created(), 1);
        assert_eq!(manager.destroyed(), 1);
        assert_eq!(pool.status().size(), 0);
    }

    /// Dropped acquisition future gives its reserved slot back.
    #[tokio::test(start_paused = true)]
    async fn cancelled_creation_frees_slot() {
        let manager = MockManager::with_delay(Duration::from_millis(100));
        let pool = Pool::new(manager.clone(), config(0, 1));
        let res = tokio::time::timeout(Duration::from_millis(10), pool.get()).await;
        assert!(res.is_err());
        let conn = pool
            .get_timeout(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(pool.status().in_use, 1);
        drop(conn);
    }

    /// Detached connection leaves the pool for good.
    #[tokio::test(start_paused = true)]
    async fn detach_frees_slot() {
        let (pool, manager) = warm_pool(0, 1).await;
        let conn = pool.get().await.unwrap().detach();
        assert_eq!(conn.serial, 1);
        assert_eq!(pool.status().size(), 0);
        let again = pool.get().await.unwrap();
        assert_eq!(again.serial, 2);
        assert_eq!(manager.created(), 2);
        assert_eq!(manager.destroyed(), 0);
    }

    /// Reaper closes stale connections, keeping the minimum.
    #[tokio::test(start_paused = true)]
    async fn reap_idle_keeps_min() {
        let (pool, manager) = warm_pool(1, 4).await;
        let conns = vec![
            pool.get().await.unwrap(),
            pool.get().await.unwrap(),
            pool.get().await.unwrap(),
        ];
        drop(conns);
        assert_eq!(pool.status().available, 3);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(pool.reap_idle(), 0);
        sleep(Duration::from_secs(31)).await;
        assert_eq!(pool.reap_idle(), 2);
        assert_eq!(pool.status().available, 1);
        assert_eq!(manager.destroyed(), 2);
    }

    /// Reaper never touches recently used connections.
    #[tokio::test(start_paused = true)]
    async fn reap_idle_skips_fresh() {
        let (pool, manager) = warm_pool(0, 4).await;
        let stale = pool.get().await.unwrap();
        let fresh = pool.get().await.unwrap();
        drop(stale);
        sleep(Duration::from_secs(45)).await;
        drop(fresh);
        sleep(Duration::from_secs(20)).await;
        assert_eq!(pool.reap_idle(), 1);
        assert_eq!(pool.status().available, 1);
        assert_eq!(manager.destroyed(), 1);
    }

    /// Background reaper runs periodically and stops after close.
    #[tokio::test(start_paused = true)]
    async fn background_reaper() {
        let manager = MockManager::default();
        let pool = Pool::new(
            manager.clone(),
            config(0, 2)
                .with_idle_timeout(Duration::from_secs(10))
                .with_reap_interval(Duration::from_secs(5)),
        );
        let reaper = pool.spawn_reaper().unwrap();
        drop(pool.get().await.unwrap());
        sleep(Duration::from_secs(16)).await;
        assert_eq!(pool.status().available, 0);
        assert_eq!(manager.destroyed(), 1);
        pool.close();
        sleep(Duration::from_secs(6)).await;
        assert!(reaper.is_finished());
    }

    /// Closing the pool aborts its reaper right away.
    #[tokio::test(start_paused = true)]
    async fn close_aborts_reaper() {
        let pool = Pool::new(
            MockManager::default(),
            config(0, 2).with_reap_interval(Duration::from_secs(60)),
        );
        let reaper = pool.spawn_reaper().unwrap();
        assert!(pool.has_reaper());
        pool.close();
        assert!(reaper.await.unwrap_err().is_cancelled());
        assert!(!pool.has_reaper());
        assert!(pool.spawn_reaper().is_none());
    }

    /// Spawning a reaper again replaces the running one.
    #[tokio::test(start_paused = true)]
    async fn respawned_reaper_replaces_previous() {
        let pool = Pool::new(
            MockManager::default(),
            config(0, 2).with_reap_interval(Duration::from_secs(60)),
        );
        let first = pool.spawn_reaper().unwrap();
        let second = pool.spawn_reaper().unwrap();
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(pool.has_reaper());
        second.abort();
    }

    /// No reaper without configured interval.
    #[tokio::test(start_paused = true)]
    async fn no_reaper_by_default() {
        let pool = Pool::new(MockManager::default(), PoolConfig::default());
        assert!(pool.spawn_reaper().is_none());
        assert!(!pool.has_reaper());
    }

    /// Huge maximum is accepted without allocating up front.
    #[test]
    fn huge_max_connections() {
        let pool = Pool::new(
            MockManager::default(),
            PoolConfig::default().with_max_connections(usize::MAX),
        );
        let status = pool.status();
        assert_eq!(status.max, Semaphore::MAX_PERMITS);
        assert_eq!(status.min, 2);
        assert_eq!(status.size(), 0);
    }

    /// Huge pool still hands out and takes back connections.
    #[tokio::test(start_paused = true)]
    async fn huge_pool_is_usable() {
        let (pool, manager) = warm_pool(0, usize::MAX).await;
        assert_eq!(manager.created(), 0);
        assert!(matches!(pool.try_get(), Err(Error::WouldBlock)));
        let conn = pool.get().await.unwrap();
        assert_eq!(pool.status().in_use, 1);
        drop(conn);
        assert_eq!(pool.status().available, 1);
    }
}
