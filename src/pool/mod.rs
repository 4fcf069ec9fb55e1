//! Connection Pool Module
//!
//! Bounded connection pool that tracks every borrowed connection and
//! reclaims the ones that are never handed back.

mod resource;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{Manager, Object, Pool, PoolError, TimeoutType};
use deadpool::Runtime;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::error::{CacheError, Result};
use crate::tasks::{spawn_audit_task, AUDIT_PERIOD};

pub use resource::PooledConnection;
pub(crate) use resource::{Reclaim, TrackedResource};

/// Borrowed connections, oldest first. Shared with the audit task.
pub(crate) type TrackedList<M> = Arc<Mutex<Vec<TrackedResource<M>>>>;

// == Health Check ==
/// Liveness check run on each borrow when `test_on_borrow` is set.
pub trait HealthCheck: Manager {
    fn is_alive(&self, conn: &mut Self::Type) -> impl Future<Output = bool> + Send;
}

// == Pool Status ==
/// Point-in-time view of the pool, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Connections currently open, idle or borrowed
    pub size: usize,
    /// Idle connections
    pub available: usize,
    /// Borrows the auditor still watches
    pub tracked: usize,
}

// == Connection Pool ==
/// Bounded pool with leak detection.
///
/// Every successful [`borrow`](ConnectionPool::borrow) is registered with a
/// deadline. A background audit task started with the pool drops entries
/// whose connection was released or found dead, and force-closes the ones
/// still borrowed past their deadline.
pub struct ConnectionPool<M: Manager> {
    pool: Pool<M>,
    pool_size: usize,
    resource_timeout: Duration,
    liveness_timeout: Duration,
    test_on_borrow: bool,
    tracked: TrackedList<M>,
    auditor: Mutex<Option<JoinHandle<()>>>,
}

impl<M> ConnectionPool<M>
where
    M: HealthCheck + 'static,
    M::Error: fmt::Display,
{
    // == Constructor ==
    /// Creates the pool and starts its audit task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(manager: M, config: &ConnectionConfig) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CacheError::Configuration(
                "connection pool requires a Tokio runtime".to_string(),
            ));
        }

        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .wait_timeout(Some(config.borrow_wait()))
            .create_timeout(Some(config.connect_timeout()))
            .recycle_timeout(Some(config.connect_timeout()))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| CacheError::Configuration(e.to_string()))?;

        let tracked: TrackedList<M> = Arc::new(Mutex::new(Vec::new()));
        let auditor = spawn_audit_task(tracked.clone(), AUDIT_PERIOD);

        info!(
            pool_size = config.pool_size,
            resource_timeout_ms = config.resource_timeout_ms,
            "Connection pool created"
        );

        Ok(Self {
            pool,
            pool_size: config.pool_size,
            resource_timeout: config.resource_timeout(),
            liveness_timeout: config.connect_timeout(),
            test_on_borrow: config.test_on_borrow,
            tracked,
            auditor: Mutex::new(Some(auditor)),
        })
    }

    // == Borrow ==
    /// Borrows a connection from the pool.
    ///
    /// # Errors
    /// - `PoolUnavailable` if the pool has been closed
    /// - `PoolExhausted` if every connection is in use, immediately or after the borrow wait
    /// - `BorrowFailed` if the pool could not produce a connection
    /// - `DeadResource` if the connection failed its liveness check
    pub async fn borrow(&self) -> Result<PooledConnection<M>> {
        if self.pool.is_closed() {
            return Err(CacheError::PoolUnavailable);
        }

        let status = self.pool.status();
        let active = status.size.saturating_sub(status.available);
        if active > self.pool_size {
            return Err(CacheError::PoolExhausted(format!(
                "{} of {} connections in use",
                active, self.pool_size
            )));
        }

        let mut object = self.pool.get().await.map_err(borrow_error)?;

        if self.test_on_borrow && !self.check_alive(&mut object).await {
            warn!("Pool resource is not connected, discarding it");
            drop(Object::take(object));
            return Err(CacheError::DeadResource);
        }

        let (connection, tracked) =
            PooledConnection::track(object, Instant::now() + self.resource_timeout);
        self.tracked.lock().push(tracked);

        Ok(connection)
    }

    /// Liveness check bounded by the connect timeout; a connection that does
    /// not answer in time counts as dead.
    async fn check_alive(&self, object: &mut Object<M>) -> bool {
        let alive = self.pool.manager().is_alive(&mut **object);
        tokio::time::timeout(self.liveness_timeout, alive)
            .await
            .unwrap_or(false)
    }

    // == Close ==
    /// Stops the auditor, force-closes every live borrow and closes the pool.
    ///
    /// Idempotent. Does not wait for borrowers that are mid-command.
    pub fn close(&self) {
        if let Some(auditor) = self.auditor.lock().take() {
            auditor.abort();
        }

        let drained: Vec<TrackedResource<M>> = self.tracked.lock().drain(..).collect();
        let closed = drained
            .iter()
            .filter(|resource| !resource.is_dead())
            .filter(|resource| resource.force_close() == Reclaim::Closed)
            .count();

        if !self.pool.is_closed() {
            self.pool.close();
            info!(force_closed = closed, "Connection pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> &TrackedList<M> {
        &self.tracked
    }

    // == Status ==
    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            tracked: self.tracked.lock().len(),
        }
    }
}

impl<M: Manager> Drop for ConnectionPool<M> {
    fn drop(&mut self) {
        if let Some(auditor) = self.auditor.get_mut().take() {
            auditor.abort();
        }
    }
}

impl<M: Manager> fmt::Debug for ConnectionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("pool_size", &self.pool_size)
            .field("resource_timeout", &self.resource_timeout)
            .field("test_on_borrow", &self.test_on_borrow)
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

fn borrow_error<E: fmt::Display>(err: PoolError<E>) -> CacheError {
    match err {
        PoolError::Closed => CacheError::PoolUnavailable,
        PoolError::Timeout(TimeoutType::Wait) => {
            CacheError::PoolExhausted("timed out waiting for a free connection".to_string())
        }
        other => CacheError::BorrowFailed(other.to_string()),
    }
}
