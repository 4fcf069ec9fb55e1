//! Pool Resource Module
//!
//! A borrowed connection and the bookkeeping the auditor uses to reclaim it.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use deadpool::managed::{Manager, Object};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::time::Instant;

use crate::error::{CacheError, Result};

// == Slot ==
/// Shared cell holding one pooled connection.
///
/// The borrower and the tracked list both point at the slot. Whoever takes
/// the connection out first (normal release or audit reclaim) returns it to
/// the pool; the slot is empty afterwards.
pub(crate) struct Slot<M: Manager> {
    object: Mutex<Option<Object<M>>>,
    /// Handle reported a dropped connection, or was reclaimed by the auditor
    dead: AtomicBool,
    /// Borrower dropped its guard
    released: AtomicBool,
}

/// Outcome of an attempt to force-close a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reclaim {
    /// Connection was taken away from its borrower and returned to the pool
    Closed,
    /// Borrower is in the middle of a command
    Busy,
    /// Nothing left to close
    Empty,
}

impl<M: Manager> Slot<M> {
    fn new(object: Object<M>) -> Self {
        Self {
            object: Mutex::new(Some(object)),
            dead: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    fn is_dead(&self) -> bool {
        if self.dead.load(Ordering::Acquire) || self.released.load(Ordering::Acquire) {
            return true;
        }

        match self.object.try_lock() {
            Ok(object) => object.is_none(),
            // Leased: the borrower is using it right now
            Err(_) => false,
        }
    }

    fn reclaim(&self) -> Reclaim {
        let Ok(mut object) = self.object.try_lock() else {
            return Reclaim::Busy;
        };

        match object.take() {
            Some(object) => {
                if self.dead.swap(true, Ordering::AcqRel) {
                    // Broken handle: detached so it is never reused
                    drop(Object::take(object));
                } else {
                    drop(object);
                }
                Reclaim::Closed
            }
            None => Reclaim::Empty,
        }
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);

        // The auditor only holds the lock for a synchronous check. If this
        // try_lock loses to it, the connection stays in the slot until the
        // next audit pass hands it back, at most one audit period later.
        if let Ok(mut object) = self.object.try_lock() {
            if let Some(object) = object.take() {
                self.discard_or_return(object);
            }
        }
    }

    fn discard_or_return(&self, object: Object<M>) {
        if self.dead.load(Ordering::Acquire) {
            // Detached from the pool so a broken connection is never reused
            drop(Object::take(object));
        }
    }
}

impl<M: Manager> Drop for Slot<M> {
    fn drop(&mut self) {
        if let Some(object) = self.object.get_mut().take() {
            self.discard_or_return(object);
        }
    }
}

// == Tracked Resource ==
/// Entry in the pool's tracked list: a borrowed slot and its reclaim deadline.
pub(crate) struct TrackedResource<M: Manager> {
    slot: Arc<Slot<M>>,
    deadline: Instant,
}

impl<M: Manager> TrackedResource<M> {
    /// True once the connection was released, reclaimed, or found disconnected.
    pub(crate) fn is_dead(&self) -> bool {
        self.slot.is_dead()
    }

    pub(crate) fn is_overdue(&self, now: Instant) -> bool {
        now > self.deadline
    }

    pub(crate) fn force_close(&self) -> Reclaim {
        self.slot.reclaim()
    }
}

// == Pooled Connection ==
/// A connection borrowed from a [`ConnectionPool`](super::ConnectionPool).
///
/// Dropping the guard returns the connection to the pool. If the guard is
/// held past the configured resource timeout, the pool's auditor reclaims
/// the connection and later leases fail with [`CacheError::DeadResource`].
pub struct PooledConnection<M: Manager> {
    slot: Arc<Slot<M>>,
    deadline: Instant,
}

impl<M: Manager> PooledConnection<M> {
    pub(crate) fn track(object: Object<M>, deadline: Instant) -> (Self, TrackedResource<M>) {
        let slot = Arc::new(Slot::new(object));
        let tracked = TrackedResource {
            slot: slot.clone(),
            deadline,
        };
        (Self { slot, deadline }, tracked)
    }

    // == Lease ==
    /// Locks the underlying connection for one or more commands.
    pub async fn lease(&self) -> Result<MappedMutexGuard<'_, M::Type>> {
        if self.slot.dead.load(Ordering::Acquire) {
            return Err(CacheError::DeadResource);
        }

        let object = self.slot.object.lock().await;
        MutexGuard::try_map(object, |object| object.as_deref_mut())
            .map_err(|_| CacheError::DeadResource)
    }

    /// Runs `work` until this borrow's deadline.
    ///
    /// A command that is still pending at the deadline is abandoned and the
    /// connection is marked dead, so a stuck socket cannot hold the lease
    /// past the resource timeout.
    pub async fn within_deadline<F: Future>(&self, work: F) -> Result<F::Output> {
        match tokio::time::timeout_at(self.deadline, work).await {
            Ok(output) => Ok(output),
            Err(_) => {
                self.mark_dead();
                Err(CacheError::CommandTimeout)
            }
        }
    }

    /// Flags the connection as disconnected; it is discarded instead of recycled.
    pub fn mark_dead(&self) {
        self.slot.dead.store(true, Ordering::Release);
    }

    pub fn is_dead(&self) -> bool {
        self.slot.dead.load(Ordering::Acquire)
    }

    /// Instant after which the auditor may reclaim this connection.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl<M: Manager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        self.slot.release();
    }
}

impl<M: Manager> fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("deadline", &self.deadline)
            .field("dead", &self.is_dead())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::pool::testing::FakeManager;
    use crate::pool::ConnectionPool;
    use crate::tasks::run_audit;

    #[tokio::test]
    async fn test_release_that_loses_the_lock_is_closed_by_audit() {
        let config = ConnectionConfig::default().with_pool_size(2);
        let pool = ConnectionPool::new(FakeManager::default(), &config).unwrap();

        let conn = pool.borrow().await.unwrap();
        let slot = pool.tracked().lock()[0].slot.clone();
        {
            // Lock held as an audit pass would, while the borrower lets go
            let _auditing = slot.object.try_lock().unwrap();
            drop(conn);
        }
        assert_eq!(pool.status().available, 0);

        let report = run_audit(pool.tracked(), Instant::now());
        assert_eq!(report.pruned, 1);
        assert_eq!(pool.status().available, 1);
    }

    #[tokio::test]
    async fn test_within_deadline_passes_output_through() {
        let config = ConnectionConfig::default().with_pool_size(1);
        let pool = ConnectionPool::new(FakeManager::default(), &config).unwrap();

        let conn = pool.borrow().await.unwrap();
        let id = conn
            .within_deadline(async { conn.lease().await.map(|c| c.id) })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(id, 0);
        assert!(!conn.is_dead());
    }
}
