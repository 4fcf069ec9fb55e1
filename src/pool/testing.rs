//! In-process pool manager for tests.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use deadpool::managed::{Manager, Metrics, RecycleResult};

use super::HealthCheck;

#[derive(Debug)]
pub(crate) struct FakeConnection {
    pub id: usize,
}

#[derive(Default)]
pub(crate) struct FakeManager {
    created: AtomicUsize,
    pub unhealthy: AtomicBool,
    /// Liveness checks never answer
    pub stalled: AtomicBool,
}

impl FakeManager {
    pub(crate) fn unhealthy() -> Self {
        let manager = Self::default();
        manager.unhealthy.store(true, Ordering::SeqCst);
        manager
    }

    pub(crate) fn stalled() -> Self {
        let manager = Self::default();
        manager.stalled.store(true, Ordering::SeqCst);
        manager
    }
}

impl Manager for FakeManager {
    type Type = FakeConnection;
    type Error = io::Error;

    async fn create(&self) -> Result<FakeConnection, io::Error> {
        let id = self.created.fetch_add(1, Ordering::SeqCst);
        Ok(FakeConnection { id })
    }

    async fn recycle(&self, _conn: &mut FakeConnection, _metrics: &Metrics) -> RecycleResult<io::Error> {
        Ok(())
    }
}

impl HealthCheck for FakeManager {
    async fn is_alive(&self, _conn: &mut FakeConnection) -> bool {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        !self.unhealthy.load(Ordering::SeqCst)
    }
}
