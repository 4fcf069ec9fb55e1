//! Pool Audit Task
//!
//! Background task that reclaims borrowed connections which were never
//! returned to the pool.

use std::time::Duration;

use deadpool::managed::Manager;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::pool::{Reclaim, TrackedList};

/// Interval between two audits of a pool's borrowed connections.
pub const AUDIT_PERIOD: Duration = Duration::from_secs(1);

/// What one audit pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AuditReport {
    /// Entries dropped because their connection was released or dead
    pub pruned: usize,
    /// Overdue connections force-closed and returned to the pool
    pub reclaimed: usize,
    /// Overdue connections left alone because a command was in flight
    pub busy: usize,
}

/// Spawns a background task that audits the tracked list at a fixed period.
///
/// The first audit runs immediately. The task runs until its handle is
/// aborted, which the owning pool does on close and on drop.
pub(crate) fn spawn_audit_task<M>(tracked: TrackedList<M>, period: Duration) -> JoinHandle<()>
where
    M: Manager + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting pool audit task with interval of {} ms",
            period.as_millis()
        );

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let report = run_audit(&tracked, Instant::now());

            if report.reclaimed > 0 {
                warn!(
                    reclaimed = report.reclaimed,
                    "Pool audit: reclaimed connections held past their resource timeout"
                );
            }
            if report.pruned > 0 || report.busy > 0 {
                debug!(
                    pruned = report.pruned,
                    busy = report.busy,
                    "Pool audit: pruned released connections"
                );
            }
        }
    })
}

/// Runs one audit pass over the tracked list.
///
/// Drops every dead entry and every entry whose deadline is before `now`,
/// first closing whatever connection is still left in its slot: dead
/// handles are detached from the pool, live ones returned to it. Entries
/// whose connection is leased right now stay listed until a later pass.
pub(crate) fn run_audit<M: Manager>(tracked: &TrackedList<M>, now: Instant) -> AuditReport {
    let mut report = AuditReport::default();
    let mut resources = tracked.lock();

    resources.retain(|resource| {
        let dead = resource.is_dead();
        if !dead && !resource.is_overdue(now) {
            return true;
        }

        match resource.force_close() {
            Reclaim::Busy => {
                report.busy += 1;
                true
            }
            Reclaim::Closed if !dead => {
                report.reclaimed += 1;
                false
            }
            Reclaim::Closed | Reclaim::Empty => {
                report.pruned += 1;
                false
            }
        }
    });

    report
}
