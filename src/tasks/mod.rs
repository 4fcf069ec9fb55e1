//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a pool is open.
//!
//! # Tasks
//! - Pool audit: Reclaims borrowed connections that are dead or overdue

mod audit;

pub use audit::AUDIT_PERIOD;
pub(crate) use audit::spawn_audit_task;

#[cfg(test)]
pub(crate) use audit::run_audit;
