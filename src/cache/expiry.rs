//! Expiry Policy Module
//!
//! Defines how long a stored element lives.

use std::time::Duration;

/// Longest lifetime a backend is asked to hold an element for (100 years).
pub(crate) const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// == Time Unit ==
/// Unit of an [`ExpiryPolicy`] amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn millis(self) -> u64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
            TimeUnit::Days => 86_400_000,
        }
    }
}

// == Expiry Policy ==
/// Time-to-live applied to every element a provider stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    amount: u64,
    unit: TimeUnit,
}

impl ExpiryPolicy {
    // == Constructor ==
    pub fn of(amount: u64, unit: TimeUnit) -> Self {
        Self { amount, unit }
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    // == Conversions ==
    /// Returns the policy as a Duration.
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.amount.saturating_mul(self.unit.millis()))
    }

    /// Returns the policy in whole seconds, truncating any remainder.
    pub fn to_seconds(&self) -> u64 {
        self.duration().as_secs()
    }

    /// Returns the policy as a Duration, capped at [`MAX_TTL`].
    pub(crate) fn bounded_duration(&self) -> Duration {
        self.duration().min(MAX_TTL)
    }

    /// TTL in seconds for Redis `EX`, never below one second.
    pub(crate) fn remote_ttl(&self) -> u64 {
        self.bounded_duration().as_secs().max(1)
    }
}

impl From<Duration> for ExpiryPolicy {
    fn from(duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self::of(millis, TimeUnit::Milliseconds)
    }
}
