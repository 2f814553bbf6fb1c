//! Injectable time source.
//!
//! Token validity windows and key selection depend on "now". Every read goes
//! through a [`Clock`] handed to the component explicitly, so tests can pin
//! time per instance without touching process-wide state.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

/// A source of the current instant.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle to a clock, as stored in application state.
pub type SharedClock = Arc<dyn Clock>;

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Convenience constructor returning a shared handle.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Pin the clock at `instant`.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    /// Pin the clock at a unix timestamp (seconds).
    ///
    /// Out-of-range timestamps pin the clock at the unix epoch.
    #[must_use]
    pub fn at_unix(seconds: i64) -> Self {
        let instant = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH);
        Self::new(instant)
    }

    /// Move the clock to `instant`.
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut guard = self
            .instant
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = instant;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut guard = self
            .instant
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .instant
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_is_stable_until_moved() {
        let clock = FixedClock::at_unix(1_700_000_000);
        assert_eq!(clock.now(), clock.now());

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now().timestamp(), 1_700_000_090);

        let later = Utc.timestamp_opt(1_800_000_000, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_independent_fixed_clocks_do_not_interfere() {
        let a = FixedClock::at_unix(100);
        let b = FixedClock::at_unix(200);
        a.advance(Duration::seconds(1));
        assert_eq!(a.now().timestamp(), 101);
        assert_eq!(b.now().timestamp(), 200);
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock::shared();
        let first = clock.now();
        assert!(clock.now() >= first);
    }
}
