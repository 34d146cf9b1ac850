//! Clock abstraction for determinism.

use chrono::{DateTime, SubsecRound, Utc};

/// Abstraction over system time for deterministic behavior.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current time truncated to microseconds, the resolution
    /// every event log backend preserves.
    fn event_time(&self) -> DateTime<Utc> {
        self.now().trunc_subsecs(6)
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Timelike};

    use super::*;

    struct NanoClock;

    impl Clock for NanoClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0)
                .unwrap()
                .with_nanosecond(123_456_789)
                .unwrap()
        }
    }

    #[test]
    fn test_event_time_truncates_to_microseconds() {
        let time = NanoClock.event_time();

        assert_eq!(time.nanosecond(), 123_456_000);
    }
}
