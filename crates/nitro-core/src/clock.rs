//! Wall-clock source
//!
//! Daily counters reset on the UTC day boundary, so every component reads
//! time through a [`Clock`] instead of calling `Utc::now()` directly. Tests
//! and simulations drive a [`ManualClock`].

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Source of the current UTC time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC calendar day
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// System wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
pub struct ManualClock {
    now: parking_lot::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: parking_lot::Mutex::new(start),
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }

    /// Move forward and return the new time
    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut now = self.now.lock();
        *now += by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Midnight UTC at the start of the day containing `instant`
pub fn start_of_day(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock() {
        let start = Utc.with_ymd_and_hms(2026, 5, 1, 23, 59, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(2));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 5, 2).unwrap());
    }

    #[test]
    fn test_start_of_day() {
        let instant = Utc.with_ymd_and_hms(2026, 5, 1, 17, 30, 12).unwrap();
        assert_eq!(
            start_of_day(instant),
            Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
        );
    }
}
