//! Calendar and wall-clock source.
//!
//! Daily quotas and streaks are keyed by the serving process's local calendar
//! day, so the clock is injected rather than read ad hoc.

use chrono::{Days, Local, NaiveDate, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock {
    /// Local calendar day.
    fn today(&self) -> NaiveDate;
    /// Unix epoch milliseconds.
    fn now_ms(&self) -> i64;
}

/// Process clock in the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    pub today: NaiveDate,
    pub now_ms: i64,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        let now_ms = today
            .and_hms_opt(12, 0, 0)
            .map_or(0, |noon| noon.and_utc().timestamp_millis());
        Self { today, now_ms }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.today
    }

    fn now_ms(&self) -> i64 {
        self.now_ms
    }
}

/// Clock a test can move forward while a mutator holds it.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<FixedClock>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            current: Mutex::new(FixedClock::new(today)),
        }
    }

    pub fn set_today(&self, today: NaiveDate) {
        if let Ok(mut current) = self.current.lock() {
            *current = FixedClock::new(today);
        }
    }

    pub fn advance_days(&self, days: u64) {
        let next = self
            .today()
            .checked_add_days(Days::new(days))
            .unwrap_or(NaiveDate::MAX);
        self.set_today(next);
    }

    fn read(&self) -> FixedClock {
        match self.current.lock() {
            Ok(current) => *current,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        self.read().today
    }

    fn now_ms(&self) -> i64 {
        self.read().now_ms
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn today(&self) -> NaiveDate {
        (**self).today()
    }

    fn now_ms(&self) -> i64 {
        (**self).now_ms()
    }
}
