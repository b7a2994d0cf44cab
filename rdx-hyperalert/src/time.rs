//! Wall-clock access and human-readable time labels.
//!
//! The monitor never calls `Utc::now()` directly. It asks a `Clock` once per
//! tick, so every event in that tick is judged against the same instant and
//! tests can drive time by hand.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What caused a tick to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickSource {
    Startup,
    Timer,
    Refresh,
}

/// One execution of the polling cycle, stamped with its sampled time.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub tick_count: u64,
    pub now: DateTime<Utc>,
    pub source: TickSource,
}

/// Describes how long until `start`, e.g. "5 minutes" or "1 hour 20 min".
pub fn time_until_label(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (start - now).num_seconds();
    if secs < 0 {
        return "Started".to_string();
    }
    if secs < 60 {
        return "Less than 1 minute".to_string();
    }
    if secs < 3600 {
        let minutes = secs / 60;
        return format!("{} minute{}", minutes, plural(minutes));
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    if minutes > 0 {
        format!("{} hour{} {} min", hours, plural(hours), minutes)
    } else {
        format!("{} hour{}", hours, plural(hours))
    }
}

/// Formats the start time as "HH:MM" in the display timezone.
pub fn start_time_label(start: DateTime<Utc>, tz: Tz) -> String {
    start.with_timezone(&tz).format("%H:%M").to_string()
}

fn plural(n: i64) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
