//! The boundary to whatever actually stores the user's calendars.

use crate::calendar::{Calendar, RawEvent};
use crate::common::CalendarId;
use crate::error::{HyperalertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A queryable source of calendar events.
///
/// Access may be granted late, or not at all. The monitor asks again on later
/// ticks, so implementations should make `request_access` cheap to repeat.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Asks for permission to read calendars. `Ok(false)` means denied.
    async fn request_access(&self) -> Result<bool>;

    async fn list_calendars(&self) -> Result<Vec<Calendar>>;

    /// Returns events overlapping `[start, end)`, optionally limited to some calendars.
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: Option<&HashSet<CalendarId>>,
    ) -> Result<Vec<RawEvent>>;
}

#[derive(Default)]
struct MemoryState {
    calendars: Vec<Calendar>,
    events: Vec<RawEvent>,
    access_granted: bool,
    failures_queued: usize,
    fetch_delay: Option<Duration>,
    fetch_calls: usize,
}

/// An in-memory event source for tests, demos and the shell.
#[derive(Default)]
pub struct MemoryEventSource {
    state: Mutex<MemoryState>,
}

impl MemoryEventSource {
    /// Creates a source that grants access immediately.
    pub fn new() -> Self {
        let source = Self::default();
        source.set_access(true);
        source
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_access(&self, granted: bool) {
        self.state().access_granted = granted;
    }

    pub fn add_calendar(&self, calendar: Calendar) {
        self.state().calendars.push(calendar);
    }

    pub fn add_event(&self, event: RawEvent) {
        self.state().events.push(event);
    }

    pub fn remove_event(&self, id: &str) -> bool {
        let mut state = self.state();
        let before = state.events.len();
        state.events.retain(|e| e.id.as_str() != id);
        state.events.len() != before
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Makes the next `count` fetches fail with a source error.
    pub fn fail_next_fetches(&self, count: usize) {
        self.state().failures_queued = count;
    }

    /// Delays every fetch, to simulate a slow backend.
    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        self.state().fetch_delay = delay;
    }

    pub fn fetch_calls(&self) -> usize {
        self.state().fetch_calls
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn request_access(&self) -> Result<bool> {
        Ok(self.state().access_granted)
    }

    async fn list_calendars(&self) -> Result<Vec<Calendar>> {
        let state = self.state();
        if !state.access_granted {
            return Err(HyperalertError::AccessDenied);
        }
        Ok(state.calendars.clone())
    }

    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_ids: Option<&HashSet<CalendarId>>,
    ) -> Result<Vec<RawEvent>> {
        let delay = {
            let mut state = self.state();
            state.fetch_calls += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if !state.access_granted {
            return Err(HyperalertError::AccessDenied);
        }
        if state.failures_queued > 0 {
            state.failures_queued -= 1;
            return Err(HyperalertError::Source("simulated fetch failure".to_string()));
        }

        Ok(state
            .events
            .iter()
            .filter(|e| calendar_ids.map_or(true, |ids| ids.contains(&e.calendar_id)))
            .filter(|e| match (e.start, e.end) {
                (Some(s), Some(f)) => s < end && f > start,
                // Let the monitor decide what to do with incomplete records.
                _ => true,
            })
            .cloned()
            .collect())
    }
}
