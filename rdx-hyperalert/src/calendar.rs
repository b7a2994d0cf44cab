//! Calendar data as the engine sees it.
//!
//! The event source hands back loosely-typed `RawEvent` records. Each tick they
//! are converted into immutable `Event` snapshots; a record that cannot be
//! converted is dropped from that tick instead of failing the whole pass.

use crate::common::{CalendarId, EventId};
use crate::error::HyperalertError;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;

const UNTITLED: &str = "Untitled event";

/// An event record exactly as returned by an `EventSource`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    pub id: EventId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_all_day: bool,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub calendar_id: CalendarId,
}

/// An immutable snapshot of one event instance, valid for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub calendar_id: CalendarId,
}

impl Event {
    /// The location, if present and not blank.
    pub fn location_text(&self) -> Option<&str> {
        self.location
            .as_deref()
            .map(str::trim)
            .filter(|loc| !loc.is_empty())
    }
}

impl TryFrom<RawEvent> for Event {
    type Error = HyperalertError;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let start = raw.start.ok_or_else(|| HyperalertError::MalformedEvent {
            id: raw.id.clone(),
            reason: "missing start time",
        })?;
        let end = raw.end.ok_or_else(|| HyperalertError::MalformedEvent {
            id: raw.id.clone(),
            reason: "missing end time",
        })?;
        if end < start {
            return Err(HyperalertError::MalformedEvent {
                id: raw.id,
                reason: "ends before it starts",
            });
        }
        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        Ok(Self {
            id: raw.id,
            title,
            start,
            end,
            is_all_day: raw.is_all_day,
            location: raw.location,
            notes: raw.notes,
            calendar_id: raw.calendar_id,
        })
    }
}

/// A calendar as listed by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Calendar {
    pub id: CalendarId,
    pub title: String,
    /// A display color such as `#3478F6`, if the source provides one.
    #[serde(default)]
    pub color_hint: Option<String>,
}

/// A point-in-time copy of the user's settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Calendars to include. Empty means every calendar.
    pub selected_calendar_ids: HashSet<CalendarId>,
    pub skip_events_without_location_or_link: bool,
    pub open_at_login: bool,
}

impl Settings {
    pub fn is_calendar_selected(&self, id: &CalendarId) -> bool {
        self.selected_calendar_ids.is_empty() || self.selected_calendar_ids.contains(id)
    }
}
