//! Decides which fetched events the user wants to be alerted about.

use crate::calendar::{Event, Settings};
use crate::components::link::LinkExtractor;
use tracing::debug;

/// Applies the user's settings to a batch of events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    links: LinkExtractor,
}

impl EventFilter {
    pub fn new(links: LinkExtractor) -> Self {
        Self { links }
    }

    /// Returns true if `event` survives every rule in `settings`.
    ///
    /// All-day events never pass: they have no meaningful start to alert on.
    pub fn accepts(&self, event: &Event, settings: &Settings) -> bool {
        if event.is_all_day {
            return false;
        }
        if !settings.is_calendar_selected(&event.calendar_id) {
            return false;
        }
        if settings.skip_events_without_location_or_link && !self.links.has_location_or_link(event)
        {
            return false;
        }
        true
    }

    /// Keeps the accepted events. Output order follows input order.
    pub fn filter(&self, events: Vec<Event>, settings: &Settings) -> Vec<Event> {
        let before = events.len();
        let kept: Vec<Event> = events
            .into_iter()
            .filter(|event| self.accepts(event, settings))
            .collect();
        debug!("Filter kept {} of {} events.", kept.len(), before);
        kept
    }

    pub fn links(&self) -> &LinkExtractor {
        &self.links
    }
}
