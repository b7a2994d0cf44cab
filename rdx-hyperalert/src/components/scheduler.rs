//! Trigger detection and de-duplication.
//!
//! Every tick the scheduler looks for events that have just entered the
//! trigger window and have not been alerted yet. An alerted id is remembered
//! for a fixed eviction delay, after which a timer forgets it again. Eviction
//! is per-entry and time-based; it never waits for a tick.

use crate::calendar::{Event, Settings};
use crate::common::EventId;
use crate::components::lifecycle::AlertSink;
use crate::components::link::LinkExtractor;
use crate::events::AlertPayload;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, info};

pub const STARTING_NOW: &str = "Starting now";

/// One alert the scheduler decided to raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firing {
    pub event_id: EventId,
    pub payload: AlertPayload,
}

/// Ids that have already been alerted, each with the time it may be forgotten.
#[derive(Debug, Clone, Default)]
pub struct AlertedSet {
    entries: HashMap<EventId, DateTime<Utc>>,
}

impl AlertedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.entries.contains_key(id)
    }

    /// Records `id` until `deadline`. Returns `false` and leaves the existing
    /// entry untouched if `id` is already present.
    pub fn insert(&mut self, id: EventId, deadline: DateTime<Utc>) -> bool {
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(id, deadline);
        true
    }

    /// Forgets `id`. Forgetting an absent id is a no-op.
    pub fn evict(&mut self, id: &EventId) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn deadline(&self, id: &EventId) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The pure part of the scheduler: window test, skip rule and payload building.
#[derive(Debug, Clone)]
pub struct TriggerPolicy {
    pub window: chrono::Duration,
    pub eviction_delay: chrono::Duration,
    links: LinkExtractor,
}

impl TriggerPolicy {
    pub fn new(
        window: chrono::Duration,
        eviction_delay: chrono::Duration,
        links: LinkExtractor,
    ) -> Self {
        Self {
            window,
            eviction_delay,
            links,
        }
    }

    /// True if the event starts within `(now, now + window]`.
    pub fn in_window(&self, event: &Event, now: DateTime<Utc>) -> bool {
        let until_start = event.start - now;
        until_start > chrono::Duration::zero() && until_start <= self.window
    }

    /// Finds the events that should fire at `now` and marks them as alerted.
    ///
    /// Events are visited in start order. An event skipped for lacking a
    /// location or link is not marked, since it was never actually alerted.
    pub fn check_triggers(
        &self,
        events: &[Event],
        now: DateTime<Utc>,
        settings: &Settings,
        alerted: &mut AlertedSet,
    ) -> Vec<Firing> {
        let mut ordered: Vec<&Event> = events.iter().collect();
        ordered.sort_by_key(|event| event.start);

        let mut firings = Vec::new();
        for event in ordered {
            if !self.in_window(event, now) || alerted.contains(&event.id) {
                continue;
            }
            if settings.skip_events_without_location_or_link
                && !self.links.has_location_or_link(event)
            {
                debug!("Skipping '{}': no location or meeting link.", event.title);
                continue;
            }
            if !alerted.insert(event.id.clone(), now + self.eviction_delay) {
                continue;
            }
            firings.push(Firing {
                event_id: event.id.clone(),
                payload: self.payload_for(event, STARTING_NOW, now),
            });
        }
        firings
    }

    /// Builds the alert payload for `event` with the given time label.
    pub fn payload_for(&self, event: &Event, time_label: &str, now: DateTime<Utc>) -> AlertPayload {
        let link = self.links.extract_event_link(event);
        AlertPayload {
            title: event.title.clone(),
            time_label: time_label.to_string(),
            location: event.location_text().unwrap_or_default().to_string(),
            platform: link.as_ref().map(|l| l.provider.clone()),
            meeting_link: link.map(|l| l.url),
            created_at: now,
        }
    }
}

#[derive(Default)]
struct DedupState {
    alerted: AlertedSet,
    timers: HashMap<EventId, AbortHandle>,
}

/// Runs the trigger pass and owns the alerted set and its eviction timers.
#[derive(Clone)]
pub struct AlertScheduler {
    policy: Arc<TriggerPolicy>,
    state: Arc<Mutex<DedupState>>,
    sink: Arc<dyn AlertSink>,
}

impl AlertScheduler {
    pub fn new(policy: TriggerPolicy, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            policy: Arc::new(policy),
            state: Arc::new(Mutex::new(DedupState::default())),
            sink,
        }
    }

    pub fn policy(&self) -> &TriggerPolicy {
        &self.policy
    }

    /// Evaluates one tick's events and raises an alert for every firing, in order.
    pub async fn run_pass(
        &self,
        events: &[Event],
        now: DateTime<Utc>,
        settings: &Settings,
    ) -> Vec<Firing> {
        let firings = {
            let mut state = self.state.lock().await;
            let firings = self
                .policy
                .check_triggers(events, now, settings, &mut state.alerted);
            for firing in &firings {
                let handle = self.spawn_eviction(firing.event_id.clone());
                if let Some(stale) = state.timers.insert(firing.event_id.clone(), handle) {
                    stale.abort();
                }
            }
            firings
        };

        for firing in &firings {
            info!("Meeting '{}' is starting, raising alert.", firing.payload.title);
            self.sink.raise(firing.payload.clone()).await;
        }
        firings
    }

    pub async fn is_alerted(&self, id: &EventId) -> bool {
        self.state.lock().await.alerted.contains(id)
    }

    pub async fn alerted_count(&self) -> usize {
        self.state.lock().await.alerted.len()
    }

    pub async fn eviction_deadline(&self, id: &EventId) -> Option<DateTime<Utc>> {
        self.state.lock().await.alerted.deadline(id)
    }

    /// Cancels the eviction timer for `id`, keeping it in the alerted set.
    ///
    /// Returns `false` if there was no pending timer.
    pub async fn cancel_eviction(&self, id: &EventId) -> bool {
        match self.state.lock().await.timers.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every pending eviction timer and forgets every alerted id.
    ///
    /// An id left behind without its timer would never be evicted.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        for (_, handle) in state.timers.drain() {
            handle.abort();
        }
        state.alerted.clear();
    }

    fn spawn_eviction(&self, id: EventId) -> AbortHandle {
        let state = self.state.clone();
        let delay = self
            .policy
            .eviction_delay
            .to_std()
            .unwrap_or(Duration::ZERO);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = state.lock().await;
            state.timers.remove(&id);
            if state.alerted.evict(&id) {
                debug!("Evicted {} from the alerted set.", id);
            }
        })
        .abort_handle()
    }
}
