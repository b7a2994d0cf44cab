//! Defines all public event types broadcast by the Hyperalert engine.
//!
//! This module acts as the public API between the engine and whatever presents
//! it. The monitor and the alert lifecycle never expose mutable state; they
//! publish immutable values on channels and consumers subscribe.

use crate::calendar::Event;
use crate::time::TickSource;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Instant;

pub const ACCESS_GRANTED_MESSAGE: &str = "Calendar access granted";
pub const ACCESS_DENIED_MESSAGE: &str = "Calendar access denied. Please grant access in System Settings > Privacy & Security > Calendars";

/// Whether the event source may be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessStatus {
    /// Access has not been requested yet, or the request has not completed.
    #[default]
    Unknown,
    Granted,
    Denied,
}

impl AccessStatus {
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }

    /// The status line shown to the user.
    pub fn message(self) -> &'static str {
        match self {
            Self::Unknown => "Requesting calendar access...",
            Self::Granted => ACCESS_GRANTED_MESSAGE,
            Self::Denied => ACCESS_DENIED_MESSAGE,
        }
    }
}

/// The latest published state of the monitor.
#[derive(Debug, Clone, Default)]
pub struct MonitorSnapshot {
    /// Filtered events sorted by start time.
    pub upcoming: Arc<Vec<Event>>,
    pub access: AccessStatus,
    pub tick_count: u64,
    /// The "now" the snapshot was computed against. `None` before the first tick.
    pub sampled_at: Option<DateTime<Utc>>,
}

impl MonitorSnapshot {
    /// The next event to start, if any.
    pub fn next_event(&self) -> Option<&Event> {
        self.upcoming.first()
    }
}

/// Events related to the lifecycle and state of the monitor itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the monitor's run loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the monitor's run loop is about to exit.
    EngineShutdown,
    /// Fired after every tick that ran to completion.
    TickCompleted {
        tick_count: u64,
        upcoming: usize,
        fired: usize,
    },
    /// Fired when a tick was requested while another was still in flight.
    TickSkipped { source: TickSource },
    /// Fired whenever the access status changes.
    AccessChanged { status: AccessStatus },
}

/// What the presentation layer should render for an active alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertPayload {
    pub title: String,
    /// "Starting now" for triggered alerts, "Starting at HH:MM" for previews.
    pub time_label: String,
    pub location: String,
    pub meeting_link: Option<String>,
    /// Provider name of `meeting_link`, e.g. "Zoom".
    pub platform: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Why an alert stopped being shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideReason {
    AutoDismissed,
    Dismissed,
    Joined,
    /// Replaced by a newer alert.
    Superseded,
}

/// Transitions of the single active alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    Shown(AlertPayload),
    Hidden { reason: HideReason },
}
