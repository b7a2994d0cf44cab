//! The state machine behind the single on-screen alert.
//!
//! `Idle` → `Showing` → `Idle`. Raising while `Showing` preempts the current
//! alert; nothing is ever queued. Each alert owns exactly one auto-dismiss
//! timer, and that timer is cancelled before its alert is replaced or
//! dismissed. Timers also carry the generation of the alert they were armed
//! for, so a timer that slips past cancellation still cannot clear a newer
//! alert.

use crate::events::{AlertEvent, AlertPayload, HideReason};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Something that can put an alert in front of the user.
///
/// The scheduler only ever sees this capability, never the lifecycle itself.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn raise(&self, payload: AlertPayload);
}

/// The sound played once each time an alert is raised.
pub trait AudibleCue: Send + Sync {
    fn play(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCue;

impl AudibleCue for SilentCue {
    fn play(&self) {}
}

/// Rings the terminal bell.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl AudibleCue for TerminalBell {
    fn play(&self) {
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07").ok();
        stderr.flush().ok();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Showing(AlertPayload),
}

struct LifecycleInner {
    state: AlertState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl LifecycleInner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Owns the active alert and its auto-dismiss timer.
///
/// Cheap to clone; all clones share the same alert.
#[derive(Clone)]
pub struct AlertLifecycle {
    inner: Arc<Mutex<LifecycleInner>>,
    alert_event_sender: broadcast::Sender<AlertEvent>,
    cue: Arc<dyn AudibleCue>,
    auto_dismiss: Duration,
}

impl AlertLifecycle {
    pub fn new(auto_dismiss: Duration, cue: Arc<dyn AudibleCue>) -> Self {
        let (alert_event_sender, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Mutex::new(LifecycleInner {
                state: AlertState::Idle,
                generation: 0,
                timer: None,
            })),
            alert_event_sender,
            cue,
            auto_dismiss,
        }
    }

    /// Shows `payload`, replacing whatever is currently shown.
    pub async fn raise(&self, payload: AlertPayload) {
        let mut inner = self.inner.lock().await;
        inner.cancel_timer();
        if matches!(inner.state, AlertState::Showing(_)) {
            self.alert_event_sender
                .send(AlertEvent::Hidden {
                    reason: HideReason::Superseded,
                })
                .ok();
        }

        inner.generation += 1;
        let generation = inner.generation;
        inner.state = AlertState::Showing(payload.clone());

        let lifecycle = self.clone();
        let timeout = self.auto_dismiss;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            lifecycle.expire(generation).await;
        }));

        info!("Alert shown: '{}' ({}).", payload.title, payload.time_label);
        self.alert_event_sender
            .send(AlertEvent::Shown(payload))
            .ok();
        self.cue.play();
    }

    /// Clears the current alert as if its auto-dismiss timer had fired.
    ///
    /// Has no effect while `Idle`.
    pub async fn auto_dismiss_fires(&self) {
        let mut inner = self.inner.lock().await;
        self.hide(&mut inner, HideReason::AutoDismissed);
    }

    /// User-initiated dismissal. Returns `false` if nothing was showing.
    pub async fn dismiss(&self) -> bool {
        let mut inner = self.inner.lock().await;
        self.hide(&mut inner, HideReason::Dismissed).is_some()
    }

    /// Dismisses the alert and hands back its meeting link for opening.
    pub async fn join(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        self.hide(&mut inner, HideReason::Joined)
            .and_then(|payload| payload.meeting_link)
    }

    pub async fn state(&self) -> AlertState {
        self.inner.lock().await.state.clone()
    }

    pub async fn current(&self) -> Option<AlertPayload> {
        match &self.inner.lock().await.state {
            AlertState::Showing(payload) => Some(payload.clone()),
            AlertState::Idle => None,
        }
    }

    pub async fn is_showing(&self) -> bool {
        matches!(self.inner.lock().await.state, AlertState::Showing(_))
    }

    /// Subscribes to `Shown`/`Hidden` transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.alert_event_sender.subscribe()
    }

    #[doc(hidden)]
    async fn expire(&self, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!("Ignoring stale auto-dismiss for alert #{}.", generation);
            return;
        }
        // This task is the timer; dropping its own handle is enough.
        inner.timer.take();
        self.hide(&mut inner, HideReason::AutoDismissed);
    }

    fn hide(&self, inner: &mut LifecycleInner, reason: HideReason) -> Option<AlertPayload> {
        let AlertState::Showing(payload) =
            std::mem::replace(&mut inner.state, AlertState::Idle)
        else {
            return None;
        };
        inner.cancel_timer();
        info!("Alert hidden: '{}' ({:?}).", payload.title, reason);
        self.alert_event_sender
            .send(AlertEvent::Hidden { reason })
            .ok();
        Some(payload)
    }
}

#[async_trait]
impl AlertSink for AlertLifecycle {
    async fn raise(&self, payload: AlertPayload) {
        AlertLifecycle::raise(self, payload).await;
    }
}
