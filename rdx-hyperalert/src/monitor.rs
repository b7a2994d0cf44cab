//! The monitor that orchestrates the entire Hyperalert system.

use crate::calendar::{Calendar, Event, Settings};
use crate::common::EventId;
use crate::components::filter::EventFilter;
use crate::components::lifecycle::{AlertLifecycle, AudibleCue, SilentCue};
use crate::components::link::LinkExtractor;
use crate::components::scheduler::{AlertScheduler, Firing, TriggerPolicy};
use crate::config::HyperalertConfig;
use crate::error::{HyperalertError, Result};
use crate::events::{AccessStatus, AlertEvent, AlertPayload, MonitorSnapshot, SystemEvent};
use crate::settings::SettingsStore;
use crate::source::EventSource;
use crate::time::{start_time_label, Clock, SystemClock, TickEvent, TickSource};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// How a single call to `EventMonitor::tick` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed {
        upcoming: usize,
        firings: Vec<Firing>,
    },
    /// Another tick was still in flight.
    Skipped,
}

/// Builds an `EventMonitor`, optionally overriding its clock and audible cue.
pub struct MonitorBuilder {
    config: HyperalertConfig,
    source: Arc<dyn EventSource>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    cue: Arc<dyn AudibleCue>,
}

impl MonitorBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn cue(mut self, cue: Arc<dyn AudibleCue>) -> Self {
        self.cue = cue;
        self
    }

    /// Validates the configuration and wires the components together.
    pub fn build(self) -> Result<EventMonitor> {
        self.config.validate()?;
        let links = LinkExtractor::new(&self.config.providers)?;
        let lifecycle = AlertLifecycle::new(self.config.auto_dismiss(), self.cue);
        let policy = TriggerPolicy::new(
            self.config.trigger_window(),
            chrono::Duration::from_std(self.config.eviction_delay())
                .map_err(|e| HyperalertError::InvalidConfig(e.to_string()))?,
            links.clone(),
        );
        let scheduler = AlertScheduler::new(policy, Arc::new(lifecycle.clone()));

        let (snapshot_sender, _) = watch::channel(MonitorSnapshot::default());
        let (system_event_sender, _) = broadcast::channel(64);

        Ok(EventMonitor {
            config: Arc::new(self.config),
            source: self.source,
            settings: self.settings,
            clock: self.clock,
            filter: Arc::new(EventFilter::new(links)),
            scheduler,
            lifecycle,
            snapshot_sender: Arc::new(snapshot_sender),
            system_event_sender,
            refresh: Arc::new(Notify::new()),
            tick_guard: Arc::new(Mutex::new(())),
            tick_count: Arc::new(AtomicU64::new(0)),
        })
    }
}

/// The main Hyperalert monitor.
///
/// Polls the event source on a fixed cadence, filters and sorts what it finds,
/// publishes the result, and hands every tick's events to the scheduler. The
/// monitor is designed to be cloned and shared across tasks, providing a
/// handle to the running instance.
#[derive(Clone)]
pub struct EventMonitor {
    config: Arc<HyperalertConfig>,
    source: Arc<dyn EventSource>,
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    filter: Arc<EventFilter>,
    scheduler: AlertScheduler,
    lifecycle: AlertLifecycle,
    snapshot_sender: Arc<watch::Sender<MonitorSnapshot>>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    refresh: Arc<Notify>,
    tick_guard: Arc<Mutex<()>>,
    tick_count: Arc<AtomicU64>,
}

// Core implementation block for internal logic.
impl EventMonitor {
    pub fn builder(
        config: HyperalertConfig,
        source: Arc<dyn EventSource>,
        settings: Arc<dyn SettingsStore>,
    ) -> MonitorBuilder {
        MonitorBuilder {
            config,
            source,
            settings,
            clock: Arc::new(SystemClock),
            cue: Arc::new(SilentCue),
        }
    }

    /// Creates a monitor on the system clock with a silent cue.
    pub fn new(
        config: HyperalertConfig,
        source: Arc<dyn EventSource>,
        settings: Arc<dyn SettingsStore>,
    ) -> Result<Self> {
        Self::builder(config, source, settings).build()
    }

    /// Runs the monitor's main loop until Ctrl+C is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        let signal = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        };
        info!("Monitor running. Press Ctrl+C to shut down.");
        self.run_until(signal).await;
        Ok(())
    }

    /// Runs the monitor's main loop until `shutdown` completes.
    ///
    /// This method will:
    /// 1. Spawn the polling task, whose first tick runs immediately.
    /// 2. Wait for `shutdown`, then abort in-flight ticks and clear the alerted set.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        info!("EventMonitor starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let poller = self.clone();
        let poller_shutdown_rx = shutdown_tx.subscribe();
        let poll_task = tokio::spawn(async move { poller.poll_loop(poller_shutdown_rx).await });

        shutdown.await;

        info!("Shutdown signal received. Stopping the poller...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. The poller may not terminate gracefully.");
        }
        if let Err(e) = poll_task.await {
            error!("Poller task ended abnormally: {}", e);
        }
        self.scheduler.reset().await;
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("EventMonitor has shut down.");
    }

    #[doc(hidden)]
    async fn poll_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = JoinSet::new();
        let mut source = TickSource::Startup;

        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                Some(finished) = ticks.join_next(), if !ticks.is_empty() => {
                    if let Err(e) = finished {
                        if !e.is_cancelled() {
                            error!("Tick task ended abnormally: {}", e);
                        }
                    }
                }
                _ = interval.tick() => {
                    self.spawn_tick(&mut ticks, source);
                    source = TickSource::Timer;
                }
                _ = self.refresh.notified() => {
                    self.spawn_tick(&mut ticks, TickSource::Refresh);
                }
            }
        }
        // Every tick still running is aborted, so none can raise after shutdown.
        ticks.shutdown().await;
    }

    // Overlap is prevented by the tick guard, not by the loop.
    fn spawn_tick(&self, ticks: &mut JoinSet<()>, source: TickSource) {
        let monitor = self.clone();
        ticks.spawn(async move {
            monitor.tick(source).await;
        });
    }

    /// Runs one polling cycle. Skipped if another tick is still in flight.
    pub async fn tick(&self, source: TickSource) -> TickOutcome {
        let Ok(_guard) = self.tick_guard.try_lock() else {
            debug!("Tick from {:?} skipped: previous tick still running.", source);
            self.system_event_sender
                .send(SystemEvent::TickSkipped { source })
                .ok();
            return TickOutcome::Skipped;
        };

        let tick = TickEvent {
            tick_count: self.tick_count.fetch_add(1, Ordering::Relaxed) + 1,
            now: self.clock.now(),
            source,
        };
        trace!("Tick #{} ({:?}) at {}.", tick.tick_count, tick.source, tick.now);

        let settings = self.settings.settings();
        let access = self.ensure_access().await;
        let upcoming = if access.is_granted() {
            self.load_upcoming(tick.now, &settings).await
        } else {
            Vec::new()
        };
        let upcoming = Arc::new(upcoming);

        self.snapshot_sender.send_modify(|snapshot| {
            snapshot.upcoming = upcoming.clone();
            snapshot.tick_count = tick.tick_count;
            snapshot.sampled_at = Some(tick.now);
        });

        let firings = self
            .scheduler
            .run_pass(&upcoming, tick.now, &settings)
            .await;

        self.system_event_sender
            .send(SystemEvent::TickCompleted {
                tick_count: tick.tick_count,
                upcoming: upcoming.len(),
                fired: firings.len(),
            })
            .ok();
        TickOutcome::Completed {
            upcoming: upcoming.len(),
            firings,
        }
    }

    #[doc(hidden)]
    async fn ensure_access(&self) -> AccessStatus {
        let current = self.snapshot_sender.borrow().access;
        if current.is_granted() {
            return current;
        }
        match self.source.request_access().await {
            Ok(true) => self.set_access(AccessStatus::Granted),
            Ok(false) => self.set_access(AccessStatus::Denied),
            Err(HyperalertError::AccessDenied) => self.set_access(AccessStatus::Denied),
            Err(e) => {
                warn!("Access request failed, will retry next tick: {}", e);
                current
            }
        }
    }

    fn set_access(&self, status: AccessStatus) -> AccessStatus {
        let changed = self.snapshot_sender.send_if_modified(|snapshot| {
            if snapshot.access == status {
                return false;
            }
            snapshot.access = status;
            true
        });
        if changed {
            info!("{}", status.message());
            self.system_event_sender
                .send(SystemEvent::AccessChanged { status })
                .ok();
        }
        status
    }

    #[doc(hidden)]
    async fn load_upcoming(&self, now: DateTime<Utc>, settings: &Settings) -> Vec<Event> {
        let calendars = (!settings.selected_calendar_ids.is_empty())
            .then_some(&settings.selected_calendar_ids);
        let raw = match self
            .source
            .fetch_events(now, now + self.config.lookahead(), calendars)
            .await
        {
            Ok(raw) => raw,
            Err(HyperalertError::AccessDenied) => {
                self.set_access(AccessStatus::Denied);
                return Vec::new();
            }
            Err(e) => {
                warn!("Fetching events failed, treating this tick as empty: {}", e);
                return Vec::new();
            }
        };

        let events: Vec<Event> = raw
            .into_iter()
            .filter_map(|record| match Event::try_from(record) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!("Dropping event: {}", e);
                    None
                }
            })
            .collect();

        let mut upcoming = self.filter.filter(events, settings);
        upcoming.sort_by_key(|event| event.start);
        upcoming
    }
}

// Public API implementation block.
impl EventMonitor {
    /// Requests an immediate tick from the running loop, e.g. when a window opens.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Shows an alert for an upcoming event without marking it as alerted.
    pub async fn manual_preview(&self, id: &EventId) -> Result<AlertPayload> {
        let event = self
            .snapshot()
            .upcoming
            .iter()
            .find(|event| &event.id == id)
            .cloned()
            .ok_or_else(|| HyperalertError::UnknownEvent(id.clone()))?;
        let label = format!(
            "Starting at {}",
            start_time_label(event.start, self.config.timezone)
        );
        let payload = self
            .scheduler
            .policy()
            .payload_for(&event, &label, self.clock.now());
        self.lifecycle.raise(payload.clone()).await;
        Ok(payload)
    }

    /// Dismisses the active alert. Returns `false` if none was showing.
    pub async fn dismiss(&self) -> bool {
        self.lifecycle.dismiss().await
    }

    /// Dismisses the active alert and returns its meeting link for opening.
    pub async fn join(&self) -> Option<String> {
        self.lifecycle.join().await
    }

    /// Toggles a calendar in the selection and schedules a refresh.
    pub fn toggle_calendar(&self, id: &crate::common::CalendarId) -> bool {
        let selected = self.settings.toggle_calendar(id);
        self.refresh_now();
        selected
    }

    /// Lists the source's calendars. Fails until access has been granted.
    pub async fn list_calendars(&self) -> Result<Vec<Calendar>> {
        if !self.snapshot_sender.borrow().access.is_granted() {
            return Err(HyperalertError::AccessDenied);
        }
        self.source.list_calendars().await
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshot_sender.borrow().clone()
    }

    pub fn config(&self) -> &HyperalertConfig {
        &self.config
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    pub fn scheduler(&self) -> &AlertScheduler {
        &self.scheduler
    }

    pub fn lifecycle(&self) -> &AlertLifecycle {
        &self.lifecycle
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval()
    }

    /// Subscribes to published `MonitorSnapshot`s.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshot_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the `AlertEvent` stream.
    pub fn subscribe_alert_events(&self) -> broadcast::Receiver<AlertEvent> {
        self.lifecycle.subscribe()
    }
}
