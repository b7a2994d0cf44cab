use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use colored::Colorize;
use hyperalert::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the configuration; the path is optional.
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = HyperalertConfig::load(config_path.as_deref())?;

    // 3. Seed an in-memory calendar with a few meetings about to start.
    let source = Arc::new(MemoryEventSource::new());
    seed_demo_agenda(&source);
    let settings = Arc::new(MemorySettingsStore::default());

    // 4. Create the EventMonitor instance.
    let monitor = EventMonitor::builder(config, source, settings)
        .cue(Arc::new(TerminalBell))
        .build()?;

    // 5. Spawn concurrent tasks to listen to the event streams.
    spawn_event_listeners(&monitor);

    // 6. Run the monitor until Ctrl+C.
    monitor.run().await?;

    Ok(())
}

/// Spawns tasks that log every system and alert event the monitor publishes.
fn spawn_event_listeners(monitor: &EventMonitor) {
    let mut system_rx = monitor.subscribe_system_events();
    tokio::spawn(async move {
        loop {
            match system_rx.recv().await {
                Ok(event) => info!("[SYSTEM] => {:?}", event),
                Err(RecvError::Lagged(missed)) => warn!("[SYSTEM] listener lagged, missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut alert_rx = monitor.subscribe_alert_events();
    tokio::spawn(async move {
        loop {
            match alert_rx.recv().await {
                Ok(AlertEvent::Shown(payload)) => {
                    info!(
                        "{} {} | {} | {}",
                        "[ALERT]".red().bold(),
                        payload.title.as_str().bold(),
                        payload.time_label,
                        payload.meeting_link.as_deref().unwrap_or(&payload.location)
                    );
                }
                Ok(AlertEvent::Hidden { reason }) => info!("[ALERT] => hidden ({:?})", reason),
                Err(RecvError::Lagged(missed)) => warn!("[ALERT] listener lagged, missed {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Adds meetings that will start over the next few minutes.
fn seed_demo_agenda(source: &MemoryEventSource) {
    let now = Utc::now();
    let meetings = [
        ("demo-standup", "Daily Standup", 50, Some("https://acme.zoom.us/j/123?pwd=abc%3D")),
        ("demo-design", "Design Review", 170, Some("Room 4B")),
        ("demo-1on1", "1:1", 290, None),
    ];
    for (id, title, starts_in, location) in meetings {
        let start = now + ChronoDuration::seconds(starts_in);
        source.add_event(RawEvent {
            id: EventId::from(id),
            title: Some(title.to_string()),
            start: Some(start),
            end: Some(start + ChronoDuration::minutes(30)),
            location: location.map(str::to_string),
            calendar_id: CalendarId::from("demo"),
            ..Default::default()
        });
    }
}
