use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use hyperalert::components::lifecycle::AlertState;
use hyperalert::prelude::*;
use hyperalert::time::ManualClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

struct Fixture {
    monitor: EventMonitor,
    source: Arc<MemoryEventSource>,
    settings: Arc<MemorySettingsStore>,
    clock: ManualClock,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

fn fixture() -> Fixture {
    let source = Arc::new(MemoryEventSource::new());
    let settings = Arc::new(MemorySettingsStore::default());
    let clock = ManualClock::new(start());
    let monitor = EventMonitor::builder(
        HyperalertConfig::default(),
        source.clone(),
        settings.clone(),
    )
    .clock(Arc::new(clock.clone()))
    .build()
    .unwrap();
    Fixture {
        monitor,
        source,
        settings,
        clock,
    }
}

fn meeting(id: &str, starts_in_secs: i64, location: Option<&str>) -> RawEvent {
    let begin = start() + ChronoDuration::seconds(starts_in_secs);
    RawEvent {
        id: EventId::from(id),
        title: Some(id.to_string()),
        start: Some(begin),
        end: Some(begin + ChronoDuration::minutes(30)),
        location: location.map(str::to_string),
        calendar_id: CalendarId::from("work"),
        ..Default::default()
    }
}

fn fired_ids(outcome: &TickOutcome) -> Vec<String> {
    match outcome {
        TickOutcome::Completed { firings, .. } => firings
            .iter()
            .map(|f| f.event_id.as_str().to_string())
            .collect(),
        TickOutcome::Skipped => panic!("tick was skipped"),
    }
}

#[tokio::test]
async fn simultaneous_meetings_both_fire_and_last_one_is_shown() {
    let fx = fixture();
    fx.source.add_event(meeting("first", 10, Some("Room 1")));
    fx.source.add_event(meeting("second", 10, Some("Room 2")));

    let outcome = fx.monitor.tick(TickSource::Timer).await;
    assert_eq!(fired_ids(&outcome), vec!["first", "second"]);

    let shown = fx.monitor.lifecycle().current().await.unwrap();
    assert_eq!(shown.title, "second");
    assert_eq!(shown.time_label, "Starting now");
    assert_eq!(fx.monitor.scheduler().alerted_count().await, 2);
}

#[tokio::test]
async fn alerted_meeting_does_not_fire_twice() {
    let fx = fixture();
    fx.source.add_event(meeting("standup", 50, None));

    assert_eq!(fired_ids(&fx.monitor.tick(TickSource::Timer).await), vec!["standup"]);
    fx.clock.advance(ChronoDuration::seconds(20));
    assert!(fired_ids(&fx.monitor.tick(TickSource::Refresh).await).is_empty());
}

#[tokio::test]
async fn meeting_without_location_is_skipped_when_configured() {
    let fx = fixture();
    fx.settings.set_skip_without_location(true);
    fx.source.add_event(meeting("e1", 30, Some("")));

    let outcome = fx.monitor.tick(TickSource::Timer).await;
    assert!(fired_ids(&outcome).is_empty());
    assert!(!fx.monitor.scheduler().is_alerted(&EventId::from("e1")).await);
    assert!(fx.monitor.snapshot().upcoming.is_empty());

    // A minute later the meeting has started and never fires.
    fx.clock.advance(ChronoDuration::seconds(60));
    assert!(fired_ids(&fx.monitor.tick(TickSource::Timer).await).is_empty());
    assert_eq!(fx.monitor.lifecycle().state().await, AlertState::Idle);
}

#[tokio::test]
async fn upcoming_is_sorted_and_filtered() {
    let fx = fixture();
    fx.source.add_event(meeting("later", 7200, None));
    fx.source.add_event(meeting("soon", 600, None));
    let mut all_day = meeting("holiday", 3600, None);
    all_day.is_all_day = true;
    fx.source.add_event(all_day);

    fx.monitor.tick(TickSource::Startup).await;
    let snapshot = fx.monitor.snapshot();
    let ids: Vec<&str> = snapshot.upcoming.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["soon", "later"]);
    assert_eq!(snapshot.next_event().map(|e| e.id.as_str()), Some("soon"));
    assert_eq!(snapshot.sampled_at, Some(start()));
    assert_eq!(snapshot.access, AccessStatus::Granted);
}

#[tokio::test]
async fn selected_calendars_limit_the_fetch() {
    let fx = fixture();
    fx.source.add_event(meeting("work", 600, None));
    let mut personal = meeting("gym", 900, None);
    personal.calendar_id = CalendarId::from("personal");
    fx.source.add_event(personal);

    assert!(fx.monitor.toggle_calendar(&CalendarId::from("personal")));
    fx.monitor.tick(TickSource::Refresh).await;
    let snapshot = fx.monitor.snapshot();
    assert_eq!(snapshot.upcoming.len(), 1);
    assert_eq!(snapshot.upcoming[0].id, EventId::from("gym"));
}

#[tokio::test]
async fn malformed_records_are_dropped_individually() {
    let fx = fixture();
    fx.source.add_event(meeting("good", 600, None));
    let mut broken = meeting("broken", 300, None);
    broken.start = None;
    fx.source.add_event(broken);

    fx.monitor.tick(TickSource::Timer).await;
    let snapshot = fx.monitor.snapshot();
    assert_eq!(snapshot.upcoming.len(), 1);
    assert_eq!(snapshot.upcoming[0].id, EventId::from("good"));
}

#[tokio::test]
async fn denied_access_keeps_polling_until_granted() {
    let fx = fixture();
    fx.source.set_access(false);
    fx.source.add_event(meeting("standup", 30, None));
    let mut system = fx.monitor.subscribe_system_events();

    let outcome = fx.monitor.tick(TickSource::Startup).await;
    assert!(fired_ids(&outcome).is_empty());
    let snapshot = fx.monitor.snapshot();
    assert_eq!(snapshot.access, AccessStatus::Denied);
    assert!(snapshot.access.message().contains("Privacy & Security"));
    assert!(matches!(
        fx.monitor.list_calendars().await,
        Err(HyperalertError::AccessDenied)
    ));

    fx.source.set_access(true);
    let outcome = fx.monitor.tick(TickSource::Timer).await;
    assert_eq!(fired_ids(&outcome), vec!["standup"]);
    assert_eq!(fx.monitor.snapshot().access, AccessStatus::Granted);

    let mut statuses = Vec::new();
    while let Ok(event) = system.try_recv() {
        if let SystemEvent::AccessChanged { status } = event {
            statuses.push(status);
        }
    }
    assert_eq!(statuses, vec![AccessStatus::Denied, AccessStatus::Granted]);
}

#[tokio::test]
async fn fetch_failure_yields_an_empty_tick() {
    let fx = fixture();
    fx.source.add_event(meeting("review", 600, None));

    fx.monitor.tick(TickSource::Startup).await;
    assert_eq!(fx.monitor.snapshot().upcoming.len(), 1);

    fx.source.fail_next_fetches(1);
    let outcome = fx.monitor.tick(TickSource::Timer).await;
    assert!(matches!(outcome, TickOutcome::Completed { upcoming: 0, .. }));
    assert!(fx.monitor.snapshot().upcoming.is_empty());
    assert_eq!(fx.monitor.snapshot().access, AccessStatus::Granted);

    fx.monitor.tick(TickSource::Timer).await;
    assert_eq!(fx.monitor.snapshot().upcoming.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn overlapping_tick_is_skipped() {
    let fx = fixture();
    fx.source.set_fetch_delay(Some(Duration::from_secs(5)));
    fx.source.add_event(meeting("standup", 30, None));

    let mut system = fx.monitor.subscribe_system_events();

    let monitor = fx.monitor.clone();
    let slow = tokio::spawn(async move { monitor.tick(TickSource::Timer).await });
    tokio::task::yield_now().await;

    assert_eq!(fx.monitor.tick(TickSource::Refresh).await, TickOutcome::Skipped);
    let finished = slow.await.unwrap();
    assert_eq!(fired_ids(&finished), vec!["standup"]);
    assert_eq!(fx.source.fetch_calls(), 1);

    let mut skipped = Vec::new();
    while let Ok(event) = system.try_recv() {
        if let SystemEvent::TickSkipped { source } = event {
            skipped.push(source);
        }
    }
    assert_eq!(skipped, vec![TickSource::Refresh]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_aborts_the_tick_in_flight() {
    let fx = fixture();
    fx.source.set_fetch_delay(Some(Duration::from_secs(5)));
    fx.source.add_event(meeting("standup", 30, None));
    let mut alerts = fx.monitor.subscribe_alert_events();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let monitor = fx.monitor.clone();
    let running = tokio::spawn(async move {
        monitor
            .run_until(async {
                stop_rx.await.ok();
            })
            .await;
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    // Lands on the busy guard and is skipped.
    fx.monitor.refresh_now();
    tokio::time::sleep(Duration::from_millis(10)).await;

    stop_tx.send(()).unwrap();
    running.await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(!fx.monitor.lifecycle().is_showing().await);
    assert!(alerts.try_recv().is_err());
    assert_eq!(fx.monitor.scheduler().alerted_count().await, 0);
}

#[test]
fn out_of_range_config_fails_to_build() {
    for config in [
        HyperalertConfig {
            trigger_window_secs: u64::MAX,
            ..Default::default()
        },
        HyperalertConfig {
            trigger_window_secs: 10_000_000_000_000_000,
            ..Default::default()
        },
        HyperalertConfig {
            lookahead_hours: 10_000_000_000,
            ..Default::default()
        },
    ] {
        let built = EventMonitor::new(
            config,
            Arc::new(MemoryEventSource::new()),
            Arc::new(MemorySettingsStore::default()),
        );
        assert!(matches!(built, Err(HyperalertError::InvalidConfig(_))));
    }
}

#[tokio::test]
async fn manual_preview_does_not_mark_the_event() {
    let fx = fixture();
    fx.source.add_event(meeting("review", 3900, Some("https://acme.zoom.us/j/42")));
    fx.monitor.tick(TickSource::Startup).await;

    let id = EventId::from("review");
    let payload = fx.monitor.manual_preview(&id).await.unwrap();
    assert_eq!(payload.time_label, "Starting at 10:05");
    assert_eq!(payload.meeting_link.as_deref(), Some("https://acme.zoom.us/j/42"));
    assert!(fx.monitor.lifecycle().is_showing().await);
    assert!(!fx.monitor.scheduler().is_alerted(&id).await);

    assert_eq!(fx.monitor.join().await.as_deref(), Some("https://acme.zoom.us/j/42"));
    assert!(!fx.monitor.dismiss().await);

    assert!(matches!(
        fx.monitor.manual_preview(&EventId::from("missing")).await,
        Err(HyperalertError::UnknownEvent(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn run_loop_polls_on_cadence_and_on_refresh() {
    let fx = fixture();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let monitor = fx.monitor.clone();
    let running = tokio::spawn(async move {
        monitor
            .run_until(async {
                stop_rx.await.ok();
            })
            .await;
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fx.monitor.snapshot().tick_count, 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(fx.monitor.snapshot().tick_count, 2);

    fx.monitor.refresh_now();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(fx.monitor.snapshot().tick_count, 3);

    stop_tx.send(()).unwrap();
    running.await.unwrap();
    assert_eq!(fx.source.fetch_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn alert_auto_dismisses_and_id_is_evicted_later() {
    let fx = fixture();
    fx.source.add_event(meeting("standup", 45, None));
    let mut alerts = fx.monitor.subscribe_alert_events();

    fx.monitor.tick(TickSource::Timer).await;
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!fx.monitor.lifecycle().is_showing().await);
    assert!(fx.monitor.scheduler().is_alerted(&EventId::from("standup")).await);

    tokio::time::sleep(Duration::from_secs(270)).await;
    assert!(!fx.monitor.scheduler().is_alerted(&EventId::from("standup")).await);

    let mut seen = Vec::new();
    while let Ok(event) = alerts.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.first(), Some(AlertEvent::Shown(p)) if p.title == "standup"));
    assert_eq!(
        seen.last(),
        Some(&AlertEvent::Hidden {
            reason: HideReason::AutoDismissed
        })
    );
}
