use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use colored::Colorize;
use hyperalert::prelude::*;
use hyperalert::time::start_time_label;
use hyperalert::{ENGINE_NAME, VERSION as LIB_VERSION};
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct MyHighlighter;

impl Highlighter for MyHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    const LOGO_TEXT: &str = include_str!("../logo.log");
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );

    println!("{}", "-----------------------------------------------------------------------".dimmed());
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";
    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());
    println!("{}", "-----------------------------------------------------------------------".dimmed());
}

/// Spawns tasks that render alert transitions and access changes.
fn spawn_event_listeners(monitor: &EventMonitor) {
    let mut alert_rx = monitor.subscribe_alert_events();
    tokio::spawn(async move {
        loop {
            match alert_rx.recv().await {
                Ok(AlertEvent::Shown(payload)) => render_alert(&payload),
                Ok(AlertEvent::Hidden { reason }) => {
                    println!("\n<-- [ALERT HIDDEN] {:?}\n>> ", reason);
                }
                Err(RecvError::Lagged(missed)) => warn!("Alert listener lagged, missed {} events.", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut system_rx = monitor.subscribe_system_events();
    tokio::spawn(async move {
        loop {
            match system_rx.recv().await {
                Ok(SystemEvent::AccessChanged { status }) => {
                    println!("\n<-- [ACCESS] {}\n>> ", status.message());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("System listener lagged, missed {} events.", missed),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

fn render_alert(payload: &AlertPayload) {
    let rule = "=".repeat(60);
    println!("\n{}", rule.red().bold());
    println!("  {}", payload.title.as_str().bold());
    println!("  {}", payload.time_label.as_str().red().bold());
    match (&payload.platform, payload.location.is_empty()) {
        (Some(platform), _) => println!("  {}", platform.as_str().blue()),
        (None, false) => println!("  @ {}", payload.location.as_str().dimmed()),
        (None, true) => {}
    }
    if payload.meeting_link.is_some() {
        println!("  Type 'join' to open the meeting, or 'dismiss'.");
    }
    println!("{}\n>> ", rule.red().bold());
}

fn print_upcoming(monitor: &EventMonitor) {
    let snapshot = monitor.snapshot();
    if !snapshot.access.is_granted() {
        println!("{}", snapshot.access.message().yellow());
        return;
    }
    if snapshot.upcoming.is_empty() {
        println!("No upcoming meetings today");
        return;
    }
    let now = monitor.now();
    let tz = monitor.config().timezone;
    for (index, event) in snapshot.upcoming.iter().enumerate() {
        println!(
            "  #{:<3} {}  {:<28} {:>20}  {}",
            index,
            start_time_label(event.start, tz),
            event.title,
            time_until_label(event.start, now).dimmed(),
            event.location_text().unwrap_or_default().dimmed()
        );
    }
}

async fn print_calendars(monitor: &EventMonitor) {
    match monitor.list_calendars().await {
        Ok(calendars) => {
            let settings = monitor.settings().settings();
            for calendar in calendars {
                let mark = if settings.is_calendar_selected(&calendar.id) {
                    "[x]"
                } else {
                    "[ ]"
                };
                println!(
                    "  {} {:<12} {} {}",
                    mark,
                    calendar.id,
                    calendar.title,
                    calendar.color_hint.unwrap_or_default().dimmed()
                );
            }
        }
        Err(e) => println!("Error: {}", e),
    }
}

fn seed_calendars(source: &MemoryEventSource) {
    for (id, title, color) in [("work", "Work", "#3478F6"), ("personal", "Personal", "#34C759")] {
        source.add_calendar(Calendar {
            id: CalendarId::from(id),
            title: title.to_string(),
            color_hint: Some(color.to_string()),
        });
    }
}

/// Parses `add <MINUTES> <TITLE...> [@ <LOCATION...>]`.
///
/// `MINUTES` must fall within the monitor's lookahead.
fn parse_add(args: &[&str], next_id: usize, lookahead: ChronoDuration) -> Option<RawEvent> {
    let minutes = args.get(1)?.parse::<f64>().ok()?;
    let max_minutes = lookahead.num_minutes() as f64;
    if !minutes.is_finite() || !(0.0..=max_minutes).contains(&minutes) {
        return None;
    }
    let rest = args.get(2..)?.join(" ");
    let (title, location) = match rest.split_once(" @ ") {
        Some((title, location)) => (title.to_string(), Some(location.to_string())),
        None => (rest, None),
    };
    if title.is_empty() {
        return None;
    }
    let offset = ChronoDuration::try_milliseconds((minutes * 60_000.0) as i64)?;
    let start = Utc::now().checked_add_signed(offset)?;
    let end = start.checked_add_signed(ChronoDuration::minutes(30))?;
    Some(RawEvent {
        id: EventId::new(format!("shell-{}", next_id)),
        title: Some(title),
        start: Some(start),
        end: Some(end),
        location,
        calendar_id: CalendarId::from("work"),
        ..Default::default()
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let source = Arc::new(MemoryEventSource::new());
    seed_calendars(&source);
    let settings = Arc::new(MemorySettingsStore::default());
    let config = HyperalertConfig::load(env::var("HYPERALERT_CONFIG").ok().as_deref().map(std::path::Path::new))?;
    let monitor = EventMonitor::builder(config, source.clone(), settings.clone())
        .cue(Arc::new(TerminalBell))
        .build()?;

    spawn_event_listeners(&monitor);

    info!("Spawning {} in the background...", ENGINE_NAME);
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let engine = monitor.clone();
    let engine_task = tokio::spawn(async move {
        engine
            .run_until(async {
                stop_rx.await.ok();
            })
            .await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut next_id: usize = 0;
    let mut rl = Editor::new()?;
    let helper = MyHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "add" => match parse_add(&args, next_id, monitor.config().lookahead()) {
                            Some(event) => {
                                println!("--> Added '{}' as {}.", event.title.as_deref().unwrap_or_default(), event.id);
                                source.add_event(event);
                                next_id += 1;
                                monitor.refresh_now();
                            }
                            None => println!(
                                "Usage: add <MINUTES> <TITLE> [@ <LOCATION>] (0 to {} minutes)",
                                monitor.config().lookahead().num_minutes()
                            ),
                        },
                        "remove" => {
                            if let Some(id) = args.get(1) {
                                if source.remove_event(id) {
                                    println!("--> Removed {}.", id);
                                    monitor.refresh_now();
                                } else {
                                    println!("Error: no event with id '{}'.", id);
                                }
                            } else {
                                println!("Usage: remove <EVENT_ID>");
                            }
                        }
                        "list" => print_upcoming(&monitor),
                        "preview" => {
                            let snapshot = monitor.snapshot();
                            let picked = args
                                .get(1)
                                .and_then(|s| s.parse::<usize>().ok())
                                .unwrap_or(0);
                            match snapshot.upcoming.get(picked) {
                                Some(event) => {
                                    if let Err(e) = monitor.manual_preview(&event.id).await {
                                        println!("Error: {}", e);
                                    }
                                }
                                None => println!("Error: no upcoming meeting #{}. Use 'list'.", picked),
                            }
                        }
                        "dismiss" => {
                            if !monitor.dismiss().await {
                                println!("--> No alert is showing.");
                            }
                        }
                        "join" => match monitor.join().await {
                            Some(link) => println!("--> Opening {}", link.as_str().blue().underline()),
                            None => println!("--> Nothing to join."),
                        },
                        "calendars" => print_calendars(&monitor).await,
                        "toggle" => {
                            if let Some(id) = args.get(1) {
                                let selected = monitor.toggle_calendar(&CalendarId::from(*id));
                                println!("--> Calendar '{}' {}.", id, if selected { "selected" } else { "deselected" });
                            } else {
                                println!("Usage: toggle <CALENDAR_ID>");
                            }
                        }
                        "skip" => match args.get(1) {
                            Some(&"on") | Some(&"off") => {
                                let skip = args.get(1) == Some(&"on");
                                settings.set_skip_without_location(skip);
                                monitor.refresh_now();
                                println!("--> Skipping meetings without location or link: {}.", skip);
                            }
                            _ => println!("Usage: skip <on|off>"),
                        },
                        "login" => match args.get(1) {
                            Some(&"on") | Some(&"off") => {
                                settings.set_open_at_login(args.get(1) == Some(&"on"));
                            }
                            _ => println!("Usage: login <on|off>"),
                        },
                        "grant" | "deny" => {
                            source.set_access(*command == "grant");
                            monitor.refresh_now();
                        }
                        "refresh" => monitor.refresh_now(),
                        "status" => {
                            let snapshot = monitor.snapshot();
                            println!("Access:          {}", snapshot.access.message());
                            println!("Ticks:           {}", snapshot.tick_count);
                            println!("Upcoming:        {}", snapshot.upcoming.len());
                            println!("Alerted (5 min): {}", monitor.scheduler().alerted_count().await);
                            match monitor.lifecycle().current().await {
                                Some(payload) => println!("Showing:         {}", payload.title),
                                None => println!("Showing:         nothing"),
                            }
                        }
                        "help" => {
                            println!("Available commands:");
                            println!("  add <M> <TITLE> [@ <LOC>] - Adds a meeting starting in M minutes.");
                            println!("  remove <ID>               - Removes a meeting.");
                            println!("  list                      - Shows upcoming meetings.");
                            println!("  preview [#]               - Previews the alert for meeting # (default 0).");
                            println!("  dismiss | join            - Dismisses or joins the active alert.");
                            println!("  calendars | toggle <ID>   - Lists calendars or toggles one.");
                            println!("  skip <on|off>             - Skips meetings without location or link.");
                            println!("  login <on|off>            - Opens at login.");
                            println!("  grant | deny              - Simulates calendar access changes.");
                            println!("  refresh | status          - Polls now, or prints monitor state.");
                            println!("  exit                      - Quits the shell.");
                        }
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line),
                    }
                }
            }
            Err(_) => {
                println!("Exiting alertshell...");
                break;
            }
        }
    }

    stop_tx.send(()).ok();
    engine_task.await?;
    Ok(())
}
