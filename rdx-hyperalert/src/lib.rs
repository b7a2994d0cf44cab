//! # Hyperalert
//!
//! A calendar monitor that raises one prominent alert right before each
//! meeting starts.
//!
//! Hyperalert provides the decision engine only. It polls an `EventSource`,
//! decides exactly once per event when to alert, and tells whoever is
//! presenting it what to show. Windows, tray icons and the calendar backend
//! itself live outside this crate, behind small traits.
//!
//! ## Core Concepts
//!
//! - **EventMonitor**: Polls the source every minute (and on demand), filters
//!   and sorts what it finds, and publishes a `MonitorSnapshot`.
//! - **Trigger window**: An event fires when it starts within the next sixty
//!   seconds. Its id is then remembered for five minutes so it cannot fire
//!   twice.
//! - **One alert at a time**: A new alert replaces the one on screen. Every
//!   alert dismisses itself after thirty seconds unless the user gets there
//!   first.
//! - **Event-Driven**: Consumers subscribe to snapshots, `SystemEvent`s and
//!   `AlertEvent`s instead of reading shared state.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use hyperalert::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Pick an event source and a settings store.
//!     let source = Arc::new(MemoryEventSource::new());
//!     let settings = Arc::new(MemorySettingsStore::default());
//!
//!     // 2. Create the monitor.
//!     let monitor = EventMonitor::new(HyperalertConfig::default(), source, settings)?;
//!
//!     // 3. Subscribe to alerts before starting the monitor.
//!     let mut alerts = monitor.subscribe_alert_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = alerts.recv().await {
//!             println!("Alert: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Run the monitor. It will shut down on Ctrl+C.
//!     monitor.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Hyperalert";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


// Declare all the modules in the crate.
pub mod calendar;
pub mod common;
pub mod components;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod settings;
pub mod source;
pub mod time;

/// A prelude module for easy importing of the most common Hyperalert types.
pub mod prelude {
    pub use crate::calendar::{Calendar, Event, RawEvent, Settings};
    pub use crate::common::{CalendarId, EventId};
    pub use crate::components::lifecycle::{AlertLifecycle, AlertSink, AudibleCue, TerminalBell};
    pub use crate::components::link::LinkExtractor;
    pub use crate::config::HyperalertConfig;
    pub use crate::error::{HyperalertError, Result};
    pub use crate::events::{
        AccessStatus, AlertEvent, AlertPayload, HideReason, MonitorSnapshot, SystemEvent,
    };
    pub use crate::monitor::{EventMonitor, TickOutcome};
    pub use crate::settings::{MemorySettingsStore, SettingsStore};
    pub use crate::source::{EventSource, MemoryEventSource};
    pub use crate::time::{time_until_label, TickSource};
}
