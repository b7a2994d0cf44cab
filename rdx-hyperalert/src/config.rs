//! Defines all configuration structures for the Hyperalert engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, with `HYPERALERT_*` environment variables
//! layered on top. Every field has a default, so an empty or missing file
//! yields the canonical timings: poll every minute, look one day ahead, fire
//! within the last minute before start, forget an alert after five minutes and
//! auto-dismiss after thirty seconds.

use crate::error::{HyperalertError, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// The top-level configuration for the `EventMonitor`.
#[derive(Debug, Clone, Deserialize)]
pub struct HyperalertConfig {
    /// Seconds between two polls of the event source.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How far ahead of "now" each poll looks, in hours.
    #[serde(default = "default_lookahead_hours")]
    pub lookahead_hours: u64,

    /// An event fires when it starts within this many seconds (exclusive of zero).
    #[serde(default = "default_trigger_window_secs")]
    pub trigger_window_secs: u64,

    /// How long an alerted event id is remembered before it may fire again.
    #[serde(default = "default_eviction_delay_secs")]
    pub eviction_delay_secs: u64,

    /// How long an alert stays up before it dismisses itself.
    #[serde(default = "default_auto_dismiss_secs")]
    pub auto_dismiss_secs: u64,

    /// The timezone used for "Starting at HH:MM" labels.
    /// Uses the string names from the IANA Time Zone Database
    /// (e.g., "America/New_York").
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Known meeting providers, checked in order.
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

/// One meeting provider known to the link extractor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderConfig {
    /// Display name, e.g. "Zoom".
    pub name: String,
    /// Substring that identifies the provider in free text, matched case-insensitively.
    pub domain: String,
    /// Custom URL regex. When absent, a pattern is derived from `domain`.
    #[serde(default)]
    pub pattern: Option<String>,
}

impl ProviderConfig {
    pub fn new(name: &str, domain: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            pattern: None,
        }
    }
}

impl HyperalertConfig {
    /// Loads the configuration from an optional TOML file and the environment.
    ///
    /// A missing file is not an error; environment variables such as
    /// `HYPERALERT_POLL_INTERVAL_SECS=30` override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("HYPERALERT").try_parsing(true))
            .build()?;
        let loaded: Self = settings.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Rejects zero timings and timings above the `MAX_*` bounds.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("poll_interval_secs", self.poll_interval_secs, MAX_POLL_INTERVAL_SECS),
            ("lookahead_hours", self.lookahead_hours, MAX_LOOKAHEAD_HOURS),
            ("trigger_window_secs", self.trigger_window_secs, MAX_TRIGGER_WINDOW_SECS),
            ("eviction_delay_secs", self.eviction_delay_secs, MAX_EVICTION_DELAY_SECS),
            ("auto_dismiss_secs", self.auto_dismiss_secs, MAX_AUTO_DISMISS_SECS),
        ];
        for (name, value, max) in checks {
            if value == 0 {
                return Err(HyperalertError::InvalidConfig(format!(
                    "{name} must be greater than zero"
                )));
            }
            if value > max {
                return Err(HyperalertError::InvalidConfig(format!(
                    "{name} must be at most {max} (got {value})"
                )));
            }
        }
        // An id evicted while its event is still inside the window fires again.
        if self.eviction_delay_secs < self.trigger_window_secs {
            return Err(HyperalertError::InvalidConfig(format!(
                "eviction_delay_secs ({}) must not be shorter than trigger_window_secs ({})",
                self.eviction_delay_secs, self.trigger_window_secs
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.min(MAX_POLL_INTERVAL_SECS))
    }

    /// Clamped to `MAX_LOOKAHEAD_HOURS`, so it is safe even on an unvalidated config.
    pub fn lookahead(&self) -> chrono::Duration {
        bounded_delta(self.lookahead_hours.min(MAX_LOOKAHEAD_HOURS), chrono::Duration::try_hours)
    }

    /// Clamped to `MAX_TRIGGER_WINDOW_SECS`.
    pub fn trigger_window(&self) -> chrono::Duration {
        bounded_delta(
            self.trigger_window_secs.min(MAX_TRIGGER_WINDOW_SECS),
            chrono::Duration::try_seconds,
        )
    }

    pub fn eviction_delay(&self) -> Duration {
        Duration::from_secs(self.eviction_delay_secs.min(MAX_EVICTION_DELAY_SECS))
    }

    pub fn auto_dismiss(&self) -> Duration {
        Duration::from_secs(self.auto_dismiss_secs.min(MAX_AUTO_DISMISS_SECS))
    }
}

pub const MAX_POLL_INTERVAL_SECS: u64 = 60 * 60;
pub const MAX_LOOKAHEAD_HOURS: u64 = 7 * 24;
pub const MAX_TRIGGER_WINDOW_SECS: u64 = 60 * 60;
pub const MAX_EVICTION_DELAY_SECS: u64 = 24 * 60 * 60;
pub const MAX_AUTO_DISMISS_SECS: u64 = 60 * 60;

fn bounded_delta(value: u64, unit: fn(i64) -> Option<chrono::Duration>) -> chrono::Duration {
    i64::try_from(value)
        .ok()
        .and_then(unit)
        .unwrap_or(chrono::Duration::zero())
}

// --- Default value functions for serde ---

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_lookahead_hours() -> u64 {
    24
}

fn default_trigger_window_secs() -> u64 {
    60
}

fn default_eviction_delay_secs() -> u64 {
    300
}

fn default_auto_dismiss_secs() -> u64 {
    30
}

fn default_timezone() -> Tz {
    Tz::UTC
}

pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new("Zoom", "zoom.us"),
        ProviderConfig::new("Google Meet", "meet.google.com"),
        ProviderConfig::new("Teams", "teams.microsoft.com"),
        ProviderConfig::new("Webex", "webex.com"),
        ProviderConfig::new("Chime", "chime.aws"),
    ]
}

impl Default for HyperalertConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            lookahead_hours: default_lookahead_hours(),
            trigger_window_secs: default_trigger_window_secs(),
            eviction_delay_secs: default_eviction_delay_secs(),
            auto_dismiss_secs: default_auto_dismiss_secs(),
            timezone: default_timezone(),
            providers: default_providers(),
        }
    }
}
