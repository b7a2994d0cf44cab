//! Error types for the Hyperalert engine.
//!
//! None of these are fatal to a running monitor. The polling loop turns every
//! one of them into a log line or an access status, and the worst outcome is
//! that no alert fires on that tick.

use crate::common::EventId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HyperalertError {
    /// The event source has not been granted access to the user's calendars.
    #[error("calendar access has not been granted")]
    AccessDenied,

    /// A transient failure reported by the event source.
    #[error("event source error: {0}")]
    Source(String),

    /// An event record that cannot be turned into an `Event`.
    #[error("malformed event {id}: {reason}")]
    MalformedEvent { id: EventId, reason: &'static str },

    #[error("invalid link pattern for provider '{provider}': {source}")]
    InvalidProviderPattern {
        provider: String,
        #[source]
        source: regex::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Registering or unregistering the login item failed.
    #[error("login item update failed: {0}")]
    LoginItem(String),

    #[error("no upcoming event with id {0}")]
    UnknownEvent(EventId),
}

pub type Result<T> = std::result::Result<T, HyperalertError>;
