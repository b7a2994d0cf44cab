//! Finds meeting-join links in free-text event fields.

use crate::calendar::Event;
use crate::config::{default_providers, ProviderConfig};
use crate::error::{HyperalertError, Result};
use regex::Regex;

/// Characters that end a URL in free text: whitespace, angle brackets, quotes.
const URL_BODY: &str = r#"[^\s<>"']*"#;

/// A meeting link together with the provider it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMatch {
    pub provider: String,
    pub url: String,
}

#[derive(Debug, Clone)]
struct Provider {
    name: String,
    domain: String,
    pattern: Regex,
}

impl Provider {
    fn compile(config: &ProviderConfig) -> Result<Self> {
        let source = match &config.pattern {
            Some(custom) => custom.clone(),
            None => format!(
                "(?i)https?://{body}{domain}{body}",
                body = URL_BODY,
                domain = regex::escape(&config.domain)
            ),
        };
        let pattern =
            Regex::new(&source).map_err(|source| HyperalertError::InvalidProviderPattern {
                provider: config.name.clone(),
                source,
            })?;
        Ok(Self {
            name: config.name.clone(),
            domain: config.domain.to_lowercase(),
            pattern,
        })
    }
}

/// Extracts join links for a fixed table of meeting providers.
///
/// Providers are tried in table order. A provider is only consulted when its
/// domain appears in the text, and the first provider whose pattern matches
/// wins.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    providers: Vec<Provider>,
}

impl LinkExtractor {
    /// Builds an extractor, failing if any custom provider pattern is invalid.
    pub fn new(providers: &[ProviderConfig]) -> Result<Self> {
        let providers = providers
            .iter()
            .map(Provider::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { providers })
    }

    /// Returns the first meeting link found in `text`, decoded.
    pub fn extract_link(&self, text: &str) -> Option<String> {
        self.extract_match(text).map(|m| m.url)
    }

    pub fn extract_match(&self, text: &str) -> Option<LinkMatch> {
        let lowered = text.to_lowercase();
        self.providers
            .iter()
            .filter(|p| lowered.contains(&p.domain))
            .find_map(|p| {
                p.pattern.find(text).map(|found| LinkMatch {
                    provider: p.name.clone(),
                    url: decode_escapes(found.as_str()),
                })
            })
    }

    /// Looks in the location first, then the notes.
    pub fn extract_event_link(&self, event: &Event) -> Option<LinkMatch> {
        [event.location.as_deref(), event.notes.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|field| self.extract_match(field))
    }

    /// True if `text` mentions any known provider domain.
    pub fn is_meeting_link(&self, text: &str) -> bool {
        self.detect_platform(text).is_some()
    }

    /// The name of the first provider whose domain appears in `text`.
    pub fn detect_platform(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.providers
            .iter()
            .find(|p| lowered.contains(&p.domain))
            .map(|p| p.name.as_str())
    }

    /// True if the event has a physical location or any extractable meeting link.
    ///
    /// A location that is itself a meeting link only counts if a link can
    /// actually be extracted from it.
    pub fn has_location_or_link(&self, event: &Event) -> bool {
        let physical = event
            .location_text()
            .is_some_and(|loc| !self.is_meeting_link(loc));
        physical || self.extract_event_link(event).is_some()
    }
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self {
            providers: default_providers()
                .iter()
                .filter_map(|p| Provider::compile(p).ok())
                .collect(),
        }
    }
}

// Calendar sources often hand back partially escaped text.
fn decode_escapes(url: &str) -> String {
    url.replace("%3D", "=")
        .replace("%26", "&")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{CalendarId, EventId};
    use chrono::Utc;

    fn event(location: Option<&str>, notes: Option<&str>) -> Event {
        let now = Utc::now();
        Event {
            id: EventId::from("e1"),
            title: "Sync".to_string(),
            start: now,
            end: now,
            is_all_day: false,
            location: location.map(str::to_string),
            notes: notes.map(str::to_string),
            calendar_id: CalendarId::from("work"),
        }
    }

    #[test]
    fn decodes_escaped_zoom_password() {
        let extractor = LinkExtractor::default();
        let link = extractor.extract_link("Join: https://foo.zoom.us/j/123?pwd=abc%3D");
        assert_eq!(link.as_deref(), Some("https://foo.zoom.us/j/123?pwd=abc="));
    }

    #[test]
    fn stops_at_angle_brackets_and_quotes() {
        let extractor = LinkExtractor::default();
        let html = r#"<a href="https://meet.google.com/abc-defg-hij">join</a>"#;
        assert_eq!(
            extractor.extract_link(html).as_deref(),
            Some("https://meet.google.com/abc-defg-hij")
        );
    }

    #[test]
    fn decodes_html_ampersands() {
        let extractor = LinkExtractor::default();
        let text = "https://teams.microsoft.com/l/meetup-join/x?context=a&amp;tenant=b%26c";
        assert_eq!(
            extractor.extract_link(text).as_deref(),
            Some("https://teams.microsoft.com/l/meetup-join/x?context=a&tenant=b&c")
        );
    }

    #[test]
    fn domain_match_is_case_insensitive() {
        let extractor = LinkExtractor::default();
        let found = extractor
            .extract_match("HTTPS://ACME.WEBEX.COM/meet/jdoe")
            .unwrap();
        assert_eq!(found.provider, "Webex");
        assert_eq!(found.url, "HTTPS://ACME.WEBEX.COM/meet/jdoe");
    }

    #[test]
    fn skips_unrelated_urls_before_the_meeting_link() {
        let extractor = LinkExtractor::default();
        let text = "Agenda https://docs.example.com/a then https://x.zoom.us/j/9";
        assert_eq!(extractor.extract_link(text).as_deref(), Some("https://x.zoom.us/j/9"));
    }

    #[test]
    fn domain_without_scheme_is_not_a_link() {
        let extractor = LinkExtractor::default();
        assert_eq!(extractor.extract_link("zoom.us/j/123"), None);
        assert_eq!(extractor.extract_link("Room 4B"), None);
    }

    #[test]
    fn location_takes_priority_over_notes() {
        let extractor = LinkExtractor::default();
        let e = event(
            Some("https://meet.google.com/aaa-bbbb-ccc"),
            Some("fallback https://x.zoom.us/j/1"),
        );
        let found = extractor.extract_event_link(&e).unwrap();
        assert_eq!(found.provider, "Google Meet");

        let e = event(Some("Room 4B"), Some("dial in https://x.zoom.us/j/1"));
        let found = extractor.extract_event_link(&e).unwrap();
        assert_eq!(found.url, "https://x.zoom.us/j/1");
    }

    #[test]
    fn physical_location_counts() {
        let extractor = LinkExtractor::default();
        assert!(extractor.has_location_or_link(&event(Some("Room 4B"), None)));
        assert!(!extractor.has_location_or_link(&event(Some("   "), None)));
        assert!(!extractor.has_location_or_link(&event(None, None)));
    }

    #[test]
    fn link_only_location_needs_an_extractable_link() {
        let extractor = LinkExtractor::default();
        assert!(!extractor.has_location_or_link(&event(Some("zoom.us/j/123"), None)));
        assert!(extractor.has_location_or_link(&event(Some("https://zoom.us/j/123"), None)));
        assert!(extractor.has_location_or_link(&event(None, Some("https://x.chime.aws/123"))));
    }

    #[test]
    fn invalid_custom_pattern_is_reported() {
        let providers = vec![ProviderConfig {
            name: "Broken".to_string(),
            domain: "broken.example".to_string(),
            pattern: Some("https://(".to_string()),
        }];
        let err = LinkExtractor::new(&providers).unwrap_err();
        assert!(matches!(err, HyperalertError::InvalidProviderPattern { ref provider, .. } if provider == "Broken"));
    }

    #[test]
    fn custom_provider_is_honoured() {
        let providers = vec![ProviderConfig::new("Jitsi", "meet.jit.si")];
        let extractor = LinkExtractor::new(&providers).unwrap();
        assert_eq!(
            extractor.extract_link("https://meet.jit.si/standup").as_deref(),
            Some("https://meet.jit.si/standup")
        );
        assert_eq!(extractor.extract_link("https://x.zoom.us/j/1"), None);
    }
}
