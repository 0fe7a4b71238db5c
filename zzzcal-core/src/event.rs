//! Event types flowing through the pipeline.
//!
//! `EventRecord` is what the extractor reads off a page, unvalidated.
//! `CalendarEvent` is the normalized form that gets serialized.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Suffix appended to every generated UID.
const UID_DOMAIN: &str = "zzzcal";

/// A post found on the search results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLink {
    pub title: String,
    pub url: String,
}

/// An event as extracted from a page. Times are still raw strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub title: String,
    pub raw_start: String,
    pub raw_end: String,
    pub raw_description: Option<String>,
    /// Page the record was read from (for log messages)
    pub source_url: Option<String>,
}

impl EventRecord {
    pub fn new(title: impl Into<String>, raw_start: impl Into<String>, raw_end: impl Into<String>) -> Self {
        EventRecord {
            title: title.into(),
            raw_start: raw_start.into(),
            raw_end: raw_end.into(),
            raw_description: None,
            source_url: None,
        }
    }

    /// Short label identifying the record in logs.
    pub fn label(&self) -> &str {
        self.source_url.as_deref().unwrap_or(&self.title)
    }
}

/// A validated calendar event. Invariant: `start <= end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEvent {
    pub uid: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
}

impl CalendarEvent {
    /// Build an event with a UID derived from its title and start.
    ///
    /// Returns `None` when `end` precedes `start`.
    pub fn new(
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: Option<String>,
    ) -> Option<Self> {
        if end < start {
            return None;
        }
        let title = title.into();
        Some(CalendarEvent {
            uid: event_uid(&title, start),
            title,
            start,
            end,
            description,
        })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

impl std::fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} → {}  {}",
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M"),
            self.title
        )
    }
}

/// Deterministic UID for an event: a name-based (v5) UUID over title and start.
///
/// The same logical event always gets the same UID, so re-running the
/// scraper does not churn the published calendar.
pub fn event_uid(title: &str, start: DateTime<Utc>) -> String {
    let name = format!(
        "{}|{}",
        title,
        start.to_rfc3339_opts(SecondsFormat::Secs, true)
    );
    let id = Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes());
    format!("{id}@{UID_DOMAIN}")
}
