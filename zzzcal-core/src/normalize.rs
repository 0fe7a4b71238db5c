//! Record validation and time normalization.
//!
//! Raw time strings are read as wall-clock time in the publisher's zone and
//! converted to UTC. Records that cannot be normalized are dropped with a
//! logged reason; they never fail the run.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::constants::TITLE_SEPARATOR;
use crate::error::{ZzzCalError, ZzzCalResult};
use crate::event::{CalendarEvent, EventRecord};
use crate::extract::parse_version_marker;
use crate::versions::VersionTable;

/// Wall-clock formats seen in announcements, tried in order.
const LOCAL_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Normalized events plus the number of records that were dropped.
#[derive(Debug, Default)]
pub struct Normalized {
    pub events: Vec<CalendarEvent>,
    pub skipped: usize,
}

pub struct Normalizer {
    tz: Tz,
    versions: VersionTable,
}

impl Normalizer {
    pub fn new(tz: Tz, versions: VersionTable) -> Self {
        Normalizer { tz, versions }
    }

    /// Normalize a single record.
    ///
    /// An empty end means a zero-length event at the start time.
    pub fn normalize(&self, record: &EventRecord) -> ZzzCalResult<CalendarEvent> {
        let title = record.title.trim();
        if title.is_empty() {
            return Err(ZzzCalError::Parse("empty title".into()));
        }

        let start = self.parse_start(&record.raw_start)?;
        let end = if record.raw_end.trim().is_empty() {
            start
        } else {
            self.parse_local(&record.raw_end)?
        };

        let description = record
            .raw_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(String::from);

        CalendarEvent::new(title, start, end, description).ok_or_else(|| {
            ZzzCalError::Parse(format!(
                "end '{}' is before start '{}'",
                record.raw_end, record.raw_start
            ))
        })
    }

    /// Normalize, merge and deduplicate a batch of records, preserving order.
    pub fn normalize_all(&self, records: &[EventRecord]) -> Normalized {
        let mut normalized = Normalized::default();

        for record in records {
            match self.normalize(record) {
                Ok(event) => normalized.events.push(event),
                Err(e) => {
                    warn!(record = record.label(), "Skipping record: {e}");
                    normalized.skipped += 1;
                }
            }
        }

        normalized.events = dedupe_by_uid(merge_same_window(normalized.events));
        normalized
    }

    fn parse_start(&self, raw: &str) -> ZzzCalResult<DateTime<Utc>> {
        match parse_version_marker(raw) {
            Some(version) => self.versions.get(version).copied().ok_or_else(|| {
                ZzzCalError::Parse(format!("start time of version {version} is unknown"))
            }),
            None => self.parse_local(raw),
        }
    }

    fn parse_local(&self, raw: &str) -> ZzzCalResult<DateTime<Utc>> {
        let raw = raw.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(dt.with_timezone(&Utc));
        }

        let naive = LOCAL_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .ok_or_else(|| ZzzCalError::Parse(format!("unrecognized time '{raw}'")))?;

        self.tz
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| ZzzCalError::Parse(format!("'{raw}' does not exist in {}", self.tz)))
    }
}

/// Merge events sharing the exact same time window into one, joining their
/// titles (first-seen order, no repeats). The merged event takes the
/// position and description of the first one.
pub fn merge_same_window(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut merged: Vec<CalendarEvent> = Vec::with_capacity(events.len());
    let mut by_window: HashMap<(DateTime<Utc>, DateTime<Utc>), usize> = HashMap::new();

    for event in events {
        let key = (event.start, event.end);
        let Some(&index) = by_window.get(&key) else {
            by_window.insert(key, merged.len());
            merged.push(event);
            continue;
        };

        let existing = &merged[index];
        let mut titles: Vec<&str> = existing.title.split(TITLE_SEPARATOR).collect();
        for title in event.title.split(TITLE_SEPARATOR) {
            if !titles.contains(&title) {
                titles.push(title);
            }
        }
        let title = titles.join(TITLE_SEPARATOR);

        if title != existing.title {
            let replacement = CalendarEvent::new(
                title,
                existing.start,
                existing.end,
                existing.description.clone(),
            );
            if let Some(replacement) = replacement {
                merged[index] = replacement;
            }
        }
    }

    merged
}

/// Collapse events with the same UID. The last one seen wins, kept at the
/// position where the UID first appeared.
pub fn dedupe_by_uid(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut unique: Vec<CalendarEvent> = Vec::with_capacity(events.len());
    let mut by_uid: HashMap<String, usize> = HashMap::new();

    for event in events {
        match by_uid.get(&event.uid) {
            Some(&index) => unique[index] = event,
            None => {
                by_uid.insert(event.uid.clone(), unique.len());
                unique.push(event);
            }
        }
    }

    unique
}
