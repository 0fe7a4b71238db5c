//! The calendar as a whole: ordered events plus fixed metadata.

use chrono::Duration;
use chrono_tz::Tz;

use crate::config::{CalendarMetadata, Config};
use crate::constants::{LONG_EVENT_HOURS, MARKER_EVENT_HOURS};
use crate::error::ZzzCalResult;
use crate::event::CalendarEvent;
use crate::ics;

/// An immutable, ready-to-serialize calendar.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDocument {
    metadata: CalendarMetadata,
    timezone: Tz,
    events: Vec<CalendarEvent>,
}

impl CalendarDocument {
    pub fn new(metadata: CalendarMetadata, timezone: Tz, events: Vec<CalendarEvent>) -> Self {
        CalendarDocument {
            metadata,
            timezone,
            events,
        }
    }

    /// Build the document for a run, splitting long events when configured.
    pub fn from_config(config: &Config, events: Vec<CalendarEvent>) -> Self {
        let events = if config.split_long_events {
            events.into_iter().flat_map(split_long_event).collect()
        } else {
            events
        };
        CalendarDocument::new(config.calendar.clone(), config.timezone, events)
    }

    pub fn metadata(&self) -> &CalendarMetadata {
        &self.metadata
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn events(&self) -> &[CalendarEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn to_ics(&self) -> ZzzCalResult<String> {
        ics::generate_calendar(self)
    }
}

/// Banners run for weeks; as a single block they would cover the whole
/// calendar view. Events longer than a day become two short markers, one
/// when the banner opens ("开始") and one when it closes ("结束").
pub fn split_long_event(event: CalendarEvent) -> Vec<CalendarEvent> {
    if event.duration() <= Duration::hours(LONG_EVENT_HOURS) {
        return vec![event];
    }

    let marker = Duration::hours(MARKER_EVENT_HOURS);
    let opening = CalendarEvent {
        uid: suffixed_uid(&event.uid, "start"),
        title: format!("{} 开始", event.title),
        start: event.start,
        end: event.start + marker,
        description: event.description.clone(),
    };
    let closing = CalendarEvent {
        uid: suffixed_uid(&event.uid, "end"),
        title: format!("{} 结束", event.title),
        start: event.end - marker,
        end: event.end,
        description: event.description,
    };

    vec![opening, closing]
}

/// `id@domain` → `id-suffix@domain`
fn suffixed_uid(uid: &str, suffix: &str) -> String {
    match uid.split_once('@') {
        Some((id, domain)) => format!("{id}-{suffix}@{domain}"),
        None => format!("{uid}-{suffix}"),
    }
}
