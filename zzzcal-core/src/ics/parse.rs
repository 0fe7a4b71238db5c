//! ICS reading using the icalendar crate's parser.
//!
//! Used to look at a previously written calendar (change summaries, the
//! `show` command) and to check that generated output reads back intact.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    CalendarDateTime, DatePerhapsTime,
    parser::{Component, read_calendar, unfold},
};
use tracing::debug;

use crate::error::{ZzzCalError, ZzzCalResult};
use crate::event::CalendarEvent;

/// Parse every VEVENT in `content`, in file order.
///
/// Events without a UID or DTSTART are skipped; a missing DTEND means a
/// zero-length event.
pub fn read_events(content: &str) -> ZzzCalResult<Vec<CalendarEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| ZzzCalError::Parse(e.to_string()))?;

    let events = calendar
        .components
        .iter()
        .filter(|c| c.name == "VEVENT")
        .filter_map(|vevent| {
            let event = parse_vevent(vevent);
            if event.is_none() {
                debug!("Skipping VEVENT without UID or DTSTART");
            }
            event
        })
        .collect();

    Ok(events)
}

fn parse_vevent(vevent: &Component<'_>) -> Option<CalendarEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let title = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let start = to_utc(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?)?;
    let end = match vevent.find_prop("DTEND") {
        Some(prop) => to_utc(DatePerhapsTime::try_from(prop).ok()?)?,
        None => start,
    };
    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| p.val.to_string());

    Some(CalendarEvent {
        uid,
        title,
        start,
        end,
        description,
    })
}

/// Resolve an ICS date/time to UTC. Floating times and bare dates are taken as UTC.
fn to_utc(dpt: DatePerhapsTime) -> Option<DateTime<Utc>> {
    match dpt {
        DatePerhapsTime::Date(d) => d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => Some(dt),
            CalendarDateTime::Floating(naive) => Some(naive.and_utc()),
            CalendarDateTime::WithTimezone { date_time, tzid } => zoned_to_utc(date_time, &tzid),
        },
    }
}

fn zoned_to_utc(date_time: NaiveDateTime, tzid: &str) -> Option<DateTime<Utc>> {
    let tz: Tz = tzid.parse().ok()?;
    tz.from_local_datetime(&date_time)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
