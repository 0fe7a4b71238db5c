//! ICS file generation.

use icalendar::parser::unfold;
use icalendar::{Calendar, Component, EventLike};

use crate::calendar::CalendarDocument;
use crate::error::{ZzzCalError, ZzzCalResult};
use crate::event::CalendarEvent;

const UTC_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const MAX_LINE_OCTETS: usize = 75;

/// Generate the .ics content for a whole calendar.
///
/// The output depends only on the document: no wall-clock timestamps are
/// embedded, so regenerating an unchanged calendar yields identical bytes.
pub fn generate_calendar(doc: &CalendarDocument) -> ZzzCalResult<String> {
    let mut cal = Calendar::new();
    cal.name(&doc.metadata().name);
    cal.timezone(doc.timezone().name());

    for event in doc.events() {
        cal.push(to_ics_event(event)?);
    }

    let cal = cal.done();
    Ok(strip_ics_bloat(&cal.to_string(), &doc.metadata().prodid))
}

fn to_ics_event(event: &CalendarEvent) -> ZzzCalResult<icalendar::Event> {
    if event.end < event.start {
        return Err(ZzzCalError::Serialization(format!(
            "event '{}' ends before it starts",
            event.uid
        )));
    }
    if event.uid.trim().is_empty() {
        return Err(ZzzCalError::Serialization(format!(
            "event '{}' has no UID",
            event.title
        )));
    }

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&event.uid);
    ics_event.summary(&clean_text(&event.title));

    // DTSTAMP is required by RFC 5545. It is pinned to the event start so the
    // file only changes when an event does.
    ics_event.add_property("DTSTAMP", event.start.format(UTC_FORMAT).to_string());
    ics_event.add_property("DTSTART", event.start.format(UTC_FORMAT).to_string());
    ics_event.add_property("DTEND", event.end.format(UTC_FORMAT).to_string());

    if let Some(ref desc) = event.description {
        ics_event.description(&clean_text(desc));
    }

    Ok(ics_event.done())
}

/// Bare carriage returns would corrupt the CRLF framing; turn them into newlines,
/// which the writer escapes as `\n`.
fn clean_text(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ours
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Re-fold every content line to at most 75 octets
fn strip_ics_bloat(ics: &str, prodid: &str) -> String {
    let unfolded = unfold(ics);
    let mut result = String::with_capacity(unfolded.len() + unfolded.len() / 24);

    for line in unfolded.lines() {
        if line.starts_with("PRODID:") {
            fold_line(&format!("PRODID:{}", escape_text(prodid)), &mut result);
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        fold_line(line, &mut result);
    }

    result
}

/// Append `line` with CRLF, folded so no physical line exceeds 75 octets
/// (continuation lines count their leading space). Never splits a UTF-8
/// sequence.
fn fold_line(line: &str, out: &mut String) {
    let mut rest = line;
    let mut limit = MAX_LINE_OCTETS;

    while rest.len() > limit {
        let mut cut = limit;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n ");
        rest = &rest[cut..];
        limit = MAX_LINE_OCTETS - 1;
    }

    out.push_str(rest);
    out.push_str("\r\n");
}

/// RFC 5545 TEXT escaping, for values written outside the icalendar crate.
fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalendarMetadata;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;

    fn make_event(title: &str) -> CalendarEvent {
        CalendarEvent::new(
            title,
            Utc.with_ymd_and_hms(2024, 7, 4, 2, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 7, 4, 3, 0, 0).unwrap(),
            None,
        )
        .unwrap()
    }

    fn make_doc(events: Vec<CalendarEvent>) -> CalendarDocument {
        CalendarDocument::new(CalendarMetadata::default(), Tz::Asia__Shanghai, events)
    }

    #[test]
    fn test_generate_has_metadata_and_crlf() {
        let ics = generate_calendar(&make_doc(vec![make_event("Banner")])).unwrap();

        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"), "ICS:\n{ics}");
        assert!(ics.ends_with("END:VCALENDAR\r\n"), "ICS:\n{ics}");
        assert!(ics.contains("VERSION:2.0\r\n"));
        assert!(ics.contains("PRODID:-//zzzcal//Zenless Zone Zero Signal Search//CN\r\n"));
        assert!(ics.contains("X-WR-CALNAME:绝区零调频活动\r\n"));
        assert!(ics.contains("X-WR-TIMEZONE:Asia/Shanghai\r\n"));
        assert!(!ics.contains("CALSCALE"));
        assert!(!ics.replace("\r\n", "").contains('\n'), "bare LF in output");
    }

    #[test]
    fn test_generate_event_properties_in_utc() {
        let event = make_event("Banner");
        let ics = generate_calendar(&make_doc(vec![event.clone()])).unwrap();

        assert!(ics.contains("BEGIN:VEVENT\r\n"));
        assert!(ics.contains(&format!("UID:{}\r\n", event.uid)));
        assert!(ics.contains("DTSTART:20240704T020000Z\r\n"), "ICS:\n{ics}");
        assert!(ics.contains("DTEND:20240704T030000Z\r\n"));
        assert!(ics.contains("DTSTAMP:20240704T020000Z\r\n"));
        assert!(ics.contains("SUMMARY:Banner\r\n"));
        assert!(!ics.contains("DESCRIPTION"));
    }

    #[test]
    fn test_generate_is_byte_stable() {
        let doc = make_doc(vec![make_event("A"), make_event("B")]);
        assert_eq!(generate_calendar(&doc).unwrap(), generate_calendar(&doc).unwrap());
    }

    #[test]
    fn test_generate_escapes_text() {
        let mut event = make_event("Exchange,Event;Test");
        event.description = Some("line one\r\nline two".into());
        let ics = generate_calendar(&make_doc(vec![event])).unwrap();

        assert!(ics.contains("SUMMARY:Exchange\\,Event\\;Test\r\n"), "ICS:\n{ics}");
        assert!(ics.contains("DESCRIPTION:line one\\nline two\r\n"), "ICS:\n{ics}");
    }

    #[test]
    fn test_generate_folds_long_lines() {
        let mut event = make_event("Banner");
        event.description = Some("代理人".repeat(40));
        let ics = generate_calendar(&make_doc(vec![event])).unwrap();

        for line in ics.split("\r\n") {
            assert!(line.len() <= 75, "line exceeds 75 octets: {line:?}");
        }
        assert!(ics.contains("\r\n "), "expected a folded continuation line");
    }

    #[test]
    fn test_fold_line_respects_char_boundaries() {
        let mut out = String::new();
        let line = format!("SUMMARY:{}", "艾".repeat(30));
        fold_line(&line, &mut out);

        let physical: Vec<&str> = out.trim_end_matches("\r\n").split("\r\n").collect();
        assert_eq!(physical.len(), 2);
        assert!(physical.iter().all(|l| l.len() <= 75));
        assert!(physical[1].starts_with(' '));
        assert_eq!(format!("{}{}", physical[0], &physical[1][1..]), line);
    }

    #[test]
    fn test_generate_empty_calendar() {
        let ics = generate_calendar(&make_doc(vec![])).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
        assert!(!ics.contains("VEVENT"));
    }

    #[test]
    fn test_generate_rejects_backwards_event() {
        let mut event = make_event("Broken");
        std::mem::swap(&mut event.start, &mut event.end);
        let err = generate_calendar(&make_doc(vec![event])).unwrap_err();
        assert!(matches!(err, ZzzCalError::Serialization(_)));
    }

    #[test]
    fn test_prodid_override_is_escaped() {
        let metadata = CalendarMetadata {
            prodid: "-//Acme, Inc//Cal//EN".into(),
            name: "Test".into(),
        };
        let doc = CalendarDocument::new(metadata, Tz::UTC, vec![]);
        let ics = generate_calendar(&doc).unwrap();
        assert!(ics.contains("PRODID:-//Acme\\, Inc//Cal//EN\r\n"), "ICS:\n{ics}");
    }
}
