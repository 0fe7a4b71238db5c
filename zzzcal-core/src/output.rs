//! Writing the calendar file.
//!
//! Writes go to a temporary file next to the target and are renamed into
//! place, so readers (and the automation that commits the file) only ever
//! see a complete calendar.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use tracing::{info, warn};

use crate::calendar::CalendarDocument;
use crate::error::{ZzzCalError, ZzzCalResult};
use crate::event::CalendarEvent;
use crate::ics;

/// Replace `path` with `content` atomically.
pub fn write_atomic(path: &Path, content: &str) -> ZzzCalResult<()> {
    let file_name = path.file_name().ok_or_else(|| {
        ZzzCalError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' is not a file path", path.display()),
        ))
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let temp = path.with_file_name(format!(".{}.tmp", file_name.to_string_lossy()));
    if let Err(e) = std::fs::write(&temp, content) {
        let _ = std::fs::remove_file(&temp);
        return Err(e.into());
    }
    std::fs::rename(&temp, path)?;
    Ok(())
}

/// How the new calendar differs from the one it replaces, by UID.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub unchanged: usize,
}

impl ChangeSummary {
    pub fn compare(previous: &[CalendarEvent], current: &[CalendarEvent]) -> Self {
        let before: HashMap<&str, &CalendarEvent> =
            previous.iter().map(|e| (e.uid.as_str(), e)).collect();
        let mut summary = ChangeSummary::default();

        for event in current {
            match before.get(event.uid.as_str()) {
                None => summary.added += 1,
                Some(old) if *old == event => summary.unchanged += 1,
                Some(_) => summary.changed += 1,
            }
        }
        let after: HashSet<&str> = current.iter().map(|e| e.uid.as_str()).collect();
        summary.removed = before.keys().filter(|uid| !after.contains(*uid)).count();

        summary
    }

    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

impl std::fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} added, {} changed, {} removed, {} unchanged",
            self.added, self.changed, self.removed, self.unchanged
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(ChangeSummary),
    /// Nothing was extracted and the previous file was left alone.
    KeptPrevious,
}

/// Serialize `doc` and write it to `path`.
///
/// With `keep_on_empty`, an empty document never replaces an existing file.
pub fn write_calendar(
    path: &Path,
    doc: &CalendarDocument,
    keep_on_empty: bool,
) -> ZzzCalResult<WriteOutcome> {
    if keep_on_empty && doc.is_empty() && path.exists() {
        warn!(path = %path.display(), "No events extracted; keeping previous calendar");
        return Ok(WriteOutcome::KeptPrevious);
    }

    let content = doc.to_ics()?;
    let previous = previous_events(path);
    let summary = ChangeSummary::compare(&previous, doc.events());

    write_atomic(path, &content)?;
    info!(path = %path.display(), events = doc.events().len(), "Wrote calendar ({summary})");

    Ok(WriteOutcome::Written(summary))
}

/// Events in the file being replaced; empty if there is none or it cannot be read.
fn previous_events(path: &Path) -> Vec<CalendarEvent> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    ics::read_events(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), "Previous calendar is unreadable: {e}");
        Vec::new()
    })
}
