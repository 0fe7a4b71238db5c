use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use zzzcal_core::config::Config;
use zzzcal_core::ics;

pub fn run(config: &Config, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let mut events = ics::read_events(&content)?;

    if events.is_empty() {
        println!("{}", "No events found".dimmed());
        return Ok(());
    }

    events.sort_by_key(|e| e.start);

    // Times are shown in the publisher's zone, as the announcements give them.
    let tz = config.timezone;
    for event in &events {
        let start = event.start.with_timezone(&tz).format("%Y-%m-%d %H:%M");
        let end = event.end.with_timezone(&tz).format("%Y-%m-%d %H:%M");
        println!("{} → {}  {}", start, end, event.title.bold());
    }
    println!("\n{}", format!("{} events ({})", events.len(), tz.name()).dimmed());

    Ok(())
}
