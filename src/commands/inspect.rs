use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use zzzcal_core::config::Config;
use zzzcal_core::extract::{Extraction, Extractor};
use zzzcal_core::fetch::RenderedPage;

pub fn run(config: &Config, file: &Path, listing: bool) -> Result<()> {
    let html = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let extractor = Extractor::from_config(config);

    if listing {
        // Relative card links resolve against the configured search page.
        let page = RenderedPage {
            url: config.search_url.clone(),
            html,
            ready: true,
        };
        let links = extractor.post_links(&page);
        if links.is_empty() {
            println!("{}", "No post links found".dimmed());
        }
        for link in links {
            println!("{}", link.title.bold());
            println!("  {}", link.url.dimmed());
        }
        return Ok(());
    }

    let page = RenderedPage {
        url: file.display().to_string(),
        html,
        ready: true,
    };
    match extractor.event_record(&page) {
        Extraction::Event(record) => {
            println!("{} {}", "Event".green(), record.title.bold());
            println!("  start: {}", record.raw_start);
            println!("  end:   {}", record.raw_end);
        }
        Extraction::Ignored(reason) => println!("{} {reason}", "Ignored".yellow()),
        Extraction::Malformed(reason) => println!("{} {reason}", "Malformed".red()),
    }

    Ok(())
}
