//! Event extraction from rendered pages.
//!
//! Everything tied to the publisher's markup lives here: CSS selectors for
//! the search results and post pages, and the text patterns that carry
//! agent names and banner time ranges. A markup change on the site should
//! only ever require touching this module.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;
use crate::constants::TITLE_SEPARATOR;
use crate::event::{EventRecord, PostLink};
use crate::fetch::RenderedPage;

/// Selector that signals the search results have rendered.
pub const LISTING_READY_SELECTOR: &str = ".mhy-article-card";
/// Selector that signals a post body has rendered.
pub const POST_READY_SELECTOR: &str = ".mhy-article-page__content";

static CARD: Lazy<Selector> = Lazy::new(|| selector(".mhy-article-card"));
static CARD_TITLE: Lazy<Selector> = Lazy::new(|| selector(".mhy-article-card__title"));
static CARD_LINK: Lazy<Selector> = Lazy::new(|| selector(".mhy-article-card__link"));
static POST_TITLE: Lazy<Selector> = Lazy::new(|| selector(".mhy-article-page__title"));
static POST_CONTENT: Lazy<Selector> = Lazy::new(|| selector(POST_READY_SELECTOR));

/// `[艾莲(冰)]` agent mentions in a post body. Neither part may span a line
/// or contain brackets, so a bracketed heading never pairs with a later mention.
static AGENT_PATTERN: Lazy<Regex> =
    Lazy::new(|| pattern(r"\[([^\[\]()\n]+?)\(([^\[\]()\n]+?)\)\]"));
/// `2024/7/4 10:00:00 ~ 2024/7/24 11:59:59`
static TIME_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(
        r"(\d{4}/\d{1,2}/\d{1,2}\s+\d{1,2}:\d{2}:\d{2})\s*~\s*(\d{4}/\d{1,2}/\d{1,2}\s+\d{1,2}:\d{2}:\d{2})",
    )
});
/// `1.1版本更新后 ~ 2024/7/24 11:59:59` ("after the 1.1 update ~ ...")
static VERSION_RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(\d+\.\d+)版本更新后\s*~\s*(\d{4}/\d{1,2}/\d{1,2}\s+\d{1,2}:\d{2}:\d{2})")
});
/// Matches a `raw_start` that refers to a version update rather than a timestamp.
static VERSION_MARKER_PATTERN: Lazy<Regex> = Lazy::new(|| pattern(r"^(\d+\.\d+)版本更新后$"));

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("static pattern is valid")
}

/// Outcome of reading one post page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The post announces a banner.
    Event(EventRecord),
    /// The post is unrelated (wrong banner type, no agents); not an error.
    Ignored(String),
    /// The post looks relevant but lacks required fields.
    Malformed(String),
}

/// Raw start string used for version-relative banners.
pub fn version_marker(version: &str) -> String {
    format!("{version}版本更新后")
}

/// The version a `raw_start` refers to, if it is a version marker.
pub fn parse_version_marker(raw: &str) -> Option<&str> {
    VERSION_MARKER_PATTERN
        .captures(raw.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Reads post links and event records out of rendered pages.
#[derive(Debug, Clone)]
pub struct Extractor {
    require_keywords: Vec<String>,
    exclude_keywords: Vec<String>,
}

impl Extractor {
    pub fn new(require_keywords: Vec<String>, exclude_keywords: Vec<String>) -> Self {
        Extractor {
            require_keywords,
            exclude_keywords,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Extractor::new(
            config.require_keywords.clone(),
            config.exclude_keywords.clone(),
        )
    }

    /// Post links from a search results page, in page order.
    ///
    /// Cards without a title or link are skipped.
    pub fn post_links(&self, page: &RenderedPage) -> Vec<PostLink> {
        let document = Html::parse_document(&page.html);
        let base = Url::parse(&page.url).ok();

        let mut links = Vec::new();
        for (index, card) in document.select(&CARD).enumerate() {
            let title = card
                .select(&CARD_TITLE)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty());
            let href = card
                .select(&CARD_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::trim)
                .filter(|h| !h.is_empty());

            let (Some(title), Some(href)) = (title, href) else {
                warn!(card = index, "Skipping search result card without title or link");
                continue;
            };

            let url = match &base {
                Some(base) => match base.join(href) {
                    Ok(url) => url.to_string(),
                    Err(e) => {
                        warn!(card = index, href, "Skipping card with invalid link: {e}");
                        continue;
                    }
                },
                None => href.to_string(),
            };

            links.push(PostLink { title, url });
        }

        debug!(count = links.len(), url = %page.url, "Read post links");
        links
    }

    /// Read the banner announced by a post page.
    pub fn event_record(&self, page: &RenderedPage) -> Extraction {
        let document = Html::parse_document(&page.html);

        let page_title = document
            .select(&POST_TITLE)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let body = document
            .select(&POST_CONTENT)
            .next()
            .map(element_text)
            .unwrap_or_default();

        if body.is_empty() {
            return Extraction::Malformed("post body is empty".into());
        }

        if let Some(keyword) = self.exclude_keywords.iter().find(|k| body.contains(k.as_str())) {
            return Extraction::Ignored(format!("mentions excluded keyword '{keyword}'"));
        }
        if !self.require_keywords.is_empty()
            && !self.require_keywords.iter().any(|k| body.contains(k.as_str()))
        {
            return Extraction::Ignored(format!(
                "mentions none of {}",
                self.require_keywords.join(", ")
            ));
        }

        let title = agents_title(&body).unwrap_or_else(|| page_title.clone());
        if title.is_empty() {
            return Extraction::Malformed("no title and no agent names".into());
        }

        let Some((raw_start, raw_end)) = time_range(&body) else {
            return Extraction::Malformed(format!("'{title}' has no complete time range"));
        };

        let description = if page_title.is_empty() {
            page.url.clone()
        } else {
            format!("{page_title}\n{}", page.url)
        };

        Extraction::Event(EventRecord {
            title,
            raw_start,
            raw_end,
            raw_description: Some(description),
            source_url: Some(page.url.clone()),
        })
    }
}

/// Elements that start a new line in rendered text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption", "figure",
    "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "ol", "p", "pre",
    "section", "table", "tr", "ul",
];

/// Text content of an element as a browser would lay it out: inline runs
/// joined, block elements on their own lines. Trimmed.
fn element_text(element: ElementRef<'_>) -> String {
    let mut text = String::new();
    push_text(element, &mut text);
    text.trim().to_string()
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(run) = child.value().as_text() {
            out.push_str(run);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };

        let block = BLOCK_ELEMENTS.contains(&child.value().name());
        if block && !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        push_text(child, out);
        if block && !out.ends_with('\n') {
            out.push('\n');
        }
    }
}

/// Agent mentions joined into a title, first occurrence order, no repeats.
fn agents_title(body: &str) -> Option<String> {
    let mut agents: Vec<String> = Vec::new();
    for caps in AGENT_PATTERN.captures_iter(body) {
        let agent = format!("{}({})", caps[1].trim(), caps[2].trim());
        if !agents.contains(&agent) {
            agents.push(agent);
        }
    }

    if agents.is_empty() {
        None
    } else {
        Some(agents.join(TITLE_SEPARATOR))
    }
}

/// First time range in the body: an explicit one, else a version-relative one.
fn time_range(body: &str) -> Option<(String, String)> {
    if let Some(caps) = TIME_RANGE_PATTERN.captures(body) {
        return Some((caps[1].to_string(), caps[2].to_string()));
    }

    VERSION_RANGE_PATTERN
        .captures(body)
        .map(|caps| (version_marker(&caps[1]), caps[2].to_string()))
}
