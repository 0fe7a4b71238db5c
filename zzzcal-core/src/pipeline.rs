//! The run: fetch → extract → normalize → serialize → write.
//!
//! Per-post problems (a post page that fails to load, a malformed
//! announcement, an unresolvable version) are logged and counted. Only a
//! failure to load the search page, to start the browser, or to write the
//! output ends the run with an error, and in that case the output file is
//! not touched. A search page that loads but shows no result cards is an
//! empty listing: the run succeeds with zero events.

use tracing::{info, warn};
use url::Url;

use crate::calendar::CalendarDocument;
use crate::config::Config;
use crate::error::{ZzzCalError, ZzzCalResult};
use crate::event::EventRecord;
use crate::extract::{Extraction, Extractor, LISTING_READY_SELECTOR, POST_READY_SELECTOR};
use crate::fetch::{Browser, PageSource};
use crate::normalize::Normalizer;
use crate::output::{WriteOutcome, write_calendar};
use crate::versions::{ApiVersionLookup, VersionLookup, VersionStore, resolve_versions};

/// Records read from the site, with counts of what was passed over.
#[derive(Debug, Default)]
pub struct Collected {
    pub posts: usize,
    pub records: Vec<EventRecord>,
    pub ignored: usize,
    pub skipped: usize,
}

/// What a run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Posts listed on the search page
    pub posts: usize,
    /// Posts that were not banner announcements
    pub ignored: usize,
    /// Posts or records dropped as unreadable
    pub skipped: usize,
    /// Events in the written calendar
    pub events: usize,
    pub outcome: WriteOutcome,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} posts, {} ignored, {} skipped, {} events",
            self.posts, self.ignored, self.skipped, self.events
        )
    }
}

pub struct Pipeline<'a> {
    config: &'a Config,
    extractor: Extractor,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a Config) -> Self {
        Pipeline {
            config,
            extractor: Extractor::from_config(config),
        }
    }

    /// Search page URL with the keyword applied.
    pub fn search_url(&self) -> ZzzCalResult<String> {
        Url::parse_with_params(&self.config.search_url, &[("keyword", &self.config.keyword)])
            .map(|u| u.to_string())
            .map_err(|e| ZzzCalError::Config(format!("Invalid search_url: {e}")))
    }

    /// Load the search page, then each listed post in turn.
    pub async fn collect<S: PageSource>(&self, source: &mut S) -> ZzzCalResult<Collected> {
        let search_url = self.search_url()?;
        info!(url = %search_url, keyword = %self.config.keyword, "Fetching search results");

        let listing = source.fetch(&search_url, LISTING_READY_SELECTOR).await?;
        if !listing.ready {
            warn!(url = %listing.url, "No search results rendered; treating listing as empty");
        }
        let links = self.extractor.post_links(&listing);
        info!(count = links.len(), "Found posts");

        let mut collected = Collected {
            posts: links.len(),
            ..Collected::default()
        };

        for link in links {
            let page = match source.fetch(&link.url, POST_READY_SELECTOR).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(post = %link.title, url = %link.url, "Skipping post that failed to load: {e}");
                    collected.skipped += 1;
                    continue;
                }
            };

            if !page.ready {
                warn!(post = %link.title, url = %link.url, "Skipping post whose content never rendered");
                collected.skipped += 1;
                continue;
            }

            match self.extractor.event_record(&page) {
                Extraction::Event(record) => {
                    info!(
                        title = %record.title,
                        start = %record.raw_start,
                        end = %record.raw_end,
                        "Extracted banner"
                    );
                    collected.records.push(record);
                }
                Extraction::Ignored(reason) => {
                    info!(post = %link.title, "Ignoring post: {reason}");
                    collected.ignored += 1;
                }
                Extraction::Malformed(reason) => {
                    warn!(post = %link.title, url = %link.url, "Skipping post: {reason}");
                    collected.skipped += 1;
                }
            }
        }

        Ok(collected)
    }

    /// Normalize the collected records and write the calendar.
    pub async fn finish<L: VersionLookup>(
        &self,
        collected: Collected,
        lookup: &L,
    ) -> ZzzCalResult<RunSummary> {
        let config = self.config;

        let mut store = VersionStore::load(&config.version_file);
        let versions = resolve_versions(&collected.records, &mut store, lookup, config.timezone).await;

        let normalized = Normalizer::new(config.timezone, versions).normalize_all(&collected.records);
        if normalized.events.is_empty() {
            warn!("No events extracted; the page structure may have changed");
        }

        let doc = CalendarDocument::from_config(config, normalized.events);
        let outcome = write_calendar(&config.output_path, &doc, config.keep_on_empty)?;

        Ok(RunSummary {
            posts: collected.posts,
            ignored: collected.ignored,
            skipped: collected.skipped + normalized.skipped,
            events: doc.events().len(),
            outcome,
        })
    }

    pub async fn run<S: PageSource, L: VersionLookup>(
        &self,
        source: &mut S,
        lookup: &L,
    ) -> ZzzCalResult<RunSummary> {
        let collected = self.collect(source).await?;
        self.finish(collected, lookup).await
    }
}

/// Full production run: headless browser for the pages, publisher API for
/// version dates. The browser is shut down as soon as the pages are in,
/// whether or not fetching succeeded.
pub async fn generate(config: &Config) -> ZzzCalResult<RunSummary> {
    let pipeline = Pipeline::new(config);
    let lookup = ApiVersionLookup::from_config(config)?;

    let mut browser = Browser::launch(&config.webdriver, config.fetch_timeout()).await?;
    let collected = pipeline.collect(&mut browser).await;
    browser.shutdown().await;

    pipeline.finish(collected?, &lookup).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RenderedPage;
    use crate::ics::read_events;
    use crate::output::ChangeSummary;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::path::Path;

    /// Serves canned HTML by URL; unknown URLs fail like a network error.
    #[derive(Default)]
    struct FixturePages {
        pages: HashMap<String, String>,
        requested: Vec<String>,
    }

    impl FixturePages {
        fn with(mut self, url: &str, html: String) -> Self {
            self.pages.insert(url.to_string(), html);
            self
        }
    }

    impl PageSource for FixturePages {
        async fn fetch(&mut self, url: &str, ready_selector: &str) -> ZzzCalResult<RenderedPage> {
            self.requested.push(url.to_string());
            let html = self
                .pages
                .get(url)
                .ok_or_else(|| ZzzCalError::Fetch(format!("{url}: connection refused")))?;

            let selector = scraper::Selector::parse(ready_selector).unwrap();
            let ready = scraper::Html::parse_document(html)
                .select(&selector)
                .next()
                .is_some();

            Ok(RenderedPage {
                url: url.to_string(),
                html: html.clone(),
                ready,
            })
        }
    }

    struct NoVersions;

    impl VersionLookup for NoVersions {
        async fn version_start(&self, _version: &str) -> ZzzCalResult<Option<DateTime<Utc>>> {
            Ok(None)
        }
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            output_path: dir.join("zzz_events.ics"),
            version_file: dir.join("version.json"),
            split_long_events: false,
            ..Config::default()
        }
    }

    fn listing(ids: &[u32]) -> String {
        let cards: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div class="mhy-article-card">
                         <a class="mhy-article-card__link" href="/zzz/article/{id}"></a>
                         <div class="mhy-article-card__title">调频说明 {id}</div>
                       </div>"#
                )
            })
            .collect();
        format!("<html><body><header>导航</header>{cards}</body></html>")
    }

    fn post(body: &str) -> String {
        format!(
            r#"<html><body>
               <h1 class="mhy-article-page__title">「独家频段」调频说明</h1>
               <div class="mhy-article-page__content">{body}</div>
               <aside>推荐阅读</aside>
               </body></html>"#
        )
    }

    fn article(id: u32) -> String {
        format!("https://www.miyoushe.com/zzz/article/{id}")
    }

    fn site(config: &Config) -> FixturePages {
        let search = Pipeline::new(config).search_url().unwrap();
        FixturePages::default()
            .with(&search, listing(&[1, 2, 3, 4]))
            .with(
                &article(1),
                post("<p>2024/7/4 10:00:00 ~ 2024/7/24 11:59:59</p><p>代理人[艾莲(冰)]</p>"),
            )
            .with(
                &article(2),
                post("<p>2024/7/24 12:00:00 ~ 2024/8/14 11:59:59</p><p>代理人[朱鸢(以太)]</p>"),
            )
            .with(
                &article(3),
                post("<p>2024/7/4 10:00:00 ~ 待定</p><p>代理人[苍角(冰)]</p>"),
            )
            .with(
                &article(4),
                post("<p>2024/8/14 12:00:00 ~ 2024/9/4 11:59:59</p><p>代理人[青衣(电)]</p>"),
            )
    }

    #[tokio::test]
    async fn test_three_good_posts_and_one_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut source = site(&config);

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();

        assert_eq!(summary.posts, 4);
        assert_eq!(summary.events, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.ignored, 0);

        let content = std::fs::read_to_string(&config.output_path).unwrap();
        let events = read_events(&content).unwrap();
        let titles: Vec<&str> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["艾莲(冰)", "朱鸢(以太)", "青衣(电)"]);
        assert_eq!(events[0].start, Utc.with_ymd_and_hms(2024, 7, 4, 2, 0, 0).unwrap());
        assert!(events.iter().all(|e| e.start <= e.end));
    }

    #[tokio::test]
    async fn test_posts_fetched_in_listing_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let mut source = site(&config);

        Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();

        assert_eq!(&source.requested[1..], &[article(1), article(2), article(3), article(4)]);
    }

    #[tokio::test]
    async fn test_second_run_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        Pipeline::new(&config).run(&mut site(&config), &NoVersions).await.unwrap();
        let first = std::fs::read(&config.output_path).unwrap();
        let summary = Pipeline::new(&config).run(&mut site(&config), &NoVersions).await.unwrap();

        assert_eq!(std::fs::read(&config.output_path).unwrap(), first);
        assert_eq!(
            summary.outcome,
            WriteOutcome::Written(ChangeSummary {
                unchanged: 3,
                ..ChangeSummary::default()
            })
        );
    }

    #[tokio::test]
    async fn test_zero_events_writes_empty_calendar() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source = FixturePages::default().with(&search, listing(&[]));

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();

        assert_eq!(summary.events, 0);
        let content = std::fs::read_to_string(&config.output_path).unwrap();
        assert!(content.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(content.ends_with("END:VCALENDAR\r\n"));
        assert!(read_events(&content).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_without_cards_is_empty_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source = FixturePages::default().with(
            &search,
            "<html><body><div class=\"mhy-search-page\">暂无结果</div></body></html>".to_string(),
        );

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();

        assert_eq!(summary.posts, 0);
        assert_eq!(summary.events, 0);
        assert_eq!(source.requested.len(), 1);
        let content = std::fs::read_to_string(&config.output_path).unwrap();
        assert!(read_events(&content).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listing_without_cards_keeps_previous_calendar_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        Pipeline::new(&config).run(&mut site(&config), &NoVersions).await.unwrap();
        let before = std::fs::read(&config.output_path).unwrap();

        let config = Config {
            keep_on_empty: true,
            ..config
        };
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source =
            FixturePages::default().with(&search, "<html><body></body></html>".to_string());

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();

        assert_eq!(summary.outcome, WriteOutcome::KeptPrevious);
        assert_eq!(std::fs::read(&config.output_path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_post_that_never_renders_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source = FixturePages::default()
            .with(&search, listing(&[1, 2]))
            .with(
                &article(1),
                post("<p>2024/7/4 10:00:00 ~ 2024/7/24 11:59:59</p><p>代理人[艾莲(冰)]</p>"),
            )
            .with(&article(2), "<html><body>加载中</body></html>".to_string());

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();
        assert_eq!(summary.events, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_output_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        std::fs::write(&config.output_path, "previous calendar").unwrap();
        let mut source = FixturePages::default();

        let err = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap_err();

        assert!(matches!(err, ZzzCalError::Fetch(_)));
        assert_eq!(
            std::fs::read_to_string(&config.output_path).unwrap(),
            "previous calendar"
        );
    }

    #[tokio::test]
    async fn test_unreachable_post_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source = FixturePages::default()
            .with(&search, listing(&[1, 404]))
            .with(
                &article(1),
                post("<p>2024/7/4 10:00:00 ~ 2024/7/24 11:59:59</p><p>代理人[艾莲(冰)]</p>"),
            );

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();
        assert_eq!(summary.events, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[tokio::test]
    async fn test_weapon_posts_ignored_and_shared_windows_merged() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            split_long_events: true,
            ..test_config(dir.path())
        };
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source = FixturePages::default()
            .with(&search, listing(&[1, 2, 3]))
            .with(
                &article(1),
                post("<p>2024/7/4 10:00:00 ~ 2024/7/24 11:59:59</p><p>代理人[艾莲(冰)]</p>"),
            )
            .with(
                &article(2),
                post("<p>2024/7/4 10:00:00 ~ 2024/7/24 11:59:59</p><p>音擎[深海访客(冰)]</p>"),
            )
            .with(
                &article(3),
                post("<p>2024/7/4 10:00:00 ~ 2024/7/24 11:59:59</p><p>代理人[苍角(冰)]</p>"),
            );

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();
        assert_eq!(summary.ignored, 1);

        let content = std::fs::read_to_string(&config.output_path).unwrap();
        let titles: Vec<String> = read_events(&content)
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["艾莲(冰)、苍角(冰) 开始", "艾莲(冰)、苍角(冰) 结束"]);
    }

    #[tokio::test]
    async fn test_unresolved_version_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let search = Pipeline::new(&config).search_url().unwrap();
        let mut source = FixturePages::default()
            .with(&search, listing(&[1]))
            .with(
                &article(1),
                post("<p>1.1版本更新后 ~ 2024/8/14 11:59:59</p><p>代理人[青衣(电)]</p>"),
            );

        let summary = Pipeline::new(&config).run(&mut source, &NoVersions).await.unwrap();
        assert_eq!(summary.events, 0);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_search_url_encodes_keyword() {
        let config = Config::default();
        let url = Pipeline::new(&config).search_url().unwrap();
        assert!(url.starts_with("https://www.miyoushe.com/zzz/search?keyword="));
        assert!(!url.contains("调频"), "keyword should be percent-encoded: {url}");
    }
}
