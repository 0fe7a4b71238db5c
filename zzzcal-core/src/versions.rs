//! Version update start times.
//!
//! Some banners run from "after the X.Y update" rather than from a fixed
//! timestamp. The update time is taken from the publication time of the
//! official patch-notes post for that version, looked up through the
//! publisher's post-search API and cached in a small JSON file so each
//! version is only looked up once.
//!
//! Cache entries are written as RFC 3339 with an offset. Entries without an
//! offset are read as wall-clock time in the configured zone; a cache
//! written by a tool that used the host's local zone (often UTC on CI
//! runners) will be off by the difference. Delete such entries to have
//! them looked up again.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::{ZzzCalError, ZzzCalResult};
use crate::event::EventRecord;
use crate::extract::parse_version_marker;
use crate::output::write_atomic;

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolved start times, keyed by version (`"1.1"`).
pub type VersionTable = BTreeMap<String, DateTime<Utc>>;

/// Source of version update times.
#[allow(async_fn_in_trait)]
pub trait VersionLookup {
    /// Start time of `version`, or `None` if the publisher has no matching post.
    async fn version_start(&self, version: &str) -> ZzzCalResult<Option<DateTime<Utc>>>;
}

/// Looks versions up through the publisher's post-search API.
pub struct ApiVersionLookup {
    client: reqwest::Client,
    api_url: String,
    post_prefix: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    retcode: i64,
    #[serde(default)]
    message: String,
    data: Option<SearchData>,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    list: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    post: SearchPost,
}

#[derive(Debug, Deserialize)]
struct SearchPost {
    subject: String,
    /// Unix seconds
    created_at: i64,
}

impl ApiVersionLookup {
    pub fn from_config(config: &Config) -> ZzzCalResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .build()
            .map_err(|e| ZzzCalError::VersionLookup(e.to_string()))?;

        Ok(ApiVersionLookup {
            client,
            api_url: config.api_url.clone(),
            post_prefix: config.version_post_prefix.clone(),
        })
    }

    fn query(&self, version: &str) -> String {
        format!("{}{}版本", self.post_prefix, version)
    }
}

impl VersionLookup for ApiVersionLookup {
    async fn version_start(&self, version: &str) -> ZzzCalResult<Option<DateTime<Utc>>> {
        let keyword = self.query(version);
        let url = Url::parse_with_params(&self.api_url, &[("keyword", keyword.as_str()), ("size", "1")])
            .map_err(|e| ZzzCalError::VersionLookup(format!("Invalid API URL: {e}")))?;

        debug!(version, %url, "Looking up version start");

        let response: SearchResponse = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ZzzCalError::VersionLookup(e.to_string()))?
            .json()
            .await
            .map_err(|e| ZzzCalError::VersionLookup(format!("Failed to parse response: {e}")))?;

        start_from_response(response, &keyword)
    }
}

/// The first search hit's publication time, if its subject is the post we asked for.
fn start_from_response(response: SearchResponse, keyword: &str) -> ZzzCalResult<Option<DateTime<Utc>>> {
    if response.retcode != 0 {
        return Err(ZzzCalError::VersionLookup(format!(
            "API returned retcode {}: {}",
            response.retcode, response.message
        )));
    }

    let Some(item) = response.data.and_then(|d| d.list.into_iter().next()) else {
        return Ok(None);
    };
    if !item.post.subject.contains(keyword) {
        return Ok(None);
    }

    Ok(DateTime::from_timestamp(item.post.created_at, 0))
}

/// JSON cache of version start times (`version.json`).
///
/// Values are RFC 3339 timestamps. Offset-less values (as older caches
/// contain) are read as wall-clock time in the configured zone.
pub struct VersionStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl VersionStore {
    /// Load the cache; a missing or unreadable file starts an empty one.
    pub fn load(path: &Path) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %path.display(), "Ignoring unreadable version cache: {e}");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        VersionStore {
            path: path.to_path_buf(),
            entries,
            dirty: false,
        }
    }

    pub fn get(&self, version: &str, tz: Tz) -> Option<DateTime<Utc>> {
        let raw = self.entries.get(version)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .and_then(|naive| tz.from_local_datetime(&naive).earliest())
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn insert(&mut self, version: &str, start: DateTime<Utc>, tz: Tz) {
        self.entries
            .insert(version.to_string(), start.with_timezone(&tz).to_rfc3339());
        self.dirty = true;
    }

    /// Write the cache back if anything was added.
    pub fn save(&mut self) -> ZzzCalResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let content = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| ZzzCalError::Serialization(e.to_string()))?;
        write_atomic(&self.path, &content)?;
        self.dirty = false;
        info!(path = %self.path.display(), "Updated version cache");
        Ok(())
    }
}

/// Resolve every version referenced by `records`, from the cache first and
/// the lookup second. Versions that cannot be resolved are left out; the
/// normalizer then drops the records that need them.
pub async fn resolve_versions<L: VersionLookup>(
    records: &[EventRecord],
    store: &mut VersionStore,
    lookup: &L,
    tz: Tz,
) -> VersionTable {
    let versions: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| parse_version_marker(&r.raw_start))
        .collect();

    let mut table = VersionTable::new();
    for version in versions {
        if let Some(start) = store.get(version, tz) {
            table.insert(version.to_string(), start);
            continue;
        }

        match lookup.version_start(version).await {
            Ok(Some(start)) => {
                info!(version, start = %start.with_timezone(&tz), "Resolved version start");
                store.insert(version, start, tz);
                table.insert(version.to_string(), start);
            }
            Ok(None) => warn!(version, "No announcement post found for version"),
            Err(e) => warn!(version, "Version lookup failed: {e}"),
        }
    }

    if let Err(e) = store.save() {
        warn!("Failed to save version cache: {e}");
    }

    table
}
