//! Fixed defaults for the publisher and the generated calendar.

/// Config file looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "zzzcal.toml";

/// Prefix for environment variable overrides (`ZZZCAL_OUTPUT_PATH`, ...).
pub const ENV_PREFIX: &str = "ZZZCAL";

pub const DEFAULT_SEARCH_URL: &str = "https://www.miyoushe.com/zzz/search";
pub const DEFAULT_SEARCH_KEYWORD: &str = "调频说明";

pub const DEFAULT_API_URL: &str = "https://bbs-api.miyoushe.com/painter/wapi/searchPosts";
/// Title prefix of the official patch-notes posts used to date a version update.
pub const DEFAULT_VERSION_POST_PREFIX: &str = "【绝区零绳网情报站】";

pub const DEFAULT_OUTPUT_PATH: &str = "zzz_events.ics";
pub const DEFAULT_VERSION_FILE: &str = "version.json";

pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

pub const DEFAULT_PRODID: &str = "-//zzzcal//Zenless Zone Zero Signal Search//CN";
pub const DEFAULT_CALENDAR_NAME: &str = "绝区零调频活动";

/// Separator the publisher uses between agent names; also used when merging titles.
pub const TITLE_SEPARATOR: &str = "、";

pub const DEFAULT_REQUIRE_KEYWORDS: &[&str] = &["代理人"];
pub const DEFAULT_EXCLUDE_KEYWORDS: &[&str] = &["音擎"];

pub const DEFAULT_WEBDRIVER_BINARY: &str = "chromedriver";
pub const DEFAULT_WEBDRIVER_PORT: u16 = 9515;

pub const DEFAULT_BROWSER_ARGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--window-size=1920,1200",
    "--ignore-certificate-errors",
    "--disable-extensions",
    "--no-sandbox",
    "--disable-dev-shm-usage",
];

/// Events longer than this are split into start and end markers.
pub const LONG_EVENT_HOURS: i64 = 24;
/// Duration of each marker produced by splitting a long event.
pub const MARKER_EVENT_HOURS: i64 = 1;
