//! Run configuration.
//!
//! Every field has a default, so an empty (or missing) config file yields a
//! working setup. Values are layered: defaults, then `zzzcal.toml` (or the
//! file passed with `--config`), then `ZZZCAL_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use config::{Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::{ZzzCalError, ZzzCalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Search page listing the announcement posts.
    pub search_url: String,
    /// Keyword searched for on `search_url`.
    pub keyword: String,

    /// Post-search JSON API used to date version updates.
    pub api_url: String,
    pub version_post_prefix: String,
    /// Cache of version start times, kept between runs.
    pub version_file: PathBuf,

    pub output_path: PathBuf,

    /// Zone the publisher's timestamps are written in.
    pub timezone: Tz,

    /// Upper bound on waiting for a page to render.
    pub fetch_timeout_secs: u64,

    /// A post must mention at least one of these to be considered.
    pub require_keywords: Vec<String>,
    /// A post mentioning any of these is ignored.
    pub exclude_keywords: Vec<String>,

    pub split_long_events: bool,
    /// Leave the previous output alone when nothing was extracted.
    pub keep_on_empty: bool,

    pub calendar: CalendarMetadata,
    pub webdriver: WebDriverConfig,
}

/// Fixed properties written at the top of the VCALENDAR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarMetadata {
    pub prodid: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// Driver executable, looked up in PATH unless it is a path.
    pub binary: String,
    pub port: u16,
    /// Connect to an already running WebDriver instead of spawning one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Chrome/Chromium executable, when not the driver's default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_binary: Option<PathBuf>,
    pub browser_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            keyword: DEFAULT_SEARCH_KEYWORD.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            version_post_prefix: DEFAULT_VERSION_POST_PREFIX.to_string(),
            version_file: PathBuf::from(DEFAULT_VERSION_FILE),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            timezone: Tz::Asia__Shanghai,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            require_keywords: to_strings(DEFAULT_REQUIRE_KEYWORDS),
            exclude_keywords: to_strings(DEFAULT_EXCLUDE_KEYWORDS),
            split_long_events: true,
            keep_on_empty: false,
            calendar: CalendarMetadata::default(),
            webdriver: WebDriverConfig::default(),
        }
    }
}

impl Default for CalendarMetadata {
    fn default() -> Self {
        CalendarMetadata {
            prodid: DEFAULT_PRODID.to_string(),
            name: DEFAULT_CALENDAR_NAME.to_string(),
        }
    }
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        WebDriverConfig {
            binary: DEFAULT_WEBDRIVER_BINARY.to_string(),
            port: DEFAULT_WEBDRIVER_PORT,
            url: None,
            browser_binary: None,
            browser_args: to_strings(DEFAULT_BROWSER_ARGS),
        }
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Config {
    /// Load configuration from `path` (required to exist) or from
    /// `zzzcal.toml` in the working directory (optional), then apply
    /// `ZZZCAL_*` environment overrides.
    pub fn load(path: Option<&Path>) -> ZzzCalResult<Self> {
        let file = match path {
            Some(p) => File::from(p.to_path_buf()).required(true),
            None => File::from(PathBuf::from(DEFAULT_CONFIG_FILE)).required(false),
        };

        let config: Config = config::Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ZzzCalError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| ZzzCalError::Config(e.to_string()))?;

        config.expanded()
    }

    /// Expand `~` in paths and check values that serde cannot.
    fn expanded(mut self) -> ZzzCalResult<Self> {
        self.output_path = expand_tilde(&self.output_path);
        self.version_file = expand_tilde(&self.version_file);

        if self.fetch_timeout_secs == 0 {
            return Err(ZzzCalError::Config(
                "fetch_timeout_secs must be greater than zero".into(),
            ));
        }
        url::Url::parse(&self.search_url)
            .map_err(|e| ZzzCalError::Config(format!("Invalid search_url: {e}")))?;
        url::Url::parse(&self.api_url)
            .map_err(|e| ZzzCalError::Config(format!("Invalid api_url: {e}")))?;

        Ok(self)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml(&self) -> ZzzCalResult<String> {
        toml::to_string_pretty(self).map_err(|e| ZzzCalError::Config(e.to_string()))
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_default_file_gives_defaults() {
        let config = Config::default().expanded().unwrap();
        assert_eq!(config.timezone, Tz::Asia__Shanghai);
        assert_eq!(config.output_path, PathBuf::from("zzz_events.ics"));
        assert_eq!(config.require_keywords, vec!["代理人".to_string()]);
        assert!(config.split_long_events);
        assert!(!config.keep_on_empty);
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "output_path = \"out/calendar.ics\"\ntimezone = \"UTC\"\n\n[webdriver]\nport = 4444"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.output_path, PathBuf::from("out/calendar.ics"));
        assert_eq!(config.timezone, Tz::UTC);
        assert_eq!(config.webdriver.port, 4444);
        assert_eq!(config.webdriver.binary, "chromedriver");
        assert_eq!(config.keyword, "调频说明");
    }

    #[test]
    fn test_load_rejects_unknown_timezone() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "timezone = \"Mars/Olympus_Mons\"").unwrap();

        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ZzzCalError::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_load_requires_explicit_file_to_exist() {
        let err = Config::load(Some(Path::new("/nonexistent/zzzcal.toml"))).unwrap_err();
        assert!(matches!(err, ZzzCalError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = Config {
            fetch_timeout_secs: 0,
            ..Config::default()
        };
        assert!(config.expanded().is_err());
    }

    #[test]
    fn test_to_toml_round_trips_through_serde() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.search_url, config.search_url);
        assert_eq!(parsed.timezone, config.timezone);
        assert_eq!(parsed.calendar, config.calendar);
    }
}
