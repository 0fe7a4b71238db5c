//! Headless Chrome driven over WebDriver.
//!
//! A `chromedriver` process is spawned per run and a single session is
//! opened on it. [`Browser::shutdown`] closes the session and kills the
//! driver; the child is also spawned with `kill_on_drop`, so an early
//! return or panic never leaves chromedriver behind.
//!
//! Dropping a `Browser` without `shutdown` (a panic mid-run) skips the
//! WebDriver `DELETE /session` call. chromedriver is still killed, but the
//! Chrome process it started is only reaped when chromedriver's process
//! group goes away; under a supervisor that does not kill the whole group
//! it can outlive the run. [`crate::pipeline::generate`] always calls
//! `shutdown` on the non-panicking paths.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{Value, json};
use tokio::process::{Child, Command as TokioCommand};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use super::{PageSource, RenderedPage};
use crate::config::WebDriverConfig;
use crate::error::{ZzzCalError, ZzzCalResult};

/// How long to keep retrying the first connection while the driver starts up.
const DRIVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const DRIVER_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct Browser {
    client: Client,
    driver: Option<Child>,
    page_timeout: Duration,
}

impl Browser {
    /// Start the WebDriver (unless an external one is configured) and open a
    /// headless session on it.
    pub async fn launch(config: &WebDriverConfig, page_timeout: Duration) -> ZzzCalResult<Self> {
        let (mut driver, url) = match &config.url {
            Some(url) => (None, url.clone()),
            None => (
                Some(spawn_driver(config)?),
                format!("http://localhost:{}", config.port),
            ),
        };

        match connect(&url, capabilities(config)).await {
            Ok(client) => {
                info!(webdriver = %url, "Browser session started");
                Ok(Browser {
                    client,
                    driver,
                    page_timeout,
                })
            }
            Err(e) => {
                if let Some(child) = driver.as_mut() {
                    let _ = child.kill().await;
                }
                Err(e)
            }
        }
    }

    /// Close the session and stop the driver process.
    pub async fn shutdown(self) {
        if let Err(e) = self.client.close().await {
            warn!("Failed to close browser session: {e}");
        }
        if let Some(mut driver) = self.driver {
            if let Err(e) = driver.kill().await {
                warn!("Failed to stop WebDriver process: {e}");
            }
        }
        info!("Browser session closed");
    }
}

impl PageSource for Browser {
    async fn fetch(&mut self, url: &str, ready_selector: &str) -> ZzzCalResult<RenderedPage> {
        let secs = self.page_timeout.as_secs();
        debug!(url, "Loading page");

        timeout(self.page_timeout, self.client.goto(url))
            .await
            .map_err(|_| ZzzCalError::FetchTimeout(secs))?
            .map_err(|e| ZzzCalError::Fetch(format!("{url}: {e}")))?;

        let ready = match self
            .client
            .wait()
            .at_most(self.page_timeout)
            .for_element(Locator::Css(ready_selector))
            .await
        {
            Ok(_) => true,
            Err(CmdError::WaitTimeout) => {
                warn!(url, ready_selector, "Page loaded but ready selector never appeared within {secs}s");
                false
            }
            Err(e) => return Err(ZzzCalError::Fetch(format!("{url}: {e}"))),
        };

        let html = self
            .client
            .source()
            .await
            .map_err(|e| ZzzCalError::Fetch(format!("{url}: {e}")))?;
        let final_url = self
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());

        Ok(RenderedPage {
            url: final_url,
            html,
            ready,
        })
    }
}

fn driver_path(config: &WebDriverConfig) -> ZzzCalResult<PathBuf> {
    let binary = PathBuf::from(&config.binary);
    if binary.components().count() > 1 {
        return Ok(binary);
    }
    which::which(&config.binary).map_err(|_| ZzzCalError::DriverNotInstalled(config.binary.clone()))
}

fn spawn_driver(config: &WebDriverConfig) -> ZzzCalResult<Child> {
    let path = driver_path(config)?;
    debug!(driver = %path.display(), port = config.port, "Spawning WebDriver");

    TokioCommand::new(&path)
        .arg(format!("--port={}", config.port))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ZzzCalError::Browser(format!("Failed to spawn {}: {e}", path.display())))
}

/// Session capabilities requesting a headless Chrome with the configured flags.
fn capabilities(config: &WebDriverConfig) -> serde_json::Map<String, Value> {
    let mut chrome_options = json!({ "args": config.browser_args });
    if let Some(binary) = &config.browser_binary {
        chrome_options["binary"] = json!(binary.to_string_lossy());
    }

    let mut caps = serde_json::Map::new();
    caps.insert("browserName".into(), json!("chrome"));
    caps.insert("goog:chromeOptions".into(), chrome_options);
    caps
}

/// Connect to the WebDriver, retrying while a freshly spawned driver boots.
async fn connect(url: &str, caps: serde_json::Map<String, Value>) -> ZzzCalResult<Client> {
    let deadline = Instant::now() + DRIVER_STARTUP_TIMEOUT;

    loop {
        let mut builder = ClientBuilder::native();
        builder.capabilities(caps.clone());

        match builder.connect(url).await {
            Ok(client) => return Ok(client),
            Err(e) if Instant::now() >= deadline => {
                return Err(ZzzCalError::Browser(format!(
                    "Could not start a browser session at {url}: {e}"
                )));
            }
            Err(e) => {
                debug!("WebDriver not ready yet: {e}");
                sleep(DRIVER_POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_carry_browser_args() {
        let config = WebDriverConfig::default();
        let caps = capabilities(&config);

        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless"));
        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert!(caps["goog:chromeOptions"].get("binary").is_none());
    }

    #[test]
    fn test_capabilities_include_browser_binary() {
        let config = WebDriverConfig {
            browser_binary: Some(PathBuf::from("/opt/chromium/chrome")),
            ..WebDriverConfig::default()
        };
        let caps = capabilities(&config);
        assert_eq!(caps["goog:chromeOptions"]["binary"], "/opt/chromium/chrome");
    }

    #[test]
    fn test_missing_driver_binary_is_reported() {
        let config = WebDriverConfig {
            binary: "zzzcal-no-such-driver".into(),
            ..WebDriverConfig::default()
        };
        let err = driver_path(&config).unwrap_err();
        assert!(matches!(err, ZzzCalError::DriverNotInstalled(name) if name == "zzzcal-no-such-driver"));
    }

    #[test]
    fn test_explicit_driver_path_is_used_as_is() {
        let config = WebDriverConfig {
            binary: "/usr/local/bin/chromedriver".into(),
            ..WebDriverConfig::default()
        };
        assert_eq!(
            driver_path(&config).unwrap(),
            PathBuf::from("/usr/local/bin/chromedriver")
        );
    }
}
