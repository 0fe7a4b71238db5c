//! Error types for zzzcal.

use thiserror::Error;

/// Errors that can occur while generating the calendar.
#[derive(Error, Debug)]
pub enum ZzzCalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Page did not render within {0}s")]
    FetchTimeout(u64),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("WebDriver binary '{0}' not found in PATH")]
    DriverNotInstalled(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Version lookup error: {0}")]
    VersionLookup(String),

    #[error("ICS generation error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for zzzcal operations.
pub type ZzzCalResult<T> = Result<T, ZzzCalError>;
