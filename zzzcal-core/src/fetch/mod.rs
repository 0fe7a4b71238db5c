//! Page fetching.
//!
//! The publisher renders its pages client-side, so the production source is
//! a headless browser ([`Browser`]). The pipeline only sees [`PageSource`],
//! which lets tests feed it fixture pages.

mod browser;

pub use browser::Browser;

use crate::error::ZzzCalResult;

/// Page content as rendered when the fetch finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// URL the page ended up at (after redirects)
    pub url: String,
    pub html: String,
    /// Whether the ready selector appeared before the timeout. A page that
    /// loaded but never showed it is still returned, so callers can treat
    /// it as empty rather than failed.
    pub ready: bool,
}

/// Something that can load a URL and hand back its rendered HTML.
#[allow(async_fn_in_trait)]
pub trait PageSource {
    /// Load `url` and wait until an element matching `ready_selector` exists.
    ///
    /// Failing to load the page at all is an error. Waiting out the timeout
    /// without the selector appearing is not: the page comes back with
    /// `ready: false`.
    async fn fetch(&mut self, url: &str, ready_selector: &str) -> ZzzCalResult<RenderedPage>;
}
