//! Signal Search banners as a calendar.
//!
//! Fetches the publisher's Zenless Zone Zero banner announcements through a
//! headless browser, extracts each banner's agents and time window, and
//! writes them as an iCalendar file:
//! - `fetch`: rendered pages behind the `PageSource` trait
//! - `extract`: selectors and text patterns for the publisher's markup
//! - `versions`: start dates of "after the X.Y update" banners
//! - `normalize`: raw times to UTC events, merging shared windows
//! - `calendar` / `ics`: the document and its RFC 5545 form
//! - `output`: atomic writes and change summaries
//! - `pipeline`: the whole run

pub mod calendar;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod extract;
pub mod fetch;
pub mod ics;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod versions;

pub use error::{ZzzCalError, ZzzCalResult};
