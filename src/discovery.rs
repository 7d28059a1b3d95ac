//! Link discovery shared by both sources: picking event links out of a
//! document and deciding when an incrementally loading page has settled.

use crate::constants::EVENT_PATH_PATTERN;
use crate::error::DiscoveryError;
use crate::types::{EventLink, EventLinkSet};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::debug;
use url::Url;

static EVENT_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(EVENT_PATH_PATTERN).expect("event path pattern is valid"));

static ANCHOR_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("anchor selector is valid"));

/// Resolve `href` against the page it was found on and return its path if it
/// points at an event. Query string and fragment are dropped.
pub fn event_path_from_href(href: &str, page_url: &Url) -> Option<String> {
    let resolved = match page_url.join(href.trim()) {
        Ok(u) => u,
        Err(e) => {
            debug!(href, error = %e, "skipping malformed href");
            return None;
        }
    };
    let path = resolved.path();
    if EVENT_PATH_RE.is_match(path) {
        Some(path.to_string())
    } else {
        None
    }
}

/// Scan the anchors of `html` for event links.
///
/// With a `container` selector only anchors inside matching elements count;
/// when the container is missing the whole document is scanned. Links are
/// rebuilt on `link_base`.
pub fn collect_event_links(
    html: &str,
    container: Option<&str>,
    page_url: &Url,
    link_base: &Url,
) -> EventLinkSet {
    let document = Html::parse_document(html);
    let mut links = EventLinkSet::new();
    let mut push = |href: &str| {
        if let Some(link) =
            event_path_from_href(href, page_url).and_then(|path| EventLink::new(path, link_base))
        {
            links.insert(link);
        }
    };

    let container_selector = container.and_then(|c| Selector::parse(c).ok());
    let mut scoped = false;
    if let Some(selector) = &container_selector {
        for root in document.select(selector) {
            scoped = true;
            for anchor in root.select(&ANCHOR_SELECTOR) {
                if let Some(href) = anchor.value().attr("href") {
                    push(href);
                }
            }
        }
    }
    if !scoped {
        for anchor in document.select(&ANCHOR_SELECTOR) {
            if let Some(href) = anchor.value().attr("href") {
                push(href);
            }
        }
    }
    links
}

/// Build the URL of a page's event listing. Absolute URLs pass through.
pub fn page_url(base: &Url, page: &str, events_view: EventsView) -> Result<Url, DiscoveryError> {
    let page = page.trim();
    if page.starts_with("http://") || page.starts_with("https://") {
        return Url::parse(page).map_err(|_| DiscoveryError::InvalidPage(page.to_string()));
    }
    let handle = page.trim_matches('/');
    if handle.is_empty() || handle.contains(['?', '#', ' ']) {
        return Err(DiscoveryError::InvalidPage(page.to_string()));
    }
    let relative = match events_view {
        EventsView::Path => format!("/{handle}/events"),
        EventsView::Query => format!("/{handle}?v=events"),
    };
    base.join(&relative)
        .map_err(|_| DiscoveryError::InvalidPage(page.to_string()))
}

/// How a site addresses a page's event listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventsView {
    /// `/<page>/events`
    Path,
    /// `/<page>?v=events`
    Query,
}

/// What the reveal-more script reports after each round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RevealObservation {
    pub present: bool,
    pub anchors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleReason {
    ControlGone,
    Stable,
    MaxRounds,
}

impl SettleReason {
    /// Whether the round that settled also clicked the reveal control, so its
    /// content may still be arriving.
    pub fn clicked_last_round(self) -> bool {
        !matches!(self, SettleReason::ControlGone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settle {
    Continue,
    Settled(SettleReason),
}

/// Decides when lazily loaded content has stopped growing.
///
/// Settled once the reveal control is gone, the anchor count repeats on two
/// consecutive checks, or `max_rounds` observations have been made.
#[derive(Debug)]
pub struct SettleTracker {
    max_rounds: u32,
    rounds: u32,
    last_anchors: Option<usize>,
}

impl SettleTracker {
    pub fn new(max_rounds: u32) -> Self {
        Self {
            max_rounds: max_rounds.max(1),
            rounds: 0,
            last_anchors: None,
        }
    }

    pub fn observe(&mut self, observation: RevealObservation) -> Settle {
        self.rounds += 1;
        let previous = self.last_anchors.replace(observation.anchors);

        if !observation.present {
            return Settle::Settled(SettleReason::ControlGone);
        }
        if previous == Some(observation.anchors) {
            return Settle::Settled(SettleReason::Stable);
        }
        if self.rounds >= self.max_rounds {
            return Settle::Settled(SettleReason::MaxRounds);
        }
        Settle::Continue
    }

    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}
