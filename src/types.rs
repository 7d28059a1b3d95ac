use crate::error::{AuthError, DiscoveryError, FetchError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// One decoded JSON-LD object, untyped
pub type RawStructuredRecord = serde_json::Map<String, serde_json::Value>;

/// A link to one event detail page.
///
/// `path` is the dedup key: scheme, host, query and fragment are gone.
/// `url` is the same path rebuilt on the host of the session that found it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLink {
    path: String,
    url: Url,
}

impl EventLink {
    pub fn new(path: impl Into<String>, base: &Url) -> Option<Self> {
        let path = path.into();
        let url = base.join(&path).ok()?;
        Some(Self { path, url })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Event links in first-seen order, unique by normalized path
#[derive(Debug, Clone, Default)]
pub struct EventLinkSet {
    links: Vec<EventLink>,
    seen: HashSet<String>,
}

impl EventLinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when a link with the same path is already present.
    pub fn insert(&mut self, link: EventLink) -> bool {
        if !self.seen.insert(link.path.clone()) {
            return false;
        }
        self.links.push(link);
        true
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventLink> {
        self.links.iter()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.path()).collect()
    }
}

impl IntoIterator for EventLinkSet {
    type Item = EventLink;
    type IntoIter = std::vec::IntoIter<EventLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventLinkSet {
    type Item = &'a EventLink;
    type IntoIter = std::slice::Iter<'a, EventLink>;

    fn into_iter(self) -> Self::IntoIter {
        self.links.iter()
    }
}

impl FromIterator<EventLink> for EventLinkSet {
    fn from_iter<T: IntoIterator<Item = EventLink>>(iter: T) -> Self {
        let mut set = Self::new();
        for link in iter {
            set.insert(link);
        }
        set
    }
}

/// A normalized calendar event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Digit run taken from `source_url`; empty when it has none
    pub id: String,
    pub name: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
    /// `url` as published in the structured data, possibly empty
    pub url: String,
    pub source_url: String,
    pub stamp: DateTime<Utc>,
}

impl Event {
    /// URL to publish in the feed: the record's own, else where we found it.
    pub fn feed_url(&self) -> &str {
        if self.url.is_empty() {
            &self.source_url
        } else {
            &self.url
        }
    }
}

/// A session that can find event links on a page and fetch event pages.
///
/// Implementations own their browser or HTTP client exclusively. `close`
/// consumes the source so it can only run once.
#[async_trait::async_trait]
pub trait EventSource: Send {
    /// Name used in logs and metrics
    fn source_name(&self) -> &'static str;

    /// Best-effort login. Sources without a login surface accept and do nothing.
    async fn login(
        &mut self,
        _username: &str,
        _password: &str,
        _timeout: Duration,
    ) -> std::result::Result<(), AuthError> {
        tracing::debug!(source = self.source_name(), "login not supported, skipping");
        Ok(())
    }

    async fn discover_event_links(
        &mut self,
        page: &str,
    ) -> std::result::Result<EventLinkSet, DiscoveryError>;

    /// Raw HTML of one event detail page
    async fn fetch_event_page(
        &mut self,
        link: &EventLink,
    ) -> std::result::Result<String, FetchError>;

    async fn close(self: Box<Self>) -> Result<()>;
}
