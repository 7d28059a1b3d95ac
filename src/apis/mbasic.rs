use crate::constants::{CONSENT_FORM_BODY, MBASIC_SOURCE};
use crate::discovery::{collect_event_links, page_url, EventsView};
use crate::error::{DiscoveryError, FetchError, Result, ScraperError};
use crate::types::{EventLink, EventLinkSet, EventSource};
use reqwest::cookie::Jar;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Lightweight source: plain HTTP against the basic mobile site.
///
/// Only sees what the first HTML response contains, since nothing here can
/// click "See more". Cookies live in an in-memory jar for the session's
/// lifetime and consent is given once before the first real request.
pub struct MbasicSource {
    client: reqwest::Client,
    jar: Arc<Jar>,
    base: Url,
    approved_cookies: bool,
}

impl MbasicSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| ScraperError::Config(format!("invalid mbasic base url '{base_url}': {e}")))?;
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| ScraperError::SessionOpen(e.to_string()))?;

        Ok(Self {
            client,
            jar,
            base,
            approved_cookies: false,
        })
    }

    pub fn cookie_jar(&self) -> &Arc<Jar> {
        &self.jar
    }

    fn consent_url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path("/cookie/consent/");
        let next = format!("{}/", self.base.as_str().trim_end_matches('/'));
        url.query_pairs_mut().clear().append_pair("next_uri", &next);
        url
    }

    /// Accept essential cookies once per session to get baseline cookies.
    async fn ensure_consent(&mut self) -> std::result::Result<(), FetchError> {
        if self.approved_cookies {
            return Ok(());
        }
        let url = self.consent_url();
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(CONSENT_FORM_BODY)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        if !response.status().is_success() {
            warn!(status = response.status().as_u16(), "cookie consent was not accepted");
        }
        self.approved_cookies = true;
        debug!("cookie consent sent");
        Ok(())
    }

    #[instrument(skip(self, url), fields(url = %url))]
    pub async fn get(&mut self, url: &Url) -> std::result::Result<String, FetchError> {
        self.ensure_consent().await?;

        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url.clone()).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(transport)?;
        if let Some(title) = page_title(&body) {
            debug!(%title, "page title");
        }
        Ok(body)
    }
}

fn page_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    Html::parse_document(html)
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
}

#[async_trait::async_trait]
impl EventSource for MbasicSource {
    fn source_name(&self) -> &'static str {
        MBASIC_SOURCE
    }

    #[instrument(skip(self))]
    async fn discover_event_links(
        &mut self,
        page: &str,
    ) -> std::result::Result<EventLinkSet, DiscoveryError> {
        let url = page_url(&self.base, page, EventsView::Query)?;
        let html = self.get(&url).await?;
        let links = collect_event_links(&html, None, &url, &self.base);
        info!("Found {} event links on {}", links.len(), url);
        Ok(links)
    }

    async fn fetch_event_page(
        &mut self,
        link: &EventLink,
    ) -> std::result::Result<String, FetchError> {
        self.get(link.url()).await
    }

    async fn close(self: Box<Self>) -> Result<()> {
        debug!(source = MBASIC_SOURCE, "closing http session");
        Ok(())
    }
}
