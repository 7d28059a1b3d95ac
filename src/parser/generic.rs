use super::extract_structured_records;
use crate::error::FetchError;
use crate::types::RawStructuredRecord;
use std::time::Duration;
use tracing::{debug, instrument};

/// Session-less structured data fetcher.
///
/// Fetches a URL with a plain client (no cookies, no login) and runs the
/// JSON-LD extractor over the response. Used for detail pages when links
/// were discovered through the browser.
#[derive(Clone)]
pub struct GenericExtractor {
    client: reqwest::Client,
}

impl GenericExtractor {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Result<Vec<RawStructuredRecord>, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(transport)?;
        debug!(bytes = body.len(), "fetched detail page");
        Ok(extract_structured_records(&body))
    }
}
