use thiserror::Error;

/// Login failures. The pipeline logs these and continues unauthenticated.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("login timed out after {0}s")]
    Timeout(u64),

    #[error("login failed: {0}")]
    Failed(String),
}

/// Failures that abort link discovery for one page.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("timed out after {secs}s waiting for content on {url}")]
    Timeout { url: String, secs: u64 },

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("invalid page identifier '{0}'")]
    InvalidPage(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Failures fetching a single document. Fatal to that one event.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("status code error: {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("browser fetch of {url} failed: {message}")]
    Browser { url: String, message: String },
}

/// A structured-data block that could not be decoded. Skipped per block.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("structured data block {index} is not valid JSON: {source}")]
    Json {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("no structured data records found")]
    NoRecords,

    #[error("no record with an event type marker among {0} records")]
    NoEventRecord(usize),
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to open session: {0}")]
    SessionOpen(String),

    #[error("Failed to close session: {0}")]
    Teardown(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
