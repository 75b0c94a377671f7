use thiserror::Error;

/// Resolution-level failures. Any of these aborts the whole run.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Failed to fetch sitemap {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Failed to parse sitemap {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("Sitemap {url} is nested deeper than the maximum depth of {max_depth}")]
    DepthExceeded { url: String, max_depth: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Failure of a single HTTP exchange, before any status code is known.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timeout")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedirectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("exceeded {limit} redirects")]
    TooManyRedirects { limit: usize },
}

pub type Result<T> = std::result::Result<T, ScanError>;
