use thiserror::Error;

/// Errors from the trakt API client.
#[derive(Debug, Error)]
pub enum TraktError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("trakt rejected the access token")]
    Unauthorized,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl TraktError {
    /// Whether retrying the same request can never succeed.
    ///
    /// Client errors are permanent, except request timeouts and rate limiting.
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::Api { status, .. } => (400..500).contains(status) && *status != 408 && *status != 429,
            Self::Parse(_) => true,
            Self::Http(_) | Self::Unauthorized => false,
        }
    }
}
