use thiserror::Error;

/// Failure of a single backend call. Never crosses the `MusicProvider`
/// boundary: adapters log it and degrade to an absent value.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("credential rejected by backend")]
    Unauthorized,

    #[error("backend returned no content")]
    NoContent,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("backend error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl FetchError {
    pub fn from_status(code: u16) -> Self {
        match code {
            401 => Self::Unauthorized,
            204 => Self::NoContent,
            _ => Self::Status(code),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, FetchError::Unauthorized)
    }
}
