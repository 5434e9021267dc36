use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog transport error: {0}")]
    Transport(String),
    #[error("catalog rejected the access token: {0}")]
    Auth(String),
    #[error("catalog resource not found: {0}")]
    NotFound(String),
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog response could not be decoded: {0}")]
    Decode(String),
    #[error("invalid catalog request: {0}")]
    InvalidInput(String),
}

impl CatalogError {
    /// Network failures, timeouts, throttling and server errors.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Maps a non-success HTTP status to the error taxonomy.
    pub fn from_status(status: u16, path: &str, body: &str) -> Self {
        let preview: String = body.chars().take(300).collect();
        match status {
            401 | 403 => Self::Auth(format!("HTTP {status} on {path}")),
            404 => Self::NotFound(path.to_string()),
            408 | 429 | 500..=599 => Self::Transport(format!("HTTP {status} on {path}: {preview}")),
            _ => Self::Status { status, body: preview },
        }
    }
}
