use std::io;

/// Error taxonomy for the analysis pipeline.
///
/// Only `InvalidUrl`, `UnsupportedScheme` and `Internal` escape a scan;
/// network failures are absorbed into partial observations and model
/// failures degrade the verdict instead of aborting it.
#[derive(thiserror::Error, Debug)]
pub enum HawkError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout")]
    Timeout,
    #[error("model error: {0}")]
    Model(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HawkError {
    /// True when the error maps to a client-side 4xx rather than a 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HawkError::InvalidUrl(_) | HawkError::UnsupportedScheme(_)
        )
    }
}

impl From<reqwest::Error> for HawkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HawkError::Timeout
        } else {
            HawkError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for HawkError {
    fn from(err: serde_json::Error) -> Self {
        HawkError::Internal(err.to_string())
    }
}
