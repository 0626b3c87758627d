use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Provider(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Provider not configured: {0}")]
    Config(String),
}

impl From<ProviderError> for common::Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Config(message) => common::Error::BadRequest(message),
            other => common::Error::Upstream(other.to_string()),
        }
    }
}
