//! Errors raised by row store clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RowStoreError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Row store returned {status} for {table}: {body}")]
    Status {
        status: u16,
        table: String,
        body: String,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Row store not configured: {0}")]
    Config(String),
}

impl From<RowStoreError> for common::Error {
    fn from(err: RowStoreError) -> Self {
        match err {
            RowStoreError::Config(message) => common::Error::Config(message),
            other => common::Error::Upstream(other.to_string()),
        }
    }
}
