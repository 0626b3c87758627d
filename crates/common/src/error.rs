//! Unified error type for the SwainOS backend.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Validation(String),

    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Machine-readable code rendered in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::BadRequest(_) => "bad_request",
            Error::Validation(_) => "validation_error",
            Error::Upstream(_) => "upstream_error",
            Error::Json(_) | Error::Config(_) | Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP status the API layer maps this error onto.
    pub fn status(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::BadRequest(_) => 400,
            Error::Validation(_) => 422,
            Error::Upstream(_) => 502,
            Error::Json(_) | Error::Config(_) | Error::Internal(_) => 500,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_and_code_mapping() {
        assert_eq!(Error::not_found("x").status(), 404);
        assert_eq!(Error::not_found("x").code(), "not_found");
        assert_eq!(Error::bad_request("x").status(), 400);
        assert_eq!(Error::validation("x").code(), "validation_error");
        assert_eq!(Error::Upstream("boom".into()).status(), 502);
        assert_eq!(Error::Config("missing".into()).code(), "internal_error");
    }

    #[test]
    fn test_display_keeps_message() {
        let err = Error::bad_request("Unsupported time window format");
        assert_eq!(err.to_string(), "Unsupported time window format");
    }
}
