//! Failure taxonomy for calls to the completion service.
//!
//! A missing credential is not an error and has no variant here; `LLMClient`
//! answers it with placeholder content. Every variant below is converted to
//! in-band content before it reaches a caller of `LLMClient`.

use http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Connection refused, DNS failure, timeout, unreadable body.
    #[error("{0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("API request failed: {0}")]
    Status(StatusCode),

    /// The service answered, but not with the payload we expect.
    #[error("Malformed response: {0}")]
    Contract(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::Transport(err.to_string())
    }
}
