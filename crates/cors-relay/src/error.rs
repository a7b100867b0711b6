//! Relay failure type and its mapping onto caller-facing responses.

use std::error::Error as _;

use axum::http::StatusCode;

/// Everything that can stop a relay before an upstream response is returned.
///
/// Upstream 4xx/5xx answers are not errors; they are relayed verbatim.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The inbound request carried no usable `url` query parameter.
    #[error("Error: The \"url\" query parameter is required.")]
    MissingUrl,

    /// The `url` parameter could not be parsed as an absolute URL.
    #[error("invalid target URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Building, sending, or reading the outbound request failed.
    #[error("{}", describe(.0))]
    Upstream(#[from] reqwest::Error),
}

impl RelayError {
    /// Status code sent back to the caller for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingUrl => StatusCode::BAD_REQUEST,
            RelayError::InvalidUrl(_) | RelayError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Plain-text body sent back to the caller.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::MissingUrl => self.to_string(),
            _ => format!("Server error: {self}"),
        }
    }
}

/// reqwest's top-level message ("error sending request for url ...") hides
/// the interesting part, so append the source chain.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
