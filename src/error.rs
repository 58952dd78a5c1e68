use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::api::response;

/// Why an analysis could not produce a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The remote call did not settle within the configured bound.
    Timeout,
    /// The classifier could not be reached.
    NetworkError,
    /// The classifier answered, but not with something usable.
    BadResponse,
    /// Too little text to be worth a round trip. Never leaves the process.
    EmptyInput,
}

impl FailureKind {
    /// Message shown on the presenter surface for this kind of failure.
    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::Timeout => {
                "The credibility service took too long to respond. Try scanning again."
            }
            FailureKind::NetworkError => {
                "Couldn't reach the credibility service. Check your connection and try again."
            }
            FailureKind::BadResponse => {
                "The credibility service sent back an answer that couldn't be read."
            }
            FailureKind::EmptyInput => "Not enough readable text here to check.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Timeout => "Timeout",
            FailureKind::NetworkError => "NetworkError",
            FailureKind::BadResponse => "BadResponse",
            FailureKind::EmptyInput => "EmptyInput",
        };
        f.write_str(name)
    }
}

/// Typed failure carried back to every waiter of an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn empty_input(min_chars: usize) -> Self {
        Self::new(
            FailureKind::EmptyInput,
            format!("text must contain at least {} characters", min_chars),
        )
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("classifier did not respond within {:?}", after),
        )
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl From<reqwest::Error> for Failure {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FailureKind::Timeout
        } else if err.is_decode() {
            FailureKind::BadResponse
        } else if let Some(status) = err.status() {
            return Failure::new(
                FailureKind::BadResponse,
                format!("classifier returned HTTP {}", status),
            );
        } else {
            FailureKind::NetworkError
        };
        Failure::new(kind, err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Failed to fetch page: {0}")]
    FetchError(String),

    #[error("Error parsing content: {0}")]
    ParseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Analysis failed: {0}")]
    Analysis(#[from] Failure),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::FetchError(_) => StatusCode::BAD_REQUEST,
            AppError::ParseError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Analysis(failure) => match failure.kind {
                FailureKind::EmptyInput => StatusCode::UNPROCESSABLE_ENTITY,
                FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::NetworkError | FailureKind::BadResponse => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Analysis(failure) => failure.user_message().to_string(),
            other => other.to_string(),
        };

        response::error::<()>(status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
