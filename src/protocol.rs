//! Messages exchanged between the extractor, the coordinator and the
//! presenter. Every actor boundary speaks one of these shapes and nothing
//! else crosses it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Failure;

/// What every waiter of an analysis eventually receives, exactly once.
pub type Outcome = std::result::Result<AnalysisResult, Failure>;

/// A text sample taken from a page, ready to be assessed.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub text: String,
    pub source_url: String,
    pub requested_at: DateTime<Utc>,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source_url: source_url.into(),
            requested_at: Utc::now(),
        }
    }

    /// Number of characters left once surrounding whitespace is removed.
    pub fn meaningful_chars(&self) -> usize {
        self.text.trim().chars().count()
    }

    /// Whether the text falls below `min_chars`. Blank text is always too short.
    pub fn is_too_short(&self, min_chars: usize) -> bool {
        self.meaningful_chars() < min_chars.max(1)
    }

    /// Copy of this request whose text is trimmed and holds at most `max_chars` characters.
    pub fn capped(&self, max_chars: usize) -> Self {
        Self {
            text: truncate_chars(self.text.trim(), max_chars).to_string(),
            source_url: self.source_url.clone(),
            requested_at: self.requested_at,
        }
    }
}

/// Verdict returned by the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub rating: String,
    pub score: Option<f64>,
    pub source_url: Option<String>,
}

/// Inbound coordinator message, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CoordinatorRequest {
    Analyze {
        text: String,
        #[serde(rename = "sourceUrl", alias = "url", default)]
        source_url: String,
    },
}

/// Reply to a [`CoordinatorRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Failure>,
}

impl From<Outcome> for CoordinatorResponse {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(error) => Self {
                success: false,
                data: None,
                error: Some(error),
            },
        }
    }
}

/// Status updates pushed to a presenter surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PresenterMessage {
    Loading,
    Done { data: AnalysisResult },
    Error { error: String },
}

impl From<Outcome> for PresenterMessage {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Ok(data) => PresenterMessage::Done { data },
            Err(failure) => PresenterMessage::Error {
                error: failure.user_message().to_string(),
            },
        }
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
