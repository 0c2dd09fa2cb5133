//! Errors returned by content generation backends.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum GenAiError {
    #[error("Missing GEMINI_API_KEY for AI generation")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("Access to {model} denied: {message}")]
    PermissionDenied { model: String, message: String },
    #[error("AI API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Empty response from AI")]
    EmptyResponse,
    #[error("No image data in AI response")]
    NoImage,
    #[error("Failed to parse AI response: {0}")]
    Parse(String),
    #[error("AI request timed out after {0:?}")]
    Timeout(Duration),
}

impl GenAiError {
    /// 403 / `PERMISSION_DENIED`: the key lacks access to a model or tool.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, GenAiError::PermissionDenied { .. })
    }
}
