//! autoblog-genai: Topic analysis, article writing and cover images.
//!
//! [`ContentGenerator`] is the seam the autopilot depends on; [`GeminiClient`]
//! implements it over the Gemini `generateContent` REST API.

pub mod error;
pub mod extract;
pub mod gemini;
pub mod prompts;
pub mod types;

use async_trait::async_trait;

use autoblog_types::{GenerationSettings, ImageQuality};

pub use error::GenAiError;
pub use gemini::GeminiClient;
pub use types::{ArticleDraft, TopicPick};

/// Trait for content generation backends.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Pick a trending topic for the configured niche and keywords.
    async fn analyze_topic(&self, settings: &GenerationSettings) -> Result<TopicPick, GenAiError>;
    /// Write a full article about `topic`.
    async fn write_article(
        &self,
        topic: &str,
        settings: &GenerationSettings,
    ) -> Result<ArticleDraft, GenAiError>;
    /// Render a cover image, returning its URI (usually a `data:` URI).
    async fn render_image(&self, prompt: &str, quality: ImageQuality)
    -> Result<String, GenAiError>;
}

/// Stock image used when rendering fails. Same seed, same image.
pub fn placeholder_image_url(seed: &str) -> String {
    format!("https://picsum.photos/seed/{seed}/800/450")
}
