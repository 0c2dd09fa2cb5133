//! Structured results of the generation steps.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use autoblog_types::GenerationSettings;

use crate::error::GenAiError;

/// Category used when the model does not classify the article.
pub const DEFAULT_CATEGORY: &str = "عام";

/// Excerpt used when the model omits one ("article summary unavailable").
pub const DEFAULT_EXCERPT: &str = "ملخص المقال غير متوفر.";

/// Result of trend analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicPick {
    pub topic: String,
    #[serde(default)]
    pub analysis: String,
}

impl TopicPick {
    /// Topic derived from the niche alone, for replies without usable JSON.
    pub fn fallback(settings: &GenerationSettings) -> Self {
        Self {
            topic: settings.niche.clone(),
            analysis: "Generated topic.".to_string(),
        }
    }

    /// Read `{topic, analysis}`, falling back to the niche when `topic` is blank.
    pub fn from_value(value: &Value, settings: &GenerationSettings) -> Self {
        let topic = str_field(value, "topic");
        match topic {
            Some(topic) => Self {
                topic,
                analysis: str_field(value, "analysis").unwrap_or_default(),
            },
            None => Self::fallback(settings),
        }
    }
}

/// A written article, before it becomes a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    /// HTML body.
    pub content: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub category: String,
    /// English prompt for the cover image.
    pub image_prompt: String,
}

impl ArticleDraft {
    /// Normalize a model reply, filling in every missing field.
    pub fn from_value(
        value: &Value,
        topic: &str,
        settings: &GenerationSettings,
    ) -> Result<Self, GenAiError> {
        if !value.is_object() {
            return Err(GenAiError::Parse(
                "AI response was not a valid JSON object structure".into(),
            ));
        }

        let tags = match value.get("tags") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            _ => vec![DEFAULT_CATEGORY.to_string()],
        };

        Ok(Self {
            title: str_field(value, "title").unwrap_or_else(|| topic.to_string()),
            content: str_field(value, "content").unwrap_or_else(|| format!("<p>{topic}</p>")),
            excerpt: str_field(value, "excerpt").unwrap_or_else(|| DEFAULT_EXCERPT.to_string()),
            tags,
            category: str_field(value, "category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            image_prompt: str_field(value, "imagePrompt")
                .or_else(|| str_field(value, "image_prompt"))
                .unwrap_or_else(|| {
                    format!(
                        "A professional, cinematic image representing {topic}, style: {}",
                        settings.image_style
                    )
                }),
        })
    }
}

/// Non-blank string field.
fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
