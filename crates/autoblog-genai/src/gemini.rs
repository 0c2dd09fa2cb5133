//! Gemini `generateContent` client.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use autoblog_config::GeminiConfig;
use autoblog_types::{GenerationSettings, ImageQuality};

use crate::error::GenAiError;
use crate::extract::extract_json;
use crate::prompts;
use crate::types::{ArticleDraft, TopicPick};
use crate::ContentGenerator;

/// Gemini REST API client.
pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    text_model: String,
    image_model: String,
    pro_image_model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Build a client from config. A missing API key is not an error here;
    /// every call reports [`GenAiError::MissingApiKey`] instead.
    pub fn new(config: &GeminiConfig) -> Result<Self, GenAiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            api_key: config.resolve_api_key(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
            pro_image_model: config.pro_image_model.clone(),
            client,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str, api_key: &str) -> Result<Url, GenAiError> {
        let mut url = Url::parse(&format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url
        ))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url)
    }

    async fn generate(&self, model: &str, body: &Value) -> Result<Value, GenAiError> {
        let api_key = self.api_key.as_deref().ok_or(GenAiError::MissingApiKey)?;

        let resp = self
            .client
            .post(self.endpoint(model, api_key)?)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(api_error(model, status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| GenAiError::Parse(format!("{model} reply is not JSON: {e}")))
    }

    async fn generate_text(&self, prompt: &str, with_search: bool) -> Result<String, GenAiError> {
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if with_search {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        let json = self.generate(&self.text_model, &body).await?;
        response_text(&json).ok_or(GenAiError::EmptyResponse)
    }

    async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        size: Option<ImageQuality>,
    ) -> Result<String, GenAiError> {
        let mut image_config = json!({ "aspectRatio": "16:9" });
        if let Some(size) = size {
            image_config["imageSize"] = json!(size.as_str());
        }
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": image_config,
            },
        });
        let json = self.generate(model, &body).await?;
        response_image(&json).ok_or(GenAiError::NoImage)
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn analyze_topic(&self, settings: &GenerationSettings) -> Result<TopicPick, GenAiError> {
        let prompt = prompts::topic_prompt(settings);

        let text = match self.generate_text(&prompt, true).await {
            Ok(text) => text,
            Err(e) if e.is_permission_denied() => {
                warn!("Search tool access denied, running trend analysis without it");
                let fallback = format!("{prompt}{}", prompts::NO_SEARCH_NOTE);
                self.generate_text(&fallback, false).await?
            }
            Err(e) => return Err(e),
        };

        match extract_json(&text) {
            Ok(value) => Ok(TopicPick::from_value(&value, settings)),
            Err(e) => {
                debug!("Topic reply had no usable JSON ({e}), using niche as topic");
                Ok(TopicPick::fallback(settings))
            }
        }
    }

    async fn write_article(
        &self,
        topic: &str,
        settings: &GenerationSettings,
    ) -> Result<ArticleDraft, GenAiError> {
        let prompt = prompts::article_prompt(topic, settings);
        let text = self.generate_text(&prompt, false).await?;
        let value = extract_json(&text)?;
        ArticleDraft::from_value(&value, topic, settings)
    }

    async fn render_image(
        &self,
        prompt: &str,
        quality: ImageQuality,
    ) -> Result<String, GenAiError> {
        if quality == ImageQuality::Standard {
            return self.generate_image(&self.image_model, prompt, None).await;
        }

        match self
            .generate_image(&self.pro_image_model, prompt, Some(quality))
            .await
        {
            Err(e) if e.is_permission_denied() => {
                warn!(
                    model = %self.pro_image_model,
                    "Pro image model access denied, falling back to {}", self.image_model
                );
                self.generate_image(&self.image_model, prompt, None).await
            }
            other => other,
        }
    }
}

/// Map a non-success reply to an error, recognizing permission denials.
///
/// Gateways in front of the API answer with HTML, so `body` need not be JSON.
fn api_error(model: &str, status: StatusCode, body: &str) -> GenAiError {
    let json: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let message = match json.pointer("/error/message").and_then(|m| m.as_str()) {
        Some(message) => message.to_string(),
        None if !body.trim().is_empty() => body.trim().chars().take(200).collect(),
        None => "Unknown error".to_string(),
    };
    let api_status = json.pointer("/error/status").and_then(|s| s.as_str());

    if status == StatusCode::FORBIDDEN || api_status == Some("PERMISSION_DENIED") {
        GenAiError::PermissionDenied {
            model: model.to_string(),
            message,
        }
    } else {
        GenAiError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(json: &Value) -> Option<String> {
    let parts = json.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

/// First inline image of any candidate, as a `data:` URI.
fn response_image(json: &Value) -> Option<String> {
    json.get("candidates")?
        .as_array()?
        .iter()
        .filter_map(|c| c.pointer("/content/parts").and_then(|p| p.as_array()))
        .flatten()
        .find_map(|part| {
            let inline = part.get("inlineData")?;
            let mime = inline.get("mimeType")?.as_str()?;
            let data = inline.get("data")?.as_str()?;
            Some(format!("data:{mime};base64,{data}"))
        })
}
