//! # Image Context
//!
//! One vision call over an optional uploaded image (a lab poster, a job
//! posting screenshot). The result is advisory; callers absorb failures.

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::http::ClientHandle;
use crate::tools::json_extract::extract_json_block;

/// OpenAI-compatible Gemini endpoint used when no base URL is configured
pub const DEFAULT_VISION_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";

const IMAGE_PROMPT: &str = "Analyze this image as supporting context for a PhD application outreach workflow. \
Extract concise, actionable information only.\n\n\
Return strict JSON with this shape:\n\
{\n  \"available\": true,\n  \"summary\": \"1-2 sentence summary\",\n  \
\"visualClues\": [\"clue 1\", \"clue 2\"],\n  \
\"possibleResearchSignals\": [\"signal 1\", \"signal 2\"],\n  \
\"confidence\": \"high|medium|low\"\n}\n";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageContext {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub visual_clues: Vec<String>,
    #[serde(default)]
    pub possible_research_signals: Vec<String>,
    #[serde(default)]
    pub confidence: String,
    #[serde(default)]
    pub filename: Option<String>,
}

/// Where and how to call the vision model
#[derive(Debug, Clone)]
pub struct VisionEndpoint {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl VisionEndpoint {
    /// Key from `GEMINI_API_KEY`, then `OPENAI_API_KEY`; none means no vision.
    pub fn from_env(base_url: Option<&str>, model: &str) -> Option<Self> {
        let api_key = ["GEMINI_API_KEY", "OPENAI_API_KEY"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|v| !v.trim().is_empty())?;
        Some(Self {
            base_url: base_url.unwrap_or(DEFAULT_VISION_BASE_URL).to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

pub fn data_url(bytes: &[u8], content_type: Option<&str>) -> String {
    let content_type = content_type
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("image/png");
    format!(
        "data:{};base64,{}",
        content_type,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn vision_payload(model: &str, image_url: &str) -> Value {
    json!({
        "model": model,
        "temperature": 0.1,
        "response_format": {"type": "json_object"},
        "messages": [{
            "role": "user",
            "content": [
                {"type": "text", "text": IMAGE_PROMPT},
                {"type": "image_url", "image_url": {"url": image_url}}
            ]
        }]
    })
}

/// Pull the model's JSON answer out of a chat completion response.
pub fn parse_vision_response(response: &Value, filename: Option<&str>) -> Result<ImageContext> {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or("{}");
    let value = extract_json_block(content)?;
    let mut context: ImageContext =
        serde_json::from_value(value).context("Vision answer has an unexpected shape")?;
    context.available = true;
    context.filename = filename.map(str::to_string);
    Ok(context)
}

pub struct ImageAnalyzer {
    http: Arc<ClientHandle>,
    timeout: Duration,
}

impl ImageAnalyzer {
    pub fn new(http: Arc<ClientHandle>, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    pub async fn analyze(
        &self,
        endpoint: &VisionEndpoint,
        bytes: &[u8],
        content_type: Option<&str>,
        filename: Option<&str>,
    ) -> Result<ImageContext> {
        if bytes.is_empty() {
            return Ok(ImageContext::default());
        }
        let payload = vision_payload(&endpoint.model, &data_url(bytes, content_type));
        let response = self
            .http
            .post_json(
                &endpoint.chat_completions_url(),
                &endpoint.api_key,
                &payload,
                self.timeout,
            )
            .await?;
        parse_vision_response(&response, filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_url_defaults_to_png() {
        assert_eq!(data_url(b"hi", None), "data:image/png;base64,aGk=");
        assert_eq!(data_url(b"hi", Some("image/jpeg")), "data:image/jpeg;base64,aGk=");
    }

    #[test]
    fn test_vision_payload_shape() {
        let payload = vision_payload("gemini-2.0-flash", "data:image/png;base64,AA==");
        assert_eq!(payload["model"], "gemini-2.0-flash");
        assert_eq!(payload["response_format"]["type"], "json_object");
        assert_eq!(
            payload["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AA=="
        );
    }

    #[test]
    fn test_parse_vision_response_marks_available() {
        let response = json!({
            "choices": [{"message": {"content":
                "Here you go: {\"summary\": \"Lab poster\", \"visualClues\": [\"robot arm\"], \"confidence\": \"high\"}"
            }}]
        });
        let context = parse_vision_response(&response, Some("poster.png")).unwrap();
        assert!(context.available);
        assert_eq!(context.summary, "Lab poster");
        assert_eq!(context.visual_clues, vec!["robot arm"]);
        assert_eq!(context.filename.as_deref(), Some("poster.png"));
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let endpoint = VisionEndpoint {
            base_url: "https://example.test/v1/".into(),
            model: "m".into(),
            api_key: "k".into(),
        };
        assert_eq!(
            endpoint.chat_completions_url(),
            "https://example.test/v1/chat/completions"
        );
    }
}
