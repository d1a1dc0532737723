//! Google Gemini `generateContent` client

use async_trait::async_trait;
use tracing::warn;

use super::{error_message, InferenceClient};
use crate::core::config::{ApiKey, ProviderEndpoint};
use crate::core::errors::{ConversionError, Result};
use crate::core::models::RawCompletion;

const PROVIDER: &str = "gemini";

/// Client for `POST {api_base}/models/{model}:generateContent`
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: ApiKey,
}

impl GeminiClient {
    /// Client sharing `http`'s connection pool
    pub fn new(http: reqwest::Client, endpoint: &ProviderEndpoint, temperature: f32, api_key: ApiKey) -> Self {
        Self {
            http,
            endpoint: format!(
                "{}/models/{}:generateContent",
                endpoint.api_base.trim_end_matches('/'),
                endpoint.model
            ),
            model: endpoint.model.clone(),
            temperature,
            api_key,
        }
    }

    /// Model name sent with each request
    pub fn model(&self) -> &str {
        &self.model
    }
}

/// Concatenate the text parts of the first candidate
fn candidate_text(json: &serde_json::Value) -> Option<String> {
    let parts = json["candidates"].get(0)?["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|part| part["text"].as_str()).collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl InferenceClient for GeminiClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn invoke(&self, prompt: &str) -> Result<RawCompletion> {
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "temperature": self.temperature
            }
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| ConversionError::provider(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Gemini returned {}: {}", status, error_text);
            return Err(ConversionError::provider(
                PROVIDER,
                format!("{} - {}", status.as_u16(), error_message(&error_text)),
            ));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ConversionError::provider(PROVIDER, format!("invalid response: {e}")))?;

        candidate_text(&json)
            .map(RawCompletion)
            .ok_or_else(|| ConversionError::provider(PROVIDER, "no candidate text in response"))
    }
}
