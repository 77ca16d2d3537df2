use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{ScribeError, ScribeResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{build_client, ensure_success, error_envelope, sanitized_for_log};
use crate::llm::types::{
    AnthropicBlock, AnthropicMessage, AnthropicRequest, CallConfig, CompletionRequest, ImageSource,
};

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Direct Anthropic Messages API with `x-api-key` auth.
pub struct AnthropicProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(id: String, api_base: Option<String>, api_key: String, timeout: Duration) -> ScribeResult<Self> {
        Ok(Self {
            id,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key,
            client: build_client(timeout)?,
        })
    }
}

/// Messages body shared with the Bedrock gateway. The image block goes
/// before the text so the model sees the screenshot first.
pub(crate) fn build_request(
    request: &CompletionRequest,
    model: Option<&str>,
    anthropic_version: Option<&str>,
    temperature: Option<f64>,
) -> AnthropicRequest {
    let mut content = Vec::with_capacity(2);
    if let Some(b64) = &request.image_png_base64 {
        content.push(AnthropicBlock::Image {
            source: ImageSource {
                source_type: "base64".into(),
                media_type: "image/png".into(),
                data: b64.clone(),
            },
        });
    }
    content.push(AnthropicBlock::Text {
        text: request.prompt.clone(),
    });

    AnthropicRequest {
        anthropic_version: anthropic_version.map(str::to_string),
        model: model.map(str::to_string),
        max_tokens: request.max_tokens,
        temperature,
        messages: vec![AnthropicMessage {
            role: "user".into(),
            content,
        }],
    }
}

/// Text of the first `text` content block.
pub(crate) fn extract_text(json: &serde_json::Value) -> ScribeResult<String> {
    if let Some(message) = error_envelope(json) {
        return Err(ScribeError::Backend(message));
    }
    json["content"]
        .as_array()
        .and_then(|blocks| {
            blocks
                .iter()
                .find(|b| b["type"].as_str().unwrap_or("text") == "text")
                .and_then(|b| b["text"].as_str())
        })
        .map(str::to_string)
        .ok_or_else(|| ScribeError::Backend("response has no text content block".into()))
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &CompletionRequest, cfg: &CallConfig) -> ScribeResult<String> {
        let body = serde_json::to_value(build_request(request, Some(&cfg.model), None, cfg.temperature))?;

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            body = %sanitized_for_log(&body),
            "sending messages request"
        );

        let response = self
            .client
            .post(&self.api_base)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let json: serde_json::Value = response.json().await?;
        let content = extract_text(&json)?;
        tracing::info!(provider = %self.id, content_len = content.len(), "messages response received");
        Ok(content)
    }
}
