use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{ScribeError, ScribeResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::{build_client, ensure_success, error_envelope, sanitized_for_log};
use crate::llm::types::{CallConfig, ChatMessage, CompletionRequest, ContentPart, ImageUrl, MessageContent};

/// OpenAI-compatible `/chat/completions` endpoint with bearer auth.
pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: String, api_base: String, api_key: String, timeout: Duration) -> ScribeResult<Self> {
        Ok(Self {
            id,
            api_base,
            api_key,
            client: build_client(timeout)?,
        })
    }
}

pub(crate) fn build_body(request: &CompletionRequest, cfg: &CallConfig) -> serde_json::Value {
    let content = match &request.image_png_base64 {
        Some(b64) => MessageContent::Parts(vec![
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{b64}"),
                },
            },
            ContentPart::Text {
                text: request.prompt.clone(),
            },
        ]),
        None => MessageContent::Text(request.prompt.clone()),
    };
    let messages = vec![ChatMessage {
        role: "user".into(),
        content,
    }];

    let mut body = serde_json::json!({
        "model": cfg.model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "stream": false,
    });
    if let Some(t) = cfg.temperature {
        body["temperature"] = serde_json::json!(t);
    }
    body
}

pub(crate) fn extract_text(json: &serde_json::Value) -> ScribeResult<String> {
    if let Some(message) = error_envelope(json) {
        return Err(ScribeError::Backend(message));
    }
    json["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ScribeError::Backend("response has no choices[0].message.content".into()))
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &CompletionRequest, cfg: &CallConfig) -> ScribeResult<String> {
        let body = build_body(request, cfg);

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            body = %sanitized_for_log(&body),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let json: serde_json::Value = response.json().await?;
        let content = extract_text(&json)?;
        tracing::info!(provider = %self.id, content_len = content.len(), "chat completion received");
        Ok(content)
    }
}
