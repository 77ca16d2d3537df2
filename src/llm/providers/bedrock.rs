use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ScribeResult;
use crate::llm::provider::LlmProvider;
use crate::llm::providers::anthropic::{build_request, extract_text};
use crate::llm::providers::{build_client, ensure_success, sanitized_for_log};
use crate::llm::types::{CallConfig, CompletionRequest};

const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";
pub const DEFAULT_REGION: &str = "eu-central-1";

/// Anthropic models served through the Bedrock runtime `invoke` endpoint,
/// authenticated with a Bedrock API key (bearer token).
pub struct BedrockProvider {
    id: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl BedrockProvider {
    pub fn new(
        id: String,
        api_base: Option<String>,
        region: Option<String>,
        api_key: String,
        timeout: Duration,
    ) -> ScribeResult<Self> {
        let endpoint = api_base.unwrap_or_else(|| {
            let region = region.as_deref().unwrap_or(DEFAULT_REGION);
            format!("https://bedrock-runtime.{region}.amazonaws.com")
        });
        Ok(Self {
            id,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            client: build_client(timeout)?,
        })
    }

    pub fn invoke_url(&self, model: &str) -> String {
        format!("{}/model/{}/invoke", self.endpoint, model.replace(':', "%3A"))
    }
}

#[async_trait]
impl LlmProvider for BedrockProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn complete(&self, request: &CompletionRequest, cfg: &CallConfig) -> ScribeResult<String> {
        let body = serde_json::to_value(build_request(
            request,
            None,
            Some(BEDROCK_ANTHROPIC_VERSION),
            cfg.temperature,
        ))?;
        let url = self.invoke_url(&cfg.model);

        tracing::debug!(
            provider = %self.id,
            url = %url,
            body = %sanitized_for_log(&body),
            "sending bedrock invoke request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let json: serde_json::Value = response.json().await?;
        let content = extract_text(&json)?;
        tracing::info!(provider = %self.id, content_len = content.len(), "bedrock response received");
        Ok(content)
    }
}
