use async_trait::async_trait;

use crate::errors::ScribeResult;
use crate::llm::types::{CallConfig, CompletionRequest};

/// Unified model backend. Variants differ only in request framing; callers
/// see the raw completion text and nothing else.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Returns the provider's identifier (matches config.toml key).
    fn name(&self) -> &str;

    /// Run one completion and return the model's raw text.
    async fn complete(&self, request: &CompletionRequest, cfg: &CallConfig) -> ScribeResult<String>;
}
