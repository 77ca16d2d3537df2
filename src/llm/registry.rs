use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Adapter, LlmConfig, ProviderEntry};
use crate::errors::{ScribeError, ScribeResult};
use crate::llm::provider::LlmProvider;
use crate::llm::providers::anthropic::AnthropicProvider;
use crate::llm::providers::bedrock::BedrockProvider;
use crate::llm::providers::openai_compatible::OpenAiCompatibleProvider;
use crate::llm::types::CallConfig;

/// Registry of configured model backends, keyed by their config.toml identifier.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    active: String,
    llm_config: LlmConfig,
}

impl ProviderRegistry {
    #[cfg(test)]
    pub fn new(active: String) -> Self {
        Self {
            providers: HashMap::new(),
            active,
            llm_config: LlmConfig::default(),
        }
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// The selected backend and its call settings.
    pub fn active(&self) -> ScribeResult<(Arc<dyn LlmProvider>, CallConfig)> {
        let provider = self.providers.get(&self.active).cloned().ok_or_else(|| {
            ScribeError::Config(format!("Active provider '{}' not found in registry", self.active))
        })?;
        let cfg = self
            .llm_config
            .providers
            .get(&self.active)
            .map(call_config)
            .ok_or_else(|| ScribeError::Config(format!("No settings for provider '{}'", self.active)))?;
        tracing::debug!(provider = %self.active, model = %cfg.model, "resolved active provider");
        Ok((provider, cfg))
    }

    /// Build every configured provider. Keys come from `STEPSCRIBE_<ID>_API_KEY`,
    /// then config.toml, then the vendor's conventional env var.
    pub fn from_config(llm: &LlmConfig) -> ScribeResult<Self> {
        let mut registry = Self {
            providers: HashMap::new(),
            active: llm.active_provider.clone(),
            llm_config: llm.clone(),
        };
        let timeout = Duration::from_secs(llm.timeout_secs.max(1));

        for (id, entry) in &llm.providers {
            let api_key = resolve_api_key(id, entry);
            if api_key.is_empty() {
                tracing::warn!(provider = %id, "no API key configured; calls will be rejected upstream");
            }
            let provider: Arc<dyn LlmProvider> = match entry.adapter {
                Adapter::Openai => {
                    let api_base = entry.api_base.clone().ok_or_else(|| {
                        ScribeError::Config(format!("provider '{id}' (openai) requires api_base"))
                    })?;
                    Arc::new(OpenAiCompatibleProvider::new(id.clone(), api_base, api_key, timeout)?)
                }
                Adapter::Anthropic => Arc::new(AnthropicProvider::new(
                    id.clone(),
                    entry.api_base.clone(),
                    api_key,
                    timeout,
                )?),
                Adapter::Bedrock => Arc::new(BedrockProvider::new(
                    id.clone(),
                    entry.api_base.clone(),
                    entry.region.clone().or_else(|| std::env::var("AWS_REGION").ok()),
                    api_key,
                    timeout,
                )?),
            };
            tracing::info!(
                provider = %id,
                display_name = %entry.display_name,
                adapter = ?entry.adapter,
                model = %entry.model,
                "provider registered"
            );
            registry.register(provider);
        }
        Ok(registry)
    }
}

fn call_config(entry: &ProviderEntry) -> CallConfig {
    CallConfig {
        model: entry.model.clone(),
        temperature: entry.temperature,
        step_max_tokens: entry.step_max_tokens,
        journey_max_tokens: entry.journey_max_tokens,
    }
}

fn resolve_api_key(id: &str, entry: &ProviderEntry) -> String {
    if let Ok(key) = std::env::var(format!("STEPSCRIBE_{}_API_KEY", id.to_uppercase())) {
        return key;
    }
    if let Some(key) = &entry.api_key {
        return key.clone();
    }
    let vendor_var = match entry.adapter {
        Adapter::Openai => "OPENAI_API_KEY",
        Adapter::Anthropic => "ANTHROPIC_API_KEY",
        Adapter::Bedrock => "AWS_BEARER_TOKEN_BEDROCK",
    };
    std::env::var(vendor_var).unwrap_or_default()
}
