use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{ScribeError, ScribeResult};

pub const DEFAULT_STEP_PROMPT: &str = "Describe the UI element highlighted with a red rectangle in this screenshot. \
Make no reference to element itself only reply with description which starts with \"Click here to\" \
and then a one liner what will happen.";

pub const DEFAULT_JOURNEY_PROMPT: &str = "Given these steps of a user journey:\n{steps}\n\n\
Provide a JSON response with:\n1. \"name\": A short name (2-4 words)\n2. \"description\": A one-liner\n\n\
Respond ONLY with valid JSON, no markdown.";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// JSON file holding the `steps` map. Defaults to the platform data dir.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(p) = &self.path {
            return p.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("stepscribe").join("steps.json"))
            .unwrap_or_else(|| PathBuf::from("steps.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    /// RGB outline colour.
    #[serde(default = "default_color")]
    pub color: [u8; 3],
    /// Longest side of the image sent to the backend.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    /// When set, every annotated screenshot is also written here as PNG.
    #[serde(default)]
    pub debug_dump: Option<PathBuf>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            stroke_width: default_stroke_width(),
            color: default_color(),
            max_dimension: default_max_dimension(),
            debug_dump: None,
        }
    }
}

fn default_stroke_width() -> u32 {
    5
}

fn default_color() -> [u8; 3] {
    [255, 0, 0]
}

fn default_max_dimension() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub active_provider: String,
    #[serde(default)]
    pub providers: HashMap<String, ProviderEntry>,
    /// Per-call connect + read timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "bedrock".to_string(),
            ProviderEntry {
                display_name: "AWS Bedrock (Claude 3 Sonnet)".to_string(),
                adapter: Adapter::Bedrock,
                api_base: None,
                model: "anthropic.claude-3-sonnet-20240229-v1:0".to_string(),
                region: Some("eu-central-1".to_string()),
                temperature: None,
                step_max_tokens: default_step_max_tokens(),
                journey_max_tokens: default_journey_max_tokens(),
                api_key: None,
            },
        );
        Self {
            active_provider: "bedrock".to_string(),
            providers,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}

/// Request framing used by a provider entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Adapter {
    /// OpenAI-compatible `/chat/completions` (OpenAI, Groq, local gateways).
    #[default]
    Openai,
    /// Anthropic Messages API called directly.
    Anthropic,
    /// Anthropic models behind the AWS Bedrock runtime gateway.
    Bedrock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub adapter: Adapter,
    /// Endpoint URL. Bedrock derives one from `region` when absent.
    #[serde(default)]
    pub api_base: Option<String>,
    pub model: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default = "default_step_max_tokens")]
    pub step_max_tokens: u32,
    #[serde(default = "default_journey_max_tokens")]
    pub journey_max_tokens: u32,
    /// Optional key stored in config.toml (falls back to env var STEPSCRIBE_<ID>_API_KEY).
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_step_max_tokens() -> u32 {
    300
}

fn default_journey_max_tokens() -> u32 {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default = "default_step_prompt")]
    pub step: String,
    /// `{steps}` is replaced with the numbered step list.
    #[serde(default = "default_journey_prompt")]
    pub journey: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            step: default_step_prompt(),
            journey: default_journey_prompt(),
        }
    }
}

fn default_step_prompt() -> String {
    DEFAULT_STEP_PROMPT.to_string()
}

fn default_journey_prompt() -> String {
    DEFAULT_JOURNEY_PROMPT.to_string()
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("STEPSCRIBE_CONFIG") {
        let candidate = PathBuf::from(p);
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config from STEPSCRIBE_CONFIG");
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "STEPSCRIBE_CONFIG points to a missing file");
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Some(candidate);
            }
        }
    }

    let candidate = std::env::current_dir().ok()?.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Some(candidate);
    }
    None
}

pub fn parse_config(content: &str) -> ScribeResult<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;
    if !config.llm.providers.contains_key(&config.llm.active_provider) {
        return Err(ScribeError::Config(format!(
            "active_provider '{}' has no [llm.providers.{}] entry",
            config.llm.active_provider, config.llm.active_provider
        )));
    }
    Ok(config)
}

/// Load `config.toml`, or built-in defaults when no file is found.
pub fn load_config() -> ScribeResult<AppConfig> {
    let Some(path) = resolve_config_path() else {
        tracing::warn!("config.toml not found; using built-in defaults");
        return Ok(AppConfig::default());
    };
    let content = std::fs::read_to_string(&path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), provider = %config.llm.active_provider, "config loaded");
    Ok(config)
}
